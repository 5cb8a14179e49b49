use crate::round_trip_tests::{Transport, check_round_trip, f32_tensor, test_eq_exact};
use onnx_bridge::dtype::DType;
use onnx_bridge::graph::ops::Operation;
use onnx_bridge::graph::registry::OpKind;
use onnx_bridge::{GraphBuilder, NDArrayNumericTensor};

fn mask(values: &[u8], shape: &[usize]) -> NDArrayNumericTensor {
    NDArrayNumericTensor::from_vec_shape(values.to_vec(), shape).unwrap()
}

pub fn test_comparisons(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let a = builder.input("a", f32_tensor(&[1.0, 2.0, 3.0, 4.0], &[4])).unwrap();
    let b = builder.weight("b", f32_tensor(&[1.0, 3.0, 2.0, 4.0], &[4]), false).unwrap();
    let equal = builder.equal(a, b).unwrap();
    let less = builder.less(a, b).unwrap();
    let greater = builder.greater(a, b).unwrap();
    test_eq_exact(builder.value(equal).unwrap(), &mask(&[1, 0, 0, 1], &[4]));
    test_eq_exact(builder.value(less).unwrap(), &mask(&[0, 1, 0, 0], &[4]));
    test_eq_exact(builder.value(greater).unwrap(), &mask(&[0, 0, 1, 0], &[4]));
    check_round_trip(transport, builder, &[("equal", equal), ("less", less), ("greater", greater)]);
}

pub fn test_boolean_ops(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let a = builder.input("a", mask(&[0, 0, 1, 1], &[2, 2])).unwrap();
    let b = builder.input("b", mask(&[0, 1, 0, 1], &[2, 2])).unwrap();
    let and = builder.and(a, b).unwrap();
    let or = builder.or(a, b).unwrap();
    let xor = builder.xor(a, b).unwrap();
    let not = builder.not(xor).unwrap();
    test_eq_exact(builder.value(and).unwrap(), &mask(&[0, 0, 0, 1], &[2, 2]));
    test_eq_exact(builder.value(or).unwrap(), &mask(&[0, 1, 1, 1], &[2, 2]));
    test_eq_exact(builder.value(not).unwrap(), &mask(&[1, 0, 0, 1], &[2, 2]));
    check_round_trip(transport, builder, &[("and", and), ("or", or), ("not", not)]);
}

pub fn test_where(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", f32_tensor(&[-1.0, 2.0, -3.0, 4.0, 0.5, -0.5], &[2, 3])).unwrap();
    let zero = builder.constant(None, NDArrayNumericTensor::from_vec_shape(vec![0.0f32], &[]).unwrap()).unwrap();
    let positive = builder.greater(x, zero).unwrap();
    let fallback = builder.weight("fallback", f32_tensor(&[10.0, 20.0, 30.0], &[3]), true).unwrap();
    let selected = builder.where_op(positive, x, fallback).unwrap();
    test_eq_exact(builder.value(selected).unwrap(), &f32_tensor(&[10.0, 2.0, 30.0, 4.0, 0.5, 30.0], &[2, 3]));
    check_round_trip(transport, builder, &[("selected", selected)]);
}

pub fn test_casts(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", f32_tensor(&[-1.7, 0.0, 2.2, 3.9], &[4])).unwrap();
    let as_int = builder.cast(x, DType::I64).unwrap();
    let as_double = builder.cast(as_int, DType::F64).unwrap();
    let as_bool = builder.cast_to_bool(x).unwrap();
    assert_eq!(builder.value(as_int).unwrap().try_to_vec::<i64>().unwrap(), vec![-1, 0, 2, 3]);
    test_eq_exact(builder.value(as_bool).unwrap(), &mask(&[1, 0, 1, 1], &[4]));
    check_round_trip(transport, builder, &[("as_int", as_int), ("as_double", as_double), ("as_bool", as_bool)]);
}

pub fn test_numeric_use_of_bool(transport: &Transport) {
    // Add reads its operands as numbers, so the mask crosses a Cast on export.
    let mut builder = GraphBuilder::new();
    let a = builder.input("a", f32_tensor(&[1.0, 5.0, 3.0], &[3])).unwrap();
    let b = builder.weight("b", f32_tensor(&[2.0, 2.0, 2.0], &[3]), false).unwrap();
    let less = builder.less(a, b).unwrap();
    let doubled = builder.add(less, less).unwrap();
    let as_float = builder.cast(doubled, DType::F32).unwrap();
    let scaled = builder.mul(as_float, a).unwrap();
    test_eq_exact(builder.value(doubled).unwrap(), &mask(&[2, 0, 0], &[3]));
    test_eq_exact(builder.value(scaled).unwrap(), &f32_tensor(&[2.0, 0.0, 0.0], &[3]));
    let runner = check_round_trip(transport, builder, &[("less", less), ("scaled", scaled)]);
    let casts = runner
        .graph()
        .get_operations()
        .iter()
        .filter(|op| op.op.get_op_kind() == OpKind::Cast)
        .count();
    assert_eq!(casts, 2);
}

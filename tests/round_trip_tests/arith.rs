use crate::round_trip_tests::{Transport, check_round_trip, f32_tensor, test_eq_f32};
use onnx_bridge::{GraphBuilder, NDArrayNumericTensor};

pub fn test_elementwise_arith(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let a = builder.input("a", f32_tensor(&[0.15, 0.31, 5.39, -1.0, 2.5, 0.75], &[2, 3])).unwrap();
    let w = builder.weight("w", f32_tensor(&[1.34, 0.005, 6.92, 2.0, -0.5, 4.0], &[2, 3]), true).unwrap();
    let bias = builder.weight("bias", f32_tensor(&[0.5, -0.25, 1.0], &[3]), false).unwrap();
    let sum = builder.add(a, w).unwrap();
    let difference = builder.sub(a, w).unwrap();
    let product = builder.mul(a, w).unwrap();
    let quotient = builder.div(a, w).unwrap();
    let broadcast = builder.add(product, bias).unwrap();
    let runner = check_round_trip(
        transport,
        builder,
        &[("sum", sum), ("difference", difference), ("quotient", quotient), ("broadcast", broadcast)],
    );
    assert_eq!(runner.num_operations(), 5);
}

pub fn test_pow(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let base = builder.input("base", f32_tensor(&[1.0, 2.0, 3.0, 0.5], &[4])).unwrap();
    let exponent = builder.constant(Some("two"), NDArrayNumericTensor::from_vec_shape(vec![2.0f32], &[]).unwrap()).unwrap();
    let squared = builder.pow(base, exponent).unwrap();
    let expected = f32_tensor(&[1.0, 4.0, 9.0, 0.25], &[4]);
    test_eq_f32(builder.value(squared).unwrap(), &expected);
    check_round_trip(transport, builder, &[("squared", squared)]);
}

pub fn test_matmul(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let a = builder.input("a", f32_tensor(&[1.0, -2.5, 3.0, 4.0, 0.5, -1.0], &[2, 3])).unwrap();
    let b = builder.weight("b", f32_tensor(&[1.0, 2.0, 0.25, -0.75, 3.5, 0.0], &[3, 2]), true).unwrap();
    let y = builder.matmul(a, b).unwrap();
    test_eq_f32(builder.value(y).unwrap(), &f32_tensor(&[10.875, 3.875, 0.625, 7.625], &[2, 2]));
    check_round_trip(transport, builder, &[("y", y)]);
}

pub fn test_batched_matmul(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let values: Vec<f32> = (0..12).map(|x| x as f32 * 0.5).collect();
    let a = builder.input("a", f32_tensor(&values, &[2, 2, 3])).unwrap();
    let b = builder.weight("b", f32_tensor(&[1.0, 0.0, -1.0, 2.0, 0.5, 0.5], &[3, 2]), false).unwrap();
    let y = builder.matmul(a, b).unwrap();
    assert_eq!(builder.value(y).unwrap().shape(), &[2, 2, 2]);
    check_round_trip(transport, builder, &[("y", y)]);
}

pub fn test_gemm(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let a = builder.input("a", f32_tensor(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])).unwrap();
    let b = builder.weight("b", f32_tensor(&[0.5, -1.0, 2.0, 1.0, 0.0, -0.5], &[2, 3]), true).unwrap();
    let c = builder.weight("c", f32_tensor(&[1.0, -1.0], &[2]), true).unwrap();
    let y = builder.gemm(a, b, Some(c), 0.5, 2.0, false, true).unwrap();
    // 0.5 * a @ b^T + 2 * c
    test_eq_f32(builder.value(y).unwrap(), &f32_tensor(&[4.25, -2.25, 6.5, -1.5], &[2, 2]));
    check_round_trip(transport, builder, &[("y", y)]);
}

pub fn test_unary_chain(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", f32_tensor(&[-1.5, -0.25, 0.0, 0.5, 2.0, 3.5], &[2, 3])).unwrap();
    let relu = builder.relu(x).unwrap();
    let sigmoid = builder.sigmoid(x).unwrap();
    let tanh = builder.tanh(x).unwrap();
    let exp = builder.exp(x).unwrap();
    let log = builder.log(exp).unwrap();
    let abs = builder.abs(x).unwrap();
    let sqrt = builder.sqrt(abs).unwrap();
    let neg = builder.neg(sqrt).unwrap();
    let identity = builder.identity(neg).unwrap();
    check_round_trip(
        transport,
        builder,
        &[("relu", relu), ("sigmoid", sigmoid), ("tanh", tanh), ("log", log), ("identity", identity)],
    );
}

pub fn test_leaky_relu_softmax(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", f32_tensor(&[-2.0, -0.5, 0.0, 1.0, 3.0, -4.0], &[2, 3])).unwrap();
    let leaky = builder.leaky_relu(x, 0.1).unwrap();
    let probabilities = builder.softmax(leaky, 1).unwrap();
    let row_sums = builder.reduce_sum(probabilities, Some(&[1][..]), false).unwrap();
    test_eq_f32(builder.value(row_sums).unwrap(), &f32_tensor(&[1.0, 1.0], &[2]));
    check_round_trip(transport, builder, &[("leaky", leaky), ("probabilities", probabilities)]);
}

pub fn test_reductions(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", f32_tensor(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])).unwrap();
    let sum_all = builder.reduce_sum(x, None, false).unwrap();
    let mean_rows = builder.reduce_mean(x, Some(&[-1][..]), true).unwrap();
    test_eq_f32(builder.value(mean_rows).unwrap(), &f32_tensor(&[2.0, 5.0], &[2, 1]));
    check_round_trip(transport, builder, &[("sum_all", sum_all), ("mean_rows", mean_rows)]);
}

pub fn test_dropout_inference(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", f32_tensor(&[1.0, 2.0, 3.0, 4.0], &[4])).unwrap();
    let (out, mask) = builder.dropout(x, 0.3).unwrap();
    test_eq_f32(builder.value(out).unwrap(), &f32_tensor(&[1.0, 2.0, 3.0, 4.0], &[4]));
    assert_eq!(builder.value(mask).unwrap().try_to_vec::<u8>().unwrap(), vec![1, 1, 1, 1]);
    check_round_trip(transport, builder, &[("out", out), ("mask", mask)]);
}

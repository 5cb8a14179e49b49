use crate::round_trip_tests::{Transport, check_round_trip, f32_tensor, test_eq_exact};
use onnx_bridge::{GraphBuilder, NDArrayNumericTensor};

fn iota(n: usize, shape: &[usize]) -> NDArrayNumericTensor {
    let values: Vec<f32> = (0..n).map(|x| x as f32).collect();
    f32_tensor(&values, shape)
}

pub fn test_reshape_flatten(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", iota(24, &[2, 3, 4])).unwrap();
    let reshaped = builder.reshape(x, &[4, -1]).unwrap();
    let zero_copy = builder.reshape(x, &[0, 12]).unwrap();
    let flat = builder.flatten(x, 2).unwrap();
    assert_eq!(builder.value(reshaped).unwrap().shape(), &[4, 6]);
    assert_eq!(builder.value(zero_copy).unwrap().shape(), &[2, 12]);
    assert_eq!(builder.value(flat).unwrap().shape(), &[6, 4]);
    check_round_trip(transport, builder, &[("reshaped", reshaped), ("zero_copy", zero_copy), ("flat", flat)]);
}

pub fn test_squeeze_unsqueeze(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", iota(6, &[1, 2, 1, 3])).unwrap();
    let squeezed_all = builder.squeeze(x, None).unwrap();
    let squeezed_one = builder.squeeze(x, Some(&[-2][..])).unwrap();
    let unsqueezed = builder.unsqueeze(squeezed_all, &[0, 3]).unwrap();
    assert_eq!(builder.value(squeezed_all).unwrap().shape(), &[2, 3]);
    assert_eq!(builder.value(squeezed_one).unwrap().shape(), &[1, 2, 3]);
    assert_eq!(builder.value(unsqueezed).unwrap().shape(), &[1, 2, 3, 1]);
    check_round_trip(
        transport,
        builder,
        &[("squeezed_all", squeezed_all), ("squeezed_one", squeezed_one), ("unsqueezed", unsqueezed)],
    );
}

pub fn test_transpose(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", iota(6, &[2, 3])).unwrap();
    let reversed = builder.transpose(x, None).unwrap();
    test_eq_exact(builder.value(reversed).unwrap(), &f32_tensor(&[0.0, 3.0, 1.0, 4.0, 2.0, 5.0], &[3, 2]));
    let y = builder.input("y", iota(24, &[2, 3, 4])).unwrap();
    let permuted = builder.transpose(y, Some(&[1, 2, 0][..])).unwrap();
    assert_eq!(builder.value(permuted).unwrap().shape(), &[3, 4, 2]);
    check_round_trip(transport, builder, &[("reversed", reversed), ("permuted", permuted)]);
}

pub fn test_expand(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", f32_tensor(&[1.0, 2.0, 3.0], &[3, 1])).unwrap();
    let expanded = builder.expand(x, &[2, 3, 4]).unwrap();
    assert_eq!(builder.value(expanded).unwrap().shape(), &[2, 3, 4]);
    check_round_trip(transport, builder, &[("expanded", expanded)]);
}

pub fn test_concat(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let a = builder.input("a", iota(4, &[2, 2])).unwrap();
    let b = builder.weight("b", f32_tensor(&[9.0, 8.0], &[2, 1]), true).unwrap();
    let joined = builder.concat(&[a, b, a], -1).unwrap();
    test_eq_exact(
        builder.value(joined).unwrap(),
        &f32_tensor(&[0.0, 1.0, 9.0, 0.0, 1.0, 2.0, 3.0, 8.0, 2.0, 3.0], &[2, 5]),
    );
    check_round_trip(transport, builder, &[("joined", joined)]);
}

pub fn test_gather(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let table = builder.weight("table", iota(12, &[4, 3]), true).unwrap();
    let indices = builder
        .constant(Some("indices"), NDArrayNumericTensor::from_vec_shape(vec![3i64, 0, -1, 1], &[2, 2]).unwrap())
        .unwrap();
    let rows = builder.gather(table, indices, 0).unwrap();
    let column = builder.gather(table, indices, 1).unwrap_err();
    assert!(!column.to_string().is_empty());
    assert_eq!(builder.value(rows).unwrap().shape(), &[2, 2, 3]);
    let values = builder.value(rows).unwrap().try_to_vec::<f32>().unwrap();
    assert_eq!(&values[..6], &[9.0, 10.0, 11.0, 0.0, 1.0, 2.0]);
    assert_eq!(&values[6..], &[9.0, 10.0, 11.0, 3.0, 4.0, 5.0]);
    check_round_trip(transport, builder, &[("rows", rows)]);
}

pub fn test_slice(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", iota(20, &[4, 5])).unwrap();
    let window = builder.slice(x, &[1, 1], &[3, 4], None, None).unwrap();
    let reversed = builder.slice(x, &[-1], &[i64::MIN], Some(&[1][..]), Some(&[-2][..])).unwrap();
    let clamped = builder.slice(x, &[2], &[i64::MAX], Some(&[0][..]), None).unwrap();
    test_eq_exact(builder.value(window).unwrap(), &f32_tensor(&[6.0, 7.0, 8.0, 11.0, 12.0, 13.0], &[2, 3]));
    assert_eq!(builder.value(reversed).unwrap().shape(), &[4, 3]);
    assert_eq!(&builder.value(reversed).unwrap().try_to_vec::<f32>().unwrap()[..3], &[4.0, 2.0, 0.0]);
    assert_eq!(builder.value(clamped).unwrap().shape(), &[2, 5]);
    check_round_trip(transport, builder, &[("window", window), ("reversed", reversed), ("clamped", clamped)]);
}

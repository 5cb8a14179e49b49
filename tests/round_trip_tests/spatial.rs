use crate::round_trip_tests::{Transport, check_round_trip, f32_tensor, test_eq_f32};
use onnx_bridge::GraphBuilder;
use onnx_bridge::graph::ops::ConvDescriptor;

fn iota(n: usize, shape: &[usize]) -> onnx_bridge::NDArrayNumericTensor {
    let values: Vec<f32> = (0..n).map(|x| x as f32).collect();
    f32_tensor(&values, shape)
}

pub fn test_conv_padded(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", iota(9, &[1, 1, 3, 3])).unwrap();
    let w = builder.weight("w", f32_tensor(&[1.0; 4], &[1, 1, 2, 2]), true).unwrap();
    let b = builder.weight("b", f32_tensor(&[0.5], &[1]), true).unwrap();
    let descriptor = ConvDescriptor::new(&[2, 2], None, Some(&[1, 1, 1, 1]), None, 1).unwrap();
    let y = builder.conv(x, w, Some(b), descriptor).unwrap();
    let value = builder.value(y).unwrap();
    assert_eq!(value.shape(), &[1, 1, 4, 4]);
    let values = value.try_to_vec::<f32>().unwrap();
    assert_eq!(values[0], 0.5);
    assert_eq!(values[5], 8.5);
    assert_eq!(values[15], 8.5);
    check_round_trip(transport, builder, &[("y", y)]);
}

pub fn test_conv_strided_grouped(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", iota(18, &[1, 2, 3, 3])).unwrap();
    let w = builder.weight("w", f32_tensor(&[1.0, 1.0, 1.0, 1.0, -1.0, 0.0, 0.0, 2.0], &[2, 1, 2, 2]), true).unwrap();
    let descriptor = ConvDescriptor::new(&[2, 2], Some(&[2, 2]), None, None, 2).unwrap();
    assert_eq!(descriptor.group(), 2);
    let y = builder.conv(x, w, None, descriptor).unwrap();
    // Channel 0 sums 0+1+3+4, channel 1 takes -9 + 2*13
    test_eq_f32(builder.value(y).unwrap(), &f32_tensor(&[8.0, 17.0], &[1, 2, 1, 1]));
    check_round_trip(transport, builder, &[("y", y)]);
}

pub fn test_conv_dilated(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", iota(25, &[1, 1, 5, 5])).unwrap();
    let w = builder.weight("w", f32_tensor(&[1.0, 0.0, 0.0, 1.0], &[1, 1, 2, 2]), false).unwrap();
    let descriptor = ConvDescriptor::new(&[2, 2], None, None, Some(&[2, 2]), 1).unwrap();
    let y = builder.conv(x, w, None, descriptor).unwrap();
    assert_eq!(builder.value(y).unwrap().shape(), &[1, 1, 3, 3]);
    // x[0][0] + x[2][2]
    assert_eq!(builder.value(y).unwrap().try_to_vec::<f32>().unwrap()[0], 12.0);
    check_round_trip(transport, builder, &[("y", y)]);
}

pub fn test_max_pool(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", iota(16, &[1, 1, 4, 4])).unwrap();
    let descriptor = ConvDescriptor::new(&[2, 2], Some(&[2, 2]), None, None, 1).unwrap();
    let pooled = builder.max_pool(x, descriptor).unwrap();
    test_eq_f32(builder.value(pooled).unwrap(), &f32_tensor(&[5.0, 7.0, 13.0, 15.0], &[1, 1, 2, 2]));
    let overlapping = ConvDescriptor::new(&[3, 3], None, Some(&[1, 1, 1, 1]), None, 1).unwrap();
    let smoothed = builder.max_pool(x, overlapping).unwrap();
    assert_eq!(builder.value(smoothed).unwrap().shape(), &[1, 1, 4, 4]);
    check_round_trip(transport, builder, &[("pooled", pooled), ("smoothed", smoothed)]);
}

pub fn test_batch_norm(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", f32_tensor(&[1.0, 2.0, 3.0, 4.0], &[1, 2, 1, 2])).unwrap();
    let scale = builder.weight("scale", f32_tensor(&[1.0, 2.0], &[2]), true).unwrap();
    let bias = builder.weight("bias", f32_tensor(&[0.0, 1.0], &[2]), true).unwrap();
    let mean = builder.weight("mean", f32_tensor(&[1.0, 3.0], &[2]), false).unwrap();
    let var = builder.weight("var", f32_tensor(&[1.0, 4.0], &[2]), false).unwrap();
    let y = builder.batch_norm(x, scale, bias, mean, var, 1e-5).unwrap();
    test_eq_f32(builder.value(y).unwrap(), &f32_tensor(&[0.0, 1.0, 1.0, 2.0], &[1, 2, 1, 2]));
    let activated = builder.relu(y).unwrap();
    check_round_trip(transport, builder, &[("y", y), ("activated", activated)]);
}

pub fn test_small_cnn(transport: &Transport) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("image", iota(32, &[2, 1, 4, 4])).unwrap();
    let kernel: Vec<f32> = (0..18).map(|i| ((i % 5) as f32 - 2.0) * 0.1).collect();
    let w = builder.weight("conv.weight", f32_tensor(&kernel, &[2, 1, 3, 3]), true).unwrap();
    let b = builder.weight("conv.bias", f32_tensor(&[0.1, -0.1], &[2]), true).unwrap();
    let descriptor = ConvDescriptor::new(&[3, 3], None, Some(&[1, 1, 1, 1]), None, 1).unwrap();
    let features = builder.conv(x, w, Some(b), descriptor).unwrap();
    let activated = builder.relu(features).unwrap();
    let pooled = builder.max_pool(activated, ConvDescriptor::new(&[2, 2], Some(&[2, 2]), None, None, 1).unwrap()).unwrap();
    let flat = builder.flatten(pooled, 1).unwrap();
    let fc = builder.weight("fc.weight", f32_tensor(&[0.5; 24], &[3, 8]), true).unwrap();
    let logits = builder.gemm(flat, fc, None, 1.0, 1.0, false, true).unwrap();
    let probabilities = builder.softmax(logits, -1).unwrap();
    assert_eq!(builder.value(probabilities).unwrap().shape(), &[2, 3]);
    let runner = check_round_trip(transport, builder, &[("probabilities", probabilities)]);
    let trainable: Vec<&str> = runner
        .tensors()
        .filter(|(_, info)| info.trainable)
        .filter_map(|(_, info)| info.name.as_deref())
        .collect();
    assert_eq!(trainable.len(), 3);
}

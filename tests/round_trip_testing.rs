use paste::paste;
mod round_trip_tests;
use round_trip_tests::Transport;
use round_trip_tests::arith::*;
use round_trip_tests::logic::*;
use round_trip_tests::shape::*;
use round_trip_tests::spatial::*;

fn run_in_memory(test: impl FnOnce(&Transport)) {
    test(&Transport::Memory)
}

fn run_via_file(test: impl FnOnce(&Transport)) {
    let dir = tempfile::tempdir().unwrap();
    test(&Transport::File(dir))
}

macro_rules! do_test {
    ($runner_fn:expr, $runner_name:ident, $test_name:ident) => {
        paste! {
            #[allow(non_snake_case)]
            #[test]
            fn [<$runner_name _ $test_name>]() {
                $runner_fn($test_name);
            }
        }
    };
}

macro_rules! do_tests {
    ($runner_fn:expr, $runner_name:ident) => {
        do_test!($runner_fn, $runner_name, test_elementwise_arith);
        do_test!($runner_fn, $runner_name, test_pow);
        do_test!($runner_fn, $runner_name, test_matmul);
        do_test!($runner_fn, $runner_name, test_batched_matmul);
        do_test!($runner_fn, $runner_name, test_gemm);
        do_test!($runner_fn, $runner_name, test_unary_chain);
        do_test!($runner_fn, $runner_name, test_leaky_relu_softmax);
        do_test!($runner_fn, $runner_name, test_reductions);
        do_test!($runner_fn, $runner_name, test_dropout_inference);
        do_test!($runner_fn, $runner_name, test_comparisons);
        do_test!($runner_fn, $runner_name, test_boolean_ops);
        do_test!($runner_fn, $runner_name, test_where);
        do_test!($runner_fn, $runner_name, test_casts);
        do_test!($runner_fn, $runner_name, test_numeric_use_of_bool);
        do_test!($runner_fn, $runner_name, test_reshape_flatten);
        do_test!($runner_fn, $runner_name, test_squeeze_unsqueeze);
        do_test!($runner_fn, $runner_name, test_transpose);
        do_test!($runner_fn, $runner_name, test_expand);
        do_test!($runner_fn, $runner_name, test_concat);
        do_test!($runner_fn, $runner_name, test_gather);
        do_test!($runner_fn, $runner_name, test_slice);
        do_test!($runner_fn, $runner_name, test_conv_padded);
        do_test!($runner_fn, $runner_name, test_conv_strided_grouped);
        do_test!($runner_fn, $runner_name, test_conv_dilated);
        do_test!($runner_fn, $runner_name, test_max_pool);
        do_test!($runner_fn, $runner_name, test_batch_norm);
        do_test!($runner_fn, $runner_name, test_small_cnn);
    };
}

do_tests!(run_in_memory, memory);
do_tests!(run_via_file, file);

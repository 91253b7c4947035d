#[cfg(feature = "bench-include")]
pub mod bench_support;

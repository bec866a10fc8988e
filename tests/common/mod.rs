//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use tracing_subscriber::EnvFilter;

/// Install a test subscriber once. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chromaflow=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Assert every sample of a pixel is approximately `expected`
pub fn assert_pixel_eq(actual: &[f32], expected: &[f32], epsilon: f32) {
    assert_eq!(actual.len(), expected.len(), "channel count differs");
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (a - e).abs() < epsilon,
            "Expected pixel {:?} to be approximately {:?} (epsilon: {})",
            actual,
            expected,
            epsilon
        );
    }
}

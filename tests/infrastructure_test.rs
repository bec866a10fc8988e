//! Test to verify test infrastructure works correctly

mod common;

use chromaflow::pipeline::nodes::MATRIX;
use chromaflow::pipeline::Options;
use common::builders::{gradient_image, solid_image, ChainBuilder};

#[test]
fn test_infrastructure_setup() {
    // Test that builders work
    let (conversion, ids) = ChainBuilder::new()
        .stage(MATRIX, Options::new().with("gain", 2.0))
        .input(gradient_image(4, 2))
        .build();

    assert_eq!(ids.len(), 1);
    assert_eq!(conversion.pipeline().node_count(), 3);
    assert_eq!(conversion.input_image().unwrap().dimensions(), (4, 2));
}

#[test]
fn test_solid_image_fill() {
    let image = solid_image(2, 3, [0.1, 0.2, 0.3]);
    let image = image.read();
    assert_eq!(image.samples().len(), 2 * 3 * 3);
    common::assert_pixel_eq(image.pixel(1, 2), &[0.1, 0.2, 0.3], 1e-6);
}

#[test]
fn test_float_comparison() {
    common::assert_float_eq(1.0, 1.0000001, 0.001);
}

#[test]
#[should_panic]
fn test_float_comparison_fails() {
    common::assert_float_eq(1.0, 2.0, 0.001);
}

#[test]
#[should_panic]
fn test_pixel_comparison_fails() {
    common::assert_pixel_eq(&[0.5, 0.5], &[0.5, 0.6], 1e-3);
}

//! Built-in filter modules.

pub mod blend;
pub mod gamma;
pub mod matrix;
pub mod output;
pub mod root;

pub use blend::{BlendCore, BlendRunner};
pub use gamma::{GammaCore, GammaRunner};
pub use matrix::{MatrixCore, MatrixRunner};
pub use output::{OutputCore, OutputRunner};
pub use root::{RootCore, RootRunner};

use crate::pipeline::connector::Connector;
use crate::pipeline::registry::{FilterModule, ModuleRegistry};

pub const ROOT: &str = "org/chromaflow/image/root";
pub const OUTPUT: &str = "org/chromaflow/image/output";
pub const MATRIX: &str = "org/chromaflow/color/matrix";
pub const GAMMA: &str = "org/chromaflow/color/gamma";
pub const BLEND: &str = "org/chromaflow/image/blend";

/// Data type carried between the built-in modules.
pub const PIXEL_DATA: &str = "org/chromaflow/data/pixel";

pub fn register_builtins(registry: &mut ModuleRegistry) {
    registry.register(FilterModule::new(RootCore, RootRunner));
    registry.register(FilterModule::new(OutputCore, OutputRunner));
    registry.register(FilterModule::new(MatrixCore, MatrixRunner));
    registry.register(FilterModule::new(GammaCore, GammaRunner));
    registry.register(FilterModule::new(BlendCore, BlendRunner));
}

pub(crate) fn pixel_in(name: &str) -> Connector {
    Connector::sink(name, "data/pixel")
}

pub(crate) fn pixel_out(name: &str) -> Connector {
    Connector::source(name, PIXEL_DATA)
}

pub(crate) fn f32s_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn bytes_to_f32s(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_bytes_layout() {
        let bytes = f32s_to_bytes(&[1.0, -0.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes_to_f32s(&bytes).unwrap(), vec![1.0, -0.5]);
        assert!(bytes_to_f32s(&bytes[..5]).is_none());
    }

    #[test]
    fn test_builtin_connectors_link() {
        assert!(Connector::check_link(&pixel_out("out"), &pixel_in("in")).is_ok());
    }
}

//! Matrix node: 3×3 color matrix with gain and offset.
//!
//! Options:
//! - `matrix`: 9 values, row-major (default identity)
//! - `gain`: scalar applied to the matrix (default 1.0)
//! - `offset`: 3 values added after the matrix (default zero)
//!
//! The context is the compiled 3×4 affine transform as little-endian `f32`s.

use super::{bytes_to_f32s, f32s_to_bytes, pixel_in, pixel_out, MATRIX};
use crate::pipeline::connector::Connector;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::node::{ContextProducer, ContextRequest, FilterCore, RunContext, Runner};
use crate::pipeline::options::Options;
use crate::pipeline::ticket::PixelTicket;

const CONTEXT_TYPE: &str = "matrix";

const IDENTITY: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

pub struct MatrixCore;

impl MatrixCore {
    /// Affine transform as 3 rows of `[m0, m1, m2, offset]`.
    pub fn compile(options: &Options) -> [f32; 12] {
        let m = options.get_floats("matrix").unwrap_or(&IDENTITY);
        let gain = options.get_float("gain").unwrap_or(1.0);
        let offset = options.get_floats("offset").unwrap_or(&[0.0; 3]);
        let mut out = [0.0f32; 12];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 4 + col] = (m[row * 3 + col] * gain) as f32;
            }
            out[row * 4 + 3] = offset[row] as f32;
        }
        out
    }
}

fn check_floats(options: &Options, key: &str, len: usize) -> PipelineResult<()> {
    match options.get(key) {
        None => Ok(()),
        Some(v) => match v.as_floats() {
            Some(values) if values.len() == len && values.iter().all(|x| x.is_finite()) => Ok(()),
            _ => Err(PipelineError::invalid_option(
                key,
                format!("expected {} finite values", len),
            )),
        },
    }
}

impl FilterCore for MatrixCore {
    fn registration(&self) -> &str {
        MATRIX
    }

    fn plugs(&self) -> Vec<Connector> {
        vec![pixel_in("in")]
    }

    fn sockets(&self) -> Vec<Connector> {
        vec![pixel_out("out")]
    }

    fn validate_options(&self, options: &Options) -> PipelineResult<()> {
        check_floats(options, "matrix", 9)?;
        check_floats(options, "offset", 3)?;
        if let Some(v) = options.get("gain") {
            if !v.as_float().is_some_and(f64::is_finite) {
                return Err(PipelineError::invalid_option("gain", "expected a finite number"));
            }
        }
        Ok(())
    }

    fn context_type(&self) -> Option<&str> {
        Some(CONTEXT_TYPE)
    }

    fn producer(&self) -> Option<&dyn ContextProducer> {
        Some(self)
    }
}

impl ContextProducer for MatrixCore {
    fn produce(&self, request: &ContextRequest) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(Some(f32s_to_bytes(&Self::compile(&request.options))))
    }
}

pub struct MatrixRunner;

impl Runner for MatrixRunner {
    fn context_type(&self) -> Option<&str> {
        Some(CONTEXT_TYPE)
    }

    fn run(&self, ctx: &mut RunContext<'_>, ticket: &mut PixelTicket) -> PipelineResult<()> {
        ctx.pull(0, ticket)?;
        let context = ctx.context()?;
        let m = bytes_to_f32s(&context.bytes)
            .filter(|m| m.len() == 12)
            .ok_or_else(|| PipelineError::runner(ctx.node_id(), "malformed matrix context"))?;

        let buffer = ticket.ensure_buffer()?;
        let mut image = buffer.write();
        let channels = image.layout().channels();
        if channels < 3 {
            return Err(PipelineError::runner(
                ctx.node_id(),
                format!("matrix needs 3 channels, got {}", channels),
            ));
        }
        for px in image.samples_mut().chunks_exact_mut(channels) {
            let (r, g, b) = (px[0], px[1], px[2]);
            for (row, out) in px.iter_mut().take(3).enumerate() {
                let k = &m[row * 4..row * 4 + 4];
                *out = k[0] * r + k[1] * g + k[2] * b + k[3];
            }
        }
        Ok(())
    }
}

//! Gamma node: per-channel power curve.
//!
//! The core produces a `curve` context (the exponent). The runner works on a
//! sampled lookup table, so it converts the curve into a `lut` context; both
//! are cached. The gamma context also hashes its upstream nodes, so changing
//! an upstream option yields a new key.

use super::{bytes_to_f32s, f32s_to_bytes, pixel_in, pixel_out, GAMMA};
use crate::pipeline::cache::BackendContext;
use crate::pipeline::connector::Connector;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::node::{ContextProducer, ContextRequest, FilterCore, RunContext, Runner};
use crate::pipeline::options::Options;
use crate::pipeline::ticket::PixelTicket;
use anyhow::{bail, Context};

const CURVE: &str = "curve";
const LUT: &str = "lut";
const DEFAULT_GAMMA: f64 = 2.2;

/// Number of samples in the lookup table.
pub const LUT_SIZE: usize = 1024;

pub struct GammaCore;

impl FilterCore for GammaCore {
    fn registration(&self) -> &str {
        GAMMA
    }

    fn plugs(&self) -> Vec<Connector> {
        vec![pixel_in("in")]
    }

    fn sockets(&self) -> Vec<Connector> {
        vec![pixel_out("out")]
    }

    fn validate_options(&self, options: &Options) -> PipelineResult<()> {
        match options.get("gamma").map(|v| v.as_float()) {
            None => Ok(()),
            Some(Some(g)) if g.is_finite() && g > 0.0 => Ok(()),
            Some(_) => Err(PipelineError::invalid_option("gamma", "expected a positive number")),
        }
    }

    fn context_type(&self) -> Option<&str> {
        Some(CURVE)
    }

    fn producer(&self) -> Option<&dyn ContextProducer> {
        Some(self)
    }

    fn hashes_upstream(&self) -> bool {
        true
    }
}

impl ContextProducer for GammaCore {
    fn produce(&self, request: &ContextRequest) -> anyhow::Result<Option<Vec<u8>>> {
        let gamma = request.options.get_float("gamma").unwrap_or(DEFAULT_GAMMA);
        Ok(Some(gamma.to_le_bytes().to_vec()))
    }
}

pub struct GammaRunner;

impl GammaRunner {
    fn sample(lut: &[f32], v: f32) -> f32 {
        let pos = v.clamp(0.0, 1.0) * (lut.len() - 1) as f32;
        let i = pos.floor() as usize;
        if i + 1 >= lut.len() {
            return lut[lut.len() - 1];
        }
        let t = pos - i as f32;
        lut[i] + (lut[i + 1] - lut[i]) * t
    }
}

impl Runner for GammaRunner {
    fn context_type(&self) -> Option<&str> {
        Some(LUT)
    }

    fn convert_context(&self, context: &BackendContext) -> anyhow::Result<BackendContext> {
        if context.kind != CURVE {
            bail!("cannot build a lookup table from '{}'", context.kind);
        }
        let bytes: [u8; 8] = context
            .bytes
            .as_slice()
            .try_into()
            .context("curve context must hold one f64")?;
        let gamma = f64::from_le_bytes(bytes);
        let table: Vec<f32> = (0..LUT_SIZE)
            .map(|i| (i as f64 / (LUT_SIZE - 1) as f64).powf(gamma) as f32)
            .collect();
        Ok(BackendContext::new(LUT, f32s_to_bytes(&table)))
    }

    fn run(&self, ctx: &mut RunContext<'_>, ticket: &mut PixelTicket) -> PipelineResult<()> {
        ctx.pull(0, ticket)?;
        let context = ctx.context()?;
        let lut = bytes_to_f32s(&context.bytes)
            .filter(|t| t.len() == LUT_SIZE)
            .ok_or_else(|| PipelineError::runner(ctx.node_id(), "malformed lookup table"))?;

        let buffer = ticket.ensure_buffer()?;
        let mut image = buffer.write();
        let channels = image.layout().channels();
        let color = channels.min(3);
        for px in image.samples_mut().chunks_exact_mut(channels) {
            for v in px.iter_mut().take(color) {
                *v = Self::sample(&lut, *v);
            }
        }
        Ok(())
    }
}

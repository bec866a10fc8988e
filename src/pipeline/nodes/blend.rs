//! Blend node: weighted mix of two inputs.
//!
//! Pulls plug `a` into the ticket and plug `b` into a derived ticket for the
//! same rectangle, then mixes `a * (1 - weight) + b * weight`.

use super::{pixel_in, pixel_out, BLEND};
use crate::pipeline::connector::Connector;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::node::{FilterCore, RunContext, Runner};
use crate::pipeline::options::Options;
use crate::pipeline::ticket::PixelTicket;

pub struct BlendCore;

impl FilterCore for BlendCore {
    fn registration(&self) -> &str {
        BLEND
    }

    fn plugs(&self) -> Vec<Connector> {
        vec![pixel_in("a"), pixel_in("b")]
    }

    fn sockets(&self) -> Vec<Connector> {
        vec![pixel_out("out")]
    }

    fn validate_options(&self, options: &Options) -> PipelineResult<()> {
        match options.get("weight").map(|v| v.as_float()) {
            None => Ok(()),
            Some(Some(w)) if (0.0..=1.0).contains(&w) => Ok(()),
            Some(_) => Err(PipelineError::invalid_option("weight", "expected a value in 0..=1")),
        }
    }
}

pub struct BlendRunner;

impl Runner for BlendRunner {
    fn run(&self, ctx: &mut RunContext<'_>, ticket: &mut PixelTicket) -> PipelineResult<()> {
        let weight = ctx.options()?.get_float("weight").unwrap_or(0.5) as f32;
        ctx.pull(0, ticket)?;
        let mut second = ticket.derive();
        ctx.pull(1, &mut second)?;

        let a = ticket.ensure_buffer()?;
        let b = second.ensure_buffer()?;
        let other = b.read();
        let mut image = a.write();
        for (x, y) in image.samples_mut().iter_mut().zip(other.samples()) {
            *x = *x * (1.0 - weight) + *y * weight;
        }
        Ok(())
    }
}

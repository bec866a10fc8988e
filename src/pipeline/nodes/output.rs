//! Output node: the end of a conversion.
//!
//! Its plug is where a conversion pulls; its socket holds the output image.
//! When pulled through its socket it also writes the result into that image.

use super::{pixel_in, pixel_out, OUTPUT};
use crate::pipeline::connector::Connector;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::node::{FilterCore, RunContext, Runner};
use crate::pipeline::ticket::PixelTicket;

pub struct OutputCore;

impl FilterCore for OutputCore {
    fn registration(&self) -> &str {
        OUTPUT
    }

    fn plugs(&self) -> Vec<Connector> {
        vec![pixel_in("in")]
    }

    fn sockets(&self) -> Vec<Connector> {
        vec![pixel_out("image")]
    }
}

pub struct OutputRunner;

impl Runner for OutputRunner {
    fn run(&self, ctx: &mut RunContext<'_>, ticket: &mut PixelTicket) -> PipelineResult<()> {
        ctx.pull(0, ticket)?;
        let Some(target) = ctx.socket_data(ctx.socket_index()) else {
            return Ok(());
        };
        let buffer = ticket.ensure_buffer()?;
        if !buffer.same_storage(&target) {
            let (x, y, w, h) = ticket.pixel_bounds();
            target
                .write()
                .copy_region((x, y), &buffer.read(), (0, 0), (w, h));
        }
        Ok(())
    }
}

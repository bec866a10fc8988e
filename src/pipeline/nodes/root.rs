//! Root node: the data source of a conversion.
//!
//! Serves the image attached to its socket. With `width`, `height` and
//! `fill` options it can also generate a solid image when asked to resolve
//! missing data.

use super::{pixel_out, ROOT};
use crate::pipeline::connector::Connector;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::image::{Image, ImageHandle, PixelLayout};
use crate::pipeline::node::{FilterCore, RunContext, Runner};
use crate::pipeline::options::Options;
use crate::pipeline::ticket::PixelTicket;

pub struct RootCore;

impl FilterCore for RootCore {
    fn registration(&self) -> &str {
        ROOT
    }

    fn plugs(&self) -> Vec<Connector> {
        Vec::new()
    }

    fn sockets(&self) -> Vec<Connector> {
        vec![pixel_out("image")]
    }

    fn validate_options(&self, options: &Options) -> PipelineResult<()> {
        for key in ["width", "height"] {
            if let Some(v) = options.get(key) {
                match v.as_int() {
                    Some(n) if n > 0 => {}
                    _ => return Err(PipelineError::invalid_option(key, "expected a positive integer")),
                }
            }
        }
        if let Some(fill) = options.get("fill") {
            match fill.as_floats() {
                Some(v) if (1..=4).contains(&v.len()) => {}
                _ => return Err(PipelineError::invalid_option("fill", "expected 1 to 4 channel values")),
            }
        }
        Ok(())
    }
}

pub struct RootRunner;

impl Runner for RootRunner {
    fn resolve_data(&self, ctx: &mut RunContext<'_>) -> PipelineResult<Option<ImageHandle>> {
        let options = ctx.options()?;
        let (Some(width), Some(height)) = (
            options.get("width").and_then(|v| v.as_int()),
            options.get("height").and_then(|v| v.as_int()),
        ) else {
            return Ok(None);
        };
        let fill: Vec<f32> = match options.get_floats("fill") {
            Some(values) => values.iter().map(|&v| v as f32).collect(),
            None => vec![0.0; ctx.pipeline().config().default_layout.channels()],
        };
        let layout = PixelLayout {
            channels: fill.len() as u8,
        };
        let (width, height) = (width as usize, height as usize);
        let mut image = Image::try_new(width, height, layout)?;
        image.fill(&fill);
        tracing::debug!("Root {} generated a {}x{} image", ctx.node_id(), width, height);
        Ok(Some(ImageHandle::new(image)))
    }

    fn run(&self, ctx: &mut RunContext<'_>, ticket: &mut PixelTicket) -> PipelineResult<()> {
        let source = ctx
            .socket_data(ctx.socket_index())
            .ok_or_else(|| ctx.incomplete())?;
        let buffer = ticket.ensure_buffer()?;
        if buffer.same_storage(&source) {
            return Ok(());
        }
        let (x, y, w, h) = ticket.pixel_bounds();
        buffer
            .write()
            .copy_region((0, 0), &source.read(), (x, y), (w, h));
        Ok(())
    }
}

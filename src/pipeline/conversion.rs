//! Conversions: a pipeline with a designated input and output node.
//!
//! [`Conversion::run_pixels`] drives one pixel request through the graph and
//! recovers once from an incomplete graph: it rebuilds the graph snapshot,
//! asks the source nodes upstream to resolve their data and, if that changed
//! anything, retries from the remembered ticket position.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::executor::Pipeline;
use crate::pipeline::graph::{FilterGraph, GraphOptions};
use crate::pipeline::id::{NodeId, PlugRef, SocketRef};
use crate::pipeline::image::{Image, ImageHandle, PixelLayout, Rect};
use crate::pipeline::signal::{Handler, SignalEvent, Subject};
use crate::pipeline::ticket::{PixelTicket, TicketState};
use crossbeam_channel::{unbounded, Receiver};

pub struct Conversion {
    pipeline: Pipeline,
    input: NodeId,
    output: NodeId,
    listener: Subject,
    events: Receiver<SignalEvent>,
}

impl Conversion {
    /// Wrap `pipeline`, reading from `input` and delivering at `output`.
    ///
    /// The output node must have a plug to pull through.
    pub fn new(mut pipeline: Pipeline, input: NodeId, output: NodeId) -> PipelineResult<Self> {
        pipeline.node(input)?;
        pipeline.plug(PlugRef::new(output, 0))?;

        let (tx, events) = unbounded();
        let listener = pipeline.new_listener();
        pipeline.subscribe(Subject::Node(output), listener, None, Handler::Channel(tx));

        Ok(Self {
            pipeline,
            input,
            output,
            listener,
            events,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn into_pipeline(self) -> Pipeline {
        self.pipeline
    }

    pub fn input(&self) -> NodeId {
        self.input
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn listener(&self) -> Subject {
        self.listener
    }

    /// Image attached to the input node, if any.
    pub fn input_image(&self) -> Option<ImageHandle> {
        self.pipeline
            .socket_data(SocketRef::new(self.input, 0))
            .ok()
            .flatten()
    }

    pub fn set_input_image(&mut self, image: ImageHandle) -> PipelineResult<()> {
        self.pipeline
            .set_socket_data(SocketRef::new(self.input, 0), Some(image))
    }

    /// The image results land in.
    ///
    /// Created to match the input image if missing, and recreated when the
    /// input image changed size or layout since.
    pub fn output_image(&mut self) -> PipelineResult<ImageHandle> {
        let socket = SocketRef::new(self.output, 0);
        let current = self.pipeline.socket_data(socket).ok().flatten();
        let input = match (current, self.input_image()) {
            (Some(image), None) => return Ok(image),
            (Some(image), Some(input)) if shape(&image) == shape(&input) => return Ok(image),
            (_, Some(input)) => input,
            (None, None) => {
                return Err(PipelineError::IncompleteGraph(PlugRef::new(self.output, 0)))
            }
        };
        let (width, height, layout) = shape(&input);
        let image = ImageHandle::new(Image::try_new(width, height, layout)?);
        self.pipeline.set_socket_data(socket, Some(image.clone()))?;
        tracing::debug!("Created {}x{} output image", width, height);
        Ok(image)
    }

    /// Snapshot of everything connected to the output node.
    pub fn graph(&self) -> PipelineResult<FilterGraph> {
        FilterGraph::from_node(&self.pipeline, self.output, GraphOptions::default())
    }

    /// Bind contexts for the whole graph ahead of the first run.
    pub fn prepare_contexts(&mut self, force: bool) -> PipelineResult<usize> {
        let graph = self.graph()?;
        graph.prepare_contexts(&mut self.pipeline, force)
    }

    /// Ticket for `rect` of the output image, or all of it.
    pub fn create_ticket(&mut self, rect: Option<Rect>) -> PipelineResult<PixelTicket> {
        let output = self.output_image()?;
        let mut ticket = PixelTicket::for_image(output);
        if let Some(rect) = rect {
            ticket.set_rect(rect);
        }
        ticket.set_graph(self.graph()?);
        Ok(ticket)
    }

    /// Run a fresh ticket over the whole output image.
    pub fn run_pixels(&mut self) -> PipelineResult<PixelTicket> {
        let mut ticket = self.create_ticket(None)?;
        self.run_ticket(&mut ticket)?;
        Ok(ticket)
    }

    /// Status-code form of [`Conversion::run_ticket`]: 0 on success, the
    /// error's code otherwise.
    pub fn run_pixels_status(&mut self, ticket: Option<&mut PixelTicket>) -> i32 {
        let result = match ticket {
            Some(ticket) => self.run_ticket(ticket),
            None => self.run_pixels().map(|_| ()),
        };
        match result {
            Ok(()) => 0,
            Err(e) => {
                tracing::warn!("Pixel run failed: {}", e);
                e.code()
            }
        }
    }

    /// Run `ticket` through the graph and copy the result into the output image.
    pub fn run_ticket(&mut self, ticket: &mut PixelTicket) -> PipelineResult<()> {
        let changes = self.drain_events();
        if changes > 0 {
            tracing::debug!("{} graph change(s) since last run", changes);
        }

        ticket.set_state(TicketState::Requested);
        ticket.remember_position();
        if ticket.output().is_none() {
            ticket.set_output(self.output_image()?);
        }
        let stale = changes > 0 || ticket.graph().map_or(true, |g| g.is_stale(&self.pipeline));
        if stale {
            if ticket.graph().is_some() {
                ticket.mark_dirty();
            }
            ticket.set_graph(self.graph()?);
        }

        let plug = PlugRef::new(self.output, 0);
        ticket.set_state(TicketState::Running);
        if let Err(err) = self.pipeline.run(plug, ticket) {
            if !(err.is_recoverable() && self.pipeline.config().retry_on_incomplete) {
                ticket.set_state(TicketState::Failed);
                return Err(err);
            }
            tracing::warn!("Run failed ({}), resolving upstream", err);
            ticket.set_state(TicketState::ResolvingUpstream);
            ticket.set_graph(self.graph()?);

            let failing = match &err {
                PipelineError::IncompleteGraph(p) => *p,
                _ => plug,
            };
            match self.resolve_image(failing) {
                Ok(true) => ticket.mark_dirty(),
                Ok(false) => {}
                Err(resolve_err) => {
                    ticket.set_state(TicketState::Failed);
                    return Err(resolve_err);
                }
            }
            if !ticket.is_dirty() {
                ticket.set_state(TicketState::Failed);
                return Err(err);
            }

            ticket.restore_position();
            ticket.set_state(TicketState::Running);
            if let Err(err) = self.pipeline.run(plug, ticket) {
                ticket.set_state(TicketState::Failed);
                return Err(err);
            }
        }
        ticket.clear_dirty();

        self.deliver(ticket);
        ticket.set_state(TicketState::Done);
        Ok(())
    }

    /// Walk upstream from `plug` and let source nodes supply missing data.
    ///
    /// Returns whether any node received data.
    pub fn resolve_image(&mut self, plug: PlugRef) -> PipelineResult<bool> {
        let seed = match self.pipeline.plug(plug)?.remote() {
            Some(socket) => socket.node,
            None => {
                tracing::debug!("{:?} is unbound, nothing to resolve", plug);
                return Ok(false);
            }
        };
        let upstream = FilterGraph::from_node(&self.pipeline, seed, GraphOptions::upstream())?;
        let sources: Vec<NodeId> = upstream
            .nodes()
            .filter(|id| {
                self.pipeline
                    .node(*id)
                    .is_ok_and(|n| n.plugs().is_empty())
            })
            .collect();

        let mut resolved = false;
        for id in sources {
            if self.pipeline.resolve_node_data(id)? {
                tracing::info!("Resolved data for source node {}", id);
                resolved = true;
            }
        }
        Ok(resolved)
    }

    fn deliver(&self, ticket: &PixelTicket) {
        let (Some(buffer), Some(output)) = (ticket.buffer(), ticket.output()) else {
            return;
        };
        if buffer.same_storage(output) {
            return;
        }
        let (x, y, w, h) = ticket.pixel_bounds();
        let copied = output
            .write()
            .copy_region((x, y), &buffer.read(), (0, 0), (w, h));
        tracing::trace!("Copied {} pixel(s) into output at ({}, {})", copied, x, y);
    }

    /// Empty the listener channel. Returns the number of structural changes seen.
    fn drain_events(&self) -> usize {
        self.events
            .try_iter()
            .filter(|e| e.signal.is_structural())
            .count()
    }
}

fn shape(image: &ImageHandle) -> (usize, usize, PixelLayout) {
    let img = image.read();
    (img.width(), img.height(), img.layout())
}

impl std::fmt::Debug for Conversion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversion")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::pipeline::cache::ContextCache;
    use crate::pipeline::nodes::{MATRIX, OUTPUT, ROOT};
    use crate::pipeline::options::Options;
    use crate::pipeline::registry::ModuleRegistry;
    use std::sync::Arc;

    fn conversion(root_opts: Options) -> Conversion {
        let mut p = Pipeline::with_cache(
            Arc::new(ModuleRegistry::with_builtins()),
            EngineConfig::default(),
            Arc::new(ContextCache::new()),
        );
        let a = p.new_node(ROOT, root_opts).unwrap();
        let b = p
            .new_node(MATRIX, Options::new().with("gain", 0.5))
            .unwrap();
        let c = p.new_node(OUTPUT, Options::new()).unwrap();
        p.connect(a, 0, b, 0).unwrap();
        p.connect(b, 0, c, 0).unwrap();
        Conversion::new(p, a, c).unwrap()
    }

    fn solid(w: usize, h: usize, v: f32) -> ImageHandle {
        let samples = vec![v; w * h * 3];
        ImageHandle::new(Image::from_samples(w, h, PixelLayout::RGB, samples).unwrap())
    }

    #[test]
    fn test_run_pixels_applies_gain() {
        let mut conv = conversion(Options::new());
        conv.set_input_image(solid(2, 2, 0.8)).unwrap();
        let ticket = conv.run_pixels().unwrap();
        assert_eq!(ticket.state(), TicketState::Done);
        let out = conv.output_image().unwrap();
        assert!(out.read().samples().iter().all(|v| (v - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_partial_rect_is_copied_into_output() {
        let mut conv = conversion(Options::new());
        conv.set_input_image(solid(4, 4, 1.0)).unwrap();
        let mut ticket = conv
            .create_ticket(Some(Rect::new(2.0, 2.0, 2.0, 2.0)))
            .unwrap();
        conv.run_ticket(&mut ticket).unwrap();
        assert!(!ticket.writes_in_place());
        let out = conv.output_image().unwrap().to_image();
        assert_eq!(out.pixel(3, 3), &[0.5, 0.5, 0.5]);
        assert_eq!(out.pixel(0, 0), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_retry_resolves_source_data() {
        let opts = Options::new()
            .with("width", 3_i64)
            .with("height", 2_i64)
            .with("fill", vec![0.2, 0.4, 0.6]);
        let mut conv = conversion(opts);
        // No input image yet, so give the output one explicitly.
        let out = ImageHandle::new(Image::new(3, 2, PixelLayout::RGB));
        let socket = SocketRef::new(conv.output(), 0);
        conv.pipeline_mut()
            .set_socket_data(socket, Some(out.clone()))
            .unwrap();

        let mut ticket = PixelTicket::for_image(out.clone());
        conv.run_ticket(&mut ticket).unwrap();
        assert_eq!(ticket.state(), TicketState::Done);
        assert!(!ticket.is_dirty());
        let px = out.read().pixel(2, 1).to_vec();
        assert!((px[0] - 0.1).abs() < 1e-6);
        assert!((px[2] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_unresolvable_failure_is_surfaced() {
        let mut conv = conversion(Options::new());
        let out = ImageHandle::new(Image::new(1, 1, PixelLayout::RGB));
        let mut ticket = PixelTicket::for_image(out);
        let err = conv.run_ticket(&mut ticket).unwrap_err();
        assert!(matches!(err, PipelineError::IncompleteGraph(_)));
        assert_eq!(ticket.state(), TicketState::Failed);
        assert_eq!(conv.run_pixels_status(Some(&mut ticket)), err.code());
    }

    #[test]
    fn test_output_follows_input_size() {
        let mut conv = conversion(Options::new());
        conv.set_input_image(solid(2, 2, 0.8)).unwrap();
        conv.run_pixels().unwrap();
        let first = conv.output_image().unwrap();

        conv.set_input_image(solid(4, 3, 0.8)).unwrap();
        conv.run_pixels().unwrap();
        let second = conv.output_image().unwrap();
        assert!(!second.same_storage(&first));
        assert_eq!(second.dimensions(), (4, 3));
        assert!(second.read().samples().iter().all(|v| (v - 0.4).abs() < 1e-6));

        // Same shape keeps the existing image.
        conv.set_input_image(solid(4, 3, 0.2)).unwrap();
        assert!(conv.output_image().unwrap().same_storage(&second));
    }

    #[test]
    fn test_oversized_ticket_rect_is_clipped() {
        let mut conv = conversion(Options::new());
        conv.set_input_image(solid(3, 2, 0.8)).unwrap();
        let mut ticket = conv
            .create_ticket(Some(Rect::new(0.0, 0.0, 1e12, 1e12)))
            .unwrap();
        conv.run_ticket(&mut ticket).unwrap();
        assert!(ticket.writes_in_place());
        let out = conv.output_image().unwrap();
        assert!(out.read().samples().iter().all(|v| (v - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_generated_root_too_large_fails_cleanly() {
        let huge = 1_i64 << 40;
        let opts = Options::new()
            .with("width", huge)
            .with("height", huge)
            .with("fill", vec![0.2, 0.4, 0.6]);
        let mut conv = conversion(opts);
        let input = conv.input();
        let err = conv.pipeline_mut().resolve_node_data(input).unwrap_err();
        assert!(matches!(err, PipelineError::AllocationFailure(_)));

        let out = ImageHandle::new(Image::new(1, 1, PixelLayout::RGB));
        let mut ticket = PixelTicket::for_image(out);
        let err = conv.run_ticket(&mut ticket).unwrap_err();
        assert!(matches!(err, PipelineError::AllocationFailure(_)));
        assert_eq!(ticket.state(), TicketState::Failed);
        assert!(conv.input_image().is_none());
    }

    #[test]
    fn test_output_image_needs_input() {
        let mut conv = conversion(Options::new());
        assert!(conv.output_image().is_err());
        conv.set_input_image(solid(5, 3, 0.0)).unwrap();
        assert_eq!(conv.output_image().unwrap().dimensions(), (5, 3));
    }
}

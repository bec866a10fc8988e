//! Filter nodes and the collaborator traits behind them.
//!
//! Two-layer design:
//! - **`FilterCore`**: stateless description of a module: registration,
//!   connector templates, option validation and the context producer.
//! - **`Runner`**: the pixel algorithm. It is called with a [`RunContext`]
//!   and may pull its own plugs, which is how execution recurses upstream.
//!
//! A `FilterNode` instantiates a core/runner pair with its own options,
//! plugs, sockets and (lazily) a backend context.

use crate::pipeline::cache::{BackendContext, SharedContext};
use crate::pipeline::connector::Connector;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::executor::Pipeline;
use crate::pipeline::id::{NodeId, PlugRef, SocketRef};
use crate::pipeline::image::ImageHandle;
use crate::pipeline::options::Options;
use crate::pipeline::registry::FilterModule;
use crate::pipeline::ticket::PixelTicket;
use std::sync::Arc;

/// What a context producer gets to see of a node.
#[derive(Debug, Clone)]
pub struct ContextRequest {
    pub node: NodeId,
    pub registration: String,
    pub options: Options,
    /// Structural description the cache key was derived from.
    pub description: String,
    /// Context type the producer is asked for.
    pub kind: String,
}

/// Builds the raw bytes of a backend context, e.g. by compiling a transform.
pub trait ContextProducer: Send + Sync {
    /// `Ok(None)` means the node cannot have a context in its current state.
    fn produce(&self, request: &ContextRequest) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Stateless part of a module.
pub trait FilterCore: Send + Sync {
    fn registration(&self) -> &str;

    fn version(&self) -> [u32; 3] {
        [1, 0, 0]
    }

    /// Input connector templates, one plug each.
    fn plugs(&self) -> Vec<Connector>;

    /// Output connector templates, one socket each.
    fn sockets(&self) -> Vec<Connector>;

    fn validate_options(&self, _options: &Options) -> PipelineResult<()> {
        Ok(())
    }

    /// Context type this core produces. `None` for nodes without a context.
    fn context_type(&self) -> Option<&str> {
        None
    }

    fn producer(&self) -> Option<&dyn ContextProducer> {
        None
    }

    /// Whether upstream node descriptions are part of this node's cache key.
    fn hashes_upstream(&self) -> bool {
        false
    }
}

/// The pixel algorithm of a module.
pub trait Runner: Send + Sync {
    /// Context type the runner consumes. When it differs from the core's,
    /// [`Runner::convert_context`] is used and the result cached separately.
    fn context_type(&self) -> Option<&str> {
        None
    }

    fn convert_context(&self, context: &BackendContext) -> anyhow::Result<BackendContext> {
        Err(anyhow::anyhow!(
            "runner cannot convert '{}' contexts",
            context.kind
        ))
    }

    /// Called when a node drops its reference to a context.
    fn release_context(&self, _context: &SharedContext) {}

    /// Give a source node the chance to supply missing socket data.
    fn resolve_data(&self, _ctx: &mut RunContext<'_>) -> PipelineResult<Option<ImageHandle>> {
        Ok(None)
    }

    /// Produce the pixels of `ticket`'s rectangle into its buffer.
    fn run(&self, ctx: &mut RunContext<'_>, ticket: &mut PixelTicket) -> PipelineResult<()>;
}

/// Input attachment. Bound to at most one remote socket.
#[derive(Debug, Clone)]
pub struct Plug {
    pub connector: Connector,
    pub(crate) remote: Option<SocketRef>,
}

impl Plug {
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            remote: None,
        }
    }

    pub fn remote(&self) -> Option<SocketRef> {
        self.remote
    }

    pub fn is_connected(&self) -> bool {
        self.remote.is_some()
    }
}

/// Output attachment. May feed many plugs, which it does not own.
#[derive(Debug, Clone)]
pub struct Socket {
    pub connector: Connector,
    pub(crate) data: Option<ImageHandle>,
    pub(crate) requesting: Vec<PlugRef>,
}

impl Socket {
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            data: None,
            requesting: Vec::new(),
        }
    }

    pub fn data(&self) -> Option<&ImageHandle> {
        self.data.as_ref()
    }

    pub fn requesting(&self) -> &[PlugRef] {
        &self.requesting
    }

    pub fn is_connected(&self) -> bool {
        !self.requesting.is_empty()
    }
}

/// Per-node metadata.
#[derive(Debug, Clone, Default)]
pub struct NodeTags {
    /// Log this node's runs at `debug` instead of `trace`.
    pub verbose: bool,
    pub label: Option<String>,
}

pub struct FilterNode {
    pub(crate) module: FilterModule,
    pub(crate) options: Options,
    pub(crate) plugs: Vec<Plug>,
    pub(crate) sockets: Vec<Socket>,
    pub(crate) context: Option<SharedContext>,
    pub(crate) context_key: Option<String>,
    pub tags: NodeTags,
}

impl FilterNode {
    pub(crate) fn new(module: FilterModule, options: Options) -> Self {
        let plugs = module.core.plugs().into_iter().map(Plug::new).collect();
        let sockets = module.core.sockets().into_iter().map(Socket::new).collect();
        Self {
            module,
            options,
            plugs,
            sockets,
            context: None,
            context_key: None,
            tags: NodeTags::default(),
        }
    }

    pub fn registration(&self) -> &str {
        self.module.core.registration()
    }

    pub fn core(&self) -> &Arc<dyn FilterCore> {
        &self.module.core
    }

    pub fn runner(&self) -> &Arc<dyn Runner> {
        &self.module.runner
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn plugs(&self) -> &[Plug] {
        &self.plugs
    }

    pub fn sockets(&self) -> &[Socket] {
        &self.sockets
    }

    pub fn plug(&self, index: usize) -> Option<&Plug> {
        self.plugs.get(index)
    }

    pub fn socket(&self, index: usize) -> Option<&Socket> {
        self.sockets.get(index)
    }

    pub fn context(&self) -> Option<&SharedContext> {
        self.context.as_ref()
    }

    pub fn context_key(&self) -> Option<&str> {
        self.context_key.as_deref()
    }

    /// Whether the core declares a backend context at all.
    pub fn needs_context(&self) -> bool {
        self.module.core.context_type().is_some()
    }

    /// Display name: the label tag or the last registration segment.
    pub fn display_name(&self) -> &str {
        self.tags
            .label
            .as_deref()
            .unwrap_or_else(|| crate::pipeline::registration::leaf(self.registration()))
    }

    /// Drop the context reference. The cache entry is left alone.
    pub(crate) fn release_context(&mut self) -> bool {
        self.context_key = None;
        match self.context.take() {
            Some(ctx) => {
                self.module.runner.release_context(&ctx);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for FilterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterNode")
            .field("registration", &self.registration())
            .field("options", &self.options)
            .field("plugs", &self.plugs.len())
            .field("sockets", &self.sockets.len())
            .field("context", &self.context_key)
            .finish()
    }
}

/// Handle given to a runner for one execution of its node.
pub struct RunContext<'a> {
    pub(crate) pipeline: &'a mut Pipeline,
    pub(crate) node: NodeId,
    pub(crate) socket: usize,
    pub(crate) requester: Option<PlugRef>,
    pub(crate) depth: usize,
}

impl<'a> RunContext<'a> {
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Socket of this node the request came through.
    pub fn socket_index(&self) -> usize {
        self.socket
    }

    /// Downstream plug that pulled this node, if any.
    pub fn requester(&self) -> Option<PlugRef> {
        self.requester
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn pipeline(&self) -> &Pipeline {
        self.pipeline
    }

    pub fn node(&self) -> PipelineResult<&FilterNode> {
        self.pipeline.node(self.node)
    }

    pub fn options(&self) -> PipelineResult<&Options> {
        Ok(self.node()?.options())
    }

    pub fn context(&self) -> PipelineResult<SharedContext> {
        self.node()?
            .context()
            .cloned()
            .ok_or(PipelineError::NoContext(self.node))
    }

    pub fn verbose(&self) -> bool {
        self.node().map(|n| n.tags.verbose).unwrap_or(false)
    }

    /// Run the node feeding plug `plug_index` of this node.
    pub fn pull(&mut self, plug_index: usize, ticket: &mut PixelTicket) -> PipelineResult<()> {
        self.pipeline
            .run_at(PlugRef::new(self.node, plug_index), ticket, self.depth + 1)
    }

    pub fn socket_data(&self, index: usize) -> Option<ImageHandle> {
        self.pipeline
            .socket_data(SocketRef::new(self.node, index))
            .ok()
            .flatten()
    }

    /// Data stored on the socket that plug `plug_index` is bound to.
    pub fn input_data(&self, plug_index: usize) -> Option<ImageHandle> {
        let remote = self
            .pipeline
            .plug(PlugRef::new(self.node, plug_index))
            .ok()?
            .remote()?;
        self.pipeline.socket_data(remote).ok().flatten()
    }

    pub fn set_socket_data(
        &mut self,
        index: usize,
        image: Option<ImageHandle>,
    ) -> PipelineResult<()> {
        self.pipeline
            .set_socket_data(SocketRef::new(self.node, index), image)
    }

    /// The error to report when this node has no data to serve.
    pub fn incomplete(&self) -> PipelineError {
        PipelineError::IncompleteGraph(
            self.requester
                .unwrap_or_else(|| PlugRef::new(self.node, self.socket)),
        )
    }
}

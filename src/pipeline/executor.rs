//! Pipeline executor: the node arena, linking and pull execution.
//!
//! Nodes live in slots indexed by [`NodeId`]. Plugs and sockets refer to each
//! other by id, so there are no ownership cycles: a plug holds the
//! [`SocketRef`] it is bound to and a socket lists the [`PlugRef`]s that read
//! from it.
//!
//! Execution is pull based. Running a plug runs the node upstream of it; that
//! node's runner pulls its own plugs in turn, down to the data sources.

use crate::config::EngineConfig;
use crate::pipeline::cache::{self, cache_key, BackendContext, ContextCache, SharedContext};
use crate::pipeline::connector::{Connector, LinkRefusal};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::fingerprint::fingerprint_text;
use crate::pipeline::graph::{EdgeDirection, FilterGraph, GraphOptions};
use crate::pipeline::id::{NodeId, PlugRef, SocketRef};
use crate::pipeline::image::ImageHandle;
use crate::pipeline::node::{ContextRequest, FilterNode, Plug, RunContext, Socket};
use crate::pipeline::options::{OptionValue, Options};
use crate::pipeline::registry::ModuleRegistry;
use crate::pipeline::signal::{Handler, Signal, SignalBus, SignalContext, Subject, UserData};
use crate::pipeline::ticket::PixelTicket;
use std::fmt::Write as _;
use std::sync::Arc;

/// Filter for [`Pipeline::edge_count`].
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    /// Count only plugs/sockets that take part in a link.
    pub connected_only: bool,
    /// Count only connectors whose registration matches this pattern.
    pub registration: Option<String>,
}

impl EdgeFilter {
    pub fn connected() -> Self {
        Self {
            connected_only: true,
            registration: None,
        }
    }
}

pub struct Pipeline {
    nodes: Vec<Option<FilterNode>>,
    registry: Arc<ModuleRegistry>,
    cache: Arc<ContextCache>,
    bus: SignalBus,
    signal_ctx: SignalContext,
    config: EngineConfig,
    /// Bumped on every structural change (links, options, node removal).
    generation: u64,
    next_listener: u64,
}

impl Pipeline {
    /// Pipeline backed by the process-wide context cache.
    pub fn new(registry: Arc<ModuleRegistry>, config: EngineConfig) -> Self {
        Self::with_cache(registry, config, cache::global())
    }

    pub fn with_cache(
        registry: Arc<ModuleRegistry>,
        config: EngineConfig,
        cache: Arc<ContextCache>,
    ) -> Self {
        Self {
            nodes: Vec::new(),
            registry,
            cache,
            bus: SignalBus::new(),
            signal_ctx: SignalContext::new(),
            config,
            generation: 0,
            next_listener: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    // ── Nodes ──

    /// Create a node from the first module matching `registration`.
    pub fn new_node(&mut self, registration: &str, options: Options) -> PipelineResult<NodeId> {
        let module = self
            .registry
            .resolve(registration)
            .cloned()
            .ok_or_else(|| PipelineError::NoMatchingModule(registration.to_string()))?;
        module.core.validate_options(&options)?;

        let mut node = FilterNode::new(module, options);
        node.tags.verbose = self.config.verbose_nodes;
        let id = next_node_id(self.nodes.len())?;
        tracing::debug!("Created node {} ({})", id, node.registration());
        self.nodes.push(Some(node));
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> PipelineResult<&FilterNode> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(PipelineError::InvalidNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> PipelineResult<&mut FilterNode> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(PipelineError::InvalidNode(id))
    }

    /// Ids of all live nodes, in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| NodeId(i as u32))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn plug(&self, plug: PlugRef) -> PipelineResult<&Plug> {
        self.node(plug.node)?
            .plug(plug.index)
            .ok_or(PipelineError::InvalidPlug(plug))
    }

    pub fn socket(&self, socket: SocketRef) -> PipelineResult<&Socket> {
        self.node(socket.node)?
            .socket(socket.index)
            .ok_or(PipelineError::InvalidSocket(socket))
    }

    fn plug_mut(&mut self, plug: PlugRef) -> PipelineResult<&mut Plug> {
        self.node_mut(plug.node)?
            .plugs
            .get_mut(plug.index)
            .ok_or(PipelineError::InvalidPlug(plug))
    }

    fn socket_mut(&mut self, socket: SocketRef) -> PipelineResult<&mut Socket> {
        self.node_mut(socket.node)?
            .sockets
            .get_mut(socket.index)
            .ok_or(PipelineError::InvalidSocket(socket))
    }

    /// Count plugs, sockets or both of a node.
    pub fn edge_count(
        &self,
        node: NodeId,
        direction: EdgeDirection,
        filter: &EdgeFilter,
    ) -> PipelineResult<usize> {
        let node = self.node(node)?;
        let keep = |connector: &Connector, connected: bool| {
            (!filter.connected_only || connected)
                && filter.registration.as_deref().map_or(true, |pattern| {
                    crate::pipeline::registration::matches(pattern, &connector.registration)
                })
        };
        let mut count = 0;
        if direction.upstream() {
            count += node
                .plugs()
                .iter()
                .filter(|p| keep(&p.connector, p.is_connected()))
                .count();
        }
        if direction.downstream() {
            count += node
                .sockets()
                .iter()
                .filter(|s| keep(&s.connector, s.is_connected()))
                .count();
        }
        Ok(count)
    }

    // ── Linking ──

    /// Link socket `socket` of `from` to plug `plug` of `to`.
    ///
    /// A plug that is already bound is unbound first. The link is refused if
    /// the connectors do not accept each other or if it would close a cycle.
    pub fn connect(
        &mut self,
        from: NodeId,
        socket: usize,
        to: NodeId,
        plug: usize,
    ) -> PipelineResult<()> {
        let socket_ref = SocketRef::new(from, socket);
        let plug_ref = PlugRef::new(to, plug);
        let socket_connector = &self.socket(socket_ref)?.connector;
        let plug_connector = &self.plug(plug_ref)?.connector;

        Connector::check_link(socket_connector, plug_connector).map_err(|refusal| match refusal {
            LinkRefusal::Type => PipelineError::IncompatibleType {
                pattern: plug_connector.registration.clone(),
                offered: socket_connector.registration.clone(),
            },
            LinkRefusal::Capability => PipelineError::IncompatibleCapability {
                socket: socket_ref,
                plug: plug_ref,
            },
        })?;

        if from == to || self.reaches_downstream(to, from)? {
            return Err(PipelineError::CycleDetected {
                socket: socket_ref,
                plug: plug_ref,
            });
        }

        if self.plug(plug_ref)?.remote() == Some(socket_ref) {
            return Ok(());
        }
        if self.plug(plug_ref)?.is_connected() {
            self.disconnect(plug_ref)?;
        }

        self.plug_mut(plug_ref)?.remote = Some(socket_ref);
        self.socket_mut(socket_ref)?.requesting.push(plug_ref);
        self.bus
            .subscribe(Subject::Node(from), Subject::Node(to), None, Handler::Forward);
        self.bump_generation();

        tracing::info!("Connected {:?} -> {:?}", socket_ref, plug_ref);
        self.signal(Subject::Node(to), Signal::Connected, None)?;
        Ok(())
    }

    /// Unbind `plug` from its socket. Returns `false` if it was not bound.
    pub fn disconnect(&mut self, plug: PlugRef) -> PipelineResult<bool> {
        let Some(socket_ref) = self.plug(plug)?.remote() else {
            return Ok(false);
        };
        self.plug_mut(plug)?.remote = None;
        if let Ok(socket) = self.socket_mut(socket_ref) {
            socket.requesting.retain(|p| *p != plug);
        }

        let still_linked = self
            .node(plug.node)?
            .plugs()
            .iter()
            .any(|p| p.remote().is_some_and(|s| s.node == socket_ref.node));
        if !still_linked {
            self.bus.unsubscribe(
                Subject::Node(socket_ref.node),
                Subject::Node(plug.node),
                Some(&Handler::Forward),
            );
        }
        self.bump_generation();

        tracing::info!("Disconnected {:?} from {:?}", plug, socket_ref);
        self.signal(Subject::Node(plug.node), Signal::Disconnected, None)?;
        Ok(true)
    }

    /// Remove a node. Its links are cut on both sides before the slot is freed.
    pub fn release_node(&mut self, id: NodeId) -> PipelineResult<()> {
        self.node(id)?;
        self.signal(Subject::Node(id), Signal::Released, None)?;
        self.release_context(id)?;

        let plug_count = self.node(id)?.plugs().len();
        for index in 0..plug_count {
            self.disconnect(PlugRef::new(id, index))?;
        }
        let consumers: Vec<PlugRef> = self
            .node(id)?
            .sockets()
            .iter()
            .flat_map(|s| s.requesting().iter().copied())
            .collect();
        for plug in consumers {
            self.disconnect(plug)?;
        }

        self.bus.remove_subject(Subject::Node(id));
        if let Some(slot) = self.nodes.get_mut(id.index()) {
            *slot = None;
        }
        self.bump_generation();
        tracing::info!("Released node {}", id);
        Ok(())
    }

    /// Whether `target` is reachable from `start` following sockets downstream.
    pub fn reaches_downstream(&self, start: NodeId, target: NodeId) -> PipelineResult<bool> {
        Ok(FilterGraph::from_node(self, start, GraphOptions::downstream())?.contains(target))
    }

    // ── Options and data ──

    /// Set an option. A change drops the node's context and the contexts downstream.
    ///
    /// Returns whether the value changed.
    pub fn set_option(
        &mut self,
        id: NodeId,
        key: &str,
        value: impl Into<OptionValue>,
    ) -> PipelineResult<bool> {
        let value = value.into();
        let node = self.node(id)?;
        let mut options = node.options().clone();
        if !options.set(key, value.clone()) {
            return Ok(false);
        }
        node.core().validate_options(&options)?;
        self.node_mut(id)?.options = options;
        self.bump_generation();

        tracing::debug!("Node {} option '{}' = {}", id, key, value.describe());
        self.signal(Subject::Node(id), Signal::OptionChanged, Some(value))?;
        Ok(true)
    }

    pub fn socket_data(&self, socket: SocketRef) -> PipelineResult<Option<ImageHandle>> {
        Ok(self.socket(socket)?.data().cloned())
    }

    /// Attach data to a socket, e.g. the input image of a root node.
    pub fn set_socket_data(
        &mut self,
        socket: SocketRef,
        image: Option<ImageHandle>,
    ) -> PipelineResult<()> {
        let ready = image.is_some();
        self.socket_mut(socket)?.data = image;
        if ready {
            self.signal(Subject::Node(socket.node), Signal::DataReady, None)?;
        }
        Ok(())
    }

    // ── Contexts ──

    /// Text the node's cache key is hashed from.
    pub fn describe(&self, id: NodeId) -> PipelineResult<String> {
        let node = self.node(id)?;
        let core = node.core();
        let [major, minor, patch] = core.version();
        let mut text = format!("{} v{}.{}.{}", core.registration(), major, minor, patch);
        for (key, value) in node.options().iter() {
            let _ = write!(text, " {}={}", key, value.describe());
        }
        if core.hashes_upstream() {
            for (index, plug) in node.plugs().iter().enumerate() {
                match plug.remote() {
                    Some(s) => {
                        let upstream = self.describe(s.node)?;
                        let _ = write!(text, " <{}:[{}]{}>", index, s.index, upstream);
                    }
                    None => {
                        let _ = write!(text, " <{}:->", index);
                    }
                }
            }
        }
        Ok(text)
    }

    /// Cache key the node's context is (or would be) stored under.
    pub fn context_key(&self, id: NodeId) -> PipelineResult<Option<String>> {
        let node = self.node(id)?;
        match node.core().context_type() {
            Some(kind) => Ok(Some(cache_key(kind, fingerprint_text(&self.describe(id)?)))),
            None => Ok(None),
        }
    }

    /// Bind a backend context to a node.
    ///
    /// Returns the bound context, or `None` for nodes that use none. With
    /// `force` the context is produced again and replaces the cache entry.
    pub fn set_context(&mut self, id: NodeId, force: bool) -> PipelineResult<Option<SharedContext>> {
        let node = self.node(id)?;
        if !force {
            if let Some(ctx) = node.context() {
                return Ok(Some(Arc::clone(ctx)));
            }
        }
        let core = Arc::clone(node.core());
        let runner = Arc::clone(node.runner());
        let Some(kind) = core.context_type().map(str::to_string) else {
            return Ok(None);
        };
        let producer = core.producer().ok_or(PipelineError::NoContext(id))?;

        let description = self.describe(id)?;
        let fingerprint = fingerprint_text(&description);
        let key = cache_key(&kind, fingerprint);
        let request = ContextRequest {
            node: id,
            registration: core.registration().to_string(),
            options: node.options().clone(),
            description,
            kind: kind.clone(),
        };
        let produce = || -> PipelineResult<SharedContext> {
            match producer.produce(&request)? {
                Some(bytes) => Ok(Arc::new(BackendContext::new(kind.as_str(), bytes))),
                None => Err(PipelineError::NoContext(id)),
            }
        };

        let mut context = if !self.config.cache_enabled {
            produce()?
        } else if force {
            let fresh = produce()?;
            self.cache.set(key.clone(), Arc::clone(&fresh));
            fresh
        } else {
            let (found, hit) = self.cache.get_or_try_insert_with(&key, &produce)?;
            if found.kind != kind {
                tracing::warn!("Cache entry {} has type '{}', recomputing", key, found.kind);
                let fresh = produce()?;
                self.cache.set(key.clone(), Arc::clone(&fresh));
                fresh
            } else {
                tracing::debug!(
                    "Context for node {}: {}",
                    id,
                    if hit { "cache hit" } else { "produced" }
                );
                found
            }
        };
        let mut bound_key = key;

        // Runners working on a different context type get a converted copy,
        // cached under the runner's type tag.
        if let Some(target) = runner.context_type().filter(|t| *t != kind).map(str::to_string) {
            let converted_key = cache_key(&target, fingerprint);
            let source = Arc::clone(&context);
            let convert = || -> PipelineResult<SharedContext> {
                let converted = runner.convert_context(&source)?;
                Ok(Arc::new(converted))
            };
            context = if self.config.cache_enabled && !force {
                self.cache.get_or_try_insert_with(&converted_key, convert)?.0
            } else {
                let fresh = convert()?;
                if self.config.cache_enabled {
                    self.cache.set(converted_key.clone(), Arc::clone(&fresh));
                }
                fresh
            };
            bound_key = converted_key;
        }

        let node = self.node_mut(id)?;
        node.release_context();
        node.context = Some(Arc::clone(&context));
        node.context_key = Some(bound_key);
        Ok(Some(context))
    }

    /// Drop the node's context reference. The cache keeps its entry.
    pub fn release_context(&mut self, id: NodeId) -> PipelineResult<bool> {
        Ok(self.node_mut(id)?.release_context())
    }

    /// Drop the contexts of `id` and every node downstream of it.
    pub fn invalidate_downstream(&mut self, id: NodeId) -> PipelineResult<usize> {
        let graph = FilterGraph::from_node(self, id, GraphOptions::downstream())?;
        let mut released = 0;
        for node in graph.nodes() {
            if self.release_context(node)? {
                released += 1;
            }
        }
        if released > 0 {
            tracing::debug!("Invalidated {} context(s) downstream of {}", released, id);
        }
        Ok(released)
    }

    // ── Execution ──

    /// Run the node feeding `plug`, filling `ticket`'s buffer.
    pub fn run(&mut self, plug: PlugRef, ticket: &mut PixelTicket) -> PipelineResult<()> {
        self.run_at(plug, ticket, 0)
    }

    pub(crate) fn run_at(
        &mut self,
        plug: PlugRef,
        ticket: &mut PixelTicket,
        depth: usize,
    ) -> PipelineResult<()> {
        if depth >= self.config.max_recursion_depth {
            return Err(PipelineError::RecursionLimit(self.config.max_recursion_depth));
        }
        let remote = self
            .plug(plug)?
            .remote()
            .ok_or(PipelineError::IncompleteGraph(plug))?;
        self.run_node(remote, Some(plug), ticket, depth)
    }

    /// Run a node directly through one of its sockets.
    pub fn run_socket(&mut self, socket: SocketRef, ticket: &mut PixelTicket) -> PipelineResult<()> {
        self.socket(socket)?;
        self.run_node(socket, None, ticket, 0)
    }

    fn run_node(
        &mut self,
        socket: SocketRef,
        requester: Option<PlugRef>,
        ticket: &mut PixelTicket,
        depth: usize,
    ) -> PipelineResult<()> {
        let id = socket.node;
        let node = self.node(id)?;
        let needs_context = node.needs_context() && node.context().is_none();
        if needs_context && self.set_context(id, false)?.is_none() {
            return Err(PipelineError::NoContext(id));
        }

        let node = self.node(id)?;
        let runner = Arc::clone(node.runner());
        if node.tags.verbose {
            tracing::debug!("Running node {} ({}) at depth {}", id, node.registration(), depth);
        } else {
            tracing::trace!("Running node {} ({}) at depth {}", id, node.registration(), depth);
        }

        let mut ctx = RunContext {
            pipeline: self,
            node: id,
            socket: socket.index,
            requester,
            depth,
        };
        runner.run(&mut ctx, ticket)
    }

    /// Ask a source node to supply missing data on its sockets.
    ///
    /// Returns whether any socket received data.
    pub fn resolve_node_data(&mut self, id: NodeId) -> PipelineResult<bool> {
        let node = self.node(id)?;
        let runner = Arc::clone(node.runner());
        let missing: Vec<usize> = node
            .sockets()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.data().is_none())
            .map(|(i, _)| i)
            .collect();
        let mut resolved = false;
        for index in missing {
            let mut ctx = RunContext {
                pipeline: self,
                node: id,
                socket: index,
                requester: None,
                depth: 0,
            };
            if let Some(image) = runner.resolve_data(&mut ctx)? {
                self.set_socket_data(SocketRef::new(id, index), Some(image))?;
                resolved = true;
            }
        }
        Ok(resolved)
    }

    // ── Signals ──

    /// Emit a signal from `subject` using the pipeline's signal context.
    ///
    /// A structural signal from a live node drops the contexts of that node
    /// and everything downstream of it, even while delivery is disabled.
    /// Returns the number of handlers that accepted the signal.
    pub fn signal(
        &mut self,
        subject: Subject,
        signal: Signal,
        data: Option<OptionValue>,
    ) -> PipelineResult<usize> {
        if signal.is_structural() {
            if let Subject::Node(id) = subject {
                if self.node(id).is_ok() {
                    self.invalidate_downstream(id)?;
                }
            }
        }
        Ok(self.bus.signal(&self.signal_ctx, subject, signal, data))
    }

    pub fn signal_context(&self) -> &SignalContext {
        &self.signal_ctx
    }

    pub fn signal_context_mut(&mut self) -> &mut SignalContext {
        &mut self.signal_ctx
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    /// A subject id for an observer outside the node graph.
    pub fn new_listener(&mut self) -> Subject {
        self.next_listener += 1;
        Subject::External(self.next_listener)
    }

    pub fn subscribe(
        &mut self,
        model: Subject,
        observer: Subject,
        user_data: Option<UserData>,
        handler: Handler,
    ) -> bool {
        self.bus.subscribe(model, observer, user_data, handler)
    }

    pub fn unsubscribe(&mut self, model: Subject, observer: Subject, handler: Option<&Handler>) -> usize {
        self.bus.unsubscribe(model, observer, handler)
    }
}

/// Id for the slot at `index`. Slots are never reused, so ids stay unique.
fn next_node_id(index: usize) -> PipelineResult<NodeId> {
    u32::try_from(index)
        .map(NodeId)
        .map_err(|_| PipelineError::AllocationFailure(format!("node slot {}", index)))
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("nodes", &self.node_count())
            .field("generation", &self.generation)
            .finish()
    }
}

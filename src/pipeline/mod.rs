//! Node-based color-transform graph.
//!
//! Filter nodes are linked socket-to-plug into a DAG. A pixel request pulls
//! from the output node; every runner pulls its own inputs first, so data
//! flows from the root node down to the output.
//!
//! # Architecture
//!
//! ```text
//! [root] ──► [matrix] ──► [gamma] ──► [output]
//!                  │
//!                  └──► [blend] ◄── [root]
//! ```
//!
//! # Design
//!
//! - **Arena of nodes**: plugs and sockets refer to each other by id, never by pointer.
//! - **Content-addressed contexts**: a node's compiled transform is cached under
//!   `"<type>:<fingerprint>"` and shared by every node with the same description.
//! - **Signal bus**: option and topology changes travel downstream over
//!   observer links and drop stale context references.
//! - **One retry**: a conversion resolves missing upstream data and retries once.

pub mod cache;
pub mod connector;
pub mod conversion;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod graph;
pub mod id;
pub mod image;
pub mod node;
pub mod nodes;
pub mod options;
pub mod registration;
pub mod registry;
pub mod signal;
pub mod ticket;

pub use cache::{cache_key, BackendContext, CacheStats, ContextCache, SharedContext};
pub use connector::{Connector, ConnectorDirection, LinkRefusal};
pub use conversion::Conversion;
pub use error::{PipelineError, PipelineResult};
pub use executor::{EdgeFilter, Pipeline};
pub use fingerprint::{fingerprint_text, Fingerprint, StructuralHasher};
pub use graph::{EdgeDirection, FilterGraph, GraphEdge, GraphOptions, GraphStats};
pub use id::{NodeId, PlugRef, SocketRef};
pub use image::{Image, ImageHandle, PixelLayout, Rect};
pub use node::{
    ContextProducer, ContextRequest, FilterCore, FilterNode, NodeTags, Plug, RunContext, Runner,
    Socket,
};
pub use options::{OptionValue, Options};
pub use registry::{FilterModule, ModuleRegistry};
pub use signal::{
    Handler, Signal, SignalBus, SignalContext, SignalEvent, SignalHandler, Subject, UserData,
};
pub use ticket::{Cursor, PixelTicket, TicketState};

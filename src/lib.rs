//! # chromaflow: color-transform graph engine
//!
//! Builds directed acyclic graphs of filter nodes and runs pixel requests
//! through them. Each node pairs a stateless core (connectors, options,
//! context production) with a runner (the pixel algorithm). Compiled per-node
//! state is kept in a process-wide, content-addressed context cache so that
//! identical nodes share one context.
//!
//! ## Architecture
//!
//! - **Pipeline**: node arena, socket/plug linking with type and cycle checks
//! - **Context cache**: `DashMap` of shared contexts keyed by structural fingerprints
//! - **Signals**: observer links that forward change notifications downstream
//! - **Conversion**: input/output node pair with a one-shot recovery path
//!
//! ## Configuration
//!
//! Engine settings (`EngineConfig`) load from TOML or JSON; the default file
//! lives under the platform config directory in `chromaflow/engine.toml`.
//! Graphs can be described in graph files (`GraphFile`).
//!
//! ## Example
//!
//! ```ignore
//! use chromaflow::pipeline::{nodes, Conversion, ModuleRegistry, Options, Pipeline};
//! use chromaflow::config::EngineConfig;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ModuleRegistry::with_builtins());
//! let mut pipeline = Pipeline::new(registry, EngineConfig::default());
//! let root = pipeline.new_node(nodes::ROOT, Options::new())?;
//! let dim = pipeline.new_node(nodes::MATRIX, Options::new().with("gain", 0.5))?;
//! let out = pipeline.new_node(nodes::OUTPUT, Options::new())?;
//! pipeline.connect(root, 0, dim, 0)?;
//! pipeline.connect(dim, 0, out, 0)?;
//!
//! let mut conversion = Conversion::new(pipeline, root, out)?;
//! conversion.set_input_image(image)?;
//! let ticket = conversion.run_pixels()?;
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use config::{EngineConfig, GraphFile};
pub use error::{ChromaflowError, Result, ResultExt};
pub use pipeline::{
    Conversion, ContextCache, FilterGraph, ImageHandle, ModuleRegistry, NodeId, Options, Pipeline,
    PipelineError, PixelTicket,
};

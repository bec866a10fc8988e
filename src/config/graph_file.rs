//! Graph files: serialized node graphs.
//!
//! A graph file lists nodes by a file-local id with their registration and
//! options, and the links between them. It can be built into a [`Pipeline`]
//! or a [`Conversion`], and written back out from a live pipeline.

use super::{read_file, write_file, EngineConfig};
use crate::error::{ChromaflowError, Result, ResultExt};
use crate::pipeline::{Conversion, ModuleRegistry, NodeId, Options, Pipeline};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

fn default_version() -> u32 {
    1
}

/// A node entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub registration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,
}

/// A link from socket `socket` of node `from` to plug `plug` of node `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: String,
    #[serde(default)]
    pub socket: usize,
    pub to: String,
    #[serde(default)]
    pub plug: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphFile {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Node the conversion reads from. Defaults to the first node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Node the conversion delivers at. Defaults to the last node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl Default for GraphFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            input: None,
            output: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl GraphFile {
    /// Load a graph file (TOML or JSON, by extension)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_file(path.as_ref(), "graph file")
    }

    /// Save a graph file (TOML or JSON, by extension)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_file(self, path.as_ref(), "graph file")
    }

    /// Create every node and link. Returns the pipeline and the id map.
    pub fn build(
        &self,
        registry: Arc<ModuleRegistry>,
        config: EngineConfig,
    ) -> Result<(Pipeline, HashMap<String, NodeId>)> {
        let mut pipeline = Pipeline::new(registry, config);
        let ids = self.populate(&mut pipeline)?;
        Ok((pipeline, ids))
    }

    /// Like [`GraphFile::build`], using the given pipeline (and its cache).
    pub fn populate(&self, pipeline: &mut Pipeline) -> Result<HashMap<String, NodeId>> {
        let mut ids = HashMap::with_capacity(self.nodes.len());
        for spec in &self.nodes {
            if ids.contains_key(&spec.id) {
                return Err(ChromaflowError::Config(format!(
                    "Duplicate node id '{}'",
                    spec.id
                )));
            }
            let id = pipeline
                .new_node(&spec.registration, spec.options.clone())
                .with_context(|| format!("Creating node '{}'", spec.id))?;
            if spec.label.is_some() {
                pipeline.node_mut(id)?.tags.label = spec.label.clone();
            }
            ids.insert(spec.id.clone(), id);
        }

        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| ChromaflowError::UnknownNode(name.to_string()))
        };
        for edge in &self.edges {
            let (from, to) = (lookup(&edge.from)?, lookup(&edge.to)?);
            pipeline
                .connect(from, edge.socket, to, edge.plug)
                .with_context(|| format!("Linking '{}' -> '{}'", edge.from, edge.to))?;
        }
        tracing::info!(
            "Built graph with {} node(s) and {} link(s)",
            self.nodes.len(),
            self.edges.len()
        );
        Ok(ids)
    }

    /// Build the graph and wrap it as a conversion.
    pub fn into_conversion(
        &self,
        registry: Arc<ModuleRegistry>,
        config: EngineConfig,
    ) -> Result<Conversion> {
        let (pipeline, ids) = self.build(registry, config)?;
        let pick = |explicit: &Option<String>, fallback: Option<&NodeSpec>| {
            let name = explicit
                .clone()
                .or_else(|| fallback.map(|n| n.id.clone()))
                .ok_or_else(|| ChromaflowError::Config("Graph file has no nodes".to_string()))?;
            ids.get(&name)
                .copied()
                .ok_or(ChromaflowError::UnknownNode(name))
        };
        let input = pick(&self.input, self.nodes.first())?;
        let output = pick(&self.output, self.nodes.last())?;
        Ok(Conversion::new(pipeline, input, output)?)
    }

    /// Describe a live pipeline. Nodes are named `n<index>`.
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        let name = |id: NodeId| format!("n{}", id.0);
        let mut file = GraphFile::default();
        for id in pipeline.node_ids() {
            let Ok(node) = pipeline.node(id) else {
                continue;
            };
            file.nodes.push(NodeSpec {
                id: name(id),
                registration: node.registration().to_string(),
                label: node.tags.label.clone(),
                options: node.options().clone(),
            });
            for (index, plug) in node.plugs().iter().enumerate() {
                if let Some(socket) = plug.remote() {
                    file.edges.push(EdgeSpec {
                        from: name(socket.node),
                        socket: socket.index,
                        to: name(id),
                        plug: index,
                    });
                }
            }
        }
        file
    }
}

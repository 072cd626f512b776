//! Serializable cloner configuration.
//!
//! Execution and instantiation choices can come from data; policies, custom copiers and
//! seeded pairs are code and are only available on [`ClonerBuilder`](crate::ClonerBuilder).
//!
//! ```rust
//! use deepgraph::{ClonerConfig, ExecutionMode};
//!
//! let json = r#"{ "execution": { "mode": "parallel", "threads": 4 } }"#;
//! let config = ClonerConfig::from_json_str(json)?;
//! assert_eq!(config.execution, ExecutionMode::Parallel { threads: Some(4) });
//! # Ok::<(), deepgraph::CloneError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CloneError, Result};
use crate::introspect::InstantiationStrategy;

/// Queue discipline of the sequential execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalOrder {
    /// Last in, first out.
    #[default]
    DepthFirst,
    /// First in, first out.
    BreadthFirst,
}

/// Where and when continuations run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Inline, on the call stack.
    Recursive,
    /// Queued and drained by the invoking thread.
    Sequential {
        /// Queue discipline.
        #[serde(default)]
        order: TraversalOrder,
    },
    /// Spawned onto a rayon pool.
    Parallel {
        /// Dedicated pool size; `None` uses the global rayon pool.
        #[serde(default)]
        threads: Option<usize>,
    },
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Sequential {
            order: TraversalOrder::DepthFirst,
        }
    }
}

/// Data-driven part of a cloner's configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClonerConfig {
    /// Execution mode.
    pub execution: ExecutionMode,
    /// How structural copies obtain empty instances.
    pub instantiation: InstantiationStrategy,
}

impl ClonerConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CloneError::config(format!("Invalid cloner configuration: {e}")))
    }

    /// Renders the configuration as JSON.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            CloneError::Internal(format!("Cannot serialize cloner configuration: {e}"))
        })
    }
}

//! Job graphs: typed nodes, the descriptor container and the presets.

pub mod constraints;
mod graph;
pub mod nodes;
mod presets;

pub use constraints::ConstraintError;
pub use graph::{GraphError, JobDescriptor};
pub use nodes::{Link, Node, NodeId};
pub use presets::{Adapter, GenerationParams, Preset, QWEN_LIGHTNING_LORA};

use crate::error::EngineError;
use crate::registry::Registry;
use crate::task::NodeRef;

/// Drives execution of a task graph from a root.
///
/// Holds no state of its own beyond the [`Registry`] it was built from — the interesting state
/// (readiness, completeness) lives on the tasks themselves, reached transitively from the root.
pub struct Runner {
  registry: Registry,
}

impl Runner {
  pub fn new(registry: Registry) -> Self {
    Runner { registry }
  }

  /// Runs the graph reachable from `node`, or from the registry's current `root_node` when `node`
  /// is `None`. When `node` is given, it becomes the registry's root node for this and any later
  /// call — mirroring the source system, where the most recently run node is remembered as the
  /// default.
  pub fn run(&self, node: Option<NodeRef>) -> Result<(), EngineError> {
    let root = match node {
      Some(node) => {
        self.registry.set_root_node(node.clone());
        node
      }
      None => self.registry.root_node().ok_or_else(|| EngineError::UnknownTaskKey("<no root registered>".to_string()))?,
    };
    root.run(self.registry.inner())
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }
}

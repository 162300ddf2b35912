use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use hashlink::LinkedHashMap;
use log::debug;

use crate::error::EngineError;
use crate::task::{NodeRef, TaskNode};

/// Engine-wide settings that do not belong to any single task.
///
/// Grouped into one struct, rather than threaded as loose arguments, so that adding a new
/// cross-cutting knob later does not ripple through every constructor signature.
#[derive(Clone, Debug)]
pub struct EngineConfig {
  /// Root directory under which each task's working directory (`<root>/<key>`) is created.
  /// Defaults to a fresh OS temp directory (via the `tempfile` crate) when `None`.
  pub working_dir: Option<PathBuf>,
  /// When set, file connectors report themselves as unchanged without reading from disk. An
  /// unsafe speed-over-correctness knob: see the source system's `skip_checksums` flag.
  pub skip_checksums: bool,
  /// Verbosity passed through to the `log` facade's filter; the engine itself never reads this
  /// beyond handing it to whichever logger the binary installs.
  pub log_level: i32,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig { working_dir: None, skip_checksums: false, log_level: 0 }
  }
}

/// The mutable state shared by every [`TaskNode`] created from a given [`Registry`]: the root
/// directory, the skip-checksums flag tasks consult on every run, and the ordered table of all
/// registered units.
pub struct RegistryInner {
  root: PathBuf,
  pub(crate) skip_checksums: bool,
  next_id: Cell<u32>,
  units: RefCell<LinkedHashMap<String, NodeRef>>,
  /// The most recently registered unit. Reassigned on every `new_task`/`new_input_task` call, so
  /// it tracks "the last task added to the pipeline" rather than a fixed notion of "the" root —
  /// matching the source system, where each `Task.__init__` reassigns `pipeline.root_node`.
  root_node: RefCell<Option<NodeRef>>,
}

/// Owns the task graph: assigns stable, ordinal-prefixed keys to each registered unit and hands
/// out the one root directory they all nest their working directories under.
#[derive(Clone)]
pub struct Registry(Rc<RegistryInner>);

impl Registry {
  pub fn new(config: EngineConfig) -> Self {
    let root = config.working_dir.unwrap_or_else(|| {
      tempfile::tempdir().expect("failed to create a temporary working directory").into_path()
    });
    Registry(Rc::new(RegistryInner {
      root,
      skip_checksums: config.skip_checksums,
      next_id: Cell::new(1),
      units: RefCell::new(LinkedHashMap::new()),
      root_node: RefCell::new(None),
    }))
  }

  pub fn inner(&self) -> &RegistryInner {
    &self.0
  }

  pub fn skip_checksums(&self) -> bool {
    self.0.skip_checksums
  }

  pub fn root(&self) -> &std::path::Path {
    &self.0.root
  }

  fn next_id(&self) -> u32 {
    let id = self.0.next_id.get();
    self.0.next_id.set(id + 1);
    id
  }

  fn register(&self, node: NodeRef) -> NodeRef {
    debug!(target: "pipeweave::registry", "Registering {}", node.key());
    self.0.units.borrow_mut().insert(node.key().to_string(), node.clone());
    *self.0.root_node.borrow_mut() = Some(node.clone());
    node
  }

  /// Creates and registers an ordinary task with an empty (no-op) body and no inputs or outputs;
  /// callers wire those up with [`TaskNode::add_input`], [`TaskNode::add_output_value`],
  /// [`TaskNode::add_output_file`], and [`TaskNode::set_body`] before the graph is run.
  pub fn new_task(&self, module: &str, class: &str) -> NodeRef {
    let id = self.next_id();
    let node = TaskNode::new_task(id, module, class, &self.0.root);
    self.register(node)
  }

  /// Creates and registers an input (source) task. Its working directory is captured as the
  /// process current directory at the moment of this call.
  pub fn new_input_task(&self, module: &str, class: &str) -> NodeRef {
    let id = self.next_id();
    let cwd = std::env::current_dir().expect("process has a current directory");
    let node = TaskNode::new_input(id, module, class, cwd);
    self.register(node)
  }

  /// Looks up a previously registered unit by its key (e.g. `"003-Shouter"`).
  pub fn get_unit(&self, key: &str) -> Result<NodeRef, EngineError> {
    self.0.units.borrow().get(key).cloned().ok_or_else(|| EngineError::UnknownTaskKey(key.to_string()))
  }

  /// All registered units, in registration order.
  pub fn units(&self) -> Vec<NodeRef> {
    self.0.units.borrow().values().cloned().collect()
  }

  /// The most recently registered unit, if any has been registered yet.
  pub fn root_node(&self) -> Option<NodeRef> {
    self.0.root_node.borrow().clone()
  }

  /// Overrides `root_node` explicitly, as [`crate::runner::Runner::run`] does when called with a
  /// specific task.
  pub fn set_root_node(&self, node: NodeRef) {
    *self.0.root_node.borrow_mut() = Some(node);
  }

  /// The id most recently assigned to a registered task (0 if none has been registered yet).
  /// Carried opaquely in the manifest's `unit_id` field, matching the source system's
  /// `Pipeline.get_next_id` bookkeeping.
  pub fn last_assigned_id(&self) -> u32 {
    self.0.next_id.get() - 1
  }
}

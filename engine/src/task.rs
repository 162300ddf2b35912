use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use log::{debug, info};

use crate::connector::{Connector, ConnectorHandle};
use crate::error::EngineError;
use crate::registry::RegistryInner;
use crate::value::Value;

/// A unit of work: a user-defined body plus the inputs it consumes and the outputs it produces.
///
/// Represents both ordinary tasks and [`InputTask`](crate::task::NodeKind::Input) leaves — the
/// distinction lives in `kind`, matching the source system where `InputTask` is a variant of
/// `Task` rather than an unrelated type.
pub struct TaskNode {
  id: u32,
  key: String,
  module: String,
  class: String,
  working_dir: PathBuf,
  ready: Cell<bool>,
  outputs: RefCell<Vec<ConnectorHandle>>,
  kind: NodeKind,
  self_ref: Weak<TaskNode>,
}

/// Reference-counted handle to a task node. Connectors hold a [`Weak`] back-reference to their
/// producing node; the [`crate::registry::Registry`] holds the owning strong reference.
pub type NodeRef = Rc<TaskNode>;

enum NodeKind {
  /// A source leaf: declares outputs only, runs no body.
  Input,
  /// An ordinary task: declares inputs staged by filename and a body that runs when stale.
  Task {
    inputs: RefCell<Vec<ConnectorHandle>>,
    /// Local staging filename for each `FileConnector` input, keyed by its position in `inputs`.
    ip_map: RefCell<HashMap<usize, String>>,
    body: RefCell<Box<dyn TaskBody>>,
  },
}

/// The user-supplied work a [`TaskNode`] performs when it is not up-to-date.
///
/// Runs with the process current directory set to the task's working directory; reads staged
/// inputs and writes outputs by the relative filenames declared on their connectors. Any closure
/// `FnMut() -> Result<(), EngineError>` implements this automatically.
pub trait TaskBody: 'static {
  fn process(&mut self) -> Result<(), EngineError>;
}

impl<F: FnMut() -> Result<(), EngineError> + 'static> TaskBody for F {
  fn process(&mut self) -> Result<(), EngineError> { self() }
}

struct NoopBody;
impl TaskBody for NoopBody {
  fn process(&mut self) -> Result<(), EngineError> { Ok(()) }
}

impl TaskNode {
  /// Constructs an ordinary task, registering it under `id` with working directory
  /// `<root>/<key>`. Internal: callers go through `Registry::new_task`.
  pub(crate) fn new_task(id: u32, module: &str, class: &str, root: &Path) -> NodeRef {
    let key = format!("{:03}-{}", id, class);
    let working_dir = root.join(&key);
    Rc::new_cyclic(|self_ref| TaskNode {
      id,
      key,
      module: module.to_string(),
      class: class.to_string(),
      working_dir,
      ready: Cell::new(false),
      outputs: RefCell::new(Vec::new()),
      kind: NodeKind::Task {
        inputs: RefCell::new(Vec::new()),
        ip_map: RefCell::new(HashMap::new()),
        body: RefCell::new(Box::new(NoopBody)),
      },
      self_ref: self_ref.clone(),
    })
  }

  /// Constructs an input task. Its working directory is `cwd`, the process current directory
  /// captured at construction time — the source system's `InputTask.__init__` does the same, and
  /// downstream staging copies verbatim from whatever that directory held at that moment.
  pub(crate) fn new_input(id: u32, module: &str, class: &str, cwd: PathBuf) -> NodeRef {
    let key = format!("{:03}-{}", id, class);
    Rc::new_cyclic(|self_ref| TaskNode {
      id,
      key,
      module: module.to_string(),
      class: class.to_string(),
      working_dir: cwd,
      ready: Cell::new(false),
      outputs: RefCell::new(Vec::new()),
      kind: NodeKind::Input,
      self_ref: self_ref.clone(),
    })
  }

  pub fn id(&self) -> u32 { self.id }
  pub fn key(&self) -> &str { &self.key }
  pub fn module(&self) -> &str { &self.module }
  pub fn class(&self) -> &str { &self.class }
  pub fn working_dir(&self) -> &Path { &self.working_dir }
  pub fn ready(&self) -> bool { self.ready.get() }
  pub fn is_input(&self) -> bool { matches!(self.kind, NodeKind::Input) }

  pub fn outputs(&self) -> Vec<ConnectorHandle> { self.outputs.borrow().clone() }

  pub fn output(&self, index: usize) -> ConnectorHandle {
    self.outputs.borrow()[index].clone()
  }

  /// Inputs declared on this task. Empty for an [`NodeKind::Input`] leaf.
  pub fn inputs(&self) -> Vec<ConnectorHandle> {
    match &self.kind {
      NodeKind::Task { inputs, .. } => inputs.borrow().clone(),
      NodeKind::Input => Vec::new(),
    }
  }

  /// Declares a value output, returning the connector handle so the constructor can keep it (to
  /// read from, in a later task's `add_input`) and so the body closure can capture it (to write
  /// to, from inside `process()`).
  pub fn add_output_value(&self, value: Value, name: Option<&str>) -> ConnectorHandle {
    let mut outputs = self.outputs.borrow_mut();
    let key = outputs.len();
    let handle = Connector::new_value(self.self_ref.clone(), value, name.map(String::from), Some(key));
    outputs.push(handle.clone());
    handle
  }

  /// Declares a file output at relative path `filename` inside this task's working directory.
  pub fn add_output_file(&self, filename: impl Into<String>, name: Option<&str>) -> ConnectorHandle {
    let mut outputs = self.outputs.borrow_mut();
    let key = outputs.len();
    let handle = Connector::new_file(self.self_ref.clone(), filename.into(), name.map(String::from), Some(key));
    outputs.push(handle.clone());
    handle
  }

  /// Wires `producer`'s connector as one of this task's inputs. `local_filename` is required for
  /// file connectors (the name under which the file is staged into this task's working
  /// directory) and ignored for value connectors.
  ///
  /// Panics if called on an [`NodeKind::Input`] leaf: input tasks declare outputs only, never
  /// inputs, by construction.
  pub fn add_input(&self, producer: ConnectorHandle, local_filename: Option<&str>) -> ConnectorHandle {
    match &self.kind {
      NodeKind::Task { inputs, ip_map, .. } => {
        let mut inputs = inputs.borrow_mut();
        let index = inputs.len();
        if producer.borrow().is_file() {
          let local_filename = local_filename
            .expect("file connector inputs require a local staging filename")
            .to_string();
          ip_map.borrow_mut().insert(index, local_filename);
        }
        inputs.push(producer.clone());
        producer
      }
      NodeKind::Input => panic!("input tasks do not declare inputs"),
    }
  }

  /// Replaces the no-op default body with `body`. Called once, after the constructor has wired
  /// up inputs and outputs, so the closure can capture the connector handles it needs.
  pub fn set_body(&self, body: impl TaskBody) {
    match &self.kind {
      NodeKind::Task { body: slot, .. } => *slot.borrow_mut() = Box::new(body),
      NodeKind::Input => panic!("input tasks have no body"),
    }
  }

  /// Installs manifest-loaded checksums onto this task's *input* connectors (a no-op for an
  /// input task, which declares no inputs). `checksums` must be in the same order as the
  /// corresponding input record list.
  pub fn set_checksums(&self, checksums: &[Option<String>]) {
    let targets = match &self.kind {
      NodeKind::Task { inputs, .. } => inputs.borrow().clone(),
      NodeKind::Input => Vec::new(),
    };
    Self::apply_checksums(&targets, checksums);
  }

  /// Installs manifest-loaded checksums onto this task's own *output* connectors, in `outputs`
  /// order. For an input task this duplicates what `Source` input records already carry; for an
  /// ordinary task it is what lets a terminal output (one never consumed as anyone else's input)
  /// stay recognized as unchanged across a save/load round trip.
  pub fn set_output_checksums(&self, checksums: &[Option<String>]) {
    let outputs = self.outputs.borrow().clone();
    Self::apply_checksums(&outputs, checksums);
  }

  fn apply_checksums(targets: &[ConnectorHandle], checksums: &[Option<String>]) {
    for (connector, checksum) in targets.iter().zip(checksums) {
      connector.borrow_mut().set_checksum(checksum.clone());
    }
  }

  /// Executes this task per the state machine in the specification: stage inputs, decide
  /// complete/up-to-date vs. stale, run the body or skip it, and always restore the process
  /// directory before returning. Runs `process()` at most once per invocation: repeated calls
  /// after `ready()` is true are the caller's responsibility to avoid (see `ready_inputs`, which
  /// checks `ready()` before recursing into a producer).
  pub fn run(&self, registry: &RegistryInner) -> Result<(), EngineError> {
    match &self.kind {
      NodeKind::Input => self.run_input(registry),
      NodeKind::Task { .. } => self.run_task(registry),
    }
  }

  fn run_task(&self, registry: &RegistryInner) -> Result<(), EngineError> {
    std::fs::create_dir_all(&self.working_dir).map_err(|e| EngineError::io(&self.working_dir, e))?;
    let _guard = crate::dir_guard::DirGuard::enter(&self.working_dir)?;

    self.ready_inputs(registry)?;

    let complete = self.outputs.borrow().iter().all(|o| o.borrow().complete(registry.skip_checksums));
    let inputs_changed = self.inputs().iter().any(|i| i.borrow().changed(registry.skip_checksums));

    if !complete || inputs_changed {
      info!(target: "pipeweave::task", "Running: {}", self.key);
      let NodeKind::Task { body, .. } = &self.kind else { unreachable!() };
      body.borrow_mut().process().map_err(|e| match e {
        EngineError::TaskBody { .. } => e,
        other => EngineError::task_body(&self.key, other),
      })?;
    } else {
      info!(target: "pipeweave::task", "Up-to-date: {}", self.key);
    }
    self.ready.set(true);
    Ok(())
  }

  fn run_input(&self, _registry: &RegistryInner) -> Result<(), EngineError> {
    let changed = self.outputs.borrow().iter().any(|o| o.borrow().changed(_registry.skip_checksums));
    if changed {
      info!(target: "pipeweave::task", "Running: {}", self.key);
    } else {
      info!(target: "pipeweave::task", "Up-to-date: {}", self.key);
    }
    self.ready.set(true);
    Ok(())
  }

  /// Runs each not-yet-ready producer, then stages file inputs into this task's working
  /// directory. A producer that is already `ready()` is not invoked again, which is how a
  /// diamond-shaped graph ends up running each shared producer exactly once per
  /// `Runner::run` — the check happens here, at the call site, rather than inside the producer's
  /// own `run`.
  fn ready_inputs(&self, registry: &RegistryInner) -> Result<(), EngineError> {
    let NodeKind::Task { ip_map, .. } = &self.kind else { return Ok(()) };
    for (index, input) in self.inputs().into_iter().enumerate() {
      let parent = input.borrow().parent();
      if !parent.ready() {
        parent.run(registry)?;
      }
      if input.borrow().is_file() {
        self.stage_input(&input, index, ip_map)?;
      }
    }
    Ok(())
  }

  fn stage_input(&self, input: &ConnectorHandle, index: usize, ip_map: &RefCell<HashMap<usize, String>>) -> Result<(), EngineError> {
    let local_name = ip_map.borrow().get(&index).cloned().expect("file input missing a staging filename");
    let src = input.borrow().full_filename().expect("file connector always has a full_filename");
    let dest = self.working_dir.join(&local_name);
    debug!(target: "pipeweave::task", "Copying {} to {}", src.display(), dest.display());
    std::fs::copy(&src, &dest).map_err(|e| EngineError::io(&src, e))?;
    Ok(())
  }

  /// Recomputes checksums on this task's change-detection surface (outputs for an input task,
  /// own outputs otherwise — manifest serialization always freshens the *producer's* output
  /// checksums, since those are the ground truth) immediately before serialization.
  pub(crate) fn checksum_outputs(&self) -> Result<(), EngineError> {
    for output in self.outputs.borrow().iter() {
      output.borrow_mut().read_checksum()?;
    }
    Ok(())
  }
}

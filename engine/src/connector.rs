use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use crate::hash::sha1_hex;
use crate::task::TaskNode;
use crate::value::Value;

/// Which of the two endpoint flavors a [`Connector`] is. Fixed at construction: `kind ==
/// FileConnector` iff `filename` is present, so this is derived from `filename` rather than
/// stored redundantly.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ConnectorKind {
  Value,
  File,
}

/// A typed input/output endpoint bound to the task that produces it.
///
/// Owned by its producing task (in that task's `outputs`); downstream tasks hold clones of the
/// same handle in their own `inputs`, so a `Connector` is reference-counted and its mutable
/// fields live behind a `RefCell`. `parent` is a `Weak` reference to break the ownership cycle
/// that would otherwise form (task owns output -> output points back to owning task).
pub struct Connector {
  parent: Weak<TaskNode>,
  filename: Option<String>,
  name: Option<String>,
  key: Option<usize>,
  value: Value,
  value_changed: bool,
  checksum: Option<String>,
}

pub type ConnectorHandle = Rc<RefCell<Connector>>;

impl Connector {
  pub(crate) fn new_value(parent: Weak<TaskNode>, value: Value, name: Option<String>, key: Option<usize>) -> ConnectorHandle {
    Rc::new(RefCell::new(Connector {
      parent,
      filename: None,
      name,
      key,
      value,
      value_changed: false,
      checksum: None,
    }))
  }

  pub(crate) fn new_file(parent: Weak<TaskNode>, filename: String, name: Option<String>, key: Option<usize>) -> ConnectorHandle {
    Rc::new(RefCell::new(Connector {
      parent,
      filename: Some(filename),
      name,
      key,
      value: Value::Unset,
      value_changed: false,
      checksum: None,
    }))
  }

  pub fn kind(&self) -> ConnectorKind {
    if self.filename.is_some() { ConnectorKind::File } else { ConnectorKind::Value }
  }

  pub fn is_file(&self) -> bool {
    self.kind() == ConnectorKind::File
  }

  /// The task that produces this connector. Panics if called after that task has been dropped,
  /// which cannot happen while the owning [`crate::registry::Registry`] is alive.
  pub fn parent(&self) -> Rc<TaskNode> {
    self.parent.upgrade().expect("connector outlived its parent task")
  }

  pub fn filename(&self) -> Option<&str> {
    self.filename.as_deref()
  }

  pub fn key(&self) -> Option<usize> {
    self.key
  }

  pub fn name(&self) -> String {
    match &self.name {
      Some(name) => name.clone(),
      None => match &self.filename {
        Some(filename) => filename.split('.').next().unwrap_or(filename).to_string(),
        None => String::new(),
      },
    }
  }

  pub fn value(&self) -> &Value {
    &self.value
  }

  /// Assigns a new value, marking it changed for this run's change detection.
  pub fn set_value(&mut self, value: Value) {
    self.value_changed = true;
    self.value = value;
  }

  pub fn checksum(&self) -> Option<&str> {
    self.checksum.as_deref()
  }

  /// Installs a checksum loaded from a manifest, bypassing the `value_changed`/on-disk-read path.
  /// Used only by manifest reload (`set_checksums`).
  pub fn set_checksum(&mut self, checksum: Option<String>) {
    self.checksum = checksum;
  }

  /// Full path to this connector's backing file: `parent.working_dir/filename`. Only meaningful
  /// for `ConnectorKind::File`.
  pub fn full_filename(&self) -> Option<PathBuf> {
    self.filename.as_ref().map(|f| self.parent().working_dir().join(f))
  }

  /// Recomputes and caches the on-disk digest. No-op for `ConnectorKind::Value`.
  pub fn read_checksum(&mut self) -> Result<(), crate::error::EngineError> {
    if let Some(path) = self.full_filename() {
      self.checksum = Some(sha1_hex(path)?);
    }
    Ok(())
  }

  /// True iff the output is ready to be consumed downstream: a value connector with a value set,
  /// or a file connector whose file exists and has not changed since its last recorded checksum.
  pub fn complete(&self, skip_checksums: bool) -> bool {
    match self.filename {
      Some(_) => {
        let exists = self.full_filename().map(|p| p.exists()).unwrap_or(false);
        exists && !self.changed(skip_checksums)
      }
      None => !self.value.is_unset(),
    }
  }

  /// True iff this connector's content differs from what was last recorded. For a value
  /// connector, whether `set_value` has been called since construction or reload. For a file
  /// connector, whether the live digest differs from the cached `checksum` — masked to `false`
  /// when `skip_checksums` is set. A missing or unreadable file hashes to an error, which is
  /// surfaced here as "different" (changed = true), matching the source system's behavior; the
  /// exception is `skip_checksums`, under which any existing-or-not file is considered unchanged.
  pub fn changed(&self, skip_checksums: bool) -> bool {
    match &self.filename {
      Some(_) => {
        if skip_checksums {
          return false;
        }
        match self.full_filename().map(sha1_hex) {
          Some(Ok(digest)) => self.checksum.as_deref() != Some(digest.as_str()),
          _ => true,
        }
      }
      None => self.value_changed,
    }
  }
}

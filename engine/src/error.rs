use std::path::PathBuf;

use thiserror::Error;

/// Every fallible path through the engine reports through this single error type.
///
/// Mirrors the teacher's preference for small, explicit `std::error::Error` values over a
/// catch-all boxed-dyn error: each variant carries enough context to print an actionable message.
#[derive(Debug, Error)]
pub enum EngineError {
  /// A filesystem operation failed: opening/reading a file for hashing, staging a copy, or
  /// creating a working directory.
  #[error("io error at '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// A task's `process()` body returned an error.
  #[error("task '{key}' failed: {source}")]
  TaskBody {
    key: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// Tried to look up a task by a key that is not registered.
  #[error("unknown task key '{0}'")]
  UnknownTaskKey(String),

  /// A manifest named a task class that the caller's `ClassRegistry` does not know.
  #[error("unknown task class '{0}'")]
  UnknownTaskClass(String),

  /// The manifest document was not valid JSON, or did not match the expected shape.
  #[error("failed to parse manifest: {0}")]
  ManifestParse(#[from] serde_json::Error),

  /// A manifest unit's saved inputs do not match the arity the class constructor expects.
  #[error("arity mismatch for task '{key}': expected {expected} inputs, got {actual}")]
  ArityMismatch {
    key: String,
    expected: usize,
    actual: usize,
  },

  /// A manifest record did not match any recognized shape (`Source`/`Connector`).
  #[error("unrecognized manifest schema: {0}")]
  SchemaVersionMismatch(String),
}

impl EngineError {
  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io { path: path.into(), source }
  }

  pub fn task_body(key: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::TaskBody { key: key.into(), source: Box::new(source) }
  }
}

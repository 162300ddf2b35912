use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::connector::ConnectorHandle;
use crate::error::EngineError;
use crate::registry::{EngineConfig, Registry};
use crate::task::NodeRef;
use crate::value::Value;

/// Top-level manifest document, matching the stable on-disk JSON shape.
#[derive(Serialize)]
struct ManifestDocument {
  log_level: i32,
  working_dir: String,
  unit_id: u32,
  units: Vec<UnitRecord>,
  root_node: String,
}

#[derive(Serialize)]
struct UnitRecord {
  module: String,
  class: String,
  inputs: Vec<InputRecord>,
  /// Checksum of each of this unit's own output connectors, in `outputs` order. Restored on load
  /// via `TaskNode::set_output_checksums` so a unit whose output is never consumed as another
  /// unit's input (a terminal task) still recognizes itself as unchanged after a reload.
  output_checksums: Vec<Option<String>>,
}

/// A per-input-connector record, written in one of two shapes depending on whether the owning
/// unit is an ordinary task (`Connector`, pointing at a producer's output) or an input task
/// (`Source`, the value/file originates here).
#[derive(Serialize)]
#[serde(tag = "type")]
enum InputRecord {
  Connector { parent: String, key: usize, checksum: Option<String>, filename: Option<String>, value: Value },
  Source { filename: Option<String>, value: Value, checksum: Option<String> },
}

/// Writes `registry`'s current state as a manifest to `writer`. Recomputes the checksum of every
/// output connector immediately beforehand, so the saved digests reflect the run that just
/// completed rather than whatever was cached from a previous load.
pub fn save<W: Write>(registry: &Registry, log_level: i32, writer: W) -> Result<(), EngineError> {
  for unit in registry.units() {
    unit.checksum_outputs()?;
  }
  let document = ManifestDocument {
    log_level,
    working_dir: registry.root().to_string_lossy().into_owned(),
    unit_id: registry.last_assigned_id(),
    units: registry.units().iter().map(unit_record).collect(),
    root_node: registry.root_node().map(|n| n.key().to_string()).unwrap_or_default(),
  };
  serde_json::to_writer_pretty(writer, &document)?;
  Ok(())
}

fn unit_record(node: &NodeRef) -> UnitRecord {
  let inputs = if node.is_input() {
    node
      .outputs()
      .iter()
      .map(|output| {
        let output = output.borrow();
        InputRecord::Source {
          filename: output.filename().map(String::from),
          value: output.value().clone(),
          checksum: output.checksum().map(String::from),
        }
      })
      .collect()
  } else {
    node
      .inputs()
      .iter()
      .map(|input| {
        let input = input.borrow();
        InputRecord::Connector {
          parent: input.parent().key().to_string(),
          key: input.key().unwrap_or(0),
          checksum: input.checksum().map(String::from),
          filename: input.filename().map(String::from),
          value: input.value().clone(),
        }
      })
      .collect()
  };
  let output_checksums = node.outputs().iter().map(|output| output.borrow().checksum().map(String::from)).collect();
  UnitRecord { module: node.module().to_string(), class: node.class().to_string(), inputs, output_checksums }
}

#[derive(Deserialize)]
struct RawManifestDocument {
  log_level: i32,
  working_dir: String,
  units: Vec<RawUnitRecord>,
  root_node: String,
}

#[derive(Deserialize)]
struct RawUnitRecord {
  module: String,
  class: String,
  inputs: Vec<RawInputRecord>,
  #[serde(default)]
  output_checksums: Vec<Option<String>>,
}

#[derive(Deserialize)]
struct RawInputRecord {
  #[serde(rename = "type")]
  kind: String,
  parent: Option<String>,
  key: Option<usize>,
  checksum: Option<String>,
  filename: Option<String>,
  #[serde(default)]
  value: Value,
}

impl RawInputRecord {
  fn checksum(&self) -> Option<String> {
    self.checksum.clone()
  }

  /// Resolves this record to the argument a class constructor should receive. A `Source` record
  /// prefers its `value` when one has been assigned, falling back to `filename` — mirroring the
  /// source system, where an `InputTask` constructor accepts either a literal value or a path. A
  /// `Connector` record resolves to the already-constructed producer's output at `key`.
  fn materialize(&self, registry: &Registry, unit_key: &str) -> Result<ConstructorArg, EngineError> {
    match self.kind.as_str() {
      "Source" => {
        if !self.value.is_unset() {
          Ok(ConstructorArg::Value(self.value.clone()))
        } else if let Some(filename) = &self.filename {
          Ok(ConstructorArg::Value(Value::Str(filename.clone())))
        } else {
          Ok(ConstructorArg::Value(Value::Unset))
        }
      }
      "Connector" => {
        let parent_key = self
          .parent
          .as_deref()
          .ok_or_else(|| EngineError::SchemaVersionMismatch(format!("unit '{unit_key}': Connector record missing 'parent'")))?;
        let key = self
          .key
          .ok_or_else(|| EngineError::SchemaVersionMismatch(format!("unit '{unit_key}': Connector record missing 'key'")))?;
        let producer = registry.get_unit(parent_key)?;
        Ok(ConstructorArg::Connector(producer.output(key)))
      }
      other => Err(EngineError::SchemaVersionMismatch(format!("unit '{unit_key}': unrecognized input record type '{other}'"))),
    }
  }
}

/// A materialized constructor argument, resolved from a saved manifest record.
pub enum ConstructorArg {
  Value(Value),
  Connector(ConnectorHandle),
}

/// A class constructor: given the registry to register into, the unit's opaque `module` string,
/// and its materialized constructor arguments (in saved order), produces the reconstructed task.
pub type Constructor = Box<dyn Fn(&Registry, &str, Vec<ConstructorArg>) -> Result<NodeRef, EngineError>>;

/// Name-to-constructor mapping supplied by the embedding application, standing in for the source
/// system's module-qualified dynamic class lookup.
#[derive(Default)]
pub struct ClassRegistry {
  constructors: HashMap<String, Constructor>,
}

impl ClassRegistry {
  pub fn new() -> Self {
    ClassRegistry { constructors: HashMap::new() }
  }

  pub fn register(&mut self, class: impl Into<String>, constructor: impl Fn(&Registry, &str, Vec<ConstructorArg>) -> Result<NodeRef, EngineError> + 'static) -> &mut Self {
    self.constructors.insert(class.into(), Box::new(constructor));
    self
  }

  fn construct(&self, class: &str, registry: &Registry, module: &str, args: Vec<ConstructorArg>) -> Result<NodeRef, EngineError> {
    let constructor = self.constructors.get(class).ok_or_else(|| EngineError::UnknownTaskClass(class.to_string()))?;
    constructor(registry, module, args)
  }
}

/// Checks that `args` has exactly `expected` entries, returning `ArityMismatch` labeled with
/// `key` otherwise. Intended to be the first line of every registered constructor.
pub fn check_arity(key: &str, args: &[ConstructorArg], expected: usize) -> Result<(), EngineError> {
  if args.len() != expected {
    return Err(EngineError::ArityMismatch { key: key.to_string(), expected, actual: args.len() });
  }
  Ok(())
}

/// Reads a manifest from `reader`, reconstructing an equivalent [`Registry`] by invoking each
/// unit's constructor (looked up in `classes`) in saved order, then installing the saved
/// checksums onto each reconstructed task's change-detection surface.
///
/// `skip_checksums` is not itself part of the manifest (it is an operator-chosen runtime mode,
/// not a property of a past run) and is passed through to the freshly constructed [`Registry`]
/// as-is.
pub fn load<R: Read>(reader: R, classes: &ClassRegistry, skip_checksums: bool) -> Result<Registry, EngineError> {
  let document: RawManifestDocument = serde_json::from_reader(reader)?;
  let registry = Registry::new(EngineConfig {
    working_dir: Some(PathBuf::from(document.working_dir)),
    skip_checksums,
    log_level: document.log_level,
  });

  for unit in &document.units {
    let placeholder_key = format!("{}.{}", unit.module, unit.class);
    let args = unit.inputs.iter().map(|record| record.materialize(&registry, &placeholder_key)).collect::<Result<Vec<_>, _>>()?;
    let node = classes.construct(&unit.class, &registry, &unit.module, args)?;
    let checksums: Vec<Option<String>> = unit.inputs.iter().map(RawInputRecord::checksum).collect();
    node.set_checksums(&checksums);
    node.set_output_checksums(&unit.output_checksums);
  }

  registry.set_root_node(registry.get_unit(&document.root_node)?);
  Ok(registry)
}

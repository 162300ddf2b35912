use std::fs;

use pipeweave::connector::ConnectorHandle;
use pipeweave::error::EngineError;
use pipeweave::manifest::{check_arity, ClassRegistry, ConstructorArg};
use pipeweave::registry::Registry;
use pipeweave::task::NodeRef;
use pipeweave::value::Value;

/// A source task with a single declared file output, named `the_file`. Grounded on the original
/// system's `Start`/`SimpleStart` input stages, collapsed to the one-output shape the scenarios
/// in this test suite need.
pub fn start_task(registry: &Registry, filename: &str) -> NodeRef {
  let node = registry.new_input_task("pipeweave_tests", "Start");
  node.add_output_file(filename, Some("the_file"));
  node
}

/// Reads its input under the staged name `quiet.txt` and writes an uppercased copy to `loud.txt`.
pub fn shouter_task(registry: &Registry, quiet: ConnectorHandle) -> NodeRef {
  let node = registry.new_task("pipeweave_tests", "Shouter");
  node.add_input(quiet, Some("quiet.txt"));
  node.add_output_file("loud.txt", Some("loud"));
  node.set_body(|| {
    let contents = fs::read_to_string("quiet.txt").map_err(|e| EngineError::io("quiet.txt", e))?;
    fs::write("loud.txt", contents.to_uppercase()).map_err(|e| EngineError::io("loud.txt", e))?;
    Ok(())
  });
  node
}

/// Reads its input under the staged name `forward.txt` and writes its reverse to `backward.txt`.
pub fn reverser_task(registry: &Registry, forward: ConnectorHandle) -> NodeRef {
  let node = registry.new_task("pipeweave_tests", "Reverser");
  node.add_input(forward, Some("forward.txt"));
  node.add_output_file("backward.txt", Some("backward"));
  node.set_body(|| {
    let contents = fs::read_to_string("forward.txt").map_err(|e| EngineError::io("forward.txt", e))?;
    let reversed: String = contents.chars().rev().collect();
    fs::write("backward.txt", reversed).map_err(|e| EngineError::io("backward.txt", e))?;
    Ok(())
  });
  node
}

/// Concatenates two staged inputs (`a.txt`, `b.txt`), stripped of surrounding whitespace, into
/// `joined.txt`.
pub fn adder_task(registry: &Registry, file_a: ConnectorHandle, file_b: ConnectorHandle) -> NodeRef {
  let node = registry.new_task("pipeweave_tests", "Adder");
  node.add_input(file_a, Some("a.txt"));
  node.add_input(file_b, Some("b.txt"));
  node.add_output_file("joined.txt", Some("joined"));
  node.set_body(|| {
    let a = fs::read_to_string("a.txt").map_err(|e| EngineError::io("a.txt", e))?;
    let b = fs::read_to_string("b.txt").map_err(|e| EngineError::io("b.txt", e))?;
    fs::write("joined.txt", a.trim().to_string() + b.trim()).map_err(|e| EngineError::io("joined.txt", e))?;
    Ok(())
  });
  node
}

/// Constructors mirroring `start_task`/`shouter_task`/`reverser_task`/`adder_task` above, for
/// reconstructing the same task shapes from a reloaded manifest.
pub fn build_classes() -> ClassRegistry {
  let mut classes = ClassRegistry::new();

  classes.register("Start", |registry, module, args| {
    check_arity("Start", &args, 1)?;
    let filename = match &args[0] {
      ConstructorArg::Value(Value::Str(s)) => s.clone(),
      _ => return Err(EngineError::ArityMismatch { key: "Start".into(), expected: 1, actual: args.len() }),
    };
    let node = registry.new_input_task(module, "Start");
    node.add_output_file(filename, Some("the_file"));
    Ok(node)
  });

  classes.register("Shouter", |registry, _module, args| {
    check_arity("Shouter", &args, 1)?;
    let quiet = match &args[0] {
      ConstructorArg::Connector(c) => c.clone(),
      _ => return Err(EngineError::ArityMismatch { key: "Shouter".into(), expected: 1, actual: args.len() }),
    };
    Ok(shouter_task(registry, quiet))
  });

  classes.register("Reverser", |registry, _module, args| {
    check_arity("Reverser", &args, 1)?;
    let forward = match &args[0] {
      ConstructorArg::Connector(c) => c.clone(),
      _ => return Err(EngineError::ArityMismatch { key: "Reverser".into(), expected: 1, actual: args.len() }),
    };
    Ok(reverser_task(registry, forward))
  });

  classes.register("Adder", |registry, _module, args| {
    check_arity("Adder", &args, 2)?;
    let (a, b) = match (&args[0], &args[1]) {
      (ConstructorArg::Connector(a), ConstructorArg::Connector(b)) => (a.clone(), b.clone()),
      _ => return Err(EngineError::ArityMismatch { key: "Adder".into(), expected: 2, actual: args.len() }),
    };
    Ok(adder_task(registry, a, b))
  });

  classes
}

use std::fs;

use assert_matches::assert_matches;
use testresult::TestResult;

use pipeweave::dir_guard::DirGuard;
use pipeweave::manifest::{load, save};
use pipeweave::registry::{EngineConfig, Registry};
use pipeweave::runner::Runner;
use pipeweave::value::Value;
use pipeweave::EngineError;

#[path = "common/mod.rs"]
mod common;

fn registry_in(root: &std::path::Path) -> Registry {
  Registry::new(EngineConfig { working_dir: Some(root.to_path_buf()), skip_checksums: false, log_level: 0 })
}

/// S1 — fresh run, two-stage chain.
#[test]
fn fresh_run_two_stage_chain() -> TestResult {
  let root = dev_util::create_temp_dir()?;
  let source_dir = root.path().join("001-Start");
  fs::create_dir_all(&source_dir)?;
  fs::write(source_dir.join("test.txt"), "hello")?;

  let registry = registry_in(root.path());
  let start = {
    let _guard = DirGuard::enter(&source_dir)?;
    common::start_task(&registry, "test.txt")
  };
  let shouter = common::shouter_task(&registry, start.output(0));

  let runner = Runner::new(registry);
  runner.run(Some(shouter.clone()))?;

  assert!(start.ready());
  assert!(shouter.ready());
  assert_eq!(fs::read_to_string(root.path().join("002-Shouter/quiet.txt"))?, "hello");
  assert_eq!(fs::read_to_string(root.path().join("002-Shouter/loud.txt"))?, "HELLO");
  Ok(())
}

/// S2 — incremental skip after a save/load round trip: the output is not rewritten, so its mtime
/// is unchanged.
#[test]
fn incremental_skip_after_reload() -> TestResult {
  let root = dev_util::create_temp_dir()?;
  let source_dir = root.path().join("001-Start");
  fs::create_dir_all(&source_dir)?;
  fs::write(source_dir.join("test.txt"), "hello")?;

  let registry = registry_in(root.path());
  let (_start, shouter) = {
    let _guard = DirGuard::enter(&source_dir)?;
    let start = common::start_task(&registry, "test.txt");
    let shouter = common::shouter_task(&registry, start.output(0));
    (start, shouter)
  };
  Runner::new(registry.clone()).run(Some(shouter.clone()))?;

  let loud_path = root.path().join("002-Shouter/loud.txt");
  let mtime_before = fs::metadata(&loud_path)?.modified()?;

  let mut manifest_bytes = Vec::new();
  save(&registry, 0, &mut manifest_bytes)?;

  let classes = common::build_classes();
  let reloaded = {
    let _guard = DirGuard::enter(&source_dir)?;
    load(manifest_bytes.as_slice(), &classes, false)?
  };
  let reloaded_shouter = reloaded.get_unit(shouter.key())?;
  Runner::new(reloaded).run(Some(reloaded_shouter.clone()))?;

  let mtime_after = fs::metadata(&loud_path)?.modified()?;
  assert_eq!(mtime_before, mtime_after);
  assert_eq!(fs::read_to_string(&loud_path)?, "HELLO");
  assert!(reloaded_shouter.ready());
  Ok(())
}

/// S3 — the source file changes on disk between runs; the consumer reruns and picks it up.
#[test]
fn rerun_when_input_content_changes() -> TestResult {
  let root = dev_util::create_temp_dir()?;
  let source_dir = root.path().join("001-Start");
  fs::create_dir_all(&source_dir)?;
  fs::write(source_dir.join("test.txt"), "hello")?;

  let registry = registry_in(root.path());
  let (_start, shouter) = {
    let _guard = DirGuard::enter(&source_dir)?;
    let start = common::start_task(&registry, "test.txt");
    let shouter = common::shouter_task(&registry, start.output(0));
    (start, shouter)
  };
  Runner::new(registry.clone()).run(Some(shouter.clone()))?;

  let mut manifest_bytes = Vec::new();
  save(&registry, 0, &mut manifest_bytes)?;

  fs::write(source_dir.join("test.txt"), "world")?;

  let classes = common::build_classes();
  let reloaded = {
    let _guard = DirGuard::enter(&source_dir)?;
    load(manifest_bytes.as_slice(), &classes, false)?
  };
  let reloaded_shouter = reloaded.get_unit(shouter.key())?;
  Runner::new(reloaded).run(Some(reloaded_shouter.clone()))?;

  let loud_path = root.path().join("002-Shouter/loud.txt");
  assert_eq!(fs::read_to_string(&loud_path)?, "WORLD");
  Ok(())
}

/// S4 — `skip_checksums = true` masks the content change from S3: the stale output is kept.
#[test]
fn skip_checksums_ignores_input_content_changes() -> TestResult {
  let root = dev_util::create_temp_dir()?;
  let source_dir = root.path().join("001-Start");
  fs::create_dir_all(&source_dir)?;
  fs::write(source_dir.join("test.txt"), "hello")?;

  let registry = registry_in(root.path());
  let (_start, shouter) = {
    let _guard = DirGuard::enter(&source_dir)?;
    let start = common::start_task(&registry, "test.txt");
    let shouter = common::shouter_task(&registry, start.output(0));
    (start, shouter)
  };
  Runner::new(registry.clone()).run(Some(shouter.clone()))?;

  let mut manifest_bytes = Vec::new();
  save(&registry, 0, &mut manifest_bytes)?;

  fs::write(source_dir.join("test.txt"), "world")?;

  let classes = common::build_classes();
  let reloaded = {
    let _guard = DirGuard::enter(&source_dir)?;
    load(manifest_bytes.as_slice(), &classes, true)?
  };
  let reloaded_shouter = reloaded.get_unit(shouter.key())?;
  Runner::new(reloaded).run(Some(reloaded_shouter.clone()))?;

  let loud_path = root.path().join("002-Shouter/loud.txt");
  assert_eq!(fs::read_to_string(&loud_path)?, "HELLO");
  Ok(())
}

/// S5 — diamond dependency: `A -> B`, `A -> C`, `B, C -> D`. A single run visits `A` once.
#[test]
fn diamond_dependency_runs_shared_producer_once() -> TestResult {
  let root = dev_util::create_temp_dir()?;
  let source_dir = root.path().join("001-Start");
  fs::create_dir_all(&source_dir)?;
  fs::write(source_dir.join("a.txt"), "hello")?;

  let registry = registry_in(root.path());
  let a = {
    let _guard = DirGuard::enter(&source_dir)?;
    common::start_task(&registry, "a.txt")
  };
  let b = common::reverser_task(&registry, a.output(0));
  let c = common::shouter_task(&registry, a.output(0));
  let d = common::adder_task(&registry, b.output(0), c.output(0));

  Runner::new(registry).run(Some(d.clone()))?;

  assert!(a.ready());
  assert!(b.ready());
  assert!(c.ready());
  assert!(d.ready());
  let joined = fs::read_to_string(root.path().join("004-Adder/joined.txt"))?;
  assert_eq!(joined, "olleh".to_string() + "HELLO");
  Ok(())
}

/// S6 — a `Value::Unset` connector serializes to `"NOTSET"` and deserializes back to `Unset`,
/// with `complete` false in both the original and reloaded graph.
#[test]
fn unset_value_connector_round_trips() -> TestResult {
  let root = dev_util::create_temp_dir()?;
  let registry = registry_in(root.path());
  let source = registry.new_input_task("pipeweave_tests", "SimpleStart");
  let extra = source.add_output_value(Value::Unset, Some("extra"));
  assert!(!extra.borrow().complete(false));

  let mut classes = pipeweave::manifest::ClassRegistry::new();
  classes.register("SimpleStart", |registry, module, args| {
    pipeweave::manifest::check_arity("SimpleStart", &args, 1)?;
    let value = match &args[0] {
      pipeweave::manifest::ConstructorArg::Value(v) => v.clone(),
      _ => return Err(EngineError::ArityMismatch { key: "SimpleStart".into(), expected: 1, actual: args.len() }),
    };
    let node = registry.new_input_task(module, "SimpleStart");
    node.add_output_value(value, Some("extra"));
    Ok(node)
  });

  let mut manifest_bytes = Vec::new();
  save(&registry, 0, &mut manifest_bytes)?;
  assert!(String::from_utf8_lossy(&manifest_bytes).contains("NOTSET"));

  let reloaded = load(manifest_bytes.as_slice(), &classes, false)?;
  let reloaded_source = reloaded.get_unit(source.key())?;
  assert_eq!(reloaded_source.output(0).borrow().value(), &Value::Unset);
  assert!(!reloaded_source.output(0).borrow().complete(false));
  Ok(())
}

#[test]
fn loading_a_manifest_with_an_unknown_class_fails() -> TestResult {
  let root = dev_util::create_temp_dir()?;
  let registry = registry_in(root.path());
  registry.new_input_task("pipeweave_tests", "Ghost");

  let mut manifest_bytes = Vec::new();
  save(&registry, 0, &mut manifest_bytes)?;

  let classes = pipeweave::manifest::ClassRegistry::new();
  let result = load(manifest_bytes.as_slice(), &classes, false);
  assert_matches!(result, Err(EngineError::UnknownTaskClass(_)));
  Ok(())
}

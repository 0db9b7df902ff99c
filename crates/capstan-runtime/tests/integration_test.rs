//! End-to-end tests for the runtime bridge.
//!
//! Modules with scalar signatures are compiled from embedded component
//! text, so these run with no external tooling. The full nested-list and
//! string marshalling scenario needs a component built with a guest
//! toolchain (e.g. cargo-component) and is `#[ignore]`d by default.

use std::path::PathBuf;

use capstan_runtime::{
    InitStatus, ModuleFactory, RuntimeError, ScriptHost, dynamic_args, from_dynamic,
};
use tempfile::TempDir;
use wasmtime::Engine;
use wasmtime::component::Component;

/// Arithmetic module with scalar-typed exports.
const CALC_WAT: &str = r#"
(component
  (core module $impl
    (func (export "add") (param i64 i64) (result i64)
      local.get 0
      local.get 1
      i64.add)
    (func (export "both") (param i32 i32) (result i32)
      local.get 0
      local.get 1
      i32.and)
    (func (export "noop"))
  )
  (core instance $i (instantiate $impl))
  (func (export "add") (param "a" s64) (param "b" s64) (result s64)
    (canon lift (core func $i "add")))
  (func (export "both") (param "a" bool) (param "b" bool) (result bool)
    (canon lift (core func $i "both")))
  (func (export "noop")
    (canon lift (core func $i "noop")))
)
"#;

const ANSWERS_WAT: &str = r#"
(component
  (core module $impl
    (func (export "answer") (result i64)
      i64.const 42)
  )
  (core instance $i (instantiate $impl))
  (func (export "answer") (result s64)
    (canon lift (core func $i "answer")))
)
"#;

fn answers_factory(engine: &Engine) -> anyhow::Result<Component> {
    Ok(Component::new(engine, ANSWERS_WAT)?)
}

/// A pack directory with a manifest and the calc module installed.
fn pack_dir(version: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("pack.json"),
        format!(r#"{{ "name": "testpack", "version": "{version}" }}"#),
    )
    .unwrap();
    std::fs::write(dir.path().join("calc.wat"), CALC_WAT).unwrap();
    dir
}

async fn started_host(dir: &TempDir) -> ScriptHost {
    let host = ScriptHost::new(Some(dir.path().to_path_buf())).unwrap();
    let status = host.initialize(&[]).await.unwrap();
    assert_eq!(status, InitStatus::Initialized);
    host
}

#[tokio::test]
async fn missing_home_is_reported_and_leaves_nothing_started() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("pack");

    let host = ScriptHost::new(Some(missing.clone())).unwrap();
    let err = host.initialize(&[]).await.unwrap_err();
    assert!(matches!(err, RuntimeError::HomeNotFound));
    assert!(!host.is_initialized().await);

    // Nothing was mutated, so a later attempt can succeed.
    std::fs::create_dir_all(&missing).unwrap();
    std::fs::write(missing.join("calc.wat"), CALC_WAT).unwrap();
    assert_eq!(
        host.initialize(&[]).await.unwrap(),
        InitStatus::Initialized
    );
    assert!(host.is_initialized().await);
}

#[tokio::test]
async fn second_initialize_reports_already_initialized() {
    let dir = pack_dir("1.0.3");
    let host = started_host(&dir).await;

    assert_eq!(
        host.initialize(&[]).await.unwrap(),
        InitStatus::AlreadyInitialized
    );
}

#[tokio::test]
async fn version_mismatch_leaves_runtime_started() {
    let dir = pack_dir("2.1.0");
    let host = ScriptHost::new(Some(dir.path().to_path_buf())).unwrap();

    let err = host.initialize(&[]).await.unwrap_err();
    match err {
        RuntimeError::VersionMismatch { found, .. } => assert_eq!(found, "2.1.0"),
        other => panic!("expected VersionMismatch, got {other:?}"),
    }

    // The runtime is live despite the outcome: modules load and call.
    assert!(host.is_initialized().await);
    assert_eq!(host.pack_version().await.as_deref(), Some("2.1.0"));
    host.load_module("calc").await.unwrap();
    host.load_function("calc", "add").await.unwrap();
    let result = host
        .call_function("calc", "add", &dynamic_args![1i64, 2i64])
        .await
        .unwrap();
    assert_eq!(from_dynamic::<i64>(&result.unwrap()), 3);

    assert_eq!(
        host.initialize(&[]).await.unwrap(),
        InitStatus::AlreadyInitialized
    );
}

#[tokio::test]
async fn load_module_replaces_instead_of_duplicating() {
    let dir = pack_dir("1.0.0");
    let host = started_host(&dir).await;

    host.load_module("calc").await.unwrap();
    host.load_module("calc").await.unwrap();

    assert_eq!(host.module_names().await, vec!["calc"]);
}

#[tokio::test]
async fn unknown_module_resolution_fails_cleanly() {
    let dir = pack_dir("1.0.0");
    let host = started_host(&dir).await;

    let err = host.load_module("missing").await.unwrap_err();
    assert!(matches!(err, RuntimeError::ModuleNotFound(name) if name == "missing"));
}

#[tokio::test]
async fn load_function_against_unloaded_module_is_an_error() {
    let dir = pack_dir("1.0.0");
    let host = started_host(&dir).await;
    host.load_module("calc").await.unwrap();

    let err = host.load_function("unknown", "f").await.unwrap_err();
    assert!(matches!(err, RuntimeError::ModuleNotLoaded(name) if name == "unknown"));

    // The registry is intact afterwards.
    host.load_function("calc", "add").await.unwrap();
    let result = host
        .call_function("calc", "add", &dynamic_args![20i64, 22i64])
        .await
        .unwrap();
    assert_eq!(from_dynamic::<i64>(&result.unwrap()), 42);
}

#[tokio::test]
async fn missing_export_is_function_not_found() {
    let dir = pack_dir("1.0.0");
    let host = started_host(&dir).await;
    host.load_module("calc").await.unwrap();

    let err = host.load_function("calc", "absent").await.unwrap_err();
    assert!(matches!(err, RuntimeError::FunctionNotFound { .. }));
}

#[tokio::test]
async fn calling_an_unresolved_function_is_an_error() {
    let dir = pack_dir("1.0.0");
    let host = started_host(&dir).await;
    host.load_module("calc").await.unwrap();

    let err = host.call_function("calc", "add", &[]).await.unwrap_err();
    assert!(matches!(err, RuntimeError::FunctionNotFound { .. }));
}

#[tokio::test]
async fn operations_before_initialize_are_rejected() {
    let dir = pack_dir("1.0.0");
    let host = ScriptHost::new(Some(dir.path().to_path_buf())).unwrap();

    assert!(matches!(
        host.load_module("calc").await.unwrap_err(),
        RuntimeError::NotInitialized
    ));
    assert!(matches!(
        host.call_function("calc", "add", &[]).await.unwrap_err(),
        RuntimeError::NotInitialized
    ));
}

#[tokio::test]
async fn end_to_end_scalar_invocation() {
    let dir = pack_dir("1.0.0");
    let host = started_host(&dir).await;

    host.load_module("calc").await.unwrap();
    host.load_function("calc", "add").await.unwrap();
    host.load_function("calc", "both").await.unwrap();
    assert!(host.has_function("calc", "add").await);

    let sum = host
        .call_function("calc", "add", &dynamic_args![4i64, 5i64])
        .await
        .unwrap();
    assert_eq!(from_dynamic::<i64>(&sum.unwrap()), 9);

    let both = host
        .call_function("calc", "both", &dynamic_args![true, true])
        .await
        .unwrap();
    assert!(from_dynamic::<bool>(&both.unwrap()));

    let both = host
        .call_function("calc", "both", &dynamic_args![true, false])
        .await
        .unwrap();
    assert!(!from_dynamic::<bool>(&both.unwrap()));
}

#[tokio::test]
async fn functions_without_results_return_none() {
    let dir = pack_dir("1.0.0");
    let host = started_host(&dir).await;

    host.load_module("calc").await.unwrap();
    host.load_function("calc", "noop").await.unwrap();

    let result = host.call_function("calc", "noop", &[]).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn builtins_bind_early_at_startup() {
    let dir = pack_dir("1.0.0");
    let host = ScriptHost::new(Some(dir.path().to_path_buf())).unwrap();

    let builtins: &[(&str, ModuleFactory)] = &[("answers", answers_factory)];
    assert_eq!(
        host.initialize(builtins).await.unwrap(),
        InitStatus::Initialized
    );

    assert!(host.has_module("answers").await);
    host.load_function("answers", "answer").await.unwrap();
    let result = host.call_function("answers", "answer", &[]).await.unwrap();
    assert_eq!(from_dynamic::<i64>(&result.unwrap()), 42);
}

#[tokio::test]
async fn builtins_merge_into_a_live_runtime() {
    let dir = pack_dir("1.0.0");
    let host = started_host(&dir).await;
    assert!(!host.has_module("answers").await);

    let builtins: &[(&str, ModuleFactory)] = &[("answers", answers_factory)];
    assert_eq!(
        host.initialize(builtins).await.unwrap(),
        InitStatus::AlreadyInitialized
    );

    assert!(host.has_module("answers").await);
    host.load_function("answers", "answer").await.unwrap();
    let result = host.call_function("answers", "answer", &[]).await.unwrap();
    assert_eq!(from_dynamic::<i64>(&result.unwrap()), 42);
}

#[tokio::test]
async fn modules_load_from_source_text() {
    let dir = pack_dir("1.0.0");
    let host = started_host(&dir).await;

    host.load_module_from_source("inline", ANSWERS_WAT)
        .await
        .unwrap();
    host.load_function("inline", "answer").await.unwrap();

    let result = host.call_function("inline", "answer", &[]).await.unwrap();
    assert_eq!(from_dynamic::<i64>(&result.unwrap()), 42);
}

#[tokio::test]
async fn load_installed_picks_up_every_pack_module() {
    let dir = pack_dir("1.0.0");
    std::fs::write(dir.path().join("answers.wat"), ANSWERS_WAT).unwrap();
    // A broken module file is skipped, not fatal.
    std::fs::write(dir.path().join("broken.wat"), "(component (junk))").unwrap();

    let host = started_host(&dir).await;
    let loaded = host.load_installed().await;

    assert_eq!(loaded, 2);
    assert_eq!(host.module_names().await, vec!["answers", "calc"]);
}

#[tokio::test]
async fn loads_populate_the_precompiled_cache() {
    let dir = pack_dir("1.0.0");
    let host = started_host(&dir).await;
    host.load_module("calc").await.unwrap();

    let cache_dir = dir.path().join(".cache");
    let entries: Vec<_> = std::fs::read_dir(&cache_dir).unwrap().collect();
    assert_eq!(entries.len(), 1);

    // A fresh host against the same pack goes through the cache.
    let host2 = started_host(&dir).await;
    host2.load_module("calc").await.unwrap();
    host2.load_function("calc", "add").await.unwrap();
    let result = host2
        .call_function("calc", "add", &dynamic_args![2i64, 2i64])
        .await
        .unwrap();
    assert_eq!(from_dynamic::<i64>(&result.unwrap()), 4);
}

#[tokio::test]
async fn shutdown_tears_down_exactly_once() {
    let dir = pack_dir("1.0.0");
    let host = started_host(&dir).await;
    host.load_module("calc").await.unwrap();

    assert!(host.shutdown().await);
    assert!(!host.shutdown().await);
    assert!(!host.is_initialized().await);
    assert!(matches!(
        host.load_module("calc").await.unwrap_err(),
        RuntimeError::NotInitialized
    ));
}

/// The full marshalling scenario: a nested integer matrix, a float, a
/// boolean, and a string in; a list of strings out. Needs `textutil.wasm`
/// in the pack: a component with list/string exports must be built with a
/// guest toolchain, e.g. cargo-component.
#[tokio::test]
#[ignore = "requires a prebuilt textutil.wasm component in CAPSTAN_HOME"]
async fn end_to_end_nested_sequence_marshalling() {
    let home = std::env::var_os("CAPSTAN_HOME").map(PathBuf::from);
    let host = ScriptHost::new(home).unwrap();
    host.initialize(&[]).await.unwrap();

    host.load_module("textutil").await.unwrap();
    host.load_function("textutil", "describe").await.unwrap();

    let rows = vec![vec![1i64, 2, 3], vec![1, 2, 3], vec![1, 2, 3]];
    let result = host
        .call_function(
            "textutil",
            "describe",
            &dynamic_args![rows, 3.14, true, "testing"],
        )
        .await
        .unwrap();

    let lines: Vec<String> = from_dynamic(&result.unwrap());
    assert_eq!(lines.len(), 3);
}

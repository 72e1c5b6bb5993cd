//! End-to-end scenarios through the bridge: aggregator, queue, cache,
//! diagnostics and hash gate together, with a mock daemon.

#[cfg(test)]
mod tests {
  use std::{
    collections::BTreeSet,
    sync::{Arc, atomic::Ordering},
    time::Duration,
  };

  use async_trait::async_trait;
  use ipc::Severity;
  use pretty_assertions::assert_eq;

  use crate::{
    Bridge, BridgeError, BridgeOptions, JsxTransform, ModuleNode, TransformError,
    __tests__::helpers::{Call, TestContext, diagnostic},
    config::{BridgeConfig, JsxMode},
    project::ProjectDescriptor,
  };

  fn modules(file: &str) -> Vec<ModuleNode> {
    vec![
      ModuleNode::new(file).imported_by("/app/main.js"),
      ModuleNode::new(format!("{file}?orphan")),
    ]
  }

  fn ids(modules: &[ModuleNode]) -> Vec<String> {
    modules.iter().map(|m| m.id.clone()).collect()
  }

  #[tokio::test]
  async fn test_full_recompile_populates_cache() {
    let ctx = TestContext::new();
    ctx.bridge.start_watch().await.unwrap();

    assert_eq!(
      ctx.compiler.calls(),
      vec![
        Call::ProjectChanged {
          project: ctx.path("App.fsproj")
        },
        Call::InitialCompile,
      ]
    );

    let sources = ctx.bridge.cache().source_files().await;
    assert_eq!(sources.len(), 3);
    for file in &sources {
      assert!(ctx.bridge.cache().contains(file).await, "{file} missing from cache");
    }

    let watched: BTreeSet<String> = ctx.host.watched.lock().unwrap().iter().cloned().collect();
    let mut expected = sources.clone();
    expected.insert(ctx.path("App.fsproj"));
    assert_eq!(watched, expected);

    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_blocking_error_stops_hot_update() {
    let ctx = TestContext::new();
    ctx.bridge.start_watch().await.unwrap();
    let foo = ctx.path("Foo.fs");
    ctx
      .compiler
      .script_compile(Ok(vec![diagnostic(Severity::Error, &foo, 3)]));

    let result = ctx.bridge.handle_hot_update(&foo, modules(&foo)).await;

    assert_eq!(result, Some(Vec::new()));
    assert_eq!(ctx.compiler.compile_calls(), vec![vec![foo.clone()]]);

    let errors = ctx.host.errors();
    assert_eq!(errors.len(), 1);
    let err = errors[0].error();
    assert_eq!(err.loc.file, foo);
    assert_eq!(err.loc.line, 3);
    assert!(!err.frame.is_empty());
    assert!(err.frame.contains("> 3 | let c = x"));

    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_warnings_do_not_block() {
    let ctx = TestContext::new();
    ctx.bridge.start_watch().await.unwrap();
    let a = ctx.path("A.fs");
    ctx.compiler.script_compile(Ok(vec![
      diagnostic(Severity::Warning, &a, 2),
      diagnostic(Severity::Info, &a, 1),
    ]));

    let result = ctx.bridge.handle_hot_update(&a, modules(&a)).await.unwrap();

    assert_eq!(ids(&result), vec![a.clone()]);
    assert!(ctx.host.errors().is_empty());
    assert_eq!(
      ctx.bridge.cache().lookup(&a).await,
      Some(format!("// recompiled {a}\n"))
    );

    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_daemon_failure_does_not_block() {
    let ctx = TestContext::new();
    ctx.bridge.start_watch().await.unwrap();
    let b = ctx.path("B.fs");
    ctx.compiler.script_compile(Err("daemon crashed".to_string()));

    let result = ctx.bridge.handle_hot_update(&b, modules(&b)).await.unwrap();

    assert_eq!(ids(&result), vec![b.clone()]);
    assert!(ctx.host.errors().is_empty());
    assert_eq!(ctx.compiler.compile_calls(), vec![vec![b.clone()]]);
    // The old artifact survives a failed incremental compile
    assert_eq!(ctx.bridge.cache().lookup(&b).await, Some(format!("// compiled {b}\n")));

    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_identical_bytes_compile_once() {
    let ctx = TestContext::new();
    ctx.bridge.start_watch().await.unwrap();
    let a = ctx.path("A.fs");

    ctx.bridge.handle_hot_update(&a, modules(&a)).await.unwrap();
    let second = ctx.bridge.handle_hot_update(&a, modules(&a)).await.unwrap();

    assert_eq!(ids(&second), vec![a.clone()]);
    assert_eq!(ctx.compiler.compile_calls().len(), 1);

    ctx.write("A.fs", "module A\nlet a = 42\n");
    ctx.bridge.handle_hot_update(&a, modules(&a)).await.unwrap();
    assert_eq!(ctx.compiler.compile_calls().len(), 2);

    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_full_recompile_is_atomic_for_readers() {
    let ctx = TestContext::new();
    ctx.bridge.start_watch().await.unwrap();
    let (a, b, c) = (ctx.path("A.fs"), ctx.path("B.fs"), ctx.path("C.fs"));
    assert!(ctx.bridge.cache().contains(&b).await);

    *ctx.compiler.sources.lock().unwrap() = vec![a.clone(), c.clone()];
    ctx.compiler.project_hold.arm();
    assert!(ctx.bridge.watch_change(&ctx.path("App.fsproj")).await);

    // Mid-compile: nothing stale is visible
    ctx.compiler.project_hold.entered.notified().await;
    assert_eq!(ctx.bridge.cache().lookup(&b).await, None);
    assert_eq!(ctx.bridge.cache().lookup(&a).await, None);
    assert!(!ctx.bridge.cache().has_sources().await);

    ctx.compiler.project_hold.release.notify_one();
    ctx.wait_for_calls(4).await;
    tokio::time::timeout(Duration::from_secs(5), async {
      while !ctx.bridge.cache().contains(&c).await {
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
    })
    .await
    .unwrap();

    assert_eq!(ctx.bridge.cache().lookup(&b).await, None);
    assert!(ctx.bridge.cache().contains(&a).await);
    assert_eq!(ctx.bridge.cache().source_files().await, BTreeSet::from([a, c]));

    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_compiles_never_overlap() {
    let ctx = Arc::new(TestContext::new());
    ctx.bridge.start_watch().await.unwrap();
    *ctx.compiler.compile_delay.lock().unwrap() = Duration::from_millis(100);
    let (a, b) = (ctx.path("A.fs"), ctx.path("B.fs"));

    let first = {
      let ctx = ctx.clone();
      let a = a.clone();
      tokio::spawn(async move { ctx.bridge.handle_hot_update(&a, modules(&a)).await })
    };
    // Lands in a later window, while the first compile is still running
    tokio::time::sleep(Duration::from_millis(60)).await;
    let second = {
      let ctx = ctx.clone();
      let b = b.clone();
      tokio::spawn(async move { ctx.bridge.handle_hot_update(&b, modules(&b)).await })
    };

    assert!(first.await.unwrap().is_some());
    assert!(second.await.unwrap().is_some());
    ctx.wait_for_calls(4).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(ctx.compiler.compile_calls(), vec![vec![a], vec![b]]);
    assert_eq!(ctx.compiler.max_active.load(Ordering::SeqCst), 1);

    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_burst_of_triggers_is_one_compile() {
    let ctx = Arc::new(TestContext::new());
    ctx.bridge.start_watch().await.unwrap();
    let (a, b) = (ctx.path("A.fs"), ctx.path("B.fs"));

    let (ra, rb) = tokio::join!(
      ctx.bridge.handle_hot_update(&a, modules(&a)),
      ctx.bridge.handle_hot_update(&b, modules(&b)),
    );

    assert!(ra.is_some() && rb.is_some());
    assert_eq!(ctx.compiler.compile_calls(), vec![vec![a, b]]);

    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_routing_of_unknown_files() {
    let ctx = TestContext::new();
    ctx.bridge.start_watch().await.unwrap();

    assert!(
      ctx
        .bridge
        .handle_hot_update(&ctx.path("styles.css"), modules("styles.css"))
        .await
        .is_none()
    );
    assert!(!ctx.bridge.watch_change(&ctx.path("A.fs")).await);
    assert!(ctx.compiler.compile_calls().is_empty());

    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_dependent_change_forces_full_recompile() {
    let ctx = TestContext::new();
    ctx.bridge.start_watch().await.unwrap();

    assert!(ctx.bridge.watch_change(&ctx.path("App.fsproj")).await);
    ctx.wait_for_calls(4).await;

    let calls = ctx.compiler.calls();
    assert_eq!(
      calls[2..].to_vec(),
      vec![
        Call::ProjectChanged {
          project: ctx.path("App.fsproj")
        },
        Call::InitialCompile,
      ]
    );

    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_failed_full_recompile_keeps_session_alive() {
    let ctx = TestContext::new();
    ctx.compiler.fail_project.store(true, Ordering::SeqCst);

    ctx.bridge.start_watch().await.unwrap();
    assert!(ctx.bridge.cache().is_empty().await);

    // Without sources, dependent changes are not routed
    assert!(!ctx.bridge.watch_change(&ctx.path("App.fsproj")).await);
    ctx.bridge.shutdown().await;
  }

  struct Wrap;

  #[async_trait]
  impl JsxTransform for Wrap {
    async fn transform(&self, code: String, id: &str, mode: JsxMode) -> Result<String, TransformError> {
      Ok(format!("/* {mode} {id} */\n{code}"))
    }
  }

  #[tokio::test]
  async fn test_transform_applies_jsx_pass() {
    let ctx = TestContext::new();
    ctx.bridge.start_watch().await.unwrap();
    let a = ctx.path("A.fs");

    assert_eq!(
      ctx.bridge.transform(&a).await.unwrap(),
      Some(format!("// compiled {a}\n"))
    );
    assert_eq!(ctx.bridge.transform(&ctx.path("Missing.fs")).await.unwrap(), None);
    ctx.bridge.shutdown().await;

    let mut ctx = TestContext::new();
    let options = BridgeOptions {
      project: ProjectDescriptor::new(ctx.path("App.fsproj"), ctx.path("lib")),
      debounce: Duration::from_millis(20),
      jsx: Some(JsxMode::Automatic),
      jsx_command: BridgeConfig::default().jsx_command,
    };
    ctx.bridge = Bridge::new(options, ctx.compiler.clone(), ctx.host.clone()).with_jsx_transform(Arc::new(Wrap));
    ctx.bridge.start_watch().await.unwrap();

    let a = ctx.path("A.fs");
    assert_eq!(
      ctx.bridge.transform(&a).await.unwrap(),
      Some(format!("/* automatic {a} */\n// compiled {a}\n"))
    );
    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_build_and_emit() {
    let ctx = TestContext::new();
    let warning = diagnostic(Severity::Warning, &ctx.path("A.fs"), 1);
    *ctx.compiler.project_diagnostics.lock().unwrap() = vec![warning.clone()];

    let diagnostics = ctx.bridge.build().await.unwrap();
    assert_eq!(diagnostics, vec![warning]);
    assert_eq!(ctx.bridge.cache().len().await, 3);

    let out = tempfile::tempdir().unwrap();
    let written = ctx.bridge.emit(ctx.dir.path(), out.path()).await.unwrap();
    assert_eq!(written.len(), 3);
    let code = std::fs::read_to_string(out.path().join("A.js")).unwrap();
    assert_eq!(code, format!("// compiled {}\n", ctx.path("A.fs")));

    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_build_failure_is_returned() {
    let ctx = TestContext::new();
    ctx.compiler.fail_project.store(true, Ordering::SeqCst);

    let err = ctx.bridge.build().await.unwrap_err();
    assert!(matches!(err, BridgeError::Session(_)));
    ctx.bridge.shutdown().await;
  }

  #[tokio::test]
  async fn test_shutdown_is_idempotent() {
    let ctx = TestContext::new();
    ctx.bridge.shutdown().await;
    ctx.bridge.shutdown().await;
    assert_eq!(ctx.compiler.shutdowns.load(Ordering::SeqCst), 1);
    assert!(matches!(ctx.bridge.start_watch().await, Err(BridgeError::Stopped)));

    let ctx = TestContext::new();
    ctx.bridge.start_watch().await.unwrap();
    assert!(matches!(ctx.bridge.start_watch().await, Err(BridgeError::AlreadyStarted)));
    ctx.bridge.shutdown().await;
    ctx.bridge.shutdown().await;
    assert_eq!(ctx.compiler.shutdowns.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_shutdown_releases_racing_hot_updates() {
    for i in 0..50 {
      let ctx = Arc::new(TestContext::new());
      ctx.bridge.start_watch().await.unwrap();
      let a = ctx.path("A.fs");

      let caller = {
        let ctx = ctx.clone();
        let a = a.clone();
        tokio::spawn(async move { ctx.bridge.handle_hot_update(&a, modules(&a)).await })
      };
      for _ in 0..(i % 7) {
        tokio::task::yield_now().await;
      }
      ctx.bridge.shutdown().await;

      let outcome = tokio::time::timeout(Duration::from_secs(2), caller).await;
      assert!(outcome.is_ok(), "hot update still waiting after shutdown (iteration {i})");
    }
  }

  #[tokio::test]
  async fn test_shutdown_releases_caller_waiting_on_compile() {
    let ctx = Arc::new(TestContext::new());
    ctx.bridge.start_watch().await.unwrap();
    *ctx.compiler.compile_delay.lock().unwrap() = Duration::from_millis(100);
    let a = ctx.path("A.fs");

    let caller = {
      let ctx = ctx.clone();
      let a = a.clone();
      tokio::spawn(async move { ctx.bridge.handle_hot_update(&a, modules(&a)).await })
    };
    ctx.wait_for_calls(3).await;
    ctx.bridge.shutdown().await;

    let outcome = tokio::time::timeout(Duration::from_secs(2), caller)
      .await
      .expect("hot update released by shutdown")
      .unwrap();
    if let Some(modules) = outcome {
      assert_eq!(ids(&modules), vec![a]);
    }
    assert!(ctx.host.errors().is_empty());
  }
}

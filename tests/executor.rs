mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use presto_admin::executor::{Disposition, FailurePolicy, LOCAL_ONLY};
use presto_admin::{
    exit_code, AdminError, HostResult, Registry, ResultMap, Role, Settings, Targets, Task,
    TaskValue,
};

use common::MockCluster;

fn keys(results: &ResultMap) -> Vec<&str> {
    results.keys().map(String::as_str).collect()
}

fn sorted_keys(results: &ResultMap) -> Vec<&str> {
    let mut keys = keys(results);
    keys.sort();
    keys
}

/// Succeeds everywhere except on `bad`, where it fails with `err`.
fn failing_on(name: &str, bad: &'static str, err: fn() -> AdminError) -> Task {
    Task::new(name, move |cx, _args| async move {
        cx.run("hostname").await?;
        if cx.host_key() == bad {
            return Err(err());
        }
        Ok::<_, AdminError>(TaskValue::None)
    })
}

fn boom() -> AdminError {
    AdminError::config("boom")
}

fn scratch() -> (tempfile::TempDir, Settings) {
    let dir = tempfile::tempdir().unwrap();
    let settings = common::settings(dir.path());
    (dir, settings)
}

#[tokio::test]
async fn success_maps_every_host() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let task = Task::new("echo", |cx, _args| async move {
        cx.run("echo hi").await?;
        Ok::<_, AdminError>(TaskValue::None)
    });
    let results = executor
        .execute(task, vec![], Targets::hosts(&["a", "b", "c"]))
        .await
        .unwrap();

    assert_eq!(keys(&results), vec!["a", "b", "c"]);
    assert!(results.values().all(HostResult::is_success));
    assert_eq!(exit_code(&results), 0);
    assert_eq!(cluster.commands_on("b"), vec!["echo hi"]);
}

#[tokio::test]
async fn serial_abort_stops_at_failing_host() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let abort = executor
        .execute(
            failing_on("deploy", "b", boom),
            vec![],
            Targets::hosts(&["a", "b", "c"]),
        )
        .await
        .unwrap_err();

    assert_eq!(abort.host.as_deref(), Some("b"));
    assert_eq!(keys(&abort.partial), vec!["a", "b"]);
    assert!(abort.partial["a"].is_success());
    assert!(!abort.partial["b"].is_success());
    assert!(cluster.commands_on("c").is_empty());
    assert_eq!(abort.to_string(), "[b] Configuration error: boom");
}

#[tokio::test]
async fn unreachable_host_is_fatal_by_default() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    cluster.unreachable("b");
    let executor = common::executor(settings, Registry::new(), &cluster);

    let abort = executor
        .execute(
            failing_on("noop", "none", boom),
            vec![],
            Targets::hosts(&["a", "b", "c"]),
        )
        .await
        .unwrap_err();
    assert!(matches!(*abort.error, AdminError::Network { .. }));
    assert_eq!(keys(&abort.partial), vec!["a", "b"]);
}

#[tokio::test]
async fn skip_bad_hosts_completes_every_host() {
    let (_dir, mut settings) = scratch();
    settings.skip_bad_hosts = true;
    let cluster = MockCluster::new();
    cluster.unreachable("b");
    let executor = common::executor(settings, Registry::new(), &cluster);

    let results = executor
        .execute(
            failing_on("noop", "none", boom),
            vec![],
            Targets::hosts(&["a", "b", "c"]),
        )
        .await
        .unwrap();

    assert_eq!(keys(&results), vec!["a", "b", "c"]);
    assert!(matches!(
        results["b"].error(),
        Some(AdminError::Network { .. })
    ));
    assert!(results["c"].is_success());
    assert_eq!(exit_code(&results), 1);
}

#[tokio::test]
async fn warn_only_turns_failures_into_warnings() {
    let (_dir, mut settings) = scratch();
    settings.warn_only = true;
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let results = executor
        .execute(
            failing_on("deploy", "a", boom),
            vec![],
            Targets::hosts(&["a", "b"]),
        )
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["a", "b"]);
    assert_eq!(exit_code(&results), 1);
}

#[tokio::test]
async fn explicit_abort_is_fatal_even_with_warn_only() {
    let (_dir, mut settings) = scratch();
    settings.warn_only = true;
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let abort = executor
        .execute(
            failing_on("deploy", "a", || AdminError::abort("stop here")),
            vec![],
            Targets::hosts(&["a", "b"]),
        )
        .await
        .unwrap_err();
    assert_eq!(keys(&abort.partial), vec!["a"]);
}

#[tokio::test]
async fn parallel_collects_every_host_despite_failures() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let results = executor
        .execute(
            failing_on("deploy", "b", boom).parallel(),
            vec![],
            Targets::hosts(&["a", "b", "c"]),
        )
        .await
        .unwrap();

    assert_eq!(sorted_keys(&results), vec!["a", "b", "c"]);
    assert!(!results["b"].is_success());
    assert!(results["a"].is_success() && results["c"].is_success());
    assert_eq!(exit_code(&results), 1);
}

#[tokio::test]
async fn parallel_worker_panic_is_recorded_as_terminated() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let task = Task::new("explode", |cx, _args| async move {
        if cx.host_key() == "b" {
            panic!("worker blew up");
        }
        Ok::<_, AdminError>(TaskValue::None)
    })
    .parallel();
    let results = executor
        .execute(task, vec![], Targets::hosts(&["a", "b", "c"]))
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    match &results["b"] {
        HostResult::Terminated(reason) => assert!(reason.contains("worker blew up")),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(exit_code(&results), 1);
}

#[tokio::test]
async fn parallel_argument_mismatch_is_raised_after_draining() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let mismatch = || AdminError::ArgumentMismatch {
        task: "inner".to_string(),
        expected: "1".to_string(),
        given: 0,
    };
    let abort = executor
        .execute(
            failing_on("outer", "b", mismatch).parallel(),
            vec![],
            Targets::hosts(&["a", "b", "c"]),
        )
        .await
        .unwrap_err();

    assert!(abort.is_argument_mismatch());
    assert_eq!(abort.host.as_deref(), Some("b"));
    assert_eq!(abort.partial.len(), 3);
}

#[tokio::test]
async fn nested_argument_mismatch_in_parallel_worker_is_raised() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let mut registry = Registry::new();
    registry
        .register(
            Task::new("inner", |_cx, _args| async move { Ok::<_, AdminError>(TaskValue::None) })
                .arg("name"),
        )
        .unwrap();
    let executor = common::executor(settings, registry, &cluster);

    let outer = Task::new("outer", |cx, _args| async move {
        cx.executor()
            .execute("inner", vec![], Targets::default())
            .await?;
        Ok::<_, AdminError>(TaskValue::None)
    })
    .parallel();
    let abort = executor
        .execute(outer, vec![], Targets::hosts(&["a", "b"]))
        .await
        .unwrap_err();

    assert!(abort.is_argument_mismatch());
    assert_eq!(abort.partial.len(), 2);
}

#[tokio::test]
async fn parallel_workers_get_their_own_connections() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let task = Task::new("twice", |cx, _args| async move {
        cx.run("one").await?;
        cx.run("two").await?;
        Ok::<_, AdminError>(TaskValue::None)
    })
    .parallel();
    executor
        .execute(task, vec![], Targets::hosts(&["a", "b"]))
        .await
        .unwrap();

    let mut connects = cluster.connects();
    connects.sort();
    assert_eq!(connects, vec!["a", "b"]);
    let mut closes = cluster.closes();
    closes.sort();
    assert_eq!(closes, vec!["a", "b"]);
}

#[tokio::test]
async fn pool_size_bounds_concurrency() {
    let (_dir, mut settings) = scratch();
    settings.pool_size = Some(2);
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let task = {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        Task::new("slow", move |_cx, _args| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, AdminError>(TaskValue::None)
            }
        })
        .parallel()
    };
    let results = executor
        .execute(task, vec![], Targets::hosts(&["master", "a", "b", "c"]))
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn job_timeout_marks_slow_host_failed() {
    let (_dir, mut settings) = scratch();
    settings.job_timeout = Some(Duration::from_millis(50));
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let task = Task::new("hang", |cx, _args| async move {
        if cx.host_key() == "b" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok::<_, AdminError>(TaskValue::None)
    })
    .parallel();
    let results = executor
        .execute(task, vec![], Targets::hosts(&["a", "b"]))
        .await
        .unwrap();

    assert!(matches!(
        results["b"].error(),
        Some(AdminError::JobTimedOut { .. })
    ));
    assert!(results["a"].is_success());
}

#[tokio::test]
async fn serial_flag_overrides_parallel_task() {
    let (_dir, mut settings) = scratch();
    settings.parallel = false;
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let abort = executor
        .execute(
            failing_on("deploy", "a", boom).parallel(),
            vec![],
            Targets::hosts(&["a", "b"]),
        )
        .await
        .unwrap_err();
    assert_eq!(keys(&abort.partial), vec!["a"]);
}

#[tokio::test]
async fn eagerly_disconnect_closes_after_each_host() {
    let (_dir, mut settings) = scratch();
    settings.eagerly_disconnect = true;
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let task = Task::new("uptime", |cx, _args| async move {
        cx.run("uptime").await?;
        Ok::<_, AdminError>(TaskValue::None)
    });
    executor
        .execute(task, vec![], Targets::hosts(&["a", "b"]))
        .await
        .unwrap();
    assert_eq!(cluster.closes(), vec!["a", "b"]);
}

#[tokio::test]
async fn roles_and_excludes_pick_hosts() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let results = executor
        .execute(
            failing_on("noop", "none", boom),
            vec![],
            Targets::roles(&[Role::Worker]).exclude(&["b"]),
        )
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["a", "c"]);
}

#[tokio::test]
async fn default_roles_apply_without_targets() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let task = failing_on("noop", "none", boom).roles(&[Role::Coordinator, Role::Worker]);
    let results = executor
        .execute(task, vec![], Targets::default().exclude(&["c"]))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["master", "a", "b"]);
}

#[tokio::test]
async fn hosts_and_roles_union_without_duplicates() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let targets = Targets {
        hosts: Some(vec!["b".to_string(), "master".to_string()]),
        roles: Some(vec![Role::Worker]),
        exclude_hosts: vec![],
    };
    let results = executor
        .execute(failing_on("noop", "none", boom), vec![], targets)
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["b", "master", "a", "c"]);
}

#[tokio::test]
async fn local_task_runs_once_without_host() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor = common::executor(settings, Registry::new(), &cluster);

    let task = Task::new("local", |cx, _args| async move {
        assert!(cx.host().is_err());
        Ok::<_, AdminError>(TaskValue::Text("done".to_string()))
    })
    .local();
    let results = executor
        .execute(task, vec![], Targets::hosts(&["a", "b"]))
        .await
        .unwrap();

    assert_eq!(keys(&results), vec![LOCAL_ONLY]);
    assert!(cluster.connects().is_empty());
    assert_eq!(exit_code(&results), 0);
}

#[tokio::test]
async fn nested_execute_feeds_the_exit_code() {
    let (_dir, mut settings) = scratch();
    settings.warn_only = true;
    let cluster = MockCluster::new();
    let mut registry = Registry::new();
    registry
        .register(failing_on("inner step", "b", boom).roles(&[Role::Worker]))
        .unwrap();
    let executor = common::executor(settings, registry, &cluster);

    let outer = Task::new("outer", |cx, _args| async move {
        let nested = cx
            .executor()
            .execute("inner.step", vec![], cx.targets().clone())
            .await?;
        Ok::<_, AdminError>(TaskValue::Nested(nested))
    })
    .local();
    let results = executor
        .execute(outer, vec![], Targets::default())
        .await
        .unwrap();

    match &results[LOCAL_ONLY] {
        HostResult::Success(TaskValue::Nested(inner)) => {
            assert_eq!(keys(inner), vec!["a", "b", "c"]);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(exit_code(&results), 1);
}

#[tokio::test]
async fn unknown_task_aborts_or_is_skipped() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor = common::executor(settings.clone(), Registry::new(), &cluster);
    let abort = executor
        .execute("nope", vec![], Targets::default())
        .await
        .unwrap_err();
    assert!(matches!(*abort.error, AdminError::UnknownTask(_)));

    let mut settings = settings;
    settings.skip_unknown_tasks = true;
    let executor = common::executor(settings, Registry::new(), &cluster);
    let results = executor
        .execute("nope", vec![], Targets::default())
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn wrong_arity_is_an_argument_mismatch() {
    let (_dir, settings) = scratch();
    let cluster = MockCluster::new();
    let executor =
        common::executor(settings, presto_admin::commands::registry().unwrap(), &cluster);

    let abort = executor
        .execute("catalog remove", vec![], Targets::default())
        .await
        .unwrap_err();
    assert!(abort.is_argument_mismatch());
    assert!(cluster.connects().is_empty());
}

#[test]
fn registry_resolves_command_paths() {
    let registry = presto_admin::commands::registry().unwrap();
    let words = |s: &str| s.split(' ').map(String::from).collect::<Vec<_>>();

    let start = words("server start");
    let (task, rest) = registry.resolve_command(&start).unwrap();
    assert_eq!(task.name(), "server start");
    assert!(rest.is_empty());

    let copy = words("file copy foo.txt /opt");
    let (task, rest) = registry.resolve_command(&copy).unwrap();
    assert_eq!(task.name(), "file copy");
    assert_eq!(rest, ["foo.txt", "/opt"]);

    assert!(registry.resolve_command(&words("server bogus")).is_none());
    assert!(registry.resolve_command(&words("server")).is_none());
    assert!(registry.resolve("server.start").is_some());
}

#[test]
fn failure_policy_table() {
    use presto_admin::executor::Classification::*;
    let default = FailurePolicy::default();
    assert_eq!(default.dispose(NetworkUnreachable), Disposition::Abort);
    assert_eq!(default.dispose(OtherException), Disposition::Abort);
    assert_eq!(default.dispose(ArgumentMismatch), Disposition::Raise);

    let skip = FailurePolicy {
        skip_bad_hosts: true,
        warn_only: false,
    };
    assert_eq!(skip.dispose(NetworkUnreachable), Disposition::Warn);
    assert_eq!(skip.dispose(OtherException), Disposition::Abort);

    let warn = FailurePolicy {
        skip_bad_hosts: false,
        warn_only: true,
    };
    assert_eq!(warn.dispose(OtherException), Disposition::Warn);
    assert_eq!(warn.dispose(ExplicitAbort), Disposition::Abort);
}

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Notify;

use super::common::*;
use crate::workflows::screening::context::{ContextError, ContextStore};
use crate::workflows::screening::domain::{ScreeningId, ScreeningStatus};
use crate::workflows::screening::orchestrator::{
    FailurePolicy, Orchestrator, OrchestratorConfig, OrchestratorError,
};
use crate::workflows::screening::payload::StagePayload;
use crate::workflows::screening::plan::GraphError;
use crate::workflows::screening::stage::{FailureKind, StageDefinition, StageResult, StageStatus};

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        stage_timeout: Duration::from_secs(5),
        screening_timeout: None,
        failure_policy: FailurePolicy::BestEffort,
        terminal_stage: Some("c".to_string()),
    }
}

fn abc(b: StageDefinition) -> Vec<StageDefinition> {
    vec![
        StageDefinition::new("a", &[], EchoStage("a")),
        b,
        StageDefinition::new("c", &["a", "b"], EchoStage("c")),
    ]
}

fn seen_by(payload: Option<&StagePayload>) -> Vec<(String, String)> {
    match payload {
        Some(StagePayload::Custom(value)) => value["seen"]
            .as_array()
            .expect("seen list")
            .iter()
            .map(|entry| {
                (
                    entry["stage"].as_str().unwrap_or_default().to_string(),
                    entry["status"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
        other => panic!("expected custom payload, got {other:?}"),
    }
}

#[tokio::test]
async fn dependents_receive_every_upstream_result() {
    let orchestrator = Orchestrator::new(
        abc(StageDefinition::new("b", &[], EchoStage("b"))),
        config(),
    )
    .expect("orchestrator builds");

    let report = orchestrator.run(submission()).await.expect("screening runs");

    assert_eq!(report.status, ScreeningStatus::Completed);
    assert_eq!(report.stage_results.len(), 3);
    assert!(report
        .stage_results
        .iter()
        .all(|result| result.status() == StageStatus::Success));
    assert!(report.failed_stages.is_empty());
    assert_eq!(
        seen_by(report.final_decision.as_ref()),
        vec![
            ("a".to_string(), "success".to_string()),
            ("b".to_string(), "success".to_string())
        ]
    );
}

#[tokio::test]
async fn failed_sibling_is_recorded_and_dependents_still_run() {
    let orchestrator = Orchestrator::new(abc(StageDefinition::new("b", &[], FailingStage)), config())
        .expect("orchestrator builds");

    let report = orchestrator.run(submission()).await.expect("screening runs");

    assert_eq!(report.status, ScreeningStatus::Completed);
    assert_eq!(report.failed_stages, vec!["b"]);
    assert!(report.result("a").expect("a recorded").is_success());
    let b = report.result("b").expect("b recorded");
    let failure = b.failure_detail().expect("b failed");
    assert_eq!(failure.kind, FailureKind::Failed);
    assert!(failure.message.contains("503"));
    assert_eq!(
        seen_by(report.final_decision.as_ref()),
        vec![
            ("a".to_string(), "success".to_string()),
            ("b".to_string(), "error".to_string())
        ]
    );
}

#[tokio::test]
async fn panicking_stage_is_contained() {
    let orchestrator = Orchestrator::new(
        abc(StageDefinition::new("b", &[], PanickingStage)),
        config(),
    )
    .expect("orchestrator builds");

    let report = orchestrator.run(submission()).await.expect("screening runs");

    let b = report.result("b").expect("b recorded");
    let failure = b.failure_detail().expect("b failed");
    assert_eq!(failure.kind, FailureKind::Panicked);
    assert!(failure.message.contains("stage exploded"));
    assert!(report.result("a").expect("a recorded").is_success());
    assert!(report.result("c").expect("c recorded").is_success());
}

#[tokio::test]
async fn fail_fast_skips_later_waves() {
    let orchestrator = Orchestrator::new(
        abc(StageDefinition::new("b", &[], FailingStage)),
        config().with_failure_policy(FailurePolicy::FailFast),
    )
    .expect("orchestrator builds");

    let report = orchestrator.run(submission()).await.expect("screening runs");

    assert_eq!(report.status, ScreeningStatus::Failed);
    assert_eq!(report.stage_results.len(), 3);
    assert!(report.result("a").expect("a recorded").is_success());
    let c = report.result("c").expect("c recorded");
    assert_eq!(
        c.failure_detail().map(|failure| failure.kind),
        Some(FailureKind::Skipped)
    );
    assert_eq!(report.failed_stages, vec!["b", "c"]);
    assert!(report.final_decision.is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_stage_times_out_without_blocking_siblings() {
    let mut config = config();
    config.stage_timeout = Duration::from_secs(1);
    let orchestrator = Orchestrator::new(
        abc(StageDefinition::new(
            "b",
            &[],
            SleepyStage("b", Duration::from_secs(60)),
        )),
        config,
    )
    .expect("orchestrator builds");

    let report = orchestrator.run(submission()).await.expect("screening runs");

    assert_eq!(report.status, ScreeningStatus::Completed);
    let b = report.result("b").expect("b recorded");
    assert_eq!(
        b.failure_detail().map(|failure| failure.kind),
        Some(FailureKind::TimedOut)
    );
    assert!(report.result("a").expect("a recorded").is_success());
    assert!(report.result("c").expect("c recorded").is_success());
}

#[tokio::test(start_paused = true)]
async fn screening_deadline_skips_waves_not_yet_started() {
    let mut config = config();
    config.stage_timeout = Duration::from_secs(10);
    config.screening_timeout = Some(Duration::from_secs(3));
    let orchestrator = Orchestrator::new(
        abc(StageDefinition::new(
            "b",
            &[],
            SleepyStage("b", Duration::from_secs(5)),
        )),
        config,
    )
    .expect("orchestrator builds");

    let report = orchestrator.run(submission()).await.expect("screening runs");

    assert_eq!(report.status, ScreeningStatus::Failed);
    assert_eq!(
        report
            .result("b")
            .and_then(|result| result.failure_detail())
            .map(|failure| failure.kind),
        Some(FailureKind::TimedOut)
    );
    assert_eq!(
        report
            .result("c")
            .and_then(|result| result.failure_detail())
            .map(|failure| failure.kind),
        Some(FailureKind::Skipped)
    );
}

#[tokio::test(start_paused = true)]
async fn report_follows_plan_order_not_completion_order() {
    let orchestrator = Orchestrator::new(
        vec![
            StageDefinition::new("slow", &[], SleepyStage("slow", Duration::from_secs(2))),
            StageDefinition::new("fast", &[], EchoStage("fast")),
            StageDefinition::new("join", &["slow", "fast"], EchoStage("join")),
        ],
        config().with_terminal_stage("join"),
    )
    .expect("orchestrator builds");

    let id = orchestrator
        .run(submission())
        .await
        .expect("screening runs")
        .screening_id;

    let completion_order: Vec<String> = orchestrator
        .store()
        .get_all(&id)
        .expect("results")
        .into_iter()
        .map(|result| result.stage)
        .collect();
    assert_eq!(completion_order, vec!["fast", "slow", "join"]);

    let report = orchestrator.assemble(&id).expect("assembles");
    let plan_order: Vec<&str> = report
        .stage_results
        .iter()
        .map(|result| result.stage.as_str())
        .collect();
    assert_eq!(plan_order, vec!["slow", "fast", "join"]);
}

#[tokio::test(start_paused = true)]
async fn wave_results_do_not_depend_on_sibling_timing() {
    async fn run_with(delay_a: u64, delay_b: u64) -> BTreeMap<String, Value> {
        let orchestrator = Orchestrator::new(
            vec![
                StageDefinition::new("a", &[], SleepyStage("a", Duration::from_millis(delay_a))),
                StageDefinition::new("b", &[], SleepyStage("b", Duration::from_millis(delay_b))),
                StageDefinition::new("c", &["a", "b"], EchoStage("c")),
            ],
            config(),
        )
        .expect("orchestrator builds");

        let report = orchestrator.run(submission()).await.expect("screening runs");
        report
            .stage_results
            .into_iter()
            .map(|result| {
                let payload = match result.payload() {
                    Some(StagePayload::Custom(value)) => value.clone(),
                    other => panic!("unexpected payload {other:?}"),
                };
                (result.stage, payload)
            })
            .collect()
    }

    let a_first = run_with(10, 500).await;
    let b_first = run_with(500, 10).await;

    assert_eq!(a_first, b_first);
    assert_eq!(a_first["a"], json!({ "stage": "a" }));
}

#[tokio::test]
async fn terminal_stage_error_leaves_final_decision_empty() {
    let orchestrator = Orchestrator::new(
        vec![
            StageDefinition::new("a", &[], EchoStage("a")),
            StageDefinition::new("c", &["a"], FailingStage),
        ],
        config(),
    )
    .expect("orchestrator builds");

    let report = orchestrator.run(submission()).await.expect("screening runs");

    assert_eq!(report.status, ScreeningStatus::Completed);
    assert!(report.final_decision.is_none());
    assert_eq!(report.failed_stages, vec!["c"]);
}

#[tokio::test]
async fn status_of_unknown_screening_is_not_found() {
    let orchestrator = Orchestrator::new(
        abc(StageDefinition::new("b", &[], EchoStage("b"))),
        config(),
    )
    .expect("orchestrator builds");
    let unknown = ScreeningId("SCR-20250101-00000000".to_string());

    let err = orchestrator.status(&unknown).expect_err("unknown screening");

    assert!(err.is_not_found());
    assert!(matches!(
        err,
        OrchestratorError::Context(ContextError::ScreeningNotFound(ref id)) if *id == unknown
    ));
}

#[tokio::test]
async fn spawned_screenings_can_be_awaited() {
    let orchestrator = Arc::new(
        Orchestrator::new(abc(StageDefinition::new("b", &[], EchoStage("b"))), config())
            .expect("orchestrator builds"),
    );

    let id = orchestrator.start(submission()).expect("screening starts");
    let progress = orchestrator.status(&id).expect("progress available");
    assert_eq!(progress.stages_total, 3);
    assert_eq!(progress.stages_completed, 0);

    let report = orchestrator.wait(&id).await.expect("screening finishes");
    assert_eq!(report.screening_id, id);
    assert_eq!(report.status, ScreeningStatus::Completed);

    let progress = orchestrator.status(&id).expect("progress available");
    assert_eq!(progress.status, ScreeningStatus::Completed);
    assert_eq!(progress.stages_completed, 3);
    assert!(orchestrator.active_screenings().is_empty());

    let again = orchestrator.wait(&id).await.expect("report re-assembles");
    assert_eq!(again.stage_results, report.stage_results);
}

#[tokio::test(start_paused = true)]
async fn status_reports_progress_while_a_stage_is_held() {
    let gate = Arc::new(Notify::new());
    let orchestrator = Arc::new(
        Orchestrator::new(
            abc(StageDefinition::new("b", &[], GatedStage(Arc::clone(&gate)))),
            config(),
        )
        .expect("orchestrator builds"),
    );

    let id = orchestrator.start(submission()).expect("screening starts");
    let mut progress = orchestrator.status(&id).expect("progress available");
    for _ in 0..100 {
        if progress.stages_completed > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        progress = orchestrator.status(&id).expect("progress available");
    }

    assert_eq!(progress.status, ScreeningStatus::Running);
    assert_eq!(progress.stages_completed, 1);
    assert_eq!(progress.stages_total, 3);
    assert!(progress.fraction_complete() > 0.0 && progress.fraction_complete() < 1.0);
    assert_eq!(orchestrator.active_screenings(), vec![id.clone()]);

    gate.notify_one();
    let report = orchestrator.wait(&id).await.expect("screening finishes");

    assert_eq!(report.status, ScreeningStatus::Completed);
    let progress = orchestrator.status(&id).expect("progress available");
    assert_eq!(progress.stages_completed, 3);
    assert!(orchestrator.active_screenings().is_empty());
}

#[tokio::test(start_paused = true)]
async fn a_store_error_mid_run_leaves_the_screening_failed() {
    let store = Arc::new(ContextStore::new());
    let orchestrator = Arc::new(
        Orchestrator::with_store(
            abc(StageDefinition::new(
                "b",
                &[],
                SleepyStage("b", Duration::from_millis(200)),
            )),
            config(),
            Arc::clone(&store),
        )
        .expect("orchestrator builds"),
    );

    let id = orchestrator.start(submission()).expect("screening starts");
    tokio::time::sleep(Duration::from_millis(50)).await;
    store
        .write_result(
            &id,
            StageResult::success("b", StagePayload::Custom(json!({})), Duration::ZERO),
        )
        .expect("out-of-band write lands first");

    let err = orchestrator.wait(&id).await.expect_err("duplicate write stops the run");

    assert!(matches!(
        err,
        OrchestratorError::Context(ContextError::DuplicateWrite { ref stage, .. }) if stage == "b"
    ));
    let snapshot = store.snapshot(&id).expect("context kept for inspection");
    assert_eq!(snapshot.status, ScreeningStatus::Failed);
    let report = orchestrator.assemble(&id).expect("failed screening assembles");
    assert_eq!(report.failed_stages, vec!["c".to_string()]);
    assert!(orchestrator.active_screenings().is_empty());
}

#[tokio::test]
async fn release_evicts_the_context() {
    let orchestrator = Orchestrator::new(
        abc(StageDefinition::new("b", &[], EchoStage("b"))),
        config(),
    )
    .expect("orchestrator builds");
    let report = orchestrator.run(submission()).await.expect("screening runs");

    let released = orchestrator
        .release(&report.screening_id)
        .expect("release succeeds");

    assert_eq!(released.stage_results, report.stage_results);
    assert!(orchestrator.store().is_empty());
    assert!(orchestrator
        .status(&report.screening_id)
        .expect_err("evicted")
        .is_not_found());
}

#[tokio::test]
async fn assembling_an_unfinished_screening_is_rejected() {
    let store = Arc::new(ContextStore::new());
    let orchestrator = Orchestrator::with_store(
        abc(StageDefinition::new("b", &[], EchoStage("b"))),
        config(),
        Arc::clone(&store),
    )
    .expect("orchestrator builds");
    let id = ScreeningId("SCR-20250101-0000ABCD".to_string());
    store.create(id.clone(), submission()).expect("context created");

    let err = orchestrator.assemble(&id).expect_err("not finished");

    assert!(matches!(err, OrchestratorError::NotFinished(ref pending) if *pending == id));
}

#[tokio::test]
async fn shutdown_cancels_in_flight_screenings() {
    let orchestrator = Arc::new(
        Orchestrator::new(
            abc(StageDefinition::new(
                "b",
                &[],
                SleepyStage("b", Duration::from_secs(3600)),
            )),
            config(),
        )
        .expect("orchestrator builds"),
    );

    let id = orchestrator.start(submission()).expect("screening starts");
    let cancelled = orchestrator.shutdown();

    assert_eq!(cancelled, 1);
    let report = orchestrator.assemble(&id).expect("cancelled screening assembles");
    assert_eq!(report.status, ScreeningStatus::Failed);
    assert_eq!(report.stage_results.len(), 3);
    assert!(report
        .stage_results
        .iter()
        .all(|result| result.failure_detail().map(|failure| failure.kind)
            == Some(FailureKind::Skipped)));
}

#[test]
fn cyclic_definitions_fail_at_construction() {
    let err = Orchestrator::new(
        vec![
            StageDefinition::new("a", &["b"], EchoStage("a")),
            StageDefinition::new("b", &["a"], EchoStage("b")),
        ],
        OrchestratorConfig::default(),
    )
    .err()
    .expect("cycle rejected");

    assert!(matches!(
        err,
        OrchestratorError::Graph(GraphError::CyclicDependency { .. })
    ));
}

#[test]
fn unknown_terminal_stage_is_rejected() {
    let err = Orchestrator::new(
        vec![StageDefinition::new("a", &[], EchoStage("a"))],
        OrchestratorConfig::default().with_terminal_stage("decision"),
    )
    .err()
    .expect("terminal stage rejected");

    assert!(matches!(err, OrchestratorError::UnknownTerminalStage(ref name) if name == "decision"));
}

#[test]
fn failure_policy_parses_common_spellings() {
    assert_eq!(FailurePolicy::parse("fail-fast"), Some(FailurePolicy::FailFast));
    assert_eq!(FailurePolicy::parse(" BEST_EFFORT "), Some(FailurePolicy::BestEffort));
    assert_eq!(FailurePolicy::parse("retry"), None);
    assert_eq!(FailurePolicy::default(), FailurePolicy::BestEffort);
}

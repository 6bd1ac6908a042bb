//! End-to-end orchestration against the spy runtime

use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};

use podlayer::config::params::Params;
use podlayer::errors::{OrchestratorError, UnitError};
use podlayer::models::outcome::DeploymentOutcome;
use podlayer::runtime::StartMode;

use crate::common::{
    application, orchestrator, rag_application, unit, Behavior, Call, CountingRenderer, Health,
    SpyRuntime,
};

#[tokio::test(start_paused = true)]
async fn test_rag_deploys_with_two_accelerators() {
    let runtime = Arc::new(SpyRuntime::new());
    let renderer = Arc::new(CountingRenderer::new());
    let orchestrator = orchestrator(
        runtime.clone(),
        renderer.clone(),
        &["0000:01:00.0", "0000:02:00.0"],
    );

    let report = assert_ok!(orchestrator.orchestrate(&rag_application(), &Params::new()).await);

    assert!(!report.all_present);
    assert_eq!(report.application, "rag-dev");
    assert_eq!(report.layers.len(), 2);
    assert_eq!(report.deployed(), 3);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.outcome("api"), Some(&DeploymentOutcome::Deployed));

    // vector-db goes first, alone
    assert_eq!(runtime.submitted_units()[0], "vector-db");

    // Both identifiers are bound to the api container
    let api = runtime.submission("api").unwrap();
    assert!(api.body.contains("devices: \"0000:01:00.0 0000:02:00.0\""));
}

#[tokio::test(start_paused = true)]
async fn test_rag_with_one_accelerator_fails_before_submitting() {
    let runtime = Arc::new(SpyRuntime::new());
    let renderer = Arc::new(CountingRenderer::new());
    let orchestrator = orchestrator(runtime.clone(), renderer.clone(), &["0000:01:00.0"]);

    let err = assert_err!(orchestrator.orchestrate(&rag_application(), &Params::new()).await);

    assert!(matches!(
        err,
        OrchestratorError::InsufficientResources {
            required: 2,
            available: 1
        }
    ));
    assert!(runtime.submitted_units().is_empty());
    assert!(renderer.rendered().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_plan_mismatch_is_rejected_before_any_runtime_call() {
    let runtime = Arc::new(SpyRuntime::new());
    let app = application(
        &[&["vector-db"], &["api"]],
        vec![unit("vector-db", &["db"]), unit("api", &["server"]), unit("ui", &["web"])],
    );

    let err = orchestrator(runtime.clone(), Arc::new(CountingRenderer::new()), &[])
        .orchestrate(&app, &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Configuration(ref m) if m.contains("ui")));
    assert!(runtime.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_present_unit_is_skipped_without_render_or_submit() {
    let runtime = Arc::new(SpyRuntime::new().with_present(["vector-db", "unrelated"]));
    let renderer = Arc::new(CountingRenderer::new());
    let orchestrator = orchestrator(
        runtime.clone(),
        renderer.clone(),
        &["0000:01:00.0", "0000:02:00.0"],
    );

    let report = orchestrator
        .orchestrate(&rag_application(), &Params::new())
        .await
        .unwrap();

    assert_eq!(report.outcome("vector-db"), Some(&DeploymentOutcome::Skipped));
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.deployed(), 2);
    assert!(!renderer.rendered().contains(&"vector-db".to_string()));
    assert_eq!(runtime.position(&Call::Submit("vector-db".to_string())), None);
    assert_eq!(
        runtime.calls()[0],
        Call::ListByLabel("ai-services.io/application=rag-dev".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_present_units_do_not_count_towards_demand() {
    // api already runs, so its two accelerators are not needed again
    let runtime = Arc::new(SpyRuntime::new().with_present(["api"]));
    let orchestrator = orchestrator(runtime.clone(), Arc::new(CountingRenderer::new()), &[]);

    let report = orchestrator
        .orchestrate(&rag_application(), &Params::new())
        .await
        .unwrap();

    assert_eq!(report.outcome("api"), Some(&DeploymentOutcome::Skipped));
    assert_eq!(runtime.submitted_units().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_all_present_skips_the_scheduler() {
    let runtime = Arc::new(SpyRuntime::new().with_present(["vector-db", "api", "ui"]));
    let renderer = Arc::new(CountingRenderer::new());
    let orchestrator = orchestrator(runtime.clone(), renderer.clone(), &[]);

    let report = orchestrator
        .orchestrate(&rag_application(), &Params::new())
        .await
        .unwrap();

    assert!(report.all_present);
    assert!(report.layers.is_empty());
    assert_eq!(runtime.calls().len(), 1);
    assert!(renderer.rendered().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ports_and_start_mode_reach_the_runtime() {
    let runtime = Arc::new(SpyRuntime::new());
    let app = application(
        &[&["ui", "batch"]],
        vec![
            unit("ui", &["web", "proxy"])
                .with_annotation("ai-services.io/web--port-UI_PORT", "3000")
                .with_annotation("ai-services.io/proxy--port-METRICS_PORT", "9100"),
            unit("batch", &["job"]).with_annotation("ai-services.io/start", "off"),
        ],
    );
    let params = Params::parse(["UI_PORT=8000,METRICS_PORT=0"]).unwrap();

    orchestrator(runtime.clone(), Arc::new(CountingRenderer::new()), &[])
        .orchestrate(&app, &params)
        .await
        .unwrap();

    let ui = runtime.submission("ui").unwrap();
    assert_eq!(ui.options.publish, vec!["8000:3000"]);
    assert_eq!(ui.options.start, None);

    let batch = runtime.submission("batch").unwrap();
    assert!(batch.options.publish.is_empty());
    assert_eq!(batch.options.start, Some(StartMode::Off));
}

#[tokio::test(start_paused = true)]
async fn test_params_override_template_values() {
    let runtime = Arc::new(SpyRuntime::new());
    let mut app = application(
        &[&["ui"]],
        vec![podlayer::models::unit::WorkloadUnit::new(
            "ui",
            "model: {{values.MODEL}}\nport: {{values.UI_PORT}}\n",
        )
        .with_containers(["web"])],
    );
    app.values.insert("MODEL".to_string(), "granite".to_string());
    app.values.insert("UI_PORT".to_string(), "3000".to_string());

    orchestrator(runtime.clone(), Arc::new(CountingRenderer::new()), &[])
        .orchestrate(&app, &Params::parse(["UI_PORT=8000"]).unwrap())
        .await
        .unwrap();

    assert_eq!(
        runtime.submission("ui").unwrap().body,
        "model: granite\nport: 8000\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_resource_annotation_is_a_configuration_error() {
    let runtime = Arc::new(SpyRuntime::new());
    let app = application(
        &[&["api"]],
        vec![unit("api", &["server"]).with_annotation("ai-services.io/server--accelerators", "lots")],
    );

    let err = orchestrator(runtime.clone(), Arc::new(CountingRenderer::new()), &["a"])
        .orchestrate(&app, &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Configuration(ref m) if m.contains("api")));
    assert!(runtime.submitted_units().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_report_serializes_outcomes() {
    let runtime = Arc::new(SpyRuntime::new());
    let report = orchestrator(
        runtime,
        Arc::new(CountingRenderer::new()),
        &["0000:01:00.0", "0000:02:00.0"],
    )
    .orchestrate(&rag_application(), &Params::new())
    .await
    .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["application"], "rag-dev");
    assert_eq!(json["layers"][1]["outcomes"]["ui"]["status"], "deployed");
    assert!(uuid::Uuid::parse_str(&report.attempt_id).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_prefixed_pod_name_counts_as_present() {
    let runtime = Arc::new(SpyRuntime::new().with_present(["rag-dev--ui", "other-app--api"]));
    let report = orchestrator(
        runtime.clone(),
        Arc::new(CountingRenderer::new()),
        &["0000:01:00.0", "0000:02:00.0"],
    )
    .orchestrate(&rag_application(), &Params::new())
    .await
    .unwrap();

    assert_eq!(report.outcome("ui"), Some(&DeploymentOutcome::Skipped));
    assert_eq!(report.outcome("api"), Some(&DeploymentOutcome::Deployed));
}

#[tokio::test(start_paused = true)]
async fn test_every_pod_of_a_unit_is_awaited() {
    let runtime = Arc::new(SpyRuntime::new().with_behavior(
        "vector-db",
        Behavior {
            health: Health::HealthyAfter(1),
            ..Default::default()
        },
    ));
    let vector_db = podlayer::models::unit::WorkloadUnit::new(
        "vector-db",
        "kind: Pod\nname: {{AppName}}--milvus\n---\nkind: Pod\nname: {{AppName}}--etcd\n",
    )
    .with_pod("{{AppName}}--milvus", ["milvus"])
    .with_pod("{{AppName}}--etcd", ["etcd", "backup"]);
    let app = application(
        &[&["vector-db"], &["api"]],
        vec![vector_db, unit("api", &["server"])],
    );

    let report = orchestrator(runtime.clone(), Arc::new(CountingRenderer::new()), &[])
        .orchestrate(&app, &Params::new())
        .await
        .unwrap();

    assert_eq!(report.outcome("vector-db"), Some(&DeploymentOutcome::Deployed));
    assert!(runtime
        .position(&Call::InspectPod("rag-dev--milvus".to_string()))
        .is_some());
    let etcd_pod = runtime
        .position(&Call::InspectPod("rag-dev--etcd".to_string()))
        .unwrap();

    // Both containers of the second pod were checked until healthy
    assert_eq!(runtime.health_inspections("vector-db:etcd"), 2);
    assert_eq!(runtime.health_inspections("vector-db:backup"), 2);

    let api_submit = runtime.position(&Call::Submit("api".to_string())).unwrap();
    assert!(etcd_pod < api_submit);
    assert!(runtime.last_position_for("vector-db").unwrap() < api_submit);
}

#[tokio::test(start_paused = true)]
async fn test_undeclared_pod_fails_the_unit() {
    let runtime = Arc::new(SpyRuntime::new().with_behavior(
        "db",
        Behavior {
            extra_pods: vec!["rag-dev--stray".to_string()],
            ..Default::default()
        },
    ));
    let app = application(&[&["db"]], vec![unit("db", &["main"])]);

    let err = orchestrator(runtime.clone(), Arc::new(CountingRenderer::new()), &[])
        .orchestrate(&app, &Params::new())
        .await
        .unwrap_err();

    let failure = match err {
        OrchestratorError::LayerFailed(failure) => failure,
        other => panic!("expected a layer failure, got {other}"),
    };
    assert!(matches!(
        failure.failures[0].source,
        UnitError::UnknownPod(ref name) if name == "rag-dev--stray"
    ));
    // The declared pod was still awaited
    assert!(runtime.position(&Call::InspectPod("db".to_string())).is_some());
}

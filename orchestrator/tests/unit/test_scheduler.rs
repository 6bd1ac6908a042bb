//! Layer scheduling: barriers, fail-slow layers, fail-stop runs

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use podlayer::app::options::OrchestratorOptions;
use podlayer::config::params::Params;
use podlayer::deploy::annotations::AnnotationScheme;
use podlayer::deploy::{DeployContext, LayerScheduler, UnitDeployer};
use podlayer::errors::{OrchestratorError, UnitError};
use podlayer::models::outcome::DeploymentOutcome;
use podlayer::models::plan::ExecutionPlan;
use podlayer::resources::pool::ResourcePool;

use crate::common::{
    application, orchestrator, orchestrator_with, unit, Behavior, Call, CountingRenderer, Health,
    SpyRuntime,
};

fn failing_submit(message: &str) -> Behavior {
    Behavior {
        submit_error: Some(message.to_string()),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_layer_stops_later_layers() {
    let runtime = Arc::new(
        SpyRuntime::new().with_behavior("vector-db", failing_submit("image not found")),
    );
    let renderer = Arc::new(CountingRenderer::new());
    let app = application(
        &[&["vector-db", "cache"], &["api"]],
        vec![
            unit("vector-db", &["db"]),
            unit("cache", &["redis"]),
            unit("api", &["server"]),
        ],
    );

    let err = orchestrator(runtime.clone(), renderer.clone(), &[])
        .orchestrate(&app, &Params::new())
        .await
        .unwrap_err();

    let failure = match err {
        OrchestratorError::LayerFailed(failure) => failure,
        other => panic!("expected a layer failure, got {other}"),
    };
    assert_eq!(failure.layer, 0);
    assert!(failure.completed.is_empty());
    assert_eq!(failure.failures.len(), 1);
    assert_eq!(failure.failures[0].unit, "vector-db");
    assert!(matches!(failure.failures[0].source, UnitError::Submission(_)));

    // The sibling still ran to completion
    assert_eq!(
        failure.result.outcomes.get("cache"),
        Some(&DeploymentOutcome::Deployed)
    );
    assert!(failure.result.outcomes["vector-db"].is_failed());
    assert!(failure
        .result
        .aggregate_error
        .as_deref()
        .unwrap()
        .contains("vector-db"));

    // Nothing from the next layer reached the runtime or the renderer
    assert_eq!(runtime.position(&Call::Submit("api".to_string())), None);
    assert!(!renderer.rendered().contains(&"api".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_health_timeout_does_not_abort_siblings() {
    let runtime = Arc::new(
        SpyRuntime::new()
            .with_behavior(
                "stuck",
                Behavior {
                    health: Health::Never,
                    start_period: Duration::from_secs(10),
                    ..Default::default()
                },
            )
            .with_behavior(
                "slow",
                Behavior {
                    health: Health::HealthyAfter(20),
                    ..Default::default()
                },
            ),
    );
    let renderer = Arc::new(CountingRenderer::new());
    let app = application(
        &[&["stuck", "slow", "quick"], &["after"]],
        vec![
            unit("stuck", &["main"]),
            unit("slow", &["main"]),
            unit("quick", &["main"]),
            unit("after", &["main"]),
        ],
    );

    let err = orchestrator(runtime.clone(), renderer, &[])
        .orchestrate(&app, &Params::new())
        .await
        .unwrap_err();

    let failure = match err {
        OrchestratorError::LayerFailed(failure) => failure,
        other => panic!("expected a layer failure, got {other}"),
    };
    assert_eq!(failure.failures.len(), 1);
    assert_eq!(failure.failures[0].unit, "stuck");
    assert!(failure.failures[0].source.is_readiness_timeout());

    let outcomes = &failure.result.outcomes;
    assert_eq!(outcomes["slow"], DeploymentOutcome::Deployed);
    assert_eq!(outcomes["quick"], DeploymentOutcome::Deployed);
    assert_eq!(runtime.health_inspections("slow:main"), 21);
    assert_eq!(runtime.position(&Call::Submit("after".to_string())), None);
}

#[tokio::test(start_paused = true)]
async fn test_every_failed_unit_is_reported() {
    let runtime = Arc::new(
        SpyRuntime::new()
            .with_behavior("ui", failing_submit("port in use"))
            .with_behavior("api", failing_submit("bad manifest")),
    );
    let app = application(
        &[&["ui", "api"]],
        vec![unit("ui", &["web"]), unit("api", &["server"])],
    );

    let err = orchestrator(runtime, Arc::new(CountingRenderer::new()), &[])
        .orchestrate(&app, &Params::new())
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("layer 1 failed (2 unit(s)):"));
    assert!(message.contains("api: failed pod creation"));
    assert!(message.contains("bad manifest"));
    assert!(message.contains("ui: failed pod creation"));

    let OrchestratorError::LayerFailed(failure) = err else {
        panic!("expected a layer failure");
    };
    let units: Vec<&str> = failure.failures.iter().map(|f| f.unit.as_str()).collect();
    assert_eq!(units, vec!["api", "ui"]);
}

#[tokio::test(start_paused = true)]
async fn test_next_layer_starts_after_previous_joins() {
    let runtime = Arc::new(SpyRuntime::new().with_behavior(
        "vector-db",
        Behavior {
            health: Health::HealthyAfter(5),
            ..Default::default()
        },
    ));
    let app = application(
        &[&["vector-db", "cache"], &["api"]],
        vec![
            unit("vector-db", &["db"]),
            unit("cache", &["redis"]),
            unit("api", &["server"]),
        ],
    );

    let report = orchestrator(runtime.clone(), Arc::new(CountingRenderer::new()), &[])
        .orchestrate(&app, &Params::new())
        .await
        .unwrap();

    assert_eq!(report.deployed(), 3);
    let api_submit = runtime.position(&Call::Submit("api".to_string())).unwrap();
    assert!(runtime.last_position_for("vector-db").unwrap() < api_submit);
    assert!(runtime.last_position_for("cache").unwrap() < api_submit);
}

#[tokio::test(start_paused = true)]
async fn test_units_in_a_layer_deploy_concurrently() {
    // Each unit needs four health polls two seconds apart
    let slow = Behavior {
        health: Health::HealthyAfter(3),
        ..Default::default()
    };
    let runtime = Arc::new(
        SpyRuntime::new()
            .with_behavior("api", slow.clone())
            .with_behavior("ui", slow),
    );
    let app = application(&[&["api", "ui"]], vec![unit("api", &["main"]), unit("ui", &["main"])]);

    let started = Instant::now();
    orchestrator(runtime.clone(), Arc::new(CountingRenderer::new()), &[])
        .orchestrate(&app, &Params::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(6));
    assert!(elapsed < Duration::from_secs(12));

    let calls = runtime.calls();
    let api = Call::InspectContainer("api:main".to_string());
    let ui = Call::InspectContainer("ui:main".to_string());
    let first_ui = calls.iter().position(|c| *c == ui).unwrap();
    let last_api = calls.iter().rposition(|c| *c == api).unwrap();
    let first_api = calls.iter().position(|c| *c == api).unwrap();
    let last_ui = calls.iter().rposition(|c| *c == ui).unwrap();
    assert!(first_ui < last_api);
    assert!(first_api < last_ui);
}

#[tokio::test(start_paused = true)]
async fn test_parallelism_cap_serializes_units() {
    let slow = Behavior {
        health: Health::HealthyAfter(2),
        ..Default::default()
    };
    let runtime = Arc::new(
        SpyRuntime::new()
            .with_behavior("a", slow.clone())
            .with_behavior("b", slow),
    );
    let app = application(&[&["a", "b"]], vec![unit("a", &["main"]), unit("b", &["main"])]);
    let options = OrchestratorOptions {
        max_parallel_units: Some(1),
        ..Default::default()
    };

    orchestrator_with(runtime.clone(), Arc::new(CountingRenderer::new()), &[], options)
        .orchestrate(&app, &Params::new())
        .await
        .unwrap();

    let submitted = runtime.submitted_units();
    let (first, second) = (&submitted[0], &submitted[1]);
    let second_submit = runtime.position(&Call::Submit(second.clone())).unwrap();
    assert!(runtime.last_position_for(first).unwrap() < second_submit);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_unit_is_reported_as_aborted() {
    let runtime = Arc::new(SpyRuntime::new());
    let app = application(
        &[&["boom", "fine"]],
        vec![unit("boom", &["main"]), unit("fine", &["main"])],
    );

    let err = orchestrator(runtime.clone(), Arc::new(CountingRenderer::panicking_on("boom")), &[])
        .orchestrate(&app, &Params::new())
        .await
        .unwrap_err();

    let OrchestratorError::LayerFailed(failure) = err else {
        panic!("expected a layer failure");
    };
    assert!(matches!(
        failure.failures[0].source,
        UnitError::TaskAborted(ref m) if m.contains("renderer exploded on boom")
    ));
    assert_eq!(failure.result.outcomes["fine"], DeploymentOutcome::Deployed);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_skips_already_deployed_units() {
    let runtime = Arc::new(SpyRuntime::new());
    let renderer = Arc::new(CountingRenderer::new());
    let options = OrchestratorOptions::default();
    let deployer = Arc::new(UnitDeployer::new(
        runtime.clone(),
        renderer.clone(),
        AnnotationScheme::new(&options.annotations).unwrap(),
        &options,
        DeployContext {
            app_name: "rag-dev".to_string(),
            ..Default::default()
        },
    ));
    let plan = ExecutionPlan::new(
        vec![vec!["db".to_string()], vec!["api".to_string(), "ui".to_string()]],
        vec![unit("db", &["db"]), unit("api", &["api"]), unit("ui", &["web"])],
    )
    .unwrap();
    let already: HashSet<String> = ["db".to_string(), "ui".to_string()].into();

    let layers = LayerScheduler::new(deployer, None)
        .run(&plan, Arc::new(ResourcePool::empty()), &already)
        .await
        .unwrap();

    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0].outcomes["db"], DeploymentOutcome::Skipped);
    assert_eq!(layers[1].outcomes["ui"], DeploymentOutcome::Skipped);
    assert_eq!(layers[1].outcomes["api"], DeploymentOutcome::Deployed);
    assert_eq!(runtime.submitted_units(), vec!["api"]);
    assert_eq!(renderer.rendered(), vec!["api"]);
}

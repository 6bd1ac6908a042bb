//! podlayer - Entry Point
//!
//! Deploys an application described by a JSON file onto the local container
//! runtime, layer by layer.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use tracing::{error, info};

use podlayer::app::options::OrchestratorOptions;
use podlayer::app::Orchestrator;
use podlayer::config::application::Application;
use podlayer::config::params::Params;
use podlayer::config::settings::{DiscoveryKind, Settings};
use podlayer::errors::OrchestratorError;
use podlayer::filesys::File;
use podlayer::logs::{init_logging, LogOptions};
use podlayer::models::outcome::{DeploymentOutcome, DeploymentReport, LayerResult};
use podlayer::render::PlaceholderRenderer;
use podlayer::resources::discovery::{ResourceDiscovery, StaticDiscovery, VfioDiscovery};
use podlayer::runtime::podman::PodmanRuntime;
use podlayer::utils::version_info;

const USAGE: &str =
    "usage: podlayer --app=<name> --spec=<application.json> [--settings=<path>] [--params=K=V,K=V] [--version]";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        return match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => {
                println!("{}", version);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{} {}", "Error:".red().bold(), e);
                ExitCode::FAILURE
            }
        };
    }

    match run(&cli_args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli_args: &HashMap<String, String>) -> anyhow::Result<()> {
    let app_name = cli_args
        .get("app")
        .ok_or_else(|| anyhow!("missing --app\n{}", USAGE))?;
    let spec_path = cli_args
        .get("spec")
        .ok_or_else(|| anyhow!("missing --spec\n{}", USAGE))?;

    // Retrieve the settings file, defaults when none is given
    let settings = match cli_args.get("settings") {
        Some(path) => File::new(path)
            .read_json::<Settings>()
            .await
            .context("unable to read settings file")?,
        None => Settings::default(),
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.json_logs,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let params = match cli_args.get("params") {
        Some(raw) => Params::parse([raw.as_str()])?,
        None => Params::new(),
    };

    let app = Application::load(app_name.as_str(), &File::new(spec_path))
        .await
        .with_context(|| format!("unable to load application from {}", spec_path))?;

    let discovery: Arc<dyn ResourceDiscovery> = match settings.resources.discovery {
        DiscoveryKind::Vfio => Arc::new(VfioDiscovery::default()),
        DiscoveryKind::Static => Arc::new(StaticDiscovery::new(settings.resources.static_ids.clone())),
    };

    let orchestrator = Orchestrator::new(
        Arc::new(PodmanRuntime::new(settings.runtime.binary.clone())),
        Arc::new(PlaceholderRenderer),
        discovery,
        OrchestratorOptions::from(&settings),
    )?;

    info!(
        "Deploying application {} from template {} ({} units)",
        app.id,
        app.template,
        app.units.len()
    );

    let result = tokio::select! {
        result = orchestrator.orchestrate(&app, &params) => result,
        _ = tokio::signal::ctrl_c() => {
            bail!("interrupted; units already submitted are left in place");
        }
    };

    match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(OrchestratorError::LayerFailed(failure)) => {
            for layer in &failure.completed {
                print_layer(layer);
            }
            print_layer(&failure.result);
            Err(OrchestratorError::LayerFailed(failure).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &DeploymentReport) {
    if report.all_present {
        println!(
            "{} every unit of {} is already deployed",
            "✓".green().bold(),
            report.application.bold()
        );
        return;
    }

    for layer in &report.layers {
        print_layer(layer);
    }
    println!(
        "{} {}: {} deployed, {} skipped in {}s",
        "✓".green().bold(),
        report.application.bold(),
        report.deployed(),
        report.skipped(),
        (report.finished_at - report.started_at).num_seconds()
    );
}

fn print_layer(layer: &LayerResult) {
    println!("{}", format!("Layer {}", layer.index + 1).bold());
    for (unit, outcome) in &layer.outcomes {
        match outcome {
            DeploymentOutcome::Deployed => println!("  {} {}", "deployed".green(), unit),
            DeploymentOutcome::Skipped => println!("  {} {}", "skipped ".yellow(), unit),
            DeploymentOutcome::Failed(reason) => {
                println!("  {} {}: {}", "failed  ".red(), unit, reason)
            }
        }
    }
}

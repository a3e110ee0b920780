//! Shipwright Orchestrator - Entry Point
//!
//! Takes a completed build artifact and provisions it across GitHub,
//! Supabase and Vercel as a single resumable deploy operation, then verifies
//! the result is actually serving traffic.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use tracing::error;

use shipwright::config::Settings;
use shipwright::deploy::health::HttpProbe;
use shipwright::deploy::{DeployRequest, Orchestrator};
use shipwright::exec::ProcessRunner;
use shipwright::logs::{init_logging, LogOptions};
use shipwright::models::deployment::DeployStatus;
use shipwright::store::{DeploymentStore, FileStore, StorageLayout};
use shipwright::utils::version_info;

#[tokio::main]
async fn main() {
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
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version).unwrap());
        return;
    }

    // Resolve the storage layout and settings
    let layout = match cli_args.get("base-dir") {
        Some(dir) => StorageLayout::new(PathBuf::from(dir)),
        None => StorageLayout::default(),
    };

    let settings_file = layout.settings_file();
    let settings = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Settings::default()
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    let store = match FileStore::open(layout).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open record store: {}", e);
            std::process::exit(1);
        }
    };

    // Print a deployment record and exit
    if let Some(deployment_id) = cli_args.get("status") {
        print_status(store.as_ref(), deployment_id).await;
        return;
    }

    // Run a deploy
    let request = match deploy_request(&cli_args) {
        Ok(request) => request,
        Err(missing) => {
            eprintln!("Missing required argument: --{}", missing);
            eprintln!(
                "Usage: shipwright --project-id=<id> --project-name=<name> \
                 --artifact=<path> [--deployment-id=<id>]"
            );
            std::process::exit(2);
        }
    };

    let config = match settings.to_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid settings: {}", e);
            std::process::exit(1);
        }
    };

    let probe = match HttpProbe::new(config.health.request_timeout) {
        Ok(probe) => Arc::new(probe),
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let deployment_id = request.deployment_id.clone();
    let orchestrator = Orchestrator::new(config, store.clone(), Arc::new(ProcessRunner::new()), probe);

    if let Err(e) = orchestrator.deploy(request).await {
        error!("Deploy run failed: {}", e);
        std::process::exit(1);
    }

    print_status(store.as_ref(), &deployment_id).await;

    match store.load(&deployment_id).await {
        Ok(deployment) if deployment.status == DeployStatus::Failed => std::process::exit(1),
        Ok(_) => {}
        Err(e) => {
            error!("Failed to load deployment record: {}", e);
            std::process::exit(1);
        }
    }
}

fn deploy_request(cli_args: &HashMap<String, String>) -> Result<DeployRequest, &'static str> {
    let get = |key: &'static str| cli_args.get(key).cloned().ok_or(key);
    Ok(DeployRequest {
        // A fresh ID starts a new deployment; passing an existing one resumes it
        deployment_id: get("deployment-id")
            .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
        project_id: get("project-id")?,
        project_name: get("project-name")?,
        build_artifact_path: PathBuf::from(get("artifact")?),
    })
}

async fn print_status(store: &dyn DeploymentStore, deployment_id: &str) {
    let deployment = match store.load(deployment_id).await {
        Ok(deployment) => deployment,
        Err(e) => {
            eprintln!("Unable to load deployment {}: {}", deployment_id, e);
            std::process::exit(1);
        }
    };

    println!("deployment: {}", deployment.id);
    println!("status:     {}", deployment.status);
    if let Some(url) = &deployment.deploy_url {
        println!("url:        {}", url);
    }
    println!("health:     {:?}", deployment.health_check_status);
    println!();

    for line in &deployment.deploy_log {
        if let Some(msg) = line.strip_prefix("✓ ") {
            println!("{} {}", "✓".green(), msg);
        } else if let Some(msg) = line.strip_prefix("⚠ ") {
            println!("{} {}", "⚠".yellow(), msg);
        } else if let Some(msg) = line.strip_prefix("✗ ") {
            println!("{} {}", "✗".red(), msg);
        } else {
            println!("{}", line);
        }
    }
}

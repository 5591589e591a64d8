use alertcheck_server::app;
use alertcheck_server::config::{ResolvedSettings, ServerConfig};
use alertcheck_server::exporter::Exporter;
use alertcheck_server::scheduler::{build_reconcilers, ValidationScheduler};
use alertcheck_server::state::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  alertcheck-server [config.toml]                 Start validating (default config/alertcheck.toml)");
    eprintln!("  alertcheck-server check-config <config.toml>    Validate a config file and print what would run");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("alertcheck=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("check-config") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("check-config requires a <config.toml> argument")
            })?;
            run_check_config(config_path)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/alertcheck.toml");
            run_server(config_path).await
        }
    }
}

fn load_settings(config_path: &str) -> Result<ResolvedSettings> {
    let config = ServerConfig::load(config_path)?;
    let settings = config
        .validate()
        .with_context(|| format!("Invalid config file '{config_path}'"))?;
    Ok(settings)
}

#[allow(clippy::print_stdout)]
fn run_check_config(config_path: &str) -> Result<()> {
    let settings = load_settings(config_path)?;

    println!("listen address:   {}", settings.listen_addr);
    println!("compute interval: {}s", settings.compute_interval.as_secs());
    println!("request timeout:  {}s", settings.request_timeout.as_secs());
    println!("windows:");
    for window in settings.ladder.windows() {
        println!("  {window}");
    }
    println!("targets:");
    for target in &settings.targets {
        let labels: Vec<String> = settings
            .label_keys
            .iter()
            .zip(&target.label_values)
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!(
            "  rules={} query={} [{}]",
            target.rule_url,
            target.query_url,
            labels.join(", ")
        );
    }
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let settings = load_settings(config_path)?;

    let exporter = Arc::new(
        Exporter::new(&settings.label_keys).context("Failed to register metrics")?,
    );
    let reconcilers = build_reconcilers(&settings, exporter.clone())?;
    if reconcilers.is_empty() {
        tracing::warn!("No servers configured, only the metrics endpoint will run");
    }

    let windows = settings
        .ladder
        .windows()
        .iter()
        .map(|w| w.to_string())
        .collect();
    let state = AppState::new(exporter, settings.targets.len(), windows);

    let mut scheduler = ValidationScheduler::start(reconcilers);

    let listener = tokio::net::TcpListener::bind(settings.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.listen_addr))?;
    let http_server = axum::serve(listener, app::build_http_app(state));

    tracing::info!(
        http = %settings.listen_addr,
        targets = scheduler.len(),
        windows = settings.ladder.len(),
        "Server started"
    );

    let outcome = tokio::select! {
        result = http_server.with_graceful_shutdown(async { signal::ctrl_c().await.ok(); }) => {
            result.context("HTTP server error")
        }
        err = scheduler.wait_fatal() => {
            tracing::error!(error = %err, "Fatal validation error");
            Err(err)
        }
    };

    scheduler.shutdown();
    tracing::info!("Server stopped");
    outcome
}

mod api;
mod cli;
mod config;
mod logging;
mod monitor;
mod paths;
mod render;
mod state_machine;
mod store;
mod structured_logger;

use anyhow::{Context, Result};
use api::{
    HttpWorkflowApi, RespondRequest, StartRequest, StatusSnapshot, WorkflowApi, WorkflowStatus,
    WsConnector,
};
use clap::Parser;
use cli::{Cli, Command};
use config::MonitorConfig;
use monitor::FollowOutcome;
use state_machine::DashboardSnapshot;
use std::sync::Arc;
use store::WorkflowStore;
use structured_logger::StructuredLogger;
use tokio::io::BufReader;

fn run_id() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_config = paths::config_path().ok();
    let config = MonitorConfig::load_or_default(cli.config.as_deref(), default_config.as_deref())?
        .apply_env_overrides()
        .with_api_url(cli.api_url.clone());
    config.validate()?;
    let api = Arc::new(HttpWorkflowApi::new(&config.api_url, config.request_timeout()));

    if let Err(e) = logging::init_logging(cli.verbose) {
        eprintln!("[sdlc-monitor] Warning: Failed to initialize logging: {:#}", e);
    }
    tracing::info!(
        "sdlc-monitor {} using {}",
        env!("SDLC_MONITOR_GIT_SHA"),
        api.base_url()
    );

    match cli.command {
        Command::Start {
            requirements,
            project_name,
            stakeholders,
            detach,
        } => {
            let mut request =
                StartRequest::new(requirements.join(" ")).with_stakeholders(stakeholders);
            if let Some(name) = project_name {
                request = request.with_project_name(name);
            }
            let store = build_store(&config, api, None);
            let session_id = store
                .start_workflow(request)
                .await
                .context("Failed to start workflow")?;
            println!("[workflow] Started session {}", session_id);
            if detach {
                store.detach();
                return Ok(());
            }
            follow(&store).await
        }
        Command::Watch { session_id } => {
            let store = build_store(&config, api, Some(&session_id));
            store
                .attach(&session_id)
                .await
                .with_context(|| format!("Failed to attach to session {}", session_id))?;
            follow(&store).await
        }
        Command::Status { session_id, json } => {
            let doc = api
                .status(&session_id)
                .await
                .with_context(|| format!("Failed to fetch status of {}", session_id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                let snapshot = dashboard_from(&doc);
                println!("{}", render::status_line(&snapshot));
                if let Some(interrupt) = &snapshot.pending_interrupt {
                    println!("{}", render::interrupt_prompt(interrupt));
                }
                println!("{}", render::summary(&snapshot));
            }
            Ok(())
        }
        Command::Respond {
            session_id,
            response,
            data,
        } => {
            let additional_data = data
                .map(|raw| serde_json::from_str(&raw).context("--data must be valid JSON"))
                .transpose()?;
            let request = RespondRequest {
                response,
                additional_data,
            };
            let ack = api
                .respond(&session_id, &request)
                .await
                .with_context(|| format!("Failed to respond to {}", session_id))?;
            println!("[interrupt] Response sent ({})", ack.status);
            Ok(())
        }
        Command::Stop { session_id } => {
            api.stop(&session_id)
                .await
                .with_context(|| format!("Failed to stop {}", session_id))?;
            println!("[workflow] Stopped {}", session_id);
            Ok(())
        }
        Command::Sessions => {
            let store = build_store(&config, api, None);
            let sessions = store
                .list_sessions()
                .await
                .context("Failed to list sessions")?;
            println!("{}", render::session_table(&sessions));
            Ok(())
        }
        Command::Health => {
            let store = build_store(&config, api, None);
            let health = store.health().await.context("Workflow API is unreachable")?;
            println!("[health] {}", health.message);
            Ok(())
        }
    }
}

/// Store wired to the HTTP client and WebSocket connector. Events go to the
/// session's log directory when the session is known up front.
fn build_store(
    config: &MonitorConfig,
    api: Arc<HttpWorkflowApi>,
    session_id: Option<&str>,
) -> WorkflowStore {
    let push = Arc::new(WsConnector::new(&config.ws_root(), config.ping_interval()));
    let logs_dir = match session_id {
        Some(id) => paths::session_logs_dir(id),
        None => paths::logs_dir(),
    };
    let logger = logs_dir
        .and_then(|dir| StructuredLogger::new(&run_id(), &dir))
        .map_err(|e| tracing::warn!("Event log disabled: {:#}", e))
        .ok()
        .map(Arc::new);
    if let Some(logger) = &logger {
        tracing::debug!("Event log at {}", logger.path().display());
    }
    WorkflowStore::new(api, push, config.sync_config(), logger)
}

async fn follow(store: &WorkflowStore) -> Result<()> {
    let mut out = std::io::stdout();
    let input = BufReader::new(tokio::io::stdin());
    let shutdown = detach_signal(tokio::signal::ctrl_c());
    match monitor::follow(store, input, &mut out, shutdown).await? {
        FollowOutcome::Finished(snapshot) if snapshot.status == WorkflowStatus::Error => {
            anyhow::bail!("Workflow ended with status {}", snapshot.status)
        }
        FollowOutcome::Finished(_) | FollowOutcome::Stopped => Ok(()),
        FollowOutcome::Detached(Some(session_id)) => {
            println!(
                "\n[workflow] Detached; the session keeps running. Resume with: sdlc-monitor watch {}",
                session_id
            );
            Ok(())
        }
        FollowOutcome::Detached(None) => Ok(()),
    }
}

/// Resolves when `signal` fires. If the handler cannot be installed, never
/// resolves, so following continues without Ctrl-C detach.
async fn detach_signal<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::warn!("Ctrl-C handler unavailable, detach disabled: {}", e);
        std::future::pending::<()>().await;
    }
}

fn dashboard_from(doc: &StatusSnapshot) -> DashboardSnapshot {
    DashboardSnapshot {
        session_id: Some(doc.session_id.clone()),
        status: doc.status.clone(),
        current_stage: doc.current_stage.clone(),
        progress: doc.progress,
        artifacts: doc.into(),
        pending_interrupt: doc.pending_interrupt.clone(),
        error: doc.error_message.clone(),
        connected: true,
        ..DashboardSnapshot::default()
    }
}

// ABOUTME: Entry point for the deckhand CLI application.
// ABOUTME: Parses arguments, wires the manifest to a backend and dispatches commands.

mod cli;
mod output;

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands};
use deckhand::config::{self, Manifest};
use deckhand::deploy::DeployError;
use deckhand::engine::ContainerEngineManager;
use deckhand::error::{Error, Result};
use deckhand::events::{DeploymentEvent, EventKind};
use deckhand::model::{DeploymentConfig, DeploymentResult, DeploymentUpdate};
use deckhand::orchestrator::{Orchestrator, TracingInfrastructure};
use deckhand::platform::{LogQuery, Platform, PlatformAdapter};
use deckhand::runtime;
use deckhand::store::JsonFileStore;
use deckhand::types::ContainerId;
use output::{Output, OutputMode};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(cli.output_mode());
    if let Err(e) = run(cli).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

/// A manifest connected to the backend for its platform.
struct Session {
    manifest: Manifest,
    orchestrator: Orchestrator,
    engine: Arc<ContainerEngineManager>,
    reporter: JoinHandle<usize>,
}

impl Session {
    async fn open(cwd: &Path, environment: Option<&str>, mode: OutputMode) -> Result<Self> {
        let (manifest, _) = Manifest::discover(cwd)?;
        let manifest = match environment {
            Some(name) => manifest.for_environment(name)?,
            None => manifest,
        };

        let platform = manifest.platform();
        if platform != Platform::Docker {
            return Err(DeployError::UnsupportedPlatform(format!(
                "{platform} (the CLI drives container engines only)"
            ))
            .into());
        }

        let connection = runtime::connect_local(Some(&manifest.runtime)).await?;
        let secrets = manifest
            .deployments
            .iter()
            .map(|d| (d.id.clone(), d.secrets.clone()))
            .collect();
        let store = JsonFileStore::<ContainerId>::new(manifest.state_path(cwd)).with_secrets(secrets);
        let (events, receiver) = tokio::sync::mpsc::unbounded_channel();
        let output = Output::new(mode);
        let reporter = spawn_reporter(receiver, move |line| output.progress(&line));

        let engine = Arc::new(
            ContainerEngineManager::new(Arc::new(connection), Arc::new(store))
                .with_settings(manifest.engine)
                .with_events(Arc::new(events)),
        );
        let orchestrator = Orchestrator::new(Arc::new(TracingInfrastructure))
            .with_backend(Platform::Docker, engine.clone());

        Ok(Self {
            manifest,
            orchestrator,
            engine,
            reporter,
        })
    }

    /// Release the backends and wait until every queued event is reported.
    async fn close(self) {
        let Self {
            orchestrator,
            engine,
            reporter,
            ..
        } = self;
        // The managers own the only senders; the reporter ends once they are gone
        drop(orchestrator);
        drop(engine);
        match reporter.await {
            Ok(count) => tracing::debug!(events = count, "event reporter drained"),
            Err(e) => tracing::warn!(error = %e, "event reporter stopped abnormally"),
        }
    }

    fn backend(&self) -> Result<&Arc<dyn PlatformAdapter>> {
        Ok(self.orchestrator.backend(self.manifest.platform())?)
    }

    /// Manifest deployments selected by `ids`, all of them when empty.
    fn selected(&self, ids: &[String]) -> Result<Vec<DeploymentConfig>> {
        if ids.is_empty() {
            return Ok(self.manifest.deployments.iter().cloned().collect());
        }
        ids.iter()
            .map(|id| self.manifest.deployment(id).cloned())
            .collect()
    }
}

/// Report lifecycle events until every sender is dropped.
///
/// Resolves to the number of events reported.
fn spawn_reporter<F>(mut receiver: UnboundedReceiver<DeploymentEvent>, mut emit: F) -> JoinHandle<usize>
where
    F: FnMut(String) + Send + 'static,
{
    tokio::spawn(async move {
        let mut count = 0;
        while let Some(event) = receiver.recv().await {
            emit(describe(&event));
            count += 1;
        }
        count
    })
}

fn describe(event: &DeploymentEvent) -> String {
    let verb = match event.kind {
        EventKind::Started => "started",
        EventKind::Completed => "completed",
        EventKind::Failed => "failed",
    };
    format!("  → {} {} {verb}", event.operation, event.deployment_id)
}

fn finish(result: &DeploymentResult, output: &Output) -> Result<()> {
    output.result(result);
    if result.success {
        Ok(())
    } else {
        Err(Error::OperationFailed(format!(
            "{} failed for {}",
            result.status.phase, result.deployment_id
        )))
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mode = cli.output_mode();
    let mut output = Output::new(mode);
    output.start_timer();
    let cwd = env::current_dir()?;
    let environment = cli.command.environment().map(str::to_string);

    if let Commands::Init { name, image, force } = &cli.command {
        config::init_manifest(&cwd, name.as_deref(), image.as_deref(), *force)?;
        output.success(&format!("Created {}", config::MANIFEST_FILENAME));
        return Ok(());
    }

    let session = Session::open(&cwd, environment.as_deref(), mode).await?;
    let outcome = dispatch(&session, cli.command, &output).await;
    session.close().await;
    outcome
}

async fn dispatch(session: &Session, command: Commands, output: &Output) -> Result<()> {
    match command {
        Commands::Init { .. } => Ok(()),
        Commands::Deploy { ids, .. } => deploy(session, &ids, output).await,
        Commands::Status { id, usage, .. } => status(session, id, usage, output).await,
        Commands::Rollback { id, to, .. } => {
            output.progress(&format!("Rolling back {id}..."));
            let result = session.backend()?.rollback(&id, to.as_deref()).await;
            finish(&result, output)
        }
        Commands::Scale { id, replicas, .. } => {
            output.progress(&format!("Scaling {id} to {replicas}..."));
            let result = session.backend()?.scale(&id, replicas).await;
            finish(&result, output)
        }
        Commands::Logs {
            id,
            tail,
            since,
            timestamps,
            ..
        } => {
            let query = LogQuery {
                tail,
                since,
                timestamps,
            };
            let lines = session.backend()?.get_logs(&id, &query).await?;
            output.lines(&lines);
            Ok(())
        }
        Commands::Delete { id, .. } => {
            session.backend()?.delete(&id).await?;
            output.success(&format!("Deleted {id}"));
            Ok(())
        }
    }
}

/// Deploy unregistered deployments and update the registered ones.
async fn deploy(session: &Session, ids: &[String], output: &Output) -> Result<()> {
    let selected = session.selected(ids)?;
    let registered = session.engine.deployment_ids()?;
    let (existing, fresh): (Vec<_>, Vec<_>) = selected
        .into_iter()
        .partition(|d| registered.contains(&d.id));

    let mut failures = 0;

    if !fresh.is_empty() {
        output.progress(&format!(
            "Deploying {} deployment(s) to {}",
            fresh.len(),
            session.manifest.platform()
        ));
        let outcome = session
            .orchestrator
            .orchestrate(fresh, &session.manifest.orchestration)
            .await;
        output.batch(&outcome);
        if !outcome.success {
            return Err(Error::OperationFailed(outcome.message));
        }
        failures += outcome.failed().count();
    }

    if !existing.is_empty() {
        output.progress(&format!("Updating {} deployment(s)", existing.len()));
        let updates: BTreeMap<String, DeploymentUpdate> = existing
            .iter()
            .map(|d| (d.id.clone(), DeploymentUpdate::from(d)))
            .collect();
        let outcome = session
            .orchestrator
            .update_orchestration(session.manifest.platform(), updates)
            .await;
        output.batch(&outcome);
        if !outcome.success {
            return Err(Error::OperationFailed(outcome.message));
        }
        failures += outcome.failed().count();
    }

    if failures > 0 {
        return Err(Error::OperationFailed(format!(
            "{failures} deployment(s) failed"
        )));
    }
    Ok(())
}

async fn status(session: &Session, id: Option<String>, usage: bool, output: &Output) -> Result<()> {
    let ids = match id {
        Some(id) => vec![id],
        None => session.engine.deployment_ids()?,
    };
    let summary = session
        .orchestrator
        .orchestration_status(session.manifest.platform(), &ids)
        .await?;
    output.statuses(&summary.deployments);

    if usage {
        for id in &ids {
            match session.engine.resource_usage(id).await {
                Ok(sample) => output.detail(id, &sample),
                Err(e) => output.progress(&format!("{id}: no usage ({e})")),
            }
        }
    }
    Ok(())
}

mod app;
mod config;
mod telemetry;

use app::{App, StartupError};
use clap::{Parser, Subcommand};
use config::{Config, ConfigError};
use indexmap::IndexSet;
use notifier::{Command, DeliveryOutcome, LoggingChat, ReconcileError, ReconcileOutcome};
use platforms::{Platform, PlatformError};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use telemetry::TelemetryError;
use tokio::sync::mpsc;
use tracker::{LedgerError, NotificationStyle, PolicyError, PolicyUpdate, RegistryError, TenantPolicy};

#[derive(Parser)]
#[command(name = "modrunner", version, about = "Announces new CurseForge and Modrinth releases")]
struct Cli {
    #[arg(long, short, default_value = "modrunner.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the reconciliation worker and the admin listener until interrupted
    Run,
    /// Reconcile every cached project once
    Sweep,
    /// Reconcile one cached project
    Reconcile { project_id: String },
    /// Resolve a project id or slug and cache it
    Fetch { identifier: String },
    /// Search a platform for projects
    Search { platform: Platform, query: String },
    /// Track a project in a destination
    Track {
        identifier: String,
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        destination: String,
        /// Role to mention on updates. Repeatable.
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Stop tracking a project in a destination
    Untrack {
        project_id: String,
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        destination: String,
    },
    /// Inspect or change a tenant's policy
    Policy {
        #[command(subcommand)]
        action: PolicyCommand,
    },
}

#[derive(Subcommand)]
enum PolicyCommand {
    Get {
        tenant: String,
    },
    Set {
        tenant: String,
        #[arg(long)]
        changelog_max_length: Option<u32>,
        #[arg(long)]
        style: Option<NotificationStyle>,
        #[arg(long)]
        max_tracked_projects: Option<u32>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    let _sentry = telemetry::init_logging(&config.logging);
    if let Some(metrics) = &config.metrics {
        telemetry::init_metrics(metrics)?;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(run_async(cli.command, config))
}

async fn run_async(command: CliCommand, config: Config) -> Result<(), CliError> {
    let app = App::from_config(&config, Arc::new(LoggingChat)).await?;

    match command {
        CliCommand::Run => serve(app, &config).await,
        command => execute(&app, command, &mut std::io::stdout()).await,
    }
}

async fn serve(app: App, config: &Config) -> Result<(), CliError> {
    let (tx, rx) = mpsc::channel::<Command>(16);

    let worker = app.reconciler.clone();
    let worker_handle = tokio::spawn(async move { worker.start(rx).await });

    if let Some(listener) = &config.admin_listener {
        let reconciler = app.reconciler.clone();
        let service = AdminService::new(Arc::new(move || reconciler.is_ready()));
        let host = listener.host.clone();
        let port = listener.port;
        tokio::spawn(async move {
            if let Err(e) = run_http_service(&host, port, service).await {
                tracing::error!("Admin listener failed: {e}");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");
    if tx.send(Command::Shutdown).await.is_err() {
        tracing::warn!("Reconciler already stopped");
    }
    if let Err(e) = worker_handle.await {
        tracing::error!("Task panicked: {}", e);
    }
    Ok(())
}

async fn execute(app: &App, command: CliCommand, out: &mut impl Write) -> Result<(), CliError> {
    match command {
        // Long-running; handled by `serve`.
        CliCommand::Run => {}
        CliCommand::Sweep => {
            let summary = app.reconciler.reconcile_all().await?;
            writeln!(
                out,
                "{} projects: {} updated, {} unchanged, {} failed",
                summary.projects, summary.updated, summary.unchanged, summary.failed
            )?;
        }
        CliCommand::Reconcile { project_id } => {
            match app.reconciler.reconcile_project(&project_id).await? {
                ReconcileOutcome::NoChange => {
                    writeln!(out, "No new version of {project_id}")?;
                }
                ReconcileOutcome::Updated {
                    version_id,
                    deliveries,
                } => {
                    let delivered = deliveries
                        .iter()
                        .filter(|d| d.outcome == DeliveryOutcome::Delivered)
                        .count();
                    writeln!(
                        out,
                        "New version {version_id} of {project_id}: notified {delivered} of {} destinations",
                        deliveries.len()
                    )?;
                }
            }
        }
        CliCommand::Fetch { identifier } => {
            let project = app.registry.fetch(&identifier).await?;
            writeln!(
                out,
                "{} ({} {}): {} known versions, updated {}",
                project.name,
                project.platform,
                project.id,
                project.versions.len(),
                project.date_updated.to_rfc3339()
            )?;
        }
        CliCommand::Search { platform, query } => {
            let results = app.registry.platforms().search(platform, &query).await?;
            for result in results {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}",
                    result.id, result.name, result.category, result.downloads, result.url
                )?;
            }
        }
        CliCommand::Track {
            identifier,
            tenant,
            destination,
            roles,
        } => {
            let project = app.registry.fetch(&identifier).await?;
            let roles: IndexSet<String> = roles.into_iter().collect();
            match app.ledger.track(&project.id, &tenant, &destination, roles).await {
                Ok(tracked) if tracked.created => {
                    writeln!(out, "Now tracking {} in {destination}", project.name)?;
                }
                Ok(_) => {
                    writeln!(
                        out,
                        "{} is already tracked in {destination}, roles updated",
                        project.name
                    )?;
                }
                Err(LedgerError::QuotaExceeded { max, .. }) => {
                    writeln!(
                        out,
                        "Tenant {tenant} already tracks the maximum of {max} projects"
                    )?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        CliCommand::Untrack {
            project_id,
            tenant,
            destination,
        } => {
            let removed = app.ledger.untrack(&project_id, &tenant, &destination).await?;
            if removed == 0 {
                writeln!(out, "{project_id} is not tracked in {destination}")?;
            } else {
                writeln!(out, "Stopped tracking {project_id} in {destination}")?;
            }
        }
        CliCommand::Policy { action } => match action {
            PolicyCommand::Get { tenant } => {
                let policy = app.policies.get_or_create(&tenant).await?;
                print_policy(out, &policy)?;
            }
            PolicyCommand::Set {
                tenant,
                changelog_max_length,
                style,
                max_tracked_projects,
            } => {
                let mut policy = app
                    .policies
                    .update(
                        &tenant,
                        PolicyUpdate {
                            changelog_max_length,
                            notification_style: style,
                        },
                    )
                    .await?;
                if let Some(max) = max_tracked_projects {
                    policy = app.policies.set_max_tracked_projects(&tenant, max).await?;
                }
                print_policy(out, &policy)?;
            }
        },
    }
    Ok(())
}

fn print_policy(out: &mut impl Write, policy: &TenantPolicy) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(policy).map_err(std::io::Error::other)?;
    writeln!(out, "{json}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifier::testutils::{RecordingChat, text_channel};
    use platforms::Platforms;
    use platforms::testutils::{ScriptedAdapter, project_metadata, timestamp};
    use tracker::PolicyDefaults;
    use tracker::store::MemoryStore;

    struct Fixture {
        curseforge: Arc<ScriptedAdapter>,
        chat: Arc<RecordingChat>,
        app: App,
    }

    fn fixture() -> Fixture {
        let curseforge = Arc::new(ScriptedAdapter::new(Platform::CurseForge));
        let modrinth = Arc::new(ScriptedAdapter::new(Platform::Modrinth));
        let chat = Arc::new(RecordingChat::new());
        let app = App::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Platforms::new(curseforge.clone(), modrinth)),
            chat.clone(),
            Default::default(),
            PolicyDefaults::default(),
        );
        Fixture {
            curseforge,
            chat,
            app,
        }
    }

    async fn run(app: &App, args: &[&str]) -> String {
        let cli = Cli::try_parse_from(["modrunner"].iter().chain(args)).unwrap();
        let mut out = Vec::new();
        execute(app, cli.command, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_track_then_sweep() {
        let f = fixture();
        f.chat.add_destination(text_channel("chan-1"));
        f.curseforge
            .add_project(project_metadata(Platform::CurseForge, "238222", "JEI", &["1"]));

        let out = run(
            &f.app,
            &["track", "238222", "--tenant", "guild-1", "--destination", "chan-1", "--role", "42"],
        )
        .await;
        assert_eq!(out, "Now tracking JEI in chan-1\n");

        let out = run(&f.app, &["sweep"]).await;
        assert_eq!(out, "1 projects: 0 updated, 1 unchanged, 0 failed\n");

        f.curseforge.publish("238222", "2", timestamp(1_800_000_000));
        let out = run(&f.app, &["reconcile", "238222"]).await;
        assert_eq!(out, "New version 2 of 238222: notified 1 of 1 destinations\n");

        let sent = f.chat.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.content.as_deref(), Some("<@&42>"));
    }

    #[tokio::test]
    async fn test_quota_is_reported_not_raised() {
        let f = fixture();
        f.curseforge
            .add_project(project_metadata(Platform::CurseForge, "1", "One", &["a"]));
        f.curseforge
            .add_project(project_metadata(Platform::CurseForge, "2", "Two", &["a"]));

        run(&f.app, &["policy", "set", "guild-1", "--max-tracked-projects", "1"]).await;
        run(&f.app, &["track", "1", "--tenant", "guild-1", "--destination", "chan-1"]).await;
        let out = run(&f.app, &["track", "2", "--tenant", "guild-1", "--destination", "chan-1"]).await;
        assert_eq!(out, "Tenant guild-1 already tracks the maximum of 1 projects\n");
    }

    #[tokio::test]
    async fn test_policy_set_validates() {
        let f = fixture();
        let out = run(&f.app, &["policy", "set", "guild-1", "--style", "compact"]).await;
        assert!(out.contains("\"notification_style\": \"compact\""));

        let cli = Cli::try_parse_from([
            "modrunner",
            "policy",
            "set",
            "guild-1",
            "--changelog-max-length",
            "2",
        ])
        .unwrap();
        let err = execute(&f.app, cli.command, &mut Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            CliError::Policy(PolicyError::ChangelogLengthOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let f = fixture();
        let cli = Cli::try_parse_from(["modrunner", "fetch", "404"]).unwrap();
        let err = execute(&f.app, cli.command, &mut Vec::new()).await.unwrap_err();
        assert!(matches!(err, CliError::Registry(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_search_platform_argument() {
        let cli = Cli::try_parse_from(["modrunner", "search", "modrinth", "sodium"]).unwrap();
        assert!(matches!(
            cli.command,
            CliCommand::Search {
                platform: Platform::Modrinth,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["modrunner", "search", "github", "sodium"]).is_err());
    }
}

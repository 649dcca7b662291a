//! modsync - command-line front end for the document & module synchronization layer
//!
//! Every command prints JSON to stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modsync_core::{
    CloneOptions, CloneReport, DocumentPlane, DocumentSession, FsHost, LocalBaseline,
    ModuleScripts, ModuleSnapshot, ModuleType, PortalBaseline, PortalRef, ScriptType, SyncConfig,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modsync")]
#[command(about = "Track, clone and reopen portal modules and local scripts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database path (overrides MODSYNC_DB_PATH and the config file)
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List recently opened documents
    Recent {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List tracked repositories
    Repos,

    /// Track a directory as a module repository
    AddRepo {
        path: PathBuf,
    },

    /// Clone a module (JSON: {portal, module, scripts}) into a repository
    Clone {
        /// Repository root directory
        #[arg(long)]
        repo: PathBuf,

        /// Module definition as fetched from the portal
        #[arg(long)]
        input: PathBuf,

        /// Replace an existing module directory
        #[arg(long)]
        overwrite: bool,
    },

    /// Read a cloned module directory
    Show {
        dir: PathBuf,
    },

    /// Classify a buffer against its local and portal baselines
    Status {
        /// Current buffer content
        #[arg(long)]
        content: PathBuf,

        /// Last saved local content
        #[arg(long)]
        local: Option<PathBuf>,

        /// Last known portal content
        #[arg(long)]
        remote: Option<PathBuf>,
    },

    /// Run retention sweeps on every bounded store
    Sweep,

    /// Show the saved tab drafts
    Drafts {
        /// Discard the saved drafts instead
        #[arg(long)]
        clear: bool,
    },
}

/// Input accepted by `modsync clone`
#[derive(Debug, Deserialize)]
struct CloneRequest {
    portal: PortalRef,
    module: ModuleSnapshot,
    #[serde(default)]
    scripts: ModuleScripts,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    dirty_state: modsync_core::DirtyState,
    prompt: modsync_core::ClosePrompt,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<SyncConfig> {
    let mut config = match &cli.config {
        Some(path) => SyncConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SyncConfig::default(),
    };
    if let Some(path) = &cli.db_path {
        config.database_path = Some(path.clone());
    }
    // One-shot commands must finish their sweeps before exiting
    config.retention = config.retention.inline();
    Ok(config)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "modsync={level},modsync_core={level},libsql=warn",
            level = default_level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("modsync v{} starting", env!("CARGO_PKG_VERSION"));

    // Status needs no store
    if let Commands::Status {
        content,
        local,
        remote,
    } = &cli.command
    {
        let content = read_text(content)?;
        let plane = status_plane(local.as_deref(), remote.as_deref())?;
        let dirty_state = modsync_core::DirtyState::resolve(&content, &plane);
        return print_json(&StatusReport {
            dirty_state,
            prompt: dirty_state.close_prompt(),
        });
    }

    let config = load_config(&cli)?;
    let host = Arc::new(FsHost::auto_grant());
    let session = DocumentSession::open(&config, host.clone()).await?;

    match cli.command {
        Commands::Recent { limit } => print_json(&session.recent().list(limit).await?),

        Commands::Repos => print_json(&session.repository().list_repositories().await?),

        Commands::AddRepo { path } => {
            let handle = host.handle_for(&path).await?;
            print_json(&session.repository().register_repository(&handle).await?)
        }

        Commands::Clone {
            repo,
            input,
            overwrite,
        } => {
            let request: CloneRequest = serde_json::from_str(&read_text(&input)?)
                .with_context(|| format!("parsing clone request {}", input.display()))?;
            let handle = host.handle_for(&repo).await?;
            let repository = session.repository().register_repository(&handle).await?;

            let report: CloneReport = session
                .clone_module(
                    &repository.id,
                    &request.portal,
                    &request.module,
                    &request.scripts,
                    CloneOptions { overwrite },
                )
                .await;
            print_json(&report)?;
            if !report.success {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Show { dir } => {
            let handle = host.handle_for(&dir).await?;
            print_json(&session.repository().read_module_from_directory(&handle).await?)
        }

        Commands::Sweep => print_json(&session.sweep_all().await?),

        Commands::Drafts { clear } => {
            if clear {
                let cleared = session.drafts().clear().await?;
                print_json(&serde_json::json!({ "cleared": cleared }))
            } else {
                print_json(&session.drafts().load().await?)
            }
        }

        Commands::Status { .. } => Ok(()),
    }
}

/// Plane for ad-hoc status checks from files on disk
fn status_plane(local: Option<&Path>, remote: Option<&Path>) -> Result<DocumentPlane> {
    let local = local
        .map(|path| -> Result<LocalBaseline> {
            Ok(LocalBaseline {
                handle_id: path.display().to_string(),
                last_saved_content: read_text(path)?,
            })
        })
        .transpose()?;
    let portal = remote
        .map(|path| -> Result<PortalBaseline> {
            Ok(PortalBaseline {
                portal_id: String::new(),
                module_id: 0,
                module_type: ModuleType::DataSource,
                script_type: ScriptType::Collection,
                last_known_content: read_text(path)?,
            })
        })
        .transpose()?;

    Ok(match (local, portal) {
        (None, None) => DocumentPlane::Scratch,
        (Some(local), None) => DocumentPlane::Local(local),
        (None, Some(portal)) => DocumentPlane::Portal(portal),
        (Some(local), Some(portal)) => DocumentPlane::LocalAndPortal { local, portal },
    })
}

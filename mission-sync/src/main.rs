use std::path::PathBuf;
use std::process::ExitCode;

use mission_core::StoreClient;
use mission_sync::config::SyncConfig;
use mission_sync::job::SyncJob;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RunOptions {
    workspace: Option<PathBuf>,
    prune: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run(RunOptions),
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut options = RunOptions::default();
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliMode::Help),
            "--prune" => options.prune = true,
            "--workspace" => {
                let Some(path) = args.next() else {
                    anyhow::bail!("--workspace needs a path");
                };
                options.workspace = Some(PathBuf::from(path));
            }
            other => match other.strip_prefix("--workspace=") {
                Some(path) if !path.is_empty() => options.workspace = Some(PathBuf::from(path)),
                _ => anyhow::bail!("unknown argument: {other}"),
            },
        }
    }
    Ok(CliMode::Run(options))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_help() {
    println!("Usage: mission-sync [--workspace PATH] [--prune]");
    println!("  --workspace PATH   Workspace root to sync (default: MC_WORKSPACE_ROOT or ../..)");
    println!("  --prune            Delete remote entries whose local file is gone");
    println!("  -h, --help         Show this help and exit");
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let options = match parse_cli_mode(std::env::args())? {
        CliMode::Help => {
            print_help();
            return Ok(ExitCode::SUCCESS);
        }
        CliMode::Run(options) => options,
    };
    init_tracing();

    let mut config = SyncConfig::from_env(options.workspace)?;
    config.prune |= options.prune;
    info!(
        workspace = %config.workspace_root.display(),
        store = %config.store_url,
        prune = config.prune,
        "starting workspace sync"
    );

    let mut client = StoreClient::new(&config.store_url, &config.site_url)?;
    if let Some(key) = &config.deploy_key {
        client = client.with_deploy_key(key.clone());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current batch");
            on_signal.cancel();
        }
    });

    let job = SyncJob::new(config, client).with_cancellation(cancel);
    match job.run().await {
        Ok(report) => {
            println!("{report}");
            if report.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "sync failed");
            job.report_fatal(&err).await;
            Ok(ExitCode::FAILURE)
        }
    }
}

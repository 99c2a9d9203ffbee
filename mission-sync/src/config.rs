use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::sync::orchestrator::{DEFAULT_BATCH_SIZE, OrchestratorConfig};
use crate::sync::retry::RetryPolicy;
use crate::sync::scanner::ScanConfig;

const DEFAULT_MAX_ATTEMPTS: u64 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 1000;
const DEFAULT_CONCURRENCY: usize = 1;
// The job is run from `apps/mission-control`, two levels below the workspace.
const WORKSPACE_OFFSET: &str = "../..";

/// Everything one run needs, resolved once up front.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub store_url: String,
    pub site_url: String,
    pub deploy_key: Option<String>,
    pub scan: ScanConfig,
    pub orchestrator: OrchestratorConfig,
    /// Delete remote entries whose file is gone instead of only reporting them.
    pub prune: bool,
}

impl SyncConfig {
    pub fn new(workspace_root: PathBuf, store_url: impl Into<String>) -> Self {
        let store_url = store_url.into();
        Self {
            workspace_root,
            site_url: site_url_for(&store_url),
            store_url,
            deploy_key: None,
            scan: ScanConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            prune: false,
        }
    }

    pub fn from_env(workspace_override: Option<PathBuf>) -> anyhow::Result<Self> {
        let invoked_from = std::env::current_dir().context("current directory is unavailable")?;
        Self::from_lookup(
            |name| std::env::var(name).ok(),
            &invoked_from,
            workspace_override,
        )
    }

    pub fn from_lookup<F>(
        lookup: F,
        invoked_from: &Path,
        workspace_override: Option<PathBuf>,
    ) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workspace = workspace_override
            .or_else(|| lookup("MC_WORKSPACE_ROOT").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(WORKSPACE_OFFSET));
        // Canonicalized by the job.
        let workspace_root = invoked_from.join(workspace);

        let store_url = first_set(&lookup, &["CONVEX_URL", "NEXT_PUBLIC_CONVEX_URL"])
            .context("CONVEX_URL is not set")?;
        let site_url = first_set(&lookup, &["CONVEX_SITE_URL", "NEXT_PUBLIC_CONVEX_SITE_URL"])
            .unwrap_or_else(|| site_url_for(&store_url));
        let deploy_key = first_set(&lookup, &["CONVEX_DEPLOY_KEY"]);

        let max_attempts = read_u64(&lookup, "MC_SYNC_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS);
        let mut retry = RetryPolicy::new(
            u32::try_from(max_attempts).unwrap_or(DEFAULT_MAX_ATTEMPTS as u32),
            Duration::from_millis(read_u64(
                &lookup,
                "MC_SYNC_RETRY_BASE_MS",
                DEFAULT_RETRY_BASE_MS,
            )),
        )
        .with_jitter(read_bool(&lookup, "MC_SYNC_RETRY_JITTER", false));
        if let Some(max_ms) = lookup("MC_SYNC_RETRY_MAX_MS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
        {
            retry = retry.with_max_delay(Duration::from_millis(max_ms));
        }

        let orchestrator = OrchestratorConfig {
            batch_size: read_usize(&lookup, "MC_SYNC_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            item_concurrency: read_usize(&lookup, "MC_SYNC_CONCURRENCY", DEFAULT_CONCURRENCY),
            retry,
        };

        Ok(Self {
            workspace_root,
            store_url,
            site_url,
            deploy_key,
            scan: ScanConfig::default(),
            orchestrator,
            prune: read_bool(&lookup, "MC_SYNC_PRUNE", false),
        })
    }
}

/// HTTP actions live on the `.convex.site` twin of a `.convex.cloud`
/// deployment.
pub fn site_url_for(store_url: &str) -> String {
    store_url.replacen(".convex.cloud", ".convex.site", 1)
}

fn first_set<F>(lookup: &F, names: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .filter_map(|name| lookup(*name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_usize<F>(lookup: &F, name: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    usize::try_from(read_u64(lookup, name, default as u64)).unwrap_or(default)
}

fn read_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

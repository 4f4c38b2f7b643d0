//! Server configuration.
//!
//! Every option can be given as a flag or through the environment. GitHub
//! settings come in two sets, cloud and enterprise; `GITHUB_ENTERPRISE`
//! picks which one is read.

use crate::services::github_client::GitHubClientConfig;
use clap::{Args, Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// API root of github.com.
pub const GITHUB_CLOUD_API: &str = "https://api.github.com";

/// Where releases are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Process memory, lost on restart.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite,
}

/// ops-portal - release management backend with GitHub Issues sync
#[derive(Parser, Debug, Clone)]
#[command(name = "ops-portal")]
#[command(version, about, long_about = None)]
pub struct ServerConfig {
    /// Address the HTTP server listens on
    #[arg(long, env = "OPS_PORTAL_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Storage backend
    #[arg(long, env = "OPS_PORTAL_STORAGE", value_enum, default_value_t = StorageBackend::Memory)]
    pub storage: StorageBackend,

    /// SQLite database file (only used with `--storage sqlite`)
    #[arg(long, env = "OPS_PORTAL_DB_PATH", default_value = "ops-portal.db")]
    pub db_path: PathBuf,

    /// Do not load sample data into an empty store
    #[arg(long, env = "OPS_PORTAL_NO_SEED")]
    pub no_seed: bool,

    /// Timeout for each GitHub API request, in seconds
    #[arg(long, env = "GITHUB_TIMEOUT_SECS", default_value_t = 30)]
    pub github_timeout_secs: u64,

    #[command(flatten)]
    pub github: GitHubArgs,
}

/// Raw GitHub settings as given on the command line or in the environment.
#[derive(Args, Debug, Clone, Default)]
pub struct GitHubArgs {
    /// Use the GitHub Enterprise settings instead of github.com
    #[arg(long = "github-enterprise", env = "GITHUB_ENTERPRISE")]
    pub enterprise: bool,

    /// github.com personal access token
    #[arg(long, env = "GITHUB_CLOUD_TOKEN", hide_env_values = true)]
    pub github_cloud_token: Option<String>,

    /// github.com repository owner
    #[arg(long, env = "GITHUB_CLOUD_OWNER")]
    pub github_cloud_owner: Option<String>,

    /// github.com repository name
    #[arg(long, env = "GITHUB_CLOUD_REPO")]
    pub github_cloud_repo: Option<String>,

    /// GitHub Enterprise personal access token
    #[arg(long, env = "GITHUB_ENTERPRISE_TOKEN", hide_env_values = true)]
    pub github_enterprise_token: Option<String>,

    /// GitHub Enterprise repository owner
    #[arg(long, env = "GITHUB_ENTERPRISE_OWNER")]
    pub github_enterprise_owner: Option<String>,

    /// GitHub Enterprise repository name
    #[arg(long, env = "GITHUB_ENTERPRISE_REPO")]
    pub github_enterprise_repo: Option<String>,

    /// GitHub Enterprise base URL, e.g. https://github.acme.io
    #[arg(long, env = "GITHUB_ENTERPRISE_URL")]
    pub github_enterprise_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GitHubKind {
    #[default]
    Cloud,
    Enterprise,
}

/// The GitHub settings in effect, with the unused set dropped.
#[derive(Clone, Default)]
pub struct GitHubSettings {
    pub kind: GitHubKind,
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub enterprise_url: Option<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GitHubSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSettings")
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("has_token", &!self.token.is_empty())
            .field("enterprise_url", &self.enterprise_url)
            .finish()
    }
}

/// What `/api/v1/github/config-status` reports. Never includes the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubConfigStatus {
    pub configured: bool,
    pub owner: String,
    pub repo: String,
    pub has_token: bool,
    #[serde(rename = "type")]
    pub kind: GitHubKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enterprise_url: Option<String>,
}

fn value(opt: &Option<String>) -> String {
    opt.as_deref().map(str::trim).unwrap_or_default().to_string()
}

impl GitHubArgs {
    /// Pick the cloud or enterprise set.
    pub fn resolve(&self, timeout_secs: u64) -> GitHubSettings {
        if self.enterprise {
            GitHubSettings {
                kind: GitHubKind::Enterprise,
                token: value(&self.github_enterprise_token),
                owner: value(&self.github_enterprise_owner),
                repo: value(&self.github_enterprise_repo),
                enterprise_url: Some(value(&self.github_enterprise_url)),
                timeout_secs,
            }
        } else {
            GitHubSettings {
                kind: GitHubKind::Cloud,
                token: value(&self.github_cloud_token),
                owner: value(&self.github_cloud_owner),
                repo: value(&self.github_cloud_repo),
                enterprise_url: None,
                timeout_secs,
            }
        }
    }
}

impl ServerConfig {
    pub fn github_settings(&self) -> GitHubSettings {
        self.github.resolve(self.github_timeout_secs)
    }
}

impl GitHubSettings {
    /// Token, owner and repo are set and, for enterprise, so is the URL.
    pub fn is_configured(&self) -> bool {
        let basics = !self.token.is_empty() && !self.owner.is_empty() && !self.repo.is_empty();
        match self.kind {
            GitHubKind::Cloud => basics,
            GitHubKind::Enterprise => {
                basics && self.enterprise_url.as_deref().is_some_and(|u| !u.is_empty())
            }
        }
    }

    /// REST API root for the selected deployment.
    pub fn api_base_url(&self) -> String {
        match (&self.kind, &self.enterprise_url) {
            (GitHubKind::Enterprise, Some(url)) => {
                format!("{}/api/v3", url.trim_end_matches('/'))
            }
            _ => GITHUB_CLOUD_API.to_string(),
        }
    }

    /// Client settings, or `None` when the integration is not configured.
    pub fn client_config(&self) -> Option<GitHubClientConfig> {
        self.is_configured().then(|| GitHubClientConfig {
            api_base_url: self.api_base_url(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            token: self.token.clone(),
            timeout_secs: self.timeout_secs,
        })
    }

    pub fn status(&self) -> GitHubConfigStatus {
        GitHubConfigStatus {
            configured: self.is_configured(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            has_token: !self.token.is_empty(),
            kind: self.kind,
            enterprise_url: self.enterprise_url.clone(),
        }
    }
}

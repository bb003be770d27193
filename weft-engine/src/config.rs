//! Minimal process configuration (§2.1 "Process configuration"):
//! environment-driven with programmatic defaults, mirroring
//! `tandem-core::config`'s environment-layer pattern scaled down to what
//! the core actually needs to boot.

use std::path::PathBuf;
use std::time::Duration;

use weft_core::RetryPolicy;
use weft_types::TokenProfile;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub memory_root: PathBuf,
    pub plan_store_root: PathBuf,
    pub agents_dir: PathBuf,
    pub default_timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub token_profile: TokenProfile,
}

impl RuntimeConfig {
    /// Reads `WEFT_*` environment variables, falling back to `.weft/`
    /// under the current directory for anything unset.
    pub fn from_env() -> Self {
        let state_dir = env_path("WEFT_STATE_DIR", PathBuf::from(".weft"));
        let memory_root = env_path("WEFT_MEMORY_ROOT", state_dir.join("memory"));
        let plan_store_root = env_path("WEFT_PLAN_STORE_ROOT", state_dir.join("plans"));
        let agents_dir = env_path("WEFT_AGENTS_DIR", state_dir.join("agents"));

        let timeout_secs: u64 = std::env::var("WEFT_DEFAULT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let retry_attempts: u32 = std::env::var("WEFT_RETRY_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        let retry_delay_ms: u64 = std::env::var("WEFT_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        let token_profile = std::env::var("WEFT_TOKEN_PROFILE")
            .ok()
            .and_then(|name| TokenProfile::preset(&name))
            .unwrap_or_default();

        Self {
            memory_root,
            plan_store_root,
            agents_dir,
            default_timeout: Duration::from_secs(timeout_secs),
            retry_policy: RetryPolicy {
                attempts: retry_attempts,
                delay: Duration::from_millis(retry_delay_ms),
            },
            token_profile,
        }
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

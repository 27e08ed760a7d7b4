use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::deserialize_duration;

/// Name of the config file looked up by default.
pub const CONFIG_FILE_NAME: &str = "statement-analyzer.toml";

/// Backend used when neither the runtime config nor the build supplies one.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Largest statement accepted before any network call (50 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// API URL baked in at compile time, if the build environment provided one.
pub fn build_time_api_url() -> Option<&'static str> {
    option_env!("STATEMENT_ANALYZER_API_URL")
}

/// Resolve the backend base URL.
///
/// Order: runtime config, then build-time environment, then
/// [`DEFAULT_API_URL`]. Blank values count as absent. A trailing slash is
/// dropped so paths can be appended directly.
pub fn resolve_api_url(runtime: Option<&str>, build_time: Option<&str>) -> String {
    let chosen = [runtime, build_time]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|url| !url.is_empty())
        .unwrap_or(DEFAULT_API_URL);
    chosen.trim_end_matches('/').to_string()
}

fn default_app_name() -> String {
    "Bank Statement Analyzer".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_true() -> bool {
    true
}

/// Runtime feature flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Allow requesting PDF reports from the backend.
    #[serde(default = "default_true")]
    pub pdf_generation: bool,

    /// Derive categories, monthly buckets and insights after an upload.
    #[serde(default = "default_true")]
    pub advanced_analytics: bool,

    /// Verbose logging.
    pub debug_mode: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            pdf_generation: true,
            advanced_analytics: true,
            debug_mode: false,
        }
    }
}

/// A named feature flag, for callers that look flags up dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    PdfGeneration,
    AdvancedAnalytics,
    DebugMode,
}

impl FeatureFlags {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::PdfGeneration => self.pdf_generation,
            Feature::AdvancedAnalytics => self.advanced_analytics,
            Feature::DebugMode => self.debug_mode,
        }
    }
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_report_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Request timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on a statement upload, extraction included.
    #[serde(
        default = "default_upload_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub upload: Duration,

    /// Bound on a PDF report request.
    #[serde(
        default = "default_report_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub report: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upload: default_upload_timeout(),
            report: default_report_timeout(),
        }
    }
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

/// Local upload preconditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum statement size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Which identity-provider integration backs the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// No session; requests go out unauthenticated.
    #[default]
    None,
    /// Cookie session behind a same-origin `/auth/*` proxy.
    Proxy,
    /// OIDC authorization-code flow with PKCE.
    Oidc,
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "profile".to_string(),
        "email".to_string(),
        "groups".to_string(),
    ]
}

/// Identity-provider client settings.
///
/// Endpoint paths are relative to `base_url` unless they are absolute URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,

    /// Identity provider (OIDC) or auth proxy origin. Falls back to the API
    /// URL when unset.
    pub base_url: Option<String>,

    pub client_id: Option<String>,

    /// Redirect URI registered with the identity provider.
    pub redirect_url: Option<String>,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub revoke_endpoint: String,

    /// Name of the session cache entry (lets several profiles coexist).
    pub profile: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::None,
            base_url: None,
            client_id: None,
            redirect_url: None,
            scopes: default_scopes(),
            authorize_endpoint: "/oauth2/authorize".to_string(),
            token_endpoint: "/oauth2/token".to_string(),
            userinfo_endpoint: "/oauth2/userinfo".to_string(),
            revoke_endpoint: "/oauth2/revoke".to_string(),
            profile: "default".to_string(),
        }
    }
}

impl AuthConfig {
    /// Join an endpoint onto the identity provider origin.
    pub fn endpoint_url(&self, base_url: &str, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

/// Deploy-time configuration as written in `statement-analyzer.toml`.
///
/// Every field is optional; whatever is missing falls back to build-time
/// values or defaults during [`ResolvedConfig::resolve`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Backend base URL (e.g. `https://api.example.com` or a gateway path).
    pub api_url: Option<String>,

    pub app_name: Option<String>,

    pub version: Option<String>,

    pub features: FeatureFlags,

    pub timeouts: TimeoutConfig,

    pub upload: UploadConfig,

    pub auth: AuthConfig,
}

impl RuntimeConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: RuntimeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or `None` if the file doesn't exist.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Values captured from the build environment.
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    pub api_url: Option<String>,
}

impl BuildConfig {
    /// The values compiled into this binary.
    pub fn compiled() -> Self {
        Self {
            api_url: build_time_api_url().map(str::to_string),
        }
    }
}

/// Fully resolved configuration, constructed once at start-up and passed by
/// reference to every consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    pub api_url: String,
    pub app_name: String,
    pub version: String,
    pub features: FeatureFlags,
    pub timeouts: TimeoutConfig,
    pub upload: UploadConfig,
    pub auth: AuthConfig,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::resolve(None, &BuildConfig::default())
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./statement-analyzer.toml` if it exists in current directory
/// 2. `~/.config/statement-analyzer/statement-analyzer.toml`
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("statement-analyzer").join(CONFIG_FILE_NAME);
    }

    local_config
}

impl ResolvedConfig {
    /// Merge the runtime config (if any) over the build config and defaults.
    pub fn resolve(runtime: Option<RuntimeConfig>, build: &BuildConfig) -> Self {
        let runtime = runtime.unwrap_or_default();
        let api_url = resolve_api_url(runtime.api_url.as_deref(), build.api_url.as_deref());

        Self {
            api_url,
            app_name: runtime
                .app_name
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(default_app_name),
            version: runtime
                .version
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(default_version),
            features: runtime.features,
            timeouts: runtime.timeouts,
            upload: runtime.upload,
            auth: runtime.auth,
        }
    }

    /// Load the runtime config at `path` (when present) and resolve it
    /// against the compiled build config.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let runtime = RuntimeConfig::load_optional(path)?;
        Ok(Self::resolve(runtime, &BuildConfig::compiled()))
    }

    /// Origin of the identity provider or auth proxy.
    pub fn auth_base_url(&self) -> String {
        self.auth
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.api_url.clone())
    }
}

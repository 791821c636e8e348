//! Server configuration.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;
use vizgate_tableau::{DEFAULT_API_VERSION, SiteContextMode, TableauSettings};

use crate::directory::WorkbookDescriptor;

/// Longest accepted session lifetime (30 days).
pub const MAX_SESSION_EXPIRY_SECS: u64 = 30 * 24 * 60 * 60;
/// Longest accepted embed token lifetime. Tableau caps Connected App tokens at 10 minutes.
pub const MAX_EMBED_EXPIRY_MINUTES: u64 = 10;
/// Longest accepted directory cache TTL (1 day).
pub const MAX_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:5000").
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Session authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Embed token configuration.
    #[serde(default)]
    pub embed: EmbedConfig,

    /// Tableau Server connection.
    #[serde(default)]
    pub tableau: TableauConfig,

    /// Workbook directory configuration.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Serve the portal from a directory instead of the built-in assets.
    #[serde(default)]
    pub static_files: Option<StaticFilesConfig>,

    /// CORS origins (empty = allow all).
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            auth: AuthConfig::default(),
            embed: EmbedConfig::default(),
            tableau: TableauConfig::default(),
            directory: DirectoryConfig::default(),
            static_files: None,
            cors_origins: vec![],
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Load from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_env_with<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = var("VIZGATE_LISTEN_ADDR") {
            config.listen_addr = addr;
        } else if let Some(port) = var("PORT") {
            let port: u16 = port.trim().parse().context("PORT must be a port number")?;
            config.listen_addr = format!("0.0.0.0:{port}");
        }

        // Session tokens
        if let Some(secret) = var("JWT_SECRET") {
            config.auth.session_secret = Some(secret);
        }
        if let Some(expiry) = var("JWT_EXPIRY") {
            config.auth.session_expiry = parse_number("JWT_EXPIRY", &expiry)?;
        }

        // Embed tokens
        if let Some(secret) = var("TABLEAU_SECRET") {
            config.embed.secret = Some(secret);
        }
        config.embed.client_id = var("TABLEAU_CLIENT_ID");
        config.embed.secret_id = var("TABLEAU_SECRET_ID");
        if let Some(minutes) = var("TABLEAU_TOKEN_EXPIRY_MINUTES") {
            config.embed.expiry_minutes = parse_number("TABLEAU_TOKEN_EXPIRY_MINUTES", &minutes)?;
        }
        if let Some(workbook) = var("TABLEAU_WORKBOOK") {
            config.embed.default_workbook = workbook;
        }
        if let Some(view) = var("TABLEAU_VIEW") {
            config.embed.default_view = view;
        }

        // Tableau Server
        config.tableau.server_url = var("TABLEAU_SERVER_URL");
        if let Some(username) = var("TABLEAU_USERNAME") {
            config.tableau.username = username;
        }
        if let Some(password) = var("TABLEAU_PASSWORD") {
            config.tableau.password = password;
        }
        if let Some(site) = lookup("TABLEAU_SITE") {
            config.tableau.site = site.trim().to_string();
        }
        if let Some(mode) = var("TABLEAU_SITE_CONTEXT") {
            config.tableau.site_context = mode
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("TABLEAU_SITE_CONTEXT")?;
        }
        if let Some(version) = var("TABLEAU_API_VERSION") {
            config.tableau.api_version = version;
        }
        if let Some(flag) = var("TABLEAU_ACCEPT_INVALID_CERTS") {
            config.tableau.accept_invalid_certs = parse_flag("TABLEAU_ACCEPT_INVALID_CERTS", &flag)?;
        }
        if let Some(flag) = var("TABLEAU_RESOLVE_VIEWS") {
            config.tableau.resolve_views = parse_flag("TABLEAU_RESOLVE_VIEWS", &flag)?;
        }

        // Directory and UI
        if let Some(ttl) = var("VIZGATE_CACHE_TTL") {
            config.directory.cache_ttl = parse_number("VIZGATE_CACHE_TTL", &ttl)?;
        }
        if let Some(dir) = var("VIZGATE_STATIC_DIR") {
            config.static_files = Some(StaticFilesConfig {
                root: PathBuf::from(dir),
                index: default_index(),
            });
        }

        Ok(config)
    }

    /// Check everything that would otherwise fail on first use.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.socket_addr()?;

        if self.auth.session_secret.as_deref().is_none_or(str::is_empty) {
            bail!("session signing secret is not configured (JWT_SECRET)");
        }
        if self.embed.secret.as_deref().is_none_or(str::is_empty) {
            bail!("embed token signing secret is not configured (TABLEAU_SECRET)");
        }
        if !(1..=MAX_SESSION_EXPIRY_SECS).contains(&self.auth.session_expiry) {
            bail!(
                "auth.session_expiry must be between 1 and {} seconds (JWT_EXPIRY)",
                MAX_SESSION_EXPIRY_SECS
            );
        }
        if !(1..=MAX_EMBED_EXPIRY_MINUTES).contains(&self.embed.expiry_minutes) {
            bail!(
                "embed.expiry_minutes must be between 1 and {} (TABLEAU_TOKEN_EXPIRY_MINUTES)",
                MAX_EMBED_EXPIRY_MINUTES
            );
        }
        if self.directory.cache_ttl > MAX_CACHE_TTL_SECS {
            bail!(
                "directory.cache_ttl must be at most {} seconds (VIZGATE_CACHE_TTL)",
                MAX_CACHE_TTL_SECS
            );
        }
        if self.auth.users.is_empty() {
            bail!("no users configured");
        }

        let mut seen = HashSet::new();
        for user in &self.auth.users {
            if !seen.insert(user.username.as_str()) {
                bail!("duplicate username: {}", user.username);
            }
            if user.password.is_none() && user.password_hash.is_none() {
                bail!("user '{}' has neither password nor password_hash", user.username);
            }
        }

        if let Some(url) = &self.tableau.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("tableau.server_url must start with http:// or https://");
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", self.listen_addr))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a number"))
}

fn parse_flag(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{key}: expected a boolean, got '{other}'"),
    }
}

/// Session authentication configuration.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for session tokens.
    #[serde(default)]
    pub session_secret: Option<String>,
    /// Session token lifetime in seconds.
    #[serde(default = "default_session_expiry")]
    pub session_expiry: u64,
    /// Accounts allowed to log in.
    #[serde(default = "default_users")]
    pub users: Vec<UserConfig>,
}

fn default_session_expiry() -> u64 {
    86400 // 24 hours
}

fn default_users() -> Vec<UserConfig> {
    vec![UserConfig {
        id: 1,
        username: "admin".to_string(),
        password: Some("password".to_string()),
        password_hash: None,
    }]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: None,
            session_expiry: default_session_expiry(),
            users: default_users(),
        }
    }
}

impl AuthConfig {
    /// Whether the built-in demo account is still in place.
    pub fn uses_demo_account(&self) -> bool {
        self.users.iter().any(|u| {
            u.username == "admin" && u.password.as_deref() == Some("password")
        })
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("session_secret", &redacted(&self.session_secret))
            .field("session_expiry", &self.session_expiry)
            .field("users", &self.users)
            .finish()
    }
}

/// A login account. Give either a plaintext `password` (hashed at startup)
/// or an Argon2 PHC `password_hash`.
#[derive(Clone, Deserialize)]
pub struct UserConfig {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_hash: Option<String>,
}

impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfig")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("password_hash", &self.password_hash.is_some())
            .finish()
    }
}

/// Embed token configuration.
#[derive(Clone, Deserialize)]
pub struct EmbedConfig {
    /// HMAC secret shared with the Tableau Connected App.
    #[serde(default)]
    pub secret: Option<String>,
    /// Connected App client id, used as the token issuer when set.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Connected App secret id, sent as the JWT `kid` when set.
    #[serde(default)]
    pub secret_id: Option<String>,
    /// Embed token lifetime in minutes.
    #[serde(default = "default_embed_expiry")]
    pub expiry_minutes: u64,
    /// Scopes granted to the embedding client.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Workbook used when a request names none.
    #[serde(default = "default_workbook")]
    pub default_workbook: String,
    /// View used when a request names none.
    #[serde(default = "default_view")]
    pub default_view: String,
}

fn default_embed_expiry() -> u64 {
    10
}

fn default_scopes() -> Vec<String> {
    vec!["tableau:views:embed".to_string()]
}

fn default_workbook() -> String {
    "Superstore".to_string()
}

fn default_view() -> String {
    "Dashboard".to_string()
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            secret: None,
            client_id: None,
            secret_id: None,
            expiry_minutes: default_embed_expiry(),
            scopes: default_scopes(),
            default_workbook: default_workbook(),
            default_view: default_view(),
        }
    }
}

impl std::fmt::Debug for EmbedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedConfig")
            .field("secret", &redacted(&self.secret))
            .field("client_id", &self.client_id)
            .field("secret_id", &self.secret_id)
            .field("expiry_minutes", &self.expiry_minutes)
            .field("scopes", &self.scopes)
            .field("default_workbook", &self.default_workbook)
            .field("default_view", &self.default_view)
            .finish()
    }
}

/// Tableau Server connection configuration.
#[derive(Clone, Deserialize)]
pub struct TableauConfig {
    /// Server base URL. Without it the directory serves the fallback list.
    #[serde(default)]
    pub server_url: Option<String>,
    /// Service account name.
    #[serde(default)]
    pub username: String,
    /// Service account password.
    #[serde(default)]
    pub password: String,
    /// Site content URL ("" = default site).
    #[serde(default)]
    pub site: String,
    /// How sign-in names the site.
    #[serde(default)]
    pub site_context: SiteContextMode,
    /// REST API version.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Skip TLS certificate validation for self-signed servers.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Request timeout in seconds.
    #[serde(default = "default_tableau_timeout")]
    pub timeout: u64,
    /// Look up each workbook's first view instead of guessing its name.
    #[serde(default)]
    pub resolve_views: bool,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_tableau_timeout() -> u64 {
    30
}

impl Default for TableauConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            username: String::new(),
            password: String::new(),
            site: String::new(),
            site_context: SiteContextMode::default(),
            api_version: default_api_version(),
            accept_invalid_certs: false,
            timeout: default_tableau_timeout(),
            resolve_views: false,
        }
    }
}

impl TableauConfig {
    /// Client settings, or `None` when no server is configured.
    pub fn settings(&self) -> Option<TableauSettings> {
        let server_url = self.server_url.as_deref()?;

        let mut settings = TableauSettings::new(server_url)
            .with_credentials(&self.username, &self.password)
            .with_site(&self.site, self.site_context);
        settings.api_version = self.api_version.clone();
        settings.accept_invalid_certs = self.accept_invalid_certs;
        settings.timeout = Duration::from_secs(self.timeout);
        Some(settings)
    }

    /// Server URL without a trailing slash, or "" when unset.
    pub fn base_url(&self) -> &str {
        self.server_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or("")
    }
}

impl std::fmt::Debug for TableauConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableauConfig")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("site", &self.site)
            .field("site_context", &self.site_context)
            .field("api_version", &self.api_version)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout", &self.timeout)
            .field("resolve_views", &self.resolve_views)
            .finish()
    }
}

/// Workbook directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Cache lifetime in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// Replaces the built-in fallback list.
    #[serde(default)]
    pub fallback_workbooks: Option<Vec<WorkbookDescriptor>>,
    /// Sign out of Tableau after each refresh.
    #[serde(default = "default_true")]
    pub sign_out_after_refresh: bool,
}

fn default_cache_ttl() -> u64 {
    300 // 5 minutes
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            fallback_workbooks: None,
            sign_out_after_refresh: true,
        }
    }
}

impl DirectoryConfig {
    pub fn cache_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}

/// Static files configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticFilesConfig {
    /// Root directory for static files.
    pub root: PathBuf,
    /// Index file name.
    #[serde(default = "default_index")]
    pub index: String,
}

fn default_index() -> String {
    "index.html".to_string()
}

fn redacted(value: &Option<String>) -> &'static str {
    match value {
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}

//! Configuration for Gatehouse
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{
    AuthBackend, FileStore, HttpAuthBackend, LocalAccountBackend, Role, TokenIssuer,
};
use crate::flags::{FileFlagSource, FlagSource, HttpFlagSource};
use crate::logging::{JsonlWarningSink, TeeWarningSink, TracingWarningSink, WarningSink};
use crate::oauth::OAuthClientConfig;
use crate::types::{GatehouseError, Result};

/// Gatehouse - feature flags, sessions and sign-in for the storefront
#[derive(Parser, Debug, Clone)]
#[command(name = "gatehouse")]
#[command(about = "Feature-flag evaluation, session and OAuth sign-in tooling")]
pub struct Args {
    /// Flag snapshot file (bare array or {version, flags} envelope)
    #[arg(long, env = "FLAGS_FILE")]
    pub flags_file: Option<PathBuf>,

    /// Flag snapshot URL, fetched once with GET
    #[arg(long, env = "FLAGS_URL")]
    pub flags_url: Option<String>,

    /// Where the session is persisted
    #[arg(long, env = "SESSION_FILE", default_value = ".gatehouse/session.json")]
    pub session_file: PathBuf,

    /// Remote auth API base URL. Without it accounts are kept in ACCOUNTS_FILE.
    #[arg(long, env = "AUTH_API_URL")]
    pub auth_api_url: Option<String>,

    /// Where local accounts are kept when no auth API is configured
    #[arg(long, env = "ACCOUNTS_FILE", default_value = ".gatehouse/accounts.json")]
    pub accounts_file: PathBuf,

    /// Secret for locally issued session tokens (at least 32 characters)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Locally issued token lifetime in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// OAuth provider authorize endpoint
    #[arg(long, env = "OAUTH_AUTHORIZE_URL")]
    pub oauth_authorize_url: Option<String>,

    /// OAuth provider token endpoint
    #[arg(long, env = "OAUTH_TOKEN_URL")]
    pub oauth_token_url: Option<String>,

    /// OAuth client id
    #[arg(long, env = "OAUTH_CLIENT_ID")]
    pub oauth_client_id: Option<String>,

    /// Redirect URI registered with the provider
    #[arg(long, env = "OAUTH_REDIRECT_URI")]
    pub oauth_redirect_uri: Option<String>,

    /// Space-separated OAuth scopes
    #[arg(long, env = "OAUTH_SCOPE")]
    pub oauth_scope: Option<String>,

    /// Route a successful OAuth sign-in lands on
    #[arg(long, env = "OAUTH_SUCCESS_REDIRECT", default_value = "/")]
    pub oauth_success_redirect: String,

    /// Comma-separated email domains treated as internal users
    #[arg(long, env = "INTERNAL_DOMAINS", default_value = "")]
    pub internal_domains: String,

    /// Discard stored sessions past their expiry on restore
    #[arg(long, env = "ENFORCE_TOKEN_EXPIRY", default_value_t = true, action = clap::ArgAction::Set)]
    pub enforce_token_expiry: bool,

    /// Request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// How long a failed OAuth callback shows before returning home
    #[arg(long, env = "CALLBACK_REDIRECT_DELAY_MS", default_value = "3000")]
    pub callback_redirect_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Append flag configuration warnings to this JSONL file
    #[arg(long, env = "WARNINGS_LOG")]
    pub warnings_log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Evaluate one flag for the stored session
    Evaluate {
        /// Flag key, e.g. org.links.store
        key: String,

        /// Audience id for audience-scoped flags
        #[arg(long)]
        audience: Option<String>,

        /// Space id for space-scoped flags
        #[arg(long)]
        space: Option<String>,
    },

    /// List quick actions for a role (defaults to the stored session's role)
    QuickActions {
        #[arg(long)]
        role: Option<String>,
    },

    /// Sign in against the auth backend
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "GATEHOUSE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account and sign in
    Register {
        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        #[arg(long)]
        email: String,

        #[arg(long, env = "GATEHOUSE_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long, env = "GATEHOUSE_CONFIRM_PASSWORD", hide_env_values = true)]
        confirm_password: String,

        /// maker, service_provider or educator
        #[arg(long)]
        role: Option<Role>,

        #[arg(long)]
        company: Option<String>,
    },

    /// Print an authorization URL and remember its state
    AuthorizeUrl,

    /// Complete an OAuth redirect, given its query string
    Callback { query: String },

    /// Clear the stored session
    Logout,

    /// Show the stored session
    Whoami,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Internal email domains, trimmed and without empties
    pub fn internal_domain_list(&self) -> Vec<String> {
        self.internal_domains
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Where flags come from, if configured
    pub fn flag_source(&self) -> Result<Option<Box<dyn FlagSource>>> {
        if let Some(path) = &self.flags_file {
            return Ok(Some(Box::new(FileFlagSource::new(path.clone()))));
        }
        if let Some(url) = &self.flags_url {
            return Ok(Some(Box::new(HttpFlagSource::new(
                url.clone(),
                self.request_timeout(),
            )?)));
        }
        Ok(None)
    }

    /// Tracing sink, teed into a JSONL file when WARNINGS_LOG is set
    pub fn warning_sink(&self) -> Result<Arc<dyn WarningSink>> {
        let tracing_sink: Arc<dyn WarningSink> = Arc::new(TracingWarningSink::new());
        match &self.warnings_log {
            Some(path) => {
                let file_sink = JsonlWarningSink::open(path)?;
                Ok(Arc::new(TeeWarningSink::new(vec![
                    tracing_sink,
                    Arc::new(file_sink),
                ])))
            }
            None => Ok(tracing_sink),
        }
    }

    pub fn auth_backend(&self) -> Result<Box<dyn AuthBackend>> {
        if let Some(url) = &self.auth_api_url {
            return Ok(Box::new(HttpAuthBackend::new(
                url.clone(),
                self.request_timeout(),
            )?));
        }

        let issuer = match &self.jwt_secret {
            Some(secret) => TokenIssuer::new(secret.clone(), self.jwt_expiry_seconds)?,
            None => TokenIssuer::new_dev(),
        };
        Ok(Box::new(LocalAccountBackend::with_store(
            issuer,
            Arc::new(FileStore::new(&self.accounts_file)),
        )))
    }

    /// OAuth settings; all four endpoints/ids must be present
    pub fn oauth_config(&self) -> Result<OAuthClientConfig> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| GatehouseError::Config(format!("{} is required for OAuth", name)))
        };

        let mut config = OAuthClientConfig::new(
            required(&self.oauth_authorize_url, "OAUTH_AUTHORIZE_URL")?,
            required(&self.oauth_token_url, "OAUTH_TOKEN_URL")?,
            required(&self.oauth_client_id, "OAUTH_CLIENT_ID")?,
            required(&self.oauth_redirect_uri, "OAUTH_REDIRECT_URI")?,
        )
        .with_timeout(self.request_timeout())
        .with_redirect_delay(Duration::from_millis(self.callback_redirect_delay_ms))
        .with_success_redirect(self.oauth_success_redirect.clone());

        if let Some(scope) = &self.oauth_scope {
            config = config.with_scope(scope.clone());
        }
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.flags_file.is_some() && self.flags_url.is_some() {
            return Err("Set only one of FLAGS_FILE and FLAGS_URL".to_string());
        }

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }

        if let Some(secret) = &self.jwt_secret {
            if secret.len() < 32 {
                return Err("JWT_SECRET must be at least 32 characters".to_string());
            }
        }

        if matches!(self.command, Command::AuthorizeUrl | Command::Callback { .. }) {
            self.oauth_config().map_err(|e| e.to_string())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["gatehouse"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["logout"]);
        assert_eq!(args.command, Command::Logout);
        assert!(args.enforce_token_expiry);
        assert_eq!(args.request_timeout(), Duration::from_secs(10));
        assert_eq!(args.session_file, PathBuf::from(".gatehouse/session.json"));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_register_args() {
        let args = parse(&[
            "register",
            "--first-name",
            "Ana",
            "--last-name",
            "Lima",
            "--email",
            "ana@example.com",
            "--password",
            "secret1",
            "--confirm-password",
            "secret1",
            "--role",
            "service-provider",
        ]);
        match args.command {
            Command::Register { role, company, .. } => {
                assert_eq!(role, Some(Role::ServiceProvider));
                assert_eq!(company, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(args.accounts_file, PathBuf::from(".gatehouse/accounts.json"));

        let unknown = Args::try_parse_from([
            "gatehouse", "register", "--first-name", "A", "--last-name", "L", "--email",
            "a@example.com", "--password", "secret1", "--confirm-password", "secret1", "--role",
            "wizard",
        ]);
        assert!(unknown.is_err());
    }

    #[tokio::test]
    async fn test_local_accounts_outlive_the_backend() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = dir.path().join("accounts.json");
        let accounts = accounts.to_str().unwrap();
        let registration = crate::auth::RegistrationData {
            first_name: "Ana".into(),
            last_name: "Lima".into(),
            email: "ana@example.com".into(),
            password: "secret1".into(),
            confirm_password: "secret1".into(),
            role: None,
            company: None,
        }
        .validate()
        .unwrap();

        let first = parse(&["--accounts-file", accounts, "whoami"]).auth_backend().unwrap();
        first.register(&registration).await.unwrap();

        let second = parse(&["--accounts-file", accounts, "whoami"]).auth_backend().unwrap();
        let grant = second.login("ana@example.com", "secret1").await.unwrap();
        assert_eq!(grant.user.email, "ana@example.com");
    }

    #[test]
    fn test_internal_domains() {
        let args = parse(&["--internal-domains", "Example.com, ,staff.example.org", "whoami"]);
        assert_eq!(
            args.internal_domain_list(),
            vec!["example.com".to_string(), "staff.example.org".to_string()]
        );
    }

    #[test]
    fn test_expiry_can_be_disabled() {
        let args = parse(&["--enforce-token-expiry", "false", "whoami"]);
        assert!(!args.enforce_token_expiry);
    }

    #[test]
    fn test_evaluate_args() {
        let args = parse(&["evaluate", "org.links.store", "--space", "s-1"]);
        assert_eq!(
            args.command,
            Command::Evaluate {
                key: "org.links.store".into(),
                audience: None,
                space: Some("s-1".into()),
            }
        );
    }

    #[test]
    fn test_validate_rejects_conflicts() {
        let args = parse(&["--flags-file", "f.json", "--flags-url", "http://x", "logout"]);
        assert!(args.validate().is_err());

        let args = parse(&["--jwt-secret", "short", "logout"]);
        assert!(args.validate().is_err());

        let args = parse(&["--request-timeout-ms", "0", "logout"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_oauth_commands_need_oauth_config() {
        let args = parse(&["authorize-url"]);
        let err = args.validate().unwrap_err();
        assert!(err.contains("OAUTH_AUTHORIZE_URL"));

        let args = parse(&[
            "--oauth-authorize-url",
            "https://id.example.com/authorize",
            "--oauth-token-url",
            "https://id.example.com/token",
            "--oauth-client-id",
            "web",
            "--oauth-redirect-uri",
            "https://app.example.com/cb",
            "--callback-redirect-delay-ms",
            "1500",
            "authorize-url",
        ]);
        assert!(args.validate().is_ok());
        let config = args.oauth_config().unwrap();
        assert_eq!(config.redirect_delay, Duration::from_millis(1500));
        assert_eq!(config.success_redirect, "/");
    }
}

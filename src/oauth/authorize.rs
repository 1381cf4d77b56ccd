//! Authorization redirect

use rand::RngCore;
use tracing::debug;

use super::OAuthClientConfig;
use crate::auth::{keys, KeyValueStore};
use crate::types::Result;

/// Where to send the user, and the state the callback must echo back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

impl AuthorizationRequest {
    /// Build the authorize URL and remember its state for the callback.
    /// A previous pending state is replaced.
    pub fn build<S: KeyValueStore + ?Sized>(config: &OAuthClientConfig, storage: &S) -> Result<Self> {
        let state = generate_state();
        storage.set(keys::OAUTH_STATE, &state)?;

        let separator = if config.authorize_url.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{}{}response_type=code&client_id={}&redirect_uri={}&state={}",
            config.authorize_url,
            separator,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.redirect_uri),
            state,
        );
        if let Some(scope) = &config.scope {
            url.push_str("&scope=");
            url.push_str(&urlencoding::encode(scope));
        }

        debug!(client_id = %config.client_id, "Built authorization URL");
        Ok(Self { url, state })
    }
}

/// 128 random bits, hex encoded
fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStore;

    fn config() -> OAuthClientConfig {
        OAuthClientConfig::new(
            "https://id.example.com/authorize",
            "https://id.example.com/token",
            "gatehouse-web",
            "https://app.example.com/auth/callback",
        )
    }

    #[test]
    fn test_build_stores_state() {
        let store = MemoryStore::new();
        let request = AuthorizationRequest::build(&config(), &store).unwrap();

        assert_eq!(request.state.len(), 32);
        assert_eq!(
            store.get(keys::OAUTH_STATE).unwrap().as_deref(),
            Some(request.state.as_str())
        );
        assert!(request.url.starts_with("https://id.example.com/authorize?response_type=code"));
        assert!(request
            .url
            .contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fauth%2Fcallback"));
        assert!(request.url.ends_with(&format!("state={}", request.state)));
    }

    #[test]
    fn test_fresh_state_each_time() {
        let store = MemoryStore::new();
        let first = AuthorizationRequest::build(&config(), &store).unwrap();
        let second = AuthorizationRequest::build(&config(), &store).unwrap();

        assert_ne!(first.state, second.state);
        assert_eq!(
            store.get(keys::OAUTH_STATE).unwrap().as_deref(),
            Some(second.state.as_str())
        );
    }

    #[test]
    fn test_scope_and_existing_query() {
        let mut cfg = config().with_scope("openid profile");
        cfg.authorize_url = "https://id.example.com/authorize?tenant=acme".into();
        let request = AuthorizationRequest::build(&cfg, &MemoryStore::new()).unwrap();

        assert!(request.url.contains("?tenant=acme&response_type=code"));
        assert!(request.url.ends_with("&scope=openid%20profile"));
    }
}

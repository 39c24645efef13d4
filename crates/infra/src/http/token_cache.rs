//! Token cache for partner API authentication
//!
//! Partner clients authenticate with short-lived tokens. This cache owns
//! expiry and refresh and is injected into the client rather than held in
//! shared static state, so concurrent reconciliation code paths cannot race
//! on a half-refreshed token. Refreshes are single-flight: callers queue on
//! the internal lock while one refresh is in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use umbono_domain::Result;

/// A freshly issued token and its validity window.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_in: Duration,
}

/// Source of fresh tokens (an OAuth client, an API key exchange, ...).
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken>;
}

struct CachedToken {
    secret: String,
    expires_at: Instant,
}

/// Caching token provider with early refresh.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    /// Tokens are refreshed this long before their actual expiry, so a
    /// token handed out is still valid for the duration of a partner call.
    refresh_margin: Duration,
    state: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>, refresh_margin: Duration) -> Self {
        Self { source, refresh_margin, state: Mutex::new(None) }
    }

    /// Get a valid token, refreshing through the source when the cached one
    /// is missing or about to expire.
    pub async fn token(&self) -> Result<String> {
        let mut state = self.state.lock().await;

        if let Some(cached) = state.as_ref() {
            if Instant::now() + self.refresh_margin < cached.expires_at {
                return Ok(cached.secret.clone());
            }
        }

        let fresh = self.source.fetch_token().await?;
        let expires_at = Instant::now() + fresh.expires_in;
        *state = Some(CachedToken { secret: fresh.secret.clone(), expires_at });
        debug!("access token refreshed");

        Ok(fresh.secret)
    }

    /// Drop the cached token, forcing a refresh on the next call. Used when
    /// the partner API rejects a token before its expected expiry.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingSource {
        fetches: AtomicUsize,
        expires_in: Duration,
    }

    impl CountingSource {
        fn new(expires_in: Duration) -> Self {
            Self { fetches: AtomicUsize::new(0), expires_in }
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> Result<AccessToken> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AccessToken { secret: format!("token-{n}"), expires_in: self.expires_in })
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn token_is_fetched_once_while_valid() {
        let source = Arc::new(CountingSource::new(Duration::from_secs(3600)));
        let cache = TokenCache::new(source.clone(), Duration::from_secs(300));

        assert_eq!(cache.token().await.unwrap(), "token-1");
        assert_eq!(cache.token().await.unwrap(), "token-1");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expiring_token_is_refreshed_within_the_margin() {
        // Expires in 1s with a 5s margin: every call refreshes.
        let source = Arc::new(CountingSource::new(Duration::from_secs(1)));
        let cache = TokenCache::new(source.clone(), Duration::from_secs(5));

        assert_eq!(cache.token().await.unwrap(), "token-1");
        assert_eq!(cache.token().await.unwrap(), "token-2");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalidate_forces_a_refresh() {
        let source = Arc::new(CountingSource::new(Duration::from_secs(3600)));
        let cache = TokenCache::new(source.clone(), Duration::from_secs(300));

        assert_eq!(cache.token().await.unwrap(), "token-1");
        cache.invalidate().await;
        assert_eq!(cache.token().await.unwrap(), "token-2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_callers_share_one_refresh() {
        let source = Arc::new(CountingSource::new(Duration::from_secs(3600)));
        let cache = Arc::new(TokenCache::new(source.clone(), Duration::from_secs(300)));

        let a = tokio::spawn({
            let cache = cache.clone();
            async move { cache.token().await.unwrap() }
        });
        let b = tokio::spawn({
            let cache = cache.clone();
            async move { cache.token().await.unwrap() }
        });

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a, b);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }
}

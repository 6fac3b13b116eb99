// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Upstream access-token caching.
//!
//! [`TokenCache`] holds at most one bearer token. A cached token is reused
//! until it is within the safety margin of its expiry; after that the next
//! caller performs a fresh credential exchange.
//!
//! Unlike the fetch and weather layers, a failed exchange is returned to the
//! caller. No authenticated request can succeed without a token, so the
//! fetch cycle that asked for it fails as a whole.

mod client_credentials;

pub use client_credentials::{ClientCredentialsExchange, OPENSKY_TOKEN_URL};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::clock::Clock;

/// Tokens are refreshed once they are this close to expiry.
pub const DEFAULT_SAFETY_MARGIN_SECS: i64 = 60;
/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 1800;

/// Errors from the credential exchange.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("token response missing access_token")]
    MissingToken,
}

/// Result of one credential exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    /// Token lifetime in seconds, if the endpoint reported one.
    pub expires_in: Option<i64>,
}

/// Performs the upstream credential exchange.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self) -> Result<Credential, CredentialError>;
}

/// Timing knobs for [`TokenCache`].
#[derive(Debug, Clone, Copy)]
pub struct TokenCacheConfig {
    pub safety_margin: Duration,
    pub default_lifetime: Duration,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            safety_margin: Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS),
            default_lifetime: Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Single-slot access-token cache.
pub struct TokenCache<E, C> {
    exchange: E,
    clock: C,
    config: TokenCacheConfig,
    // Held across the exchange so concurrent callers wait for one refresh
    slot: Mutex<Option<CachedToken>>,
}

impl<E, C> std::fmt::Debug for TokenCache<E, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: CredentialExchange, C: Clock> TokenCache<E, C> {
    #[must_use]
    pub fn new(exchange: E, clock: C) -> Self {
        Self::with_config(exchange, clock, TokenCacheConfig::default())
    }

    #[must_use]
    pub fn with_config(exchange: E, clock: C, config: TokenCacheConfig) -> Self {
        Self {
            exchange,
            clock,
            config,
            slot: Mutex::new(None),
        }
    }

    /// Return a valid token, exchanging credentials if the cached one is
    /// missing or inside the safety margin.
    pub async fn get_token(&self) -> Result<String, CredentialError> {
        let mut slot = self.slot.lock().await;

        let now = self.clock.now();
        if let Some(cached) = slot.as_ref() {
            if now < cached.expires_at - self.config.safety_margin {
                return Ok(cached.value.clone());
            }
            debug!("Access token expires at {}, refreshing", cached.expires_at);
        }

        let credential = self.exchange.exchange().await?;

        // Expiry is computed after the exchange completes
        let now = self.clock.now();
        let expires_at = match credential.expires_in {
            None => now + self.config.default_lifetime,
            Some(secs) => Duration::try_seconds(secs)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
                .unwrap_or_else(|| {
                    warn!("Token lifetime of {secs}s is out of range, using the default");
                    now + self.config.default_lifetime
                }),
        };
        info!("Obtained access token valid until {expires_at}");

        *slot = Some(CachedToken {
            value: credential.access_token.clone(),
            expires_at,
        });

        Ok(credential.access_token)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Expiry of the cached token, if any.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.slot.lock().await.as_ref().map(|t| t.expires_at)
    }
}

/// Object-safe view of a token cache, used by transports that don't care
/// about the exchange or clock types.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, CredentialError>;
    async fn invalidate(&self);
}

#[async_trait]
impl<E: CredentialExchange, C: Clock> TokenProvider for TokenCache<E, C> {
    async fn token(&self) -> Result<String, CredentialError> {
        self.get_token().await
    }

    async fn invalidate(&self) {
        TokenCache::invalidate(self).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;

    /// Exchange that hands out numbered tokens and counts calls.
    #[derive(Default)]
    struct CountingExchange {
        calls: AtomicUsize,
        expires_in: Option<i64>,
        fail: bool,
        delay: Option<std::time::Duration>,
    }

    #[async_trait]
    impl CredentialExchange for Arc<CountingExchange> {
        async fn exchange(&self) -> Result<Credential, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(CredentialError::Rejected {
                    status: 401,
                    body: "invalid_client".to_string(),
                });
            }
            Ok(Credential {
                access_token: format!("token-{n}"),
                expires_in: self.expires_in,
            })
        }
    }

    fn setup(expires_in: Option<i64>) -> (TokenCache<Arc<CountingExchange>, ManualClock>, Arc<CountingExchange>, ManualClock) {
        let exchange = Arc::new(CountingExchange {
            expires_in,
            ..Default::default()
        });
        let clock = ManualClock::new(Utc::now());
        let cache = TokenCache::new(Arc::clone(&exchange), clock.clone());
        (cache, exchange, clock)
    }

    #[tokio::test]
    async fn test_reuses_token_before_margin() {
        let (cache, exchange, clock) = setup(Some(1800));

        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        let expires_at = cache.expires_at().await.unwrap();

        clock.set(expires_at - Duration::seconds(61));
        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refreshes_inside_margin() {
        let (cache, exchange, clock) = setup(Some(1800));

        cache.get_token().await.unwrap();
        let expires_at = cache.expires_at().await.unwrap();

        clock.set(expires_at - Duration::seconds(59));
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_default_lifetime_when_omitted() {
        let (cache, _exchange, clock) = setup(None);
        let issued_at = clock.now();

        cache.get_token().await.unwrap();

        assert_eq!(
            cache.expires_at().await,
            Some(issued_at + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS))
        );
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_uses_default() {
        for expires_in in [10_000_000_000_000, i64::MAX] {
            let (cache, _exchange, clock) = setup(Some(expires_in));
            let issued_at = clock.now();

            assert_eq!(cache.get_token().await.unwrap(), "token-1");
            assert_eq!(
                cache.expires_at().await,
                Some(issued_at + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS))
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_exchange() {
        let exchange = Arc::new(CountingExchange {
            expires_in: Some(1800),
            delay: Some(std::time::Duration::from_secs(2)),
            ..Default::default()
        });
        let cache = TokenCache::new(Arc::clone(&exchange), ManualClock::new(Utc::now()));

        let (first, second) = tokio::join!(cache.get_token(), cache.get_token());

        assert_eq!(first.unwrap(), "token-1");
        assert_eq!(second.unwrap(), "token-1");
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exchange_failure_propagates() {
        let exchange = Arc::new(CountingExchange {
            fail: true,
            ..Default::default()
        });
        let cache = TokenCache::new(Arc::clone(&exchange), ManualClock::new(Utc::now()));

        let err = cache.get_token().await.unwrap_err();
        assert!(matches!(err, CredentialError::Rejected { status: 401, .. }));
        assert!(cache.expires_at().await.is_none());

        // Nothing was cached, so the next call tries again
        assert!(cache.get_token().await.is_err());
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_exchange() {
        let (cache, exchange, _clock) = setup(Some(1800));

        cache.get_token().await.unwrap();
        cache.invalidate().await;

        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);
    }
}

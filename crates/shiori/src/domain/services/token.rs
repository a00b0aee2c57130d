use std::sync::Arc;

use shiori_auth::TokenEndpoint;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::{
    domain::entities::credential::Credential,
    utils::{Clock, SystemClock},
};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no refresh token held")]
    NoRefreshToken,
    #[error("token endpoint error: {0}")]
    Endpoint(#[from] shiori_auth::Error),
}

/// Catalog account used for the password grant.
#[derive(Debug, Clone)]
pub struct Account {
    pub username: String,
    pub password: String,
}

/// Keeps one bearer token usable for catalog requests.
///
/// Renewals (password or refresh grant) are serialized: a caller that finds
/// the credential expired waits for any renewal already in flight and checks
/// expiry again before starting its own.
pub struct TokenManager<E>
where
    E: TokenEndpoint,
{
    endpoint: E,
    account: Account,
    credential: RwLock<Credential>,
    renewal: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl<E> TokenManager<E>
where
    E: TokenEndpoint,
{
    pub fn new(endpoint: E, account: Account) -> Self {
        Self {
            endpoint,
            account,
            credential: RwLock::new(Credential::default()),
            renewal: Mutex::new(()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn credential(&self) -> Credential {
        self.credential.read().await.clone()
    }

    /// Password grant. Replaces the whole credential on success.
    pub async fn authenticate(&self) -> Result<Credential, TokenError> {
        let _renewal = self.renewal.lock().await;
        self.authenticate_locked().await
    }

    /// Refresh grant with the held refresh token.
    pub async fn refresh(&self) -> Result<Credential, TokenError> {
        let _renewal = self.renewal.lock().await;
        self.refresh_locked().await
    }

    /// Returns the access token, refreshing it first when expired.
    ///
    /// This never falls back to the password grant, so a manager that was
    /// never authenticated yields `None`. A failed refresh still returns the
    /// stale token.
    pub async fn get_access_token(&self) -> Option<String> {
        if self.is_expired().await {
            let _renewal = self.renewal.lock().await;
            if self.is_expired().await {
                if let Err(e) = self.refresh_locked().await {
                    debug!("access token not renewed: {e}");
                }
            }
        }

        self.credential.read().await.access_token.clone()
    }

    /// Authenticates with the password grant when the credential is expired
    /// or absent.
    pub async fn ensure_authentication(&self) -> Result<Credential, TokenError> {
        if self.is_expired().await {
            let _renewal = self.renewal.lock().await;
            if self.is_expired().await {
                return self.authenticate_locked().await;
            }
        }

        Ok(self.credential().await)
    }

    async fn is_expired(&self) -> bool {
        let now = self.clock.now().timestamp_millis();
        self.credential.read().await.is_expired(now)
    }

    /// Saturates instead of overflowing on absurd lifetimes.
    fn expires_at(&self, expires_in: i64) -> i64 {
        self.clock
            .now()
            .timestamp_millis()
            .saturating_add(expires_in.saturating_mul(1000))
    }

    async fn authenticate_locked(&self) -> Result<Credential, TokenError> {
        let token = self
            .endpoint
            .password_grant(&self.account.username, &self.account.password)
            .await
            .inspect_err(|e| error!("error authenticating {}: {e}", self.account.username))?;

        let credential = Credential {
            expires_at: Some(self.expires_at(token.expires_in)),
            access_token: Some(token.access_token),
            refresh_token: token.refresh_token,
        };
        *self.credential.write().await = credential.clone();

        info!("authenticated as {}", self.account.username);
        Ok(credential)
    }

    async fn refresh_locked(&self) -> Result<Credential, TokenError> {
        let refresh_token = self
            .credential
            .read()
            .await
            .refresh_token
            .clone()
            .ok_or(TokenError::NoRefreshToken)?;

        let token = self
            .endpoint
            .refresh_grant(&refresh_token)
            .await
            .inspect_err(|e| error!("error refreshing token: {e}"))?;

        let expires_at = self.expires_at(token.expires_in);
        let mut credential = self.credential.write().await;
        credential.access_token = Some(token.access_token);
        credential.expires_at = Some(expires_at);
        // the server may keep the old refresh token alive without resending it
        if let Some(refresh_token) = token.refresh_token {
            credential.refresh_token = Some(refresh_token);
        }

        debug!("access token refreshed, expires at {expires_at}");
        Ok(credential.clone())
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex as StdMutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use chrono::Duration;
    use shiori_auth::Token;

    use super::*;
    use crate::utils::test::ManualClock;

    #[derive(Default)]
    struct FakeEndpoint {
        responses: StdMutex<VecDeque<Result<Token, shiori_auth::Error>>>,
        password_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        refreshed_with: StdMutex<Vec<String>>,
    }

    impl FakeEndpoint {
        fn respond(&self, res: Result<Token, shiori_auth::Error>) {
            self.responses.lock().unwrap().push_back(res);
        }

        fn next(&self) -> Result<Token, shiori_auth::Error> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(shiori_auth::Error::Network("no response".to_string())))
        }
    }

    #[async_trait]
    impl TokenEndpoint for FakeEndpoint {
        async fn password_grant(
            &self,
            _username: &str,
            _password: &str,
        ) -> Result<Token, shiori_auth::Error> {
            self.password_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.next()
        }

        async fn refresh_grant(&self, refresh_token: &str) -> Result<Token, shiori_auth::Error> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refreshed_with
                .lock()
                .unwrap()
                .push(refresh_token.to_string());
            tokio::task::yield_now().await;
            self.next()
        }
    }

    fn token(access: &str, refresh: Option<&str>, expires_in: i64) -> Token {
        Token {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in,
        }
    }

    fn manager() -> (TokenManager<FakeEndpoint>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let manager = TokenManager::new(
            FakeEndpoint::default(),
            Account {
                username: "reader".to_string(),
                password: "hunter22".to_string(),
            },
        )
        .with_clock(clock.clone());

        (manager, clock)
    }

    async fn authenticated(expires_in: i64) -> (TokenManager<FakeEndpoint>, Arc<ManualClock>) {
        let (manager, clock) = manager();
        manager
            .endpoint
            .respond(Ok(token("access-1", Some("refresh-1"), expires_in)));
        manager.authenticate().await.unwrap();

        (manager, clock)
    }

    #[tokio::test]
    async fn test_authenticate_sets_expiry_from_expires_in() {
        let (manager, clock) = authenticated(900).await;

        let credential = manager.credential().await;
        assert_eq!(credential.access_token.as_deref(), Some("access-1"));
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(
            credential.expires_at,
            Some(clock.now().timestamp_millis() + 900_000)
        );
    }

    #[tokio::test]
    async fn test_authenticate_with_huge_expires_in_saturates() {
        let (manager, clock) = authenticated(i64::MAX / 100).await;

        let credential = manager.credential().await;
        assert_eq!(credential.expires_at, Some(i64::MAX));

        clock.advance(Duration::days(365 * 100));
        assert_eq!(manager.get_access_token().await.as_deref(), Some("access-1"));
        assert_eq!(manager.endpoint.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_access_token_without_credential() {
        let (manager, _) = manager();

        assert_eq!(manager.get_access_token().await, None);
        assert_eq!(manager.endpoint.password_calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.endpoint.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_access_token_refreshes_only_after_expiry() {
        let (manager, clock) = authenticated(60).await;

        clock.advance(Duration::seconds(59));
        assert_eq!(manager.get_access_token().await.as_deref(), Some("access-1"));

        clock.advance(Duration::seconds(1));
        assert_eq!(manager.get_access_token().await.as_deref(), Some("access-1"));
        assert_eq!(manager.endpoint.refresh_calls.load(Ordering::SeqCst), 0);

        manager
            .endpoint
            .respond(Ok(token("access-2", None, 60)));
        clock.advance(Duration::milliseconds(1));
        assert_eq!(manager.get_access_token().await.as_deref(), Some("access-2"));

        assert_eq!(manager.endpoint.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.endpoint.password_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *manager.endpoint.refreshed_with.lock().unwrap(),
            vec!["refresh-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_omitted() {
        let (manager, clock) = authenticated(60).await;
        manager
            .endpoint
            .respond(Ok(token("access-2", None, 120)));

        let credential = manager.refresh().await.unwrap();

        assert_eq!(credential.access_token.as_deref(), Some("access-2"));
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(
            credential.expires_at,
            Some(clock.now().timestamp_millis() + 120_000)
        );
        assert_eq!(manager.credential().await, credential);
    }

    #[tokio::test]
    async fn test_refresh_replaces_refresh_token_when_supplied() {
        let (manager, _) = authenticated(60).await;
        manager
            .endpoint
            .respond(Ok(token("access-2", Some("refresh-2"), 60)));

        let credential = manager.refresh().await.unwrap();

        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let (manager, _) = manager();

        let res = manager.refresh().await;

        assert!(matches!(res, Err(TokenError::NoRefreshToken)));
        assert_eq!(manager.endpoint.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.credential().await, Credential::default());
    }

    #[tokio::test]
    async fn test_failed_authenticate_leaves_credential() {
        let (manager, _) = authenticated(60).await;
        let before = manager.credential().await;
        manager.endpoint.respond(Err(shiori_auth::Error::Rejected(
            "invalid_grant".to_string(),
        )));

        let res = manager.authenticate().await;

        assert!(matches!(
            res,
            Err(TokenError::Endpoint(shiori_auth::Error::Rejected(_)))
        ));
        assert_eq!(manager.credential().await, before);
    }

    #[tokio::test]
    async fn test_failed_refresh_returns_stale_token() {
        let (manager, clock) = authenticated(60).await;
        let before = manager.credential().await;
        clock.advance(Duration::minutes(5));
        manager
            .endpoint
            .respond(Err(shiori_auth::Error::Network("timed out".to_string())));

        assert_eq!(manager.get_access_token().await.as_deref(), Some("access-1"));
        assert_eq!(manager.credential().await, before);
        assert_eq!(manager.endpoint.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ensure_authentication_uses_password_grant() {
        let (manager, clock) = manager();
        manager
            .endpoint
            .respond(Ok(token("access-1", Some("refresh-1"), 60)));

        let credential = manager.ensure_authentication().await.unwrap();
        assert_eq!(credential.access_token.as_deref(), Some("access-1"));

        // still valid, no second grant
        manager.ensure_authentication().await.unwrap();
        assert_eq!(manager.endpoint.password_calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::seconds(61));
        manager
            .endpoint
            .respond(Ok(token("access-2", Some("refresh-2"), 60)));
        let credential = manager.ensure_authentication().await.unwrap();

        assert_eq!(credential.access_token.as_deref(), Some("access-2"));
        assert_eq!(manager.endpoint.password_calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.endpoint.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ensure_authentication_reports_failure() {
        let (manager, _) = manager();
        manager
            .endpoint
            .respond(Err(shiori_auth::Error::Rejected("unauthorized_client".to_string())));

        assert!(manager.ensure_authentication().await.is_err());
        assert_eq!(manager.credential().await, Credential::default());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let (manager, clock) = authenticated(60).await;
        clock.advance(Duration::seconds(61));
        manager
            .endpoint
            .respond(Ok(token("access-2", None, 60)));

        let (a, b, c) = tokio::join!(
            manager.get_access_token(),
            manager.get_access_token(),
            manager.get_access_token()
        );

        assert_eq!(a.as_deref(), Some("access-2"));
        assert_eq!(b.as_deref(), Some("access-2"));
        assert_eq!(c.as_deref(), Some("access-2"));
        assert_eq!(manager.endpoint.refresh_calls.load(Ordering::SeqCst), 1);
    }
}

use anyhow::anyhow;
use async_trait::async_trait;
use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, RefreshToken, RequestTokenError,
    ResourceOwnerPassword, ResourceOwnerUsername, TokenResponse, TokenUrl,
    basic::{BasicClient, BasicErrorResponse, BasicTokenResponse},
    reqwest::async_http_client,
};

use crate::{Error, Token, TokenEndpoint};

pub const NAME: &str = "mangadex";

pub const DEFAULT_AUTH_URL: &str =
    "https://auth.mangadex.org/realms/mangadex/protocol/openid-connect";

/// Personal client of the MangaDex keycloak realm.
///
/// Client credentials travel in the form body next to the grant parameters,
/// which is what the realm expects from personal API clients.
#[derive(Debug, Clone)]
pub struct MangaDex {
    oauth_client: BasicClient,
}

impl MangaDex {
    pub fn new(auth_url: &str, client_id: String, client_secret: String) -> Result<Self, Error> {
        let auth_url = auth_url.trim_end_matches('/');
        let authorization_url =
            AuthUrl::new(format!("{auth_url}/auth")).map_err(|e| anyhow!("{e}"))?;
        let token_url = TokenUrl::new(format!("{auth_url}/token")).map_err(|e| anyhow!("{e}"))?;

        let client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            authorization_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        Ok(Self {
            oauth_client: client,
        })
    }
}

#[async_trait]
impl TokenEndpoint for MangaDex {
    async fn password_grant(&self, username: &str, password: &str) -> Result<Token, Error> {
        debug!("{NAME}: password grant for {username}");
        let username = ResourceOwnerUsername::new(username.to_string());
        let password = ResourceOwnerPassword::new(password.to_string());

        let token = self
            .oauth_client
            .exchange_password(&username, &password)
            .request_async(async_http_client)
            .await
            .map_err(map_request_error)?;

        token.try_into()
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<Token, Error> {
        debug!("{NAME}: refresh grant");
        let token = self
            .oauth_client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(map_request_error)?;

        token.try_into()
    }
}

impl TryFrom<BasicTokenResponse> for Token {
    type Error = Error;

    fn try_from(res: BasicTokenResponse) -> Result<Self, Self::Error> {
        let expires_in = res
            .expires_in()
            .ok_or_else(|| Error::Decode("response has no expires_in".to_string()))?;
        let expires_in = i64::try_from(expires_in.as_secs())
            .map_err(|_| Error::Decode(format!("expires_in out of range: {expires_in:?}")))?;

        Ok(Token {
            access_token: res.access_token().secret().to_owned(),
            refresh_token: res.refresh_token().map(|t| t.secret().to_owned()),
            expires_in,
        })
    }
}

fn map_request_error<RE>(e: RequestTokenError<RE, BasicErrorResponse>) -> Error
where
    RE: std::error::Error + 'static,
{
    match e {
        RequestTokenError::ServerResponse(res) => Error::Rejected(res.to_string()),
        RequestTokenError::Request(e) => Error::Network(e.to_string()),
        RequestTokenError::Parse(e, _) => Error::Decode(e.to_string()),
        RequestTokenError::Other(msg) => Error::Other(anyhow!(msg)),
    }
}

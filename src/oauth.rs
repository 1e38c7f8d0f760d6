use oauth2::{
    AccessToken, ClientId, ClientSecret, EndpointNotSet, EndpointSet, TokenResponse, TokenUrl,
    basic::BasicClient,
};

use crate::endpoints::ApiUrls;
use crate::error::{Error, Result};
use crate::scope::Scope;

/// Stores the OAuth 2 client ID and client secret.
#[derive(Clone)]
pub struct KeyPair(pub(crate) ClientId, pub(crate) ClientSecret);

impl KeyPair {
    /// Creates a new `KeyPair` from the provided `client_id` and `client_secret` strings.
    #[must_use]
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self(ClientId::new(client_id), ClientSecret::new(client_secret))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyPair")
            .field(&self.0.as_str())
            .field(&"<redacted>")
            .finish()
    }
}

/// An OAuth client that only knows the token endpoint, which is all the
/// client-credentials grant needs.
pub type OAuthClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

pub(crate) fn build_oauth_client(key_pair: KeyPair, urls: &ApiUrls) -> OAuthClient {
    BasicClient::new(key_pair.0)
        .set_client_secret(key_pair.1)
        .set_token_uri(TokenUrl::from_url(urls.token.clone()))
}

/// Exchanges the app credentials for an access token.
///
/// An empty scope collection asks Xero for every scope granted to the app.
#[instrument(skip(key_pair), fields(client_id = key_pair.0.as_str()))]
pub async fn exchange_client_credentials(
    key_pair: KeyPair,
    scopes: Scope,
    urls: &ApiUrls,
) -> Result<AccessToken> {
    let client = build_oauth_client(key_pair, urls);
    // The token endpoint is never followed through redirects.
    let http_client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(Error::Request)?;

    debug!(%scopes, "requesting client credentials token");
    let token = client
        .exchange_client_credentials()
        .add_scopes(scopes.into_oauth2_scopes())
        .request_async(&http_client)
        .await?;

    if let Some(expires_in) = token.expires_in() {
        debug!(?expires_in, "access token issued");
    }
    Ok(token.access_token().clone())
}

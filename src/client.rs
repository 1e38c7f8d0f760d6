use core::fmt;
use std::time::Duration;

use oauth2::AccessToken;
use reqwest::{IntoUrl, Method, RequestBuilder, StatusCode, header};
use serde::{Serialize, de::DeserializeOwned};
use time::Date;
use tokio::time::sleep;
use uuid::Uuid;

use crate::endpoints::{ApiUrls, XeroEndpoint};
use crate::entities::{
    attachment::{self, Attachment},
    connection::{self, Connection},
    contact::{self, Contact},
    invoice::{self, Invoice},
};
use crate::error::{Error, Result};
use crate::oauth::{self, KeyPair};
use crate::scope::Scope;

const MAX_RETRY_ATTEMPTS: usize = 3;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
const TENANT_HEADER: &str = "Xero-tenant-id";

// Rate limiting headers used by the Xero API
/// Header containing number of remaining daily API calls
const HEADER_DAY_LIMIT_REMAINING: &str = "X-DayLimit-Remaining";
/// Header containing number of remaining per-minute API calls
const HEADER_MIN_LIMIT_REMAINING: &str = "X-MinLimit-Remaining";
/// Header containing number of remaining app-wide per-minute API calls
const HEADER_APP_MIN_LIMIT_REMAINING: &str = "X-AppMinLimit-Remaining";
/// Header identifying which rate limit was hit when a 429 is returned
const HEADER_RATE_LIMIT_PROBLEM: &str = "X-Rate-Limit-Problem";

#[derive(Debug, Clone, Default)]
/// Information about the remaining API rate limits
///
/// Xero applies several rate limits to API usage:
/// - Daily limit: 5000 calls per day per tenant
/// - Minute limit: 60 calls per minute per tenant
/// - App minute limit: 10,000 calls per minute across all tenants
pub struct RateLimitInfo {
    /// Number of remaining API calls for the day (out of 5000)
    pub day_limit_remaining: Option<u32>,
    /// Number of remaining API calls for the minute (out of 60)
    pub minute_limit_remaining: Option<u32>,
    /// Number of remaining API calls for the app across all tenants (out of 10,000)
    pub app_minute_limit_remaining: Option<u32>,
}

impl RateLimitInfo {
    /// Extract rate limit information from response headers
    #[must_use]
    pub fn from_response_headers(headers: &header::HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u32>().ok())
        };
        Self {
            day_limit_remaining: read(HEADER_DAY_LIMIT_REMAINING),
            minute_limit_remaining: read(HEADER_MIN_LIMIT_REMAINING),
            app_minute_limit_remaining: read(HEADER_APP_MIN_LIMIT_REMAINING),
        }
    }

    /// Returns true if any of the limits are close to being exhausted
    #[must_use]
    pub fn is_near_limit(&self) -> bool {
        self.day_limit_remaining.is_some_and(|v| v < 100)
            || self.minute_limit_remaining.is_some_and(|v| v < 10)
            || self.app_minute_limit_remaining.is_some_and(|v| v < 100)
    }
}

/// This is the client that is used for interacting with the Xero API. It holds the
/// bearer token and context (the current tenant).
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    access_token: AccessToken,
    tenant_id: Option<Uuid>,
    urls: ApiUrls,
}

impl Client {
    /// Authenticates with the client-credentials grant.
    ///
    /// `None` (or an empty collection) requests the scopes configured on the app.
    ///
    /// # Errors
    /// Returns an error if the token exchange fails.
    #[instrument(skip(key_pair, scopes))]
    pub async fn from_client_credentials(
        key_pair: KeyPair,
        scopes: impl Into<Option<Scope>>,
        urls: ApiUrls,
    ) -> Result<Self> {
        let scopes = scopes.into().unwrap_or_default();
        let access_token = oauth::exchange_client_credentials(key_pair, scopes, &urls).await?;
        info!("Obtained token successfully");
        Ok(Self::from_access_token(access_token, urls))
    }

    /// Wraps an already issued access token.
    #[must_use]
    pub fn from_access_token(access_token: AccessToken, urls: ApiUrls) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token,
            tenant_id: None,
            urls,
        }
    }

    /// Sets the tenant ID for this client.
    pub fn set_tenant(&mut self, tenant_id: Option<Uuid>) {
        trace!(?tenant_id, "updating tenant id");
        self.tenant_id = tenant_id;
    }

    #[must_use]
    pub fn urls(&self) -> &ApiUrls {
        &self.urls
    }

    /// Build a request object with authentication headers.
    pub(crate) fn build_request<U: IntoUrl>(
        &self,
        method: Method,
        url: U,
        accept: &'static str,
    ) -> RequestBuilder {
        let request = self
            .http
            .request(method, url)
            .bearer_auth(self.access_token.secret())
            .header(header::ACCEPT, accept);
        match self.tenant_id {
            Some(tenant_id) => request.header(TENANT_HEADER, tenant_id.to_string()),
            None => request,
        }
    }

    /// Execute a request with automatic retry for rate limit errors
    async fn execute_with_retry<T, F, Fut>(&self, request_fn: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match request_fn().await {
                Ok(result) => return Ok(result),
                Err(Error::RateLimitExceeded { retry_after, .. })
                    if attempts <= MAX_RETRY_ATTEMPTS =>
                {
                    let wait_time = retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
                    warn!(
                        "Rate limit exceeded (attempt {}/{}), waiting for {:?} before retrying",
                        attempts, MAX_RETRY_ATTEMPTS, wait_time
                    );
                    sleep(wait_time).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Perform an authenticated `GET` request returning JSON, with automatic retry.
    #[instrument(skip(self, query))]
    pub async fn get<R, U, T>(&self, url: U, query: &T) -> Result<R>
    where
        R: DeserializeOwned,
        U: IntoUrl + fmt::Debug + Clone,
        T: Serialize + ?Sized + fmt::Debug,
    {
        let url = &url;
        self.execute_with_retry(|| async move {
            trace!(?query, ?url, "making GET request");
            let response = self
                .build_request(Method::GET, url.clone(), "application/json")
                .query(query)
                .send()
                .await?;

            Self::handle_response(response).await
        })
        .await
    }

    /// Perform a `GET` request against a typed accounting endpoint.
    #[instrument(skip(self, query))]
    pub async fn get_endpoint<R, T>(&self, endpoint: XeroEndpoint, query: &T) -> Result<R>
    where
        R: DeserializeOwned,
        T: Serialize + ?Sized + fmt::Debug,
    {
        let url = endpoint.to_url(&self.urls.accounting)?;
        self.get(url, query).await
    }

    /// Perform a `GET` request for a raw file body. The returned response has a
    /// success status and its body has not been read yet.
    #[instrument(skip(self))]
    pub async fn get_binary(&self, endpoint: XeroEndpoint) -> Result<reqwest::Response> {
        let url = &endpoint.to_url(&self.urls.accounting)?;
        self.execute_with_retry(|| async move {
            trace!(%url, "making binary GET request");
            let response = self
                .build_request(Method::GET, url.clone(), "application/octet-stream")
                .send()
                .await?;

            Self::check_status(response, "Attachment").await
        })
        .await
    }

    #[instrument(skip(response))]
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let entity_type = std::any::type_name::<T>()
            .split("::")
            .last()
            .unwrap_or("Unknown")
            .trim_end_matches('>');
        let response = Self::check_status(response, entity_type).await?;
        let text = response.text().await?;

        debug!("Response body size: {} bytes", text.len());
        trace!("Response text:\n{}", text);

        serde_json::from_str(&text).map_err(|e| {
            error!(
                "Deserialization error: {}, near position: {} - response text around that position: {}",
                e,
                e.column(),
                &text
                    .chars()
                    .skip(e.column().saturating_sub(30))
                    .take(100)
                    .collect::<String>()
            );
            Error::DeserializationError(e, Some(text.clone()))
        })
    }

    /// Passes successful responses through and turns every other status into
    /// the matching error, reading the body for context.
    async fn check_status(response: reqwest::Response, entity: &str) -> Result<reqwest::Response> {
        let status = response.status();
        let url = response.url().to_string();

        debug!("Response from {}: status={}, entity_type={}", url, status, entity);

        let rate_limit_info = RateLimitInfo::from_response_headers(response.headers());
        if rate_limit_info.is_near_limit() {
            warn!(
                "Approaching Xero API rate limits: day_remaining={:?}, minute_remaining={:?}, app_minute_remaining={:?}",
                rate_limit_info.day_limit_remaining,
                rate_limit_info.minute_limit_remaining,
                rate_limit_info.app_minute_limit_remaining
            );
        }

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let rate_limit_problem = response
                .headers()
                .get(HEADER_RATE_LIMIT_PROBLEM)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);

            warn!(
                "Rate limit exceeded for {}: problem={:?}, retry_after={:?}",
                url, rate_limit_problem, retry_after
            );

            let text = response.text().await.unwrap_or_default();
            return Err(Error::RateLimitExceeded {
                retry_after,
                status_code: status,
                url,
                response_body: Some(text),
            });
        }

        let text = response.text().await.unwrap_or_default();
        trace!("Error response text:\n{}", text);
        match status {
            StatusCode::NOT_FOUND => Err(Error::NotFound {
                entity: entity.to_string(),
                url,
                status_code: status,
                response_body: Some(text),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                match serde_json::from_str::<crate::error::ForbiddenResponse>(&text) {
                    Ok(problem) => Err(problem.into()),
                    Err(_) => Err(Error::UnexpectedStatus {
                        status_code: status,
                        url,
                        response_body: Some(text),
                    }),
                }
            }
            _ => {
                error!("Unexpected status code: {}", status);
                match serde_json::from_str(&text) {
                    Ok(api_error) => Err(Error::API(api_error)),
                    Err(_) => Err(Error::UnexpectedStatus {
                        status_code: status,
                        url,
                        response_body: Some(text),
                    }),
                }
            }
        }
    }

    /// Access the connections (tenants) API
    #[must_use]
    pub fn connections(&self) -> ConnectionsApi<'_> {
        ConnectionsApi { client: self }
    }

    /// Access the contacts API
    #[must_use]
    pub fn contacts(&self) -> ContactsApi<'_> {
        ContactsApi { client: self }
    }

    /// Access the invoices API
    #[must_use]
    pub fn invoices(&self) -> InvoicesApi<'_> {
        InvoicesApi { client: self }
    }
}

/// API handler for the connections endpoint
#[derive(Debug)]
pub struct ConnectionsApi<'a> {
    client: &'a Client,
}

impl ConnectionsApi<'_> {
    /// Retrieve the organisations the app is connected to
    pub async fn list(&self) -> Result<Vec<Connection>> {
        connection::list(self.client).await
    }

    /// Choose the tenant to work against
    pub async fn select(&self, tenant_id: Option<Uuid>) -> Result<Connection> {
        connection::select(self.client, tenant_id).await
    }
}

/// API handler for Contacts endpoints
#[derive(Debug)]
pub struct ContactsApi<'a> {
    client: &'a Client,
}

impl ContactsApi<'_> {
    /// Retrieve contacts whose name is exactly `name`
    pub async fn list_by_name(&self, name: &str) -> Result<Vec<Contact>> {
        contact::list_by_name(self.client, name).await
    }

    /// Resolve a single contact by exact name
    pub async fn find_by_name(&self, name: &str) -> Result<Contact> {
        contact::find_by_name(self.client, name).await
    }
}

/// API handler for Invoices endpoints
#[derive(Debug)]
pub struct InvoicesApi<'a> {
    client: &'a Client,
}

impl InvoicesApi<'_> {
    /// List a single page of invoices
    pub async fn list(&self, parameters: &invoice::ListParameters) -> Result<Vec<Invoice>> {
        invoice::list(self.client, parameters).await
    }

    /// List every invoice for a contact dated on or after `since`, page by page
    pub async fn list_for_contact_since(
        &self,
        contact_id: Uuid,
        since: Date,
        page_delay: Duration,
    ) -> Result<Vec<Invoice>> {
        invoice::list_for_contact_since(self.client, contact_id, since, page_delay).await
    }

    /// List attachments for an invoice
    pub async fn list_attachments(&self, invoice_id: Uuid) -> Result<Vec<Attachment>> {
        attachment::list_for_invoice(self.client, invoice_id).await
    }

    /// Fetch an attachment body by filename
    pub async fn get_attachment_by_filename(
        &self,
        invoice_id: Uuid,
        file_name: &str,
    ) -> Result<reqwest::Response> {
        attachment::get_by_filename(self.client, invoice_id, file_name).await
    }
}

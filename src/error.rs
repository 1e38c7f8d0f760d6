use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use oauth2::{HttpClientError, RequestTokenError, basic::BasicErrorResponse};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// The `Type` discriminator of a Xero API error document.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "Type", rename_all = "PascalCase")]
#[allow(clippy::module_name_repetitions)]
pub enum ErrorType {
    ValidationException {
        #[serde(default, rename = "Elements")]
        elements: Vec<ValidationExceptionElement>,
    },
    PostDataInvalidException,
    QueryParseException,
    ObjectNotFoundException,
    OrganisationOfflineException,
    UnauthorisedException,
    NoDataProcessedException,
    UnsupportedMediaTypeException,
    MethodNotAllowedException,
    InternalServerException,
    NotImplementedException,
    NotAvailableException,
    RateLimitExceededException,
    SystemUnavailableException,
    #[serde(other)]
    Unknown,
}

impl ErrorType {
    /// A short human readable explanation of the error type.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ValidationException { .. } => "One or more fields failed validation",
            Self::PostDataInvalidException => "The request body could not be read",
            Self::QueryParseException => "The query string could not be parsed",
            Self::ObjectNotFoundException => "The requested object does not exist",
            Self::OrganisationOfflineException => "The organisation is temporarily offline",
            Self::UnauthorisedException => "The access token is invalid or has expired",
            Self::NoDataProcessedException => "The request did not contain any data to process",
            Self::UnsupportedMediaTypeException => "The requested media type is not supported",
            Self::MethodNotAllowedException => "The HTTP method is not allowed on this endpoint",
            Self::InternalServerException => "Xero encountered an internal error",
            Self::NotImplementedException => "The endpoint is not implemented",
            Self::NotAvailableException => "The API is not available for this organisation",
            Self::RateLimitExceededException => "The API rate limit was exceeded",
            Self::SystemUnavailableException => "Xero is currently unavailable",
            Self::Unknown => "Unrecognised Xero error type",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[allow(clippy::module_name_repetitions)]
pub struct ValidationError {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidationExceptionElement {
    #[serde(default)]
    pub validation_errors: Vec<ValidationError>,
}

/// An error document returned by the accounting API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    #[serde(default)]
    pub error_number: u64,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub error: ErrorType,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Xero API Error ({}): {} ({})",
            self.error_number,
            self.message,
            self.error.description()
        )?;
        if let ErrorType::ValidationException { elements } = &self.error {
            for message in elements
                .iter()
                .flat_map(|element| &element.validation_errors)
                .map(|error| &error.message)
            {
                write!(f, "\n  - {message}")?;
            }
        }
        Ok(())
    }
}

/// Problem-details body returned for 401 and 403 responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ForbiddenResponse {
    pub r#type: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: u16,
    pub detail: Option<String>,
    pub instance: Option<String>,
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,
}

pub type OAuth2Error = RequestTokenError<HttpClientError<reqwest::Error>, BasicErrorResponse>;

/// Errors that can occur while downloading invoice attachments from Xero.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("error making request: {0:?}")]
    #[diagnostic(
        code(xero_invoice_attachments::request_error),
        help("Check your network connection and Xero API availability")
    )]
    Request(#[source] reqwest::Error),

    #[error("invalid attachment filename")]
    #[diagnostic(
        code(xero_invoice_attachments::invalid_filename),
        help("Xero returned an attachment without a usable file name")
    )]
    InvalidFilename,

    #[error("error decoding response: {0:?}")]
    #[diagnostic(
        code(xero_invoice_attachments::deserialization_error),
        help("The API returned data in an unexpected format")
    )]
    DeserializationError(#[source] serde_json::Error, Option<String>),

    #[error("object not found: {entity} (url: {url})")]
    #[diagnostic(
        code(xero_invoice_attachments::not_found),
        help("Verify that the {entity} exists and that you have permission to access it")
    )]
    NotFound {
        entity: String,
        url: String,
        status_code: reqwest::StatusCode,
        response_body: Option<String>,
    },

    #[error("endpoint could not be parsed as a URL")]
    #[diagnostic(
        code(xero_invoice_attachments::invalid_endpoint),
        help("Check that the API endpoint URL is correctly formatted")
    )]
    InvalidEndpoint,

    /// A standard error returned while interacting with the API such as a `ValidationException`.
    #[error("{0}")]
    #[diagnostic(
        code(xero_invoice_attachments::api_error),
        help("Review the error returned by the Xero API")
    )]
    API(Response),

    /// The access token was rejected or lacks a required scope.
    #[error("encountered forbidden response: {0:#?}")]
    #[diagnostic(
        code(xero_invoice_attachments::forbidden),
        help(
            "Check that the app is connected to the organisation and has the accounting.transactions, accounting.contacts and accounting.attachments scopes"
        )
    )]
    Forbidden(Box<ForbiddenResponse>),

    #[error("oauth2 error: {0:?}")]
    #[diagnostic(
        code(xero_invoice_attachments::oauth2_error),
        help("Verify CLIENT_ID, CLIENT_SECRET and the requested scopes")
    )]
    OAuth2(#[source] OAuth2Error),

    /// Rate limit exceeded (HTTP 429 Too Many Requests)
    #[error("rate limit exceeded: retry after {retry_after:?}")]
    #[diagnostic(
        code(xero_invoice_attachments::rate_limit_exceeded),
        help("The Xero API rate limit has been exceeded. Wait and retry, or raise --request-delay-ms.")
    )]
    RateLimitExceeded {
        retry_after: Option<Duration>,
        status_code: reqwest::StatusCode,
        url: String,
        response_body: Option<String>,
    },

    #[error("unexpected status {status_code} from {url}")]
    #[diagnostic(code(xero_invoice_attachments::unexpected_status))]
    UnexpectedStatus {
        status_code: reqwest::StatusCode,
        url: String,
        response_body: Option<String>,
    },

    #[error("no tenant found in connections")]
    #[diagnostic(
        code(xero_invoice_attachments::no_tenant),
        help("Connect the app to an organisation, or check that TENANT_ID names a connected organisation")
    )]
    NoTenant { tenant_id: Option<Uuid> },

    #[error("no contact found with name '{name}'")]
    #[diagnostic(
        code(xero_invoice_attachments::contact_not_found),
        help("SUPPLIER_NAME must match the contact name in Xero exactly")
    )]
    ContactNotFound { name: String },

    #[error("failed to install the log subscriber")]
    #[diagnostic(
        code(xero_invoice_attachments::logging_init),
        help("A global tracing subscriber was already installed")
    )]
    LoggingInit(#[source] tracing_subscriber::util::TryInitError),

    #[error("i/o error on {}", .path.display())]
    #[diagnostic(code(xero_invoice_attachments::io_error))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::DeserializationError(e, None)
    }
}

impl From<OAuth2Error> for Error {
    fn from(e: OAuth2Error) -> Self {
        Self::OAuth2(e)
    }
}

impl From<ForbiddenResponse> for Error {
    fn from(response: ForbiddenResponse) -> Self {
        Self::Forbidden(Box::new(response))
    }
}

/// Type alias for results from this crate.
///
/// This is already a Miette diagnostic result due to the implementation of
/// the Diagnostic trait for the Error type.
pub type Result<O> = std::result::Result<O, Error>;

use std::fmt;

use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

pub const BASE_URL: &str = "https://api.xero.com/api.xro/2.0/";
pub const CONNECTIONS_URL: &str = "https://api.xero.com/connections";
pub const TOKEN_URL: &str = "https://identity.xero.com/connect/token";

/// The three roots every request is made against.
///
/// Production Xero unless overridden, which the integration tests do to point
/// the client at a local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiUrls {
    pub token: Url,
    pub connections: Url,
    /// Accounting API root. Must end with a `/` so that relative joins keep the
    /// version segment.
    pub accounting: Url,
}

impl ApiUrls {
    /// Builds the URL set from string roots.
    pub fn new(token: &str, connections: &str, accounting: &str) -> Result<Self> {
        let parse = |s: &str| Url::parse(s).map_err(|_| Error::InvalidEndpoint);
        let mut accounting = parse(accounting)?;
        if !accounting.path().ends_with('/') {
            let path = format!("{}/", accounting.path());
            accounting.set_path(&path);
        }
        Ok(Self {
            token: parse(token)?,
            connections: parse(connections)?,
            accounting,
        })
    }
}

impl Default for ApiUrls {
    fn default() -> Self {
        Self::new(TOKEN_URL, CONNECTIONS_URL, BASE_URL).expect("production URLs are valid")
    }
}

/// A typed representation of the accounting endpoints this crate talks to.
#[derive(Debug, Clone)]
pub enum XeroEndpoint {
    Contacts,
    Invoices,
    InvoiceAttachments(Uuid),
    /// A single attachment body, addressed by its file name.
    InvoiceAttachment(Uuid, String),
}

impl XeroEndpoint {
    /// Resolves the endpoint against the accounting root.
    ///
    /// File names are pushed as path segments so that spaces, `#`, `?` and
    /// friends are percent-encoded rather than reinterpreted.
    pub fn to_url(&self, base: &Url) -> Result<Url> {
        let mut url = base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| Error::InvalidEndpoint)?;
            segments.pop_if_empty();
            match self {
                Self::Contacts => {
                    segments.push("Contacts");
                }
                Self::Invoices => {
                    segments.push("Invoices");
                }
                Self::InvoiceAttachments(id) => {
                    segments
                        .push("Invoices")
                        .push(&id.to_string())
                        .push("Attachments");
                }
                Self::InvoiceAttachment(id, file_name) => {
                    if file_name.is_empty() {
                        return Err(Error::InvalidFilename);
                    }
                    segments
                        .push("Invoices")
                        .push(&id.to_string())
                        .push("Attachments")
                        .push(file_name);
                }
            }
        }
        Ok(url)
    }
}

impl fmt::Display for XeroEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_url(&ApiUrls::default().accounting) {
            Ok(url) => write!(f, "{url}"),
            Err(_) => write!(f, "Invalid endpoint"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_production_urls() {
        let base = ApiUrls::default().accounting;
        assert_eq!(
            XeroEndpoint::Contacts.to_url(&base).unwrap().as_str(),
            "https://api.xero.com/api.xro/2.0/Contacts"
        );
        let id = Uuid::nil();
        assert_eq!(
            XeroEndpoint::InvoiceAttachments(id).to_url(&base).unwrap().as_str(),
            "https://api.xero.com/api.xro/2.0/Invoices/00000000-0000-0000-0000-000000000000/Attachments"
        );
    }

    #[test]
    fn attachment_file_names_are_percent_encoded() {
        let base = ApiUrls::default().accounting;
        let url = XeroEndpoint::InvoiceAttachment(Uuid::nil(), "scan #1 (copy).pdf".to_string())
            .to_url(&base)
            .unwrap();
        assert!(url.path().ends_with("/Attachments/scan%20%231%20(copy).pdf"), "{url}");
        assert!(url.query().is_none());
    }

    #[test]
    fn empty_attachment_name_is_rejected() {
        let base = ApiUrls::default().accounting;
        let result = XeroEndpoint::InvoiceAttachment(Uuid::nil(), String::new()).to_url(&base);
        assert!(matches!(result, Err(Error::InvalidFilename)));
    }

    #[test]
    fn accounting_root_gains_trailing_slash() {
        let urls = ApiUrls::new(
            "http://127.0.0.1:1/token",
            "http://127.0.0.1:1/connections",
            "http://127.0.0.1:1/api.xro/2.0",
        )
        .unwrap();
        assert_eq!(urls.accounting.path(), "/api.xro/2.0/");
        assert_eq!(
            XeroEndpoint::Invoices.to_url(&urls.accounting).unwrap().as_str(),
            "http://127.0.0.1:1/api.xro/2.0/Invoices"
        );
    }
}

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;
use tokio::time::sleep;
use uuid::Uuid;

use crate::{
    Client,
    endpoints::XeroEndpoint,
    error::Result,
    utils::{date_format::xero_date_format_option, serde_helpers::empty_string_as_none},
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Type {
    #[serde(rename = "ACCPAY")]
    AccountsPayable,

    #[serde(rename = "ACCREC")]
    AccountsReceivable,

    #[serde(other)]
    Unknown,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Draft,
    Submitted,
    Deleted,
    Authorised,
    Paid,
    Voided,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Invoice {
    pub r#type: Option<Type>,
    #[serde(rename = "InvoiceID")]
    pub invoice_id: Uuid,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub reference: Option<String>,
    #[serde(
        rename = "DateString",
        default,
        deserialize_with = "xero_date_format_option::deserialize"
    )]
    pub date: Option<Date>,
    pub status: Option<Status>,
    pub currency_code: Option<String>,
    pub total: Option<Decimal>,
    pub amount_due: Option<Decimal>,
    pub has_attachments: Option<bool>,
}

impl Invoice {
    /// The invoice number, or the invoice ID when the number is missing.
    #[must_use]
    pub fn label(&self) -> String {
        self.invoice_number
            .clone()
            .unwrap_or_else(|| self.invoice_id.to_string())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ListResponse {
    #[serde(default)]
    pub invoices: Vec<Invoice>,
}

/// Query parameters for the invoices endpoint.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct ListParameters {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl ListParameters {
    /// Invoices billed to `contact_id` dated on or after `since`, newest first.
    #[must_use]
    pub fn for_contact_since(contact_id: Uuid, since: Date) -> Self {
        Self {
            where_filter: Some(contact_since_filter(contact_id, since)),
            order: Some("Date DESC".to_string()),
            page: None,
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// `Contact.ContactID==Guid("<id>") AND Date>=DateTime(<yyyy>,<mm>,<dd>)`
#[must_use]
pub fn contact_since_filter(contact_id: Uuid, since: Date) -> String {
    format!(
        "Contact.ContactID==Guid(\"{contact_id}\") AND Date>=DateTime({},{:02},{:02})",
        since.year(),
        u8::from(since.month()),
        since.day()
    )
}

/// Retrieve a single page of invoices.
#[instrument(skip(client))]
pub async fn list(client: &Client, parameters: &ListParameters) -> Result<Vec<Invoice>> {
    let response: ListResponse = client
        .get_endpoint(XeroEndpoint::Invoices, parameters)
        .await?;
    Ok(response.invoices)
}

/// Retrieve every invoice for a contact since a date, requesting pages from 1
/// upwards until one comes back empty. Sleeps `page_delay` after each
/// non-empty page.
#[instrument(skip(client))]
pub async fn list_for_contact_since(
    client: &Client,
    contact_id: Uuid,
    since: Date,
    page_delay: Duration,
) -> Result<Vec<Invoice>> {
    let parameters = ListParameters::for_contact_since(contact_id, since);
    let mut invoices = Vec::new();
    let mut page = 1;
    loop {
        let page_invoices = list(client, &parameters.clone().with_page(page)).await?;
        if page_invoices.is_empty() {
            break;
        }
        invoices.extend(page_invoices.iter().cloned());
        info!(
            "Fetched page {page}: {} invoices (total so far: {})",
            page_invoices.len(),
            invoices.len()
        );
        page += 1;
        sleep(page_delay).await;
    }
    Ok(invoices)
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Client, endpoints::XeroEndpoint, error::Result};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Attachment {
    #[serde(rename = "AttachmentID")]
    pub attachment_id: Uuid,
    pub file_name: String,
    pub url: Option<String>,
    pub mime_type: Option<String>,
    pub content_length: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ListResponse {
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Retrieve the attachment metadata for an invoice.
#[instrument(skip(client))]
pub async fn list_for_invoice(client: &Client, invoice_id: Uuid) -> Result<Vec<Attachment>> {
    let response: ListResponse = client
        .get_endpoint(XeroEndpoint::InvoiceAttachments(invoice_id), &())
        .await?;
    Ok(response.attachments)
}

/// Request an attachment body. The caller streams it from the returned response.
#[instrument(skip(client))]
pub async fn get_by_filename(
    client: &Client,
    invoice_id: Uuid,
    file_name: &str,
) -> Result<reqwest::Response> {
    client
        .get_binary(XeroEndpoint::InvoiceAttachment(invoice_id, file_name.to_string()))
        .await
}

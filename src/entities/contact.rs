use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Client,
    endpoints::XeroEndpoint,
    error::{Error, Result},
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Active,
    Archived,
    GdprRequest,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Contact {
    #[serde(rename = "ContactID")]
    pub contact_id: Uuid,
    pub contact_number: Option<String>,
    pub account_number: Option<String>,
    pub contact_status: Option<Status>,
    pub name: String,
    pub email_address: Option<String>,
    pub is_supplier: Option<bool>,
    pub is_customer: Option<bool>,
    pub default_currency: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ListResponse {
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

/// Query parameters for the contacts endpoint.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ListParameters {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<String>,
}

/// Builds an exact-match filter on the contact name, e.g. `Name=="Acme Ltd"`.
#[must_use]
pub fn name_filter(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("Name==\"{escaped}\"")
}

/// Retrieve contacts whose name matches `name` exactly.
#[instrument(skip(client))]
pub async fn list_by_name(client: &Client, name: &str) -> Result<Vec<Contact>> {
    let parameters = ListParameters {
        where_filter: Some(name_filter(name)),
    };
    let response: ListResponse = client
        .get_endpoint(XeroEndpoint::Contacts, &parameters)
        .await?;
    Ok(response.contacts)
}

/// Resolve a contact by name. The first match wins.
#[instrument(skip(client))]
pub async fn find_by_name(client: &Client, name: &str) -> Result<Contact> {
    let contacts = list_by_name(client, name).await?;
    if contacts.len() > 1 {
        warn!(
            count = contacts.len(),
            "several contacts are named '{name}', using the first"
        );
    }
    contacts.into_iter().next().ok_or_else(|| Error::ContactNotFound {
        name: name.to_string(),
    })
}

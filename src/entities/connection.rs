use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    Client,
    error::{Error, Result},
    utils::date_format::xero_datetime_format_option,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[serde(default)]
    pub tenant_type: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(
        default,
        skip_serializing,
        deserialize_with = "xero_datetime_format_option::deserialize"
    )]
    pub created_date_utc: Option<OffsetDateTime>,
    #[serde(
        default,
        skip_serializing,
        deserialize_with = "xero_datetime_format_option::deserialize"
    )]
    pub updated_date_utc: Option<OffsetDateTime>,
}

/// Retrieve a list of authorized connections (tenants).
#[instrument(skip(client))]
pub async fn list(client: &Client) -> Result<Vec<Connection>> {
    let url = client.urls().connections.clone();
    client.get(url, &()).await
}

/// Picks the tenant to use: the one matching `tenant_id`, or else the first
/// connection returned.
pub fn choose(connections: Vec<Connection>, tenant_id: Option<Uuid>) -> Result<Connection> {
    let chosen = match tenant_id {
        Some(wanted) => connections.into_iter().find(|c| c.tenant_id == wanted),
        None => connections.into_iter().next(),
    };
    chosen.ok_or(Error::NoTenant { tenant_id })
}

/// Lists the connections and chooses the tenant.
#[instrument(skip(client))]
pub async fn select(client: &Client, tenant_id: Option<Uuid>) -> Result<Connection> {
    let connections = list(client).await?;
    if connections.len() > 1 && tenant_id.is_none() {
        debug!(
            count = connections.len(),
            "several organisations are connected, using the first"
        );
    }
    choose(connections, tenant_id)
}

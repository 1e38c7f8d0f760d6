use serde::{Deserialize, Deserializer};

/// Deserializes an optional string, treating empty and whitespace-only strings as None.
/// Useful for Xero API fields that return "" instead of null.
pub fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

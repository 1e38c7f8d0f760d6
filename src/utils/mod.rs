pub mod date_format;
pub mod filename;
pub mod serde_helpers;

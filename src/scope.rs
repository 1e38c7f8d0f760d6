use oauth2::Scope as OAuth2Scope;
use std::fmt;
use std::iter::FromIterator;
use std::str::FromStr;

/// Represents permission level for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadWrite,
    ReadOnly,
}

/// Accounting API scopes understood by the downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeType {
    AccountingTransactions(Permission),
    AccountingContacts(Permission),
    AccountingAttachments(Permission),
    AccountingSettings(Permission),
}

impl ScopeType {
    /// The wire name of the scope.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccountingTransactions(Permission::ReadWrite) => "accounting.transactions",
            Self::AccountingTransactions(Permission::ReadOnly) => "accounting.transactions.read",
            Self::AccountingContacts(Permission::ReadWrite) => "accounting.contacts",
            Self::AccountingContacts(Permission::ReadOnly) => "accounting.contacts.read",
            Self::AccountingAttachments(Permission::ReadWrite) => "accounting.attachments",
            Self::AccountingAttachments(Permission::ReadOnly) => "accounting.attachments.read",
            Self::AccountingSettings(Permission::ReadWrite) => "accounting.settings",
            Self::AccountingSettings(Permission::ReadOnly) => "accounting.settings.read",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing a scope from a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseScopeError(pub String);

impl fmt::Display for ParseScopeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Invalid scope string: {}", self.0)
    }
}

impl std::error::Error for ParseScopeError {}

impl FromStr for ScopeType {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accounting.transactions" => Ok(Self::AccountingTransactions(Permission::ReadWrite)),
            "accounting.transactions.read" => Ok(Self::AccountingTransactions(Permission::ReadOnly)),
            "accounting.contacts" => Ok(Self::AccountingContacts(Permission::ReadWrite)),
            "accounting.contacts.read" => Ok(Self::AccountingContacts(Permission::ReadOnly)),
            "accounting.attachments" => Ok(Self::AccountingAttachments(Permission::ReadWrite)),
            "accounting.attachments.read" => Ok(Self::AccountingAttachments(Permission::ReadOnly)),
            "accounting.settings" => Ok(Self::AccountingSettings(Permission::ReadWrite)),
            "accounting.settings.read" => Ok(Self::AccountingSettings(Permission::ReadOnly)),
            _ => Err(ParseScopeError(s.to_string())),
        }
    }
}

/// A collection of Xero API scopes requested together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    scopes: Vec<ScopeType>,
}

impl Scope {
    /// Creates a new scope collection
    #[must_use]
    pub fn new(scope_types: Vec<ScopeType>) -> Self {
        Self {
            scopes: scope_types,
        }
    }

    /// The scopes needed to find a supplier, list its bills and fetch their files.
    #[must_use]
    pub fn downloader_default() -> Self {
        Self::new(vec![
            ScopeType::AccountingTransactions(Permission::ReadWrite),
            ScopeType::AccountingAttachments(Permission::ReadWrite),
            ScopeType::AccountingContacts(Permission::ReadWrite),
        ])
    }

    /// Parses a space separated list such as `accounting.transactions.read accounting.contacts.read`.
    pub fn parse_list(list: &str) -> Result<Self, ParseScopeError> {
        list.split_whitespace().map(ScopeType::from_str).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Converts every scope in the collection into an OAuth2 scope.
    #[must_use]
    pub fn into_oauth2_scopes(self) -> Vec<OAuth2Scope> {
        self.scopes
            .into_iter()
            .map(|scope| OAuth2Scope::new(scope.as_str().to_string()))
            .collect()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope_strs: Vec<&str> = self.scopes.iter().map(|s| s.as_str()).collect();
        write!(f, "{}", scope_strs.join(" "))
    }
}

impl FromIterator<ScopeType> for Scope {
    fn from_iter<I: IntoIterator<Item = ScopeType>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

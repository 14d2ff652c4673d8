//! Parsing of check import identifiers.
//!
//! A check is imported either by static id or by reference:
//!
//! ```text
//! <table_id>,<check_static_id>
//! <table_id>,,<reference>
//! ```
//!
//! A trailing empty field after the static id (`5,12,`) is ignored.

use std::fmt;
use std::str::FromStr;

use crate::error::ProviderError;

const EXPECTED_FORMATS: &str = "\"<table_id>,<check_static_id>\" or \"<table_id>,,<reference>\"";

/// How an imported check is identified on its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckIdentity {
    /// By static id.
    StaticId(i64),
    /// By table-scoped reference.
    Reference(String),
}

/// A parsed check import identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckImportId {
    /// Owning table.
    pub table_id: i64,
    /// Static id or reference.
    pub identity: CheckIdentity,
}

impl CheckImportId {
    /// Parse `<table_id>,<check_static_id>` or `<table_id>,,<reference>`.
    ///
    /// ```
    /// use anomalo_provider::import::{CheckIdentity, CheckImportId};
    ///
    /// let id = CheckImportId::parse("5,,orders_not_null").unwrap();
    /// assert_eq!(id.table_id, 5);
    /// assert_eq!(id.identity, CheckIdentity::Reference("orders_not_null".to_string()));
    /// ```
    pub fn parse(id: &str) -> Result<Self, ProviderError> {
        let fields: Vec<&str> = id.split(',').collect();
        match fields.as_slice() {
            [table, static_id] | [table, static_id, ""]
                if !table.is_empty() && !static_id.is_empty() =>
            {
                Ok(Self {
                    table_id: parse_field("table_id", table, id)?,
                    identity: CheckIdentity::StaticId(parse_field("check_static_id", static_id, id)?),
                })
            }
            [table, "", reference] if !table.is_empty() && !reference.is_empty() => Ok(Self {
                table_id: parse_field("table_id", table, id)?,
                identity: CheckIdentity::Reference(reference.to_string()),
            }),
            _ => Err(ProviderError::InvalidInput(format!(
                "unexpected import identifier {:?}; expected {}",
                id, EXPECTED_FORMATS
            ))),
        }
    }

    /// Static id, when imported by static id.
    pub fn static_id(&self) -> Option<i64> {
        match self.identity {
            CheckIdentity::StaticId(id) => Some(id),
            CheckIdentity::Reference(_) => None,
        }
    }

    /// Reference, when imported by reference.
    pub fn reference(&self) -> Option<&str> {
        match &self.identity {
            CheckIdentity::StaticId(_) => None,
            CheckIdentity::Reference(reference) => Some(reference),
        }
    }
}

impl FromStr for CheckImportId {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CheckImportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identity {
            CheckIdentity::StaticId(id) => write!(f, "{},{}", self.table_id, id),
            CheckIdentity::Reference(reference) => write!(f, "{},,{}", self.table_id, reference),
        }
    }
}

fn parse_field(name: &str, raw: &str, id: &str) -> Result<i64, ProviderError> {
    raw.trim().parse::<i64>().map_err(|_| {
        ProviderError::InvalidInput(format!(
            "could not parse {} {:?} in import identifier {:?} as an integer",
            name, raw, id
        ))
    })
}

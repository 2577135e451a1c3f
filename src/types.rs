//! Core identifier and enumeration types shared across the sync core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric identifier for an entity row (person, location, event, entry...).
///
/// Identifiers are assigned by the external entity-resolution layer; the sync
/// core only requires that they are positive.
pub type EntityId = i64;

/// Origin of a mutation flowing through the sync core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncSource {
    /// Import from the primary serialized file set.
    PrimaryImport,
    /// Import from a secondary or auxiliary file set.
    SecondaryImport,
    /// Direct user action through the CLI or an editor integration.
    Manual,
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncSource::PrimaryImport => "primary-import",
            SyncSource::SecondaryImport => "secondary-import",
            SyncSource::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SyncSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary-import" => Ok(SyncSource::PrimaryImport),
            "secondary-import" => Ok(SyncSource::SecondaryImport),
            "manual" => Ok(SyncSource::Manual),
            other => Err(format!(
                "unknown sync source '{}' (expected primary-import, secondary-import, or manual)",
                other
            )),
        }
    }
}

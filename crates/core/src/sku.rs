//! Stock keeping unit value object.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// SKU: the human-facing stock keeping unit code.
///
/// Denormalized onto ledger rows and reservations for lookup; compared by
/// value. Stored trimmed and uppercased so `"ab-1"` and `" AB-1 "` refer to
/// the same unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    /// Validate and normalize a raw SKU string.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, DomainError> {
        let normalized = raw.as_ref().trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if normalized.len() > 64 {
            return Err(DomainError::validation("sku longer than 64 characters"));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Sku {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for Sku {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Listed price as reported by the catalog, rendered in its shortest decimal
/// form (`9.9`, not `9.900000000000000355`).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl From<f64> for Price {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One catalog item from a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sku {
    pub id: i64,
    pub name: String,
    pub price: Price,
    pub category_id: i64,
    /// The listing entry exactly as received, kept for auditing.
    pub raw: String,
}

impl Sku {
    /// Items with id 0 are placeholders and are never persisted.
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

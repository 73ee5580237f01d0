//! Response bodies. Every success carries a human-readable `detail`; structural operations
//! also return the table inventory.

use crate::model::TableInfo;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct Detail {
    pub detail: String,
}

impl Detail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TablesResponse {
    pub detail: String,
    pub tables: Vec<TableInfo>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HeadsResponse {
    pub heads: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CurrentResponse {
    pub current: Vec<String>,
}

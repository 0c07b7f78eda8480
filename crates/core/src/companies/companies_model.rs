use serde::{Deserialize, Serialize};

/// One row of the company master: a display name and the directory holding
/// that company's tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub name: String,
    pub data_path: String,
}

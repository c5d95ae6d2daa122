use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::samples::DataSample;

/// Mutation that records one project/environment sample.
pub const COLLECT_DATA_MUTATION: &str = "
mutation ($sample: DataSample!) {
	collectData(sample: $sample)
}
";

#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest {
    pub query: String,
    pub variables: HashMap<String, serde_json::Value>,
}

impl GraphqlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: HashMap::new(),
        }
    }

    pub fn variable(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> serde_json::Result<Self> {
        self.variables
            .insert(name.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// The `collectData` mutation carrying `sample`.
    pub fn collect_data(sample: &DataSample) -> serde_json::Result<Self> {
        Self::new(COLLECT_DATA_MUTATION).variable("sample", sample)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorLocation {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default)]
    pub locations: Vec<ErrorLocation>,
}

/// Response envelope. `data` is passed through uninterpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

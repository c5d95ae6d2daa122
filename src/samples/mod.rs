pub mod aggregator;

pub use aggregator::SampleAggregator;

use serde::{Deserialize, Serialize};

/// Identity of one accumulated counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    pub project: String,
    pub environment: String,
    pub function: String,
}

impl SampleKey {
    pub fn new(
        project: impl Into<String>,
        environment: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            function: function.into(),
        }
    }
}

/// One exported row: a function and how often it was called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotpathSample {
    #[serde(rename = "fnName")]
    pub function: String,
    #[serde(rename = "nCalls")]
    pub call_count: u64,
}

/// Everything accumulated for one project/environment pair.
/// This is the unit the upstream API receives as the `sample` variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSample {
    #[serde(rename = "projectName")]
    pub project: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment: String,
    pub hotpaths: Vec<HotpathSample>,
}

impl DataSample {
    /// Sum of all call counts in this group.
    pub fn total_calls(&self) -> u64 {
        self.hotpaths
            .iter()
            .fold(0u64, |acc, h| acc.saturating_add(h.call_count))
    }

    /// Looks up the count exported for `function`, if present.
    pub fn calls_for(&self, function: &str) -> Option<u64> {
        self.hotpaths
            .iter()
            .find(|h| h.function == function)
            .map(|h| h.call_count)
    }
}

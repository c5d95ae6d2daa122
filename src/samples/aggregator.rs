use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use super::{DataSample, HotpathSample, SampleKey};

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe accumulator of call counts.
/// Handlers call `merge()`, the flush path calls `export()` and then
/// `settle()` once the upstream API has accepted the batch.
pub struct SampleAggregator {
    inner: RwLock<Inner>,
}

// ─── Internal state ──────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    samples: HashMap<SampleKey, u64>,
}

// ─── SampleAggregator impl ───────────────────────────────────────

impl SampleAggregator {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Add one batch of per-function counts for a project/environment.
    pub fn merge<'a, I>(&self, counts: I, project: &str, environment: &str)
    where
        I: IntoIterator<Item = (&'a String, &'a u64)>,
    {
        let mut inner = self.inner.write();
        for (function, delta) in counts {
            let key = SampleKey::new(project, environment, function.as_str());
            let slot = inner.samples.entry(key).or_insert(0);
            *slot = slot.saturating_add(*delta);
        }
    }

    /// Group everything accumulated so far by project/environment.
    /// Group and row order are unspecified.
    pub fn export(&self) -> Vec<DataSample> {
        self.inner.read().export()
    }

    /// Pretty-printed snapshot of the raw counters, for diagnostic mode.
    pub fn dump(&self) -> serde_json::Result<String> {
        self.inner.read().dump()
    }

    /// Discard all accumulated counts.
    pub fn clear(&self) {
        *self.inner.write() = Inner::default();
    }

    /// Remove exactly the counts in `exported` and drop counters that reach
    /// zero. Samples merged after the export was taken are kept.
    pub fn settle(&self, exported: &[DataSample]) {
        let mut inner = self.inner.write();
        for group in exported {
            for row in &group.hotpaths {
                let key = SampleKey::new(
                    group.project.as_str(),
                    group.environment.as_str(),
                    row.function.as_str(),
                );
                if let Some(count) = inner.samples.get_mut(&key) {
                    *count = count.saturating_sub(row.call_count);
                    if *count == 0 {
                        inner.samples.remove(&key);
                    }
                }
            }
        }
    }

    /// Current count for one key, `None` if nothing was merged for it.
    pub fn get(&self, key: &SampleKey) -> Option<u64> {
        self.inner.read().samples.get(key).copied()
    }

    /// Number of distinct (project, environment, function) counters.
    pub fn len(&self) -> usize {
        self.inner.read().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().samples.is_empty()
    }
}

impl Default for SampleAggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn export(&self) -> Vec<DataSample> {
        let mut groups: HashMap<(&str, &str), DataSample> = HashMap::new();

        for (key, &count) in &self.samples {
            let group = groups
                .entry((key.project.as_str(), key.environment.as_str()))
                .or_insert_with(|| DataSample {
                    project: key.project.clone(),
                    environment: key.environment.clone(),
                    hotpaths: Vec::new(),
                });
            group.hotpaths.push(HotpathSample {
                function: key.function.clone(),
                call_count: count,
            });
        }

        // Groups only exist because a row was pushed, so none is empty.
        groups.into_values().collect()
    }

    fn dump(&self) -> serde_json::Result<String> {
        // project → environment → function → count, sorted for readability
        let mut tree: BTreeMap<&str, BTreeMap<&str, BTreeMap<&str, u64>>> =
            BTreeMap::new();

        for (key, &count) in &self.samples {
            tree.entry(key.project.as_str())
                .or_default()
                .entry(key.environment.as_str())
                .or_default()
                .insert(key.function.as_str(), count);
        }

        serde_json::to_string_pretty(&tree)
    }
}

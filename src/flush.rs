use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::{AccessTokenCache, CredentialError};
use crate::samples::{DataSample, SampleAggregator};
use crate::upstream::{GraphqlRequest, SubmissionClient, SubmissionError};

// ─── Public types ────────────────────────────────────────────────

/// Where a flush sends the accumulated samples.
pub enum Delivery {
    /// Submit every project/environment group to the remote API.
    Submit {
        endpoint: String,
        tokens: Arc<AccessTokenCache>,
        client: SubmissionClient,
    },
    /// Log the accumulated samples instead of sending them. No credentials
    /// are needed in this mode.
    Dump,
}

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("get API access token: {0}")]
    Credential(#[from] CredentialError),

    #[error("encode sample for project {project:?}: {error}")]
    Encode {
        project: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("submit samples for project {project:?} environment {environment:?}: {source}")]
    Submission {
        project: String,
        environment: String,
        source: SubmissionError,
    },

    #[error("format samples: {0}")]
    Dump(#[source] serde_json::Error),
}

/// What one successful flush shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub groups: usize,
    pub calls: u64,
}

/// Result of one `ingest` call.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Threshold not crossed yet.
    Pending { batches: u64 },
    /// Another flush is running; this batch rides along with the next one.
    Busy,
    Flushed(FlushReport),
    /// Groups the destination did not accept stay for the next attempt,
    /// and the batch counter is left as it was.
    Failed(FlushError),
}

/// Counts ingested batches and flushes the aggregator once more than
/// `threshold` batches have arrived since the last successful flush.
pub struct FlushController {
    aggregator: Arc<SampleAggregator>,
    delivery: Delivery,
    threshold: u64,
    pending: AtomicU64,
    /// Serialises flushes so two handlers never ship the same samples.
    gate: Mutex<()>,
}

// ─── FlushController impl ────────────────────────────────────────

impl FlushController {
    pub fn new(aggregator: Arc<SampleAggregator>, threshold: u64, delivery: Delivery) -> Self {
        Self {
            aggregator,
            delivery,
            threshold,
            pending: AtomicU64::new(0),
            gate: Mutex::new(()),
        }
    }

    pub fn aggregator(&self) -> &Arc<SampleAggregator> {
        &self.aggregator
    }

    /// Batches ingested since the last successful flush.
    pub fn pending_batches(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_dump_mode(&self) -> bool {
        matches!(self.delivery, Delivery::Dump)
    }

    /// Merge one batch and flush if the threshold has been crossed.
    /// Flush failures are logged and reported, never propagated.
    pub async fn ingest(
        &self,
        counts: &HashMap<String, u64>,
        project: &str,
        environment: &str,
    ) -> FlushOutcome {
        self.aggregator.merge(counts, project, environment);
        let batches = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(project, environment, functions = counts.len(), batches, "samples merged");

        if batches <= self.threshold {
            return FlushOutcome::Pending { batches };
        }

        let Ok(_guard) = self.gate.try_lock() else {
            debug!("flush already in progress");
            return FlushOutcome::Busy;
        };

        match self.flush_locked().await {
            Ok(report) => FlushOutcome::Flushed(report),
            Err(error) => {
                warn!(%error, "flush failed, keeping samples for the next attempt");
                FlushOutcome::Failed(error)
            }
        }
    }

    /// Flush now, regardless of the counter. Waits for a running flush.
    pub async fn flush(&self) -> Result<FlushReport, FlushError> {
        let _guard = self.gate.lock().await;
        self.flush_locked().await
    }

    async fn flush_locked(&self) -> Result<FlushReport, FlushError> {
        let span = info_span!("flush", flush_id = %Uuid::new_v4());
        async {
            let exported = self.aggregator.export();
            // Read after exporting. A batch merged in between is subtracted
            // below without having been sent; its samples stay accumulated
            // and leave with a later flush.
            let batches = self.pending.load(Ordering::SeqCst);

            let report = FlushReport {
                groups: exported.len(),
                calls: exported
                    .iter()
                    .fold(0u64, |acc, s| acc.saturating_add(s.total_calls())),
            };

            if !exported.is_empty() {
                self.deliver(&exported).await?;
            }

            self.pending.fetch_sub(batches, Ordering::SeqCst);
            info!(groups = report.groups, calls = report.calls, batches, "samples flushed");
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Ship `exported` and retire every group the destination accepted.
    ///
    /// Groups are retired one by one, so a group accepted before another one
    /// failed is not sent twice. Groups that failed keep their counts, and
    /// the first failure is returned once every group has been tried.
    async fn deliver(&self, exported: &[DataSample]) -> Result<(), FlushError> {
        match &self.delivery {
            Delivery::Dump => {
                let dumped = self.aggregator.dump().map_err(FlushError::Dump)?;
                info!("TESTMODE | samples accumulated so far (not sending to server):\n{dumped}");
                self.aggregator.settle(exported);
                Ok(())
            }
            Delivery::Submit {
                endpoint,
                tokens,
                client,
            } => {
                let token = tokens.get_access_token().await?;
                let mut first_error = None;

                for sample in exported {
                    match Self::submit_group(endpoint, client, sample, &token).await {
                        Ok(()) => self.aggregator.settle(std::slice::from_ref(sample)),
                        Err(error) => {
                            warn!(
                                project = %sample.project,
                                environment = %sample.environment,
                                %error,
                                "group rejected"
                            );
                            first_error.get_or_insert(error);
                        }
                    }
                }

                match first_error {
                    Some(error) => Err(error),
                    None => Ok(()),
                }
            }
        }
    }

    async fn submit_group(
        endpoint: &str,
        client: &SubmissionClient,
        sample: &DataSample,
        token: &str,
    ) -> Result<(), FlushError> {
        let request =
            GraphqlRequest::collect_data(sample).map_err(|error| FlushError::Encode {
                project: sample.project.clone(),
                error,
            })?;

        client
            .submit(endpoint, &request, token)
            .await
            .map_err(|source| FlushError::Submission {
                project: sample.project.clone(),
                environment: sample.environment.clone(),
                source,
            })?;

        debug!(
            project = %sample.project,
            environment = %sample.environment,
            functions = sample.hotpaths.len(),
            "group submitted"
        );
        Ok(())
    }
}

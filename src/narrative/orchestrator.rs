//! Narrative orchestration.
//!
//! Sections are independent: they are requested concurrently and each
//! result is written only to its own entry. A section that fails is
//! replaced by its fallback text and never fails the run.

use crate::config::NarrativeConfig;
use crate::error::{BackendError, NarrativeError, PipelineError};
use crate::narrative::backend::NarrativeBackend;
use crate::narrative::digest::build_digest;
use crate::narrative::fallback::fallback_text;
use crate::narrative::prompts;
use crate::narrative::NarrativeRequest;
use crate::pipeline::CancelToken;
use crate::progress::{Checkpoint, ProgressSink};
use crate::report::model::{Narrative, NarrativeSection, ReportModel};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry and timeout policy for one section.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after a transient failure.
    pub max_retries: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline for a single backend call.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &NarrativeConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    /// Delay before retry number `retry` (1-based), doubling up to the cap.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// What happened to the narrative sections of a run.
#[derive(Debug, Default)]
pub struct NarrativeOutcome {
    /// Sections written by the backend.
    pub generated: Vec<NarrativeSection>,
    /// Sections that fell back, with the reason.
    pub failed: Vec<(NarrativeSection, NarrativeError)>,
    /// True when no backend was configured.
    pub offline: bool,
}

/// Requests narrative text for every section of a report.
pub struct NarrativeOrchestrator {
    backend: Option<Arc<dyn NarrativeBackend>>,
    policy: RetryPolicy,
    concurrency: usize,
    top_banks: usize,
}

impl NarrativeOrchestrator {
    pub fn new(
        backend: Option<Arc<dyn NarrativeBackend>>,
        policy: RetryPolicy,
        concurrency: usize,
        top_banks: usize,
    ) -> Self {
        Self {
            backend,
            policy,
            concurrency: concurrency.max(1),
            top_banks,
        }
    }

    /// Label of the configured backend.
    pub fn provider_name(&self) -> String {
        match &self.backend {
            Some(backend) => backend.name(),
            None => "offline".to_string(),
        }
    }

    /// Fill every narrative section of `model`.
    ///
    /// Returns [`PipelineError::Cancelled`] if `cancel` fires first; any
    /// in-flight requests are dropped and their results discarded.
    pub async fn narrate(
        &self,
        model: ReportModel,
        cancel: &CancelToken,
        progress: &Arc<dyn ProgressSink>,
    ) -> Result<(ReportModel, NarrativeOutcome), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let Some(backend) = self.backend.clone() else {
            let narratives = NarrativeSection::ALL
                .iter()
                .map(|&s| (s, Narrative::fallback(fallback_text(&model, s), None)))
                .collect();
            let outcome = NarrativeOutcome {
                offline: true,
                ..NarrativeOutcome::default()
            };
            return Ok((model.with_narratives(narratives), outcome));
        };

        info!(
            "Generating {} narrative sections with {}",
            NarrativeSection::ALL.len(),
            backend.name()
        );

        let results = {
            let model_ref = &model;
            let requests = NarrativeSection::ALL.iter().map(|&section| {
                let backend = Arc::clone(&backend);
                let progress = Arc::clone(progress);
                async move {
                    progress.checkpoint(Checkpoint::GeneratingNarrative(section));
                    let result = self
                        .generate_section(backend.as_ref(), model_ref, section)
                        .await;
                    (section, result)
                }
            });

            let collected = stream::iter(requests)
                .buffer_unordered(self.concurrency)
                .collect::<Vec<_>>();

            tokio::select! {
                results = collected => results,
                _ = cancel.cancelled() => {
                    warn!("Run cancelled; discarding in-flight narrative requests");
                    return Err(PipelineError::Cancelled);
                }
            }
        };

        let mut outcome = NarrativeOutcome::default();
        let mut narratives = BTreeMap::new();

        for (section, result) in results {
            match result {
                Ok(text) => {
                    outcome.generated.push(section);
                    narratives.insert(section, Narrative::generated(text));
                }
                Err(err) => {
                    warn!("Using fallback text for {}: {}", section, err);
                    narratives.insert(
                        section,
                        Narrative::fallback(fallback_text(&model, section), Some(err.to_string())),
                    );
                    outcome.failed.push((section, err));
                }
            }
        }

        outcome.generated.sort();
        outcome.failed.sort_by_key(|(section, _)| *section);

        Ok((model.with_narratives(narratives), outcome))
    }

    async fn generate_section(
        &self,
        backend: &dyn NarrativeBackend,
        model: &ReportModel,
        section: NarrativeSection,
    ) -> Result<String, NarrativeError> {
        let digest = build_digest(model, section, self.top_banks)?;
        let request = NarrativeRequest {
            section,
            digest: digest.render()?,
            instruction: prompts::instruction(section).to_string(),
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = match tokio::time::timeout(self.policy.timeout, backend.generate(&request)).await
            {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout),
            };

            match result {
                Ok(text) => {
                    debug!("{} generated on attempt {}", section, attempts);
                    return Ok(text);
                }
                Err(err) if !err.is_transient() => {
                    return Err(NarrativeError::Rejected {
                        section: section.key(),
                        cause: err,
                    });
                }
                Err(err) if attempts > self.policy.max_retries => {
                    return Err(NarrativeError::RetriesExhausted {
                        section: section.key(),
                        attempts,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.policy.delay(attempts);
                    debug!(
                        "{} failed ({}), retrying in {}ms",
                        section,
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

//! The analysis processor: one processing attempt for one record.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::fault::{Disposition, PipelineFault};
use super::parser::parse_response;
use super::prompt::PromptBuilder;
use super::tooling::{SubmissionObserver, SubmitAnalysisTool, TOOL_MODE_INSTRUCTIONS};
use super::PipelineConfig;
use crate::analysis::{AnalysisRecord, AnalysisStatus, AnalysisStore, AnalysisStoreError, AnalysisUpdate};
use crate::document::TextExtractor;
use crate::llm::{CompletionRequest, LlmClient};
use crate::metrics;
use crate::notification::Notifier;

/// Runs extract, prompt, model, parse, persist and notify for a record,
/// and owns its status transitions.
///
/// Callers must not run two attempts for the same id at once; the store's
/// compare-and-set transitions only keep overlapping attempts from
/// corrupting the record.
pub struct AnalysisProcessor {
    analyses: Arc<dyn AnalysisStore>,
    extractor: Arc<dyn TextExtractor>,
    llm: Arc<dyn LlmClient>,
    notifier: Notifier,
    prompt: PromptBuilder,
    config: PipelineConfig,
    max_tokens: u32,
    temperature: f32,
}

impl AnalysisProcessor {
    pub fn new(
        analyses: Arc<dyn AnalysisStore>,
        extractor: Arc<dyn TextExtractor>,
        llm: Arc<dyn LlmClient>,
        notifier: Notifier,
        config: PipelineConfig,
    ) -> Self {
        Self {
            analyses,
            extractor,
            llm,
            notifier,
            prompt: PromptBuilder::default(),
            config,
            max_tokens: 4096,
            temperature: 0.0,
        }
    }

    pub fn with_prompt(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    /// Generation settings passed with every model request.
    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn analyses(&self) -> &Arc<dyn AnalysisStore> {
        &self.analyses
    }

    /// Run one processing attempt.
    ///
    /// On success the record is `Completed` and a success notification
    /// exists. On a fault the record is `Failed` with the fault's message and
    /// a failure notification exists, except for [`Disposition::Discard`]
    /// faults, which leave everything untouched.
    ///
    /// A notification that cannot be stored is logged and never changes the
    /// outcome: the record transition has already been committed.
    #[instrument(skip(self), fields(provider = self.llm.provider()))]
    pub async fn process(&self, analysis_id: &str) -> Result<(), PipelineFault> {
        let start = Instant::now();
        let result = self.process_inner(analysis_id).await;

        let outcome = match &result {
            Ok(()) => "completed",
            Err(fault) if fault.disposition() == Disposition::Discard => "discarded",
            Err(_) => "failed",
        };
        metrics::ANALYSES_PROCESSED
            .with_label_values(&[outcome])
            .inc();
        metrics::PROCESSING_DURATION
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        result
    }

    async fn process_inner(&self, analysis_id: &str) -> Result<(), PipelineFault> {
        let record = self.analyses.get(analysis_id)?.ok_or_else(|| {
            debug!("Analysis no longer exists, discarding");
            PipelineFault::NotFound {
                analysis_id: analysis_id.to_string(),
            }
        })?;

        if record.status.is_completed() {
            return Err(already_terminal(&record));
        }

        if record.status != AnalysisStatus::Pending && record.attempts >= self.config.max_attempts
        {
            if record.status == AnalysisStatus::Failed {
                return Err(already_terminal(&record));
            }
            // Left in Processing by an interrupted final attempt.
            return Err(self.abandon(&record));
        }

        let record = match self.analyses.apply(analysis_id, AnalysisUpdate::StartAttempt) {
            Ok(record) => record,
            Err(AnalysisStoreError::NotFound(_)) => {
                return Err(PipelineFault::NotFound {
                    analysis_id: analysis_id.to_string(),
                })
            }
            Err(AnalysisStoreError::StaleState { current_status, .. }) => {
                return Err(PipelineFault::AlreadyTerminal {
                    analysis_id: analysis_id.to_string(),
                    status: current_status,
                })
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            attempt = record.attempts,
            max_attempts = self.config.max_attempts,
            "Processing analysis"
        );

        match self.run_attempt(&record).await {
            Ok(notified) => {
                if !notified {
                    // The record is committed; a retry could not resend this.
                    if let Err(e) = self.notifier.emit_success(analysis_id) {
                        error!(error = %e, "Analysis completed but notification failed");
                    }
                }
                info!(attempt = record.attempts, "Analysis completed");
                Ok(())
            }
            Err(fault) => Err(self.record_failure(analysis_id, fault)),
        }
    }

    /// Everything from extraction to the `Completed` transition. Returns
    /// whether the success notification was already sent.
    async fn run_attempt(&self, record: &AnalysisRecord) -> Result<bool, PipelineFault> {
        let text = self.extractor.extract(&record.document).await?;
        self.analyses
            .apply(&record.id, AnalysisUpdate::ExtractedText(text.clone()))?;

        let request = CompletionRequest::new(self.prompt.build(&text))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let (result, notified) = if self.config.tool_mode {
            self.ask_with_tool(&record.id, request).await?
        } else {
            let response = self.llm.complete(request).await?;
            debug!(
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "Model responded"
            );
            (parse_response(&response.text).into_value(), false)
        };

        self.analyses
            .apply(&record.id, AnalysisUpdate::Complete(result))?;
        Ok(notified)
    }

    async fn ask_with_tool(
        &self,
        analysis_id: &str,
        request: CompletionRequest,
    ) -> Result<(Value, bool), PipelineFault> {
        let observer = SubmissionObserver::new(analysis_id, &self.notifier);
        let outcome = self
            .llm
            .complete_with_tool(
                request.with_system(TOOL_MODE_INSTRUCTIONS),
                &SubmitAnalysisTool,
                &observer,
            )
            .await;
        let submission = observer.finish();

        // A submitted analysis outlives a fault in a later round.
        let result = match (submission.analysis, outcome) {
            (Some(analysis), Ok(_)) => analysis,
            (Some(analysis), Err(e)) => {
                warn!(error = %e, "Model failed after submitting, keeping the submission");
                analysis
            }
            (None, Ok(response)) => {
                warn!(
                    tool_calls = response.tool_calls,
                    "Model answered without submitting, parsing text"
                );
                parse_response(&response.text).into_value()
            }
            (None, Err(e)) => return Err(e.into()),
        };
        Ok((result, submission.notified))
    }

    /// Persist the failure and notify. Returns the fault to surface.
    fn record_failure(&self, analysis_id: &str, fault: PipelineFault) -> PipelineFault {
        let message = fault.to_string();
        error!(
            kind = fault.kind(),
            retryable = fault.is_retryable(),
            error = %message,
            "Analysis attempt failed"
        );

        match self
            .analyses
            .apply(analysis_id, AnalysisUpdate::Fail(message.clone()))
        {
            Ok(_) => {}
            Err(AnalysisStoreError::NotFound(_)) => {
                debug!("Analysis deleted during processing, discarding");
                return PipelineFault::NotFound {
                    analysis_id: analysis_id.to_string(),
                };
            }
            Err(e) => {
                error!(error = %e, "Failed to record analysis failure");
                return fault;
            }
        }

        if let Err(e) = self.notifier.emit_failure(analysis_id, &message) {
            error!(error = %e, "Failed to create failure notification");
        }
        fault
    }

    fn abandon(&self, record: &AnalysisRecord) -> PipelineFault {
        let fault = PipelineFault::Exhausted {
            analysis_id: record.id.clone(),
            attempts: record.attempts,
        };
        warn!(attempts = record.attempts, "Found interrupted final attempt");
        self.record_failure(&record.id, fault)
    }
}

fn already_terminal(record: &AnalysisRecord) -> PipelineFault {
    debug!(status = %record.status, "Analysis already terminal, discarding");
    PipelineFault::AlreadyTerminal {
        analysis_id: record.id.clone(),
        status: record.status,
    }
}

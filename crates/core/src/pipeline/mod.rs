//! The analysis pipeline.
//!
//! [`AnalysisProcessor`] turns an uploaded document into a structured
//! analysis: extract text, build the prompt, ask the model, parse the answer,
//! persist it and notify the user. Failures come back as a typed
//! [`PipelineFault`] whose [`Disposition`] tells the scheduler what to do.

mod config;
mod fault;
mod parser;
mod processor;
mod prompt;
mod tooling;

pub use config::PipelineConfig;
pub use fault::{Disposition, PipelineFault};
pub use parser::{parse_response, ParseOutcome, NO_STRUCTURE_MESSAGE};
pub use processor::AnalysisProcessor;
pub use prompt::{PromptBuilder, CV_TEXT_BEGIN, CV_TEXT_END};
pub use tooling::{
    Submission, SubmissionObserver, SubmitAnalysisTool, SUBMIT_TOOL_NAME, TOOL_MODE_INSTRUCTIONS,
};

//! Narrative generation for report sections.
//!
//! Each section's statistics are condensed into a digest and sent to an
//! interchangeable text backend. Sections that cannot be generated fall
//! back to a deterministic statement built from the same statistics.

pub mod backend;
pub mod digest;
pub mod fallback;
pub mod orchestrator;
pub mod prompts;

use crate::report::model::NarrativeSection;

pub use backend::create_backend;
pub use orchestrator::{NarrativeOrchestrator, NarrativeOutcome, RetryPolicy};

/// One request to a narrative backend.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeRequest {
    pub section: NarrativeSection,
    /// Rendered statistical digest.
    pub digest: String,
    /// Section-specific instruction template.
    pub instruction: String,
}

//! Error taxonomy for the annotation pipeline (spec §7).

use thiserror::Error;

/// The seven error categories the pipeline distinguishes.
///
/// Validation and canonicalisation errors are attributed to a single input;
/// transient/permanent errors come from the HTTP layer; cache errors are
/// always swallowed before reaching a public API (kept here only so that
/// internal helpers have a typed value to log); formula and inheritance
/// errors are isolated per-variable/per-variant by their respective engines.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Malformed input, unrecognised CNV type, or missing required options.
    #[error("validation error: {0}")]
    Validation(String),

    /// The recoder returned no canonical VCF string for this input.
    #[error("could not canonicalise input {original_input:?}: {reason}")]
    Canonicalisation {
        original_input: String,
        reason: String,
    },

    /// 5xx / 429 / network timeout, surfaced only after retries are exhausted.
    #[error("transient network error after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },

    /// 4xx other than 429.
    #[error("remote service rejected the request ({status}): {message}")]
    Permanent { status: u16, message: String },

    /// Best-effort cache failure; never surfaced to a caller, only logged.
    #[error("cache error: {0}")]
    Cache(String),

    /// A single formula or variable failed to evaluate.
    #[error("formula evaluation error in {name:?}: {reason}")]
    Formula { name: String, reason: String },

    /// Inheritance analysis failed for a single variant.
    #[error("inheritance analysis failed for variant {variant_key:?}: {reason}")]
    Inheritance {
        variant_key: String,
        reason: String,
    },
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn canonicalisation(original_input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Canonicalisation {
            original_input: original_input.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

//! Frame analysis through a remote vision model.
//!
//! A captured still is JPEG-encoded, stripped of its data-URL header and sent
//! with a fixed instruction to an [`AnalysisClient`]. The
//! [`AnalysisRequester`] folds every failure into an [`AnalysisOutcome`] so
//! nothing escapes to the caller.

mod client;
pub mod data_url;
mod requester;

pub use client::{
    AnalysisClient, AnalysisRequest, ClientError, HttpAnalysisClient, UnconfiguredClient,
    API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL,
};
pub use requester::{
    AnalysisFailure, AnalysisOutcome, AnalysisRequester, DEFAULT_ANALYSIS_TIMEOUT,
    DEFAULT_INSTRUCTION, EMPTY_DESCRIPTION_PLACEHOLDER,
};

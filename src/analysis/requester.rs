//! One-shot frame analysis with a single in-flight request.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::client::{AnalysisClient, AnalysisRequest};
use super::data_url::{strip_data_url_prefix, JPEG_MIME};
use crate::capture::{StillFrame, DEFAULT_JPEG_QUALITY};

/// Returned in place of an empty description.
pub const EMPTY_DESCRIPTION_PLACEHOLDER: &str = "No description was returned for this frame.";

/// Instruction sent with every still unless configured otherwise.
pub const DEFAULT_INSTRUCTION: &str =
    "Describe what is in front of the camera in one or two short sentences.";

/// Default upper bound for one analysis round trip.
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Why an analysis produced no description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisFailure {
    #[error("Another analysis is already in progress")]
    Busy,

    #[error("Failed to encode frame: {0}")]
    Encoding(String),

    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Analysis failed: {0}")]
    Collaborator(String),
}

/// Result of one analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Text(String),
    Failure(AnalysisFailure),
}

impl AnalysisOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            AnalysisOutcome::Text(text) => Some(text),
            AnalysisOutcome::Failure(_) => None,
        }
    }
}

impl fmt::Display for AnalysisOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisOutcome::Text(text) => f.write_str(text),
            AnalysisOutcome::Failure(failure) => write!(f, "{}", failure),
        }
    }
}

/// Clears the in-flight flag even if the analysis future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sends stills to an [`AnalysisClient`].
pub struct AnalysisRequester {
    client: Arc<dyn AnalysisClient>,
    timeout: Duration,
    jpeg_quality: u8,
    in_flight: AtomicBool,
}

impl AnalysisRequester {
    pub fn new(client: Arc<dyn AnalysisClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_ANALYSIS_TIMEOUT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Describe `frame` following `instruction`.
    ///
    /// Consumes the frame. Never fails: every error is folded into
    /// `AnalysisOutcome::Failure`, and a call made while another is pending
    /// returns `Failure(AnalysisFailure::Busy)`. A blank `instruction` is
    /// replaced by [`DEFAULT_INSTRUCTION`].
    pub async fn analyze(&self, frame: StillFrame, instruction: &str) -> AnalysisOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Rejecting analysis of {}: request already in flight", frame.fingerprint());
            return AnalysisOutcome::Failure(AnalysisFailure::Busy);
        }
        let _guard = InFlight(&self.in_flight);

        let instruction = match instruction.trim() {
            "" => DEFAULT_INSTRUCTION,
            trimmed => trimmed,
        };

        let outcome = self.send(frame, instruction).await;
        match &outcome {
            AnalysisOutcome::Text(text) => log::info!("Analysis returned {} chars", text.len()),
            AnalysisOutcome::Failure(failure) => log::warn!("{}", failure),
        }
        outcome
    }

    async fn send(&self, frame: StillFrame, instruction: &str) -> AnalysisOutcome {
        let data_url = match frame.to_data_url(self.jpeg_quality) {
            Ok(url) => url,
            Err(e) => return AnalysisOutcome::Failure(AnalysisFailure::Encoding(e.to_string())),
        };
        log::debug!(
            "Sending {}x{} still {} ({} bytes base64)",
            frame.width(),
            frame.height(),
            frame.fingerprint(),
            data_url.len()
        );
        drop(frame);

        let request = AnalysisRequest {
            image: strip_data_url_prefix(&data_url).to_string(),
            mime_type: JPEG_MIME.to_string(),
            instruction: instruction.to_string(),
        };

        match tokio::time::timeout(self.timeout, self.client.describe(&request)).await {
            Err(_) => AnalysisOutcome::Failure(AnalysisFailure::Timeout(self.timeout)),
            Ok(Err(e)) => AnalysisOutcome::Failure(AnalysisFailure::Collaborator(e.to_string())),
            Ok(Ok(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    AnalysisOutcome::Text(EMPTY_DESCRIPTION_PLACEHOLDER.to_string())
                } else {
                    AnalysisOutcome::Text(text.to_string())
                }
            }
        }
    }
}

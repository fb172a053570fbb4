use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the recognition pipeline
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// Missing, empty or undecodable input image
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// No vehicle region survived the pipeline. User-actionable, not a fault.
    #[error("no license plates detected with sufficient confidence")]
    NoDetection,

    /// A model capability failed at runtime
    #[error("model invocation failed: {context}")]
    ModelInvocation {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// Inference did not finish within the configured budget; retryable
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
}

impl RecognitionError {
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn model(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ModelInvocation {
            context: context.into(),
            source,
        }
    }

    /// Whether a caller may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Label used for the request outcome metric
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidImage(_) => "invalid_input",
            Self::NoDetection => "no_detection",
            Self::ModelInvocation { .. } | Self::Timeout(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RecognitionError::invalid_image("empty").outcome(), "invalid_input");
        assert_eq!(RecognitionError::NoDetection.outcome(), "no_detection");
        assert_eq!(
            RecognitionError::model("ocr", anyhow::anyhow!("boom")).outcome(),
            "error"
        );
        assert_eq!(RecognitionError::Timeout(Duration::from_secs(1)).outcome(), "error");
        assert!(RecognitionError::Timeout(Duration::from_secs(1)).is_retryable());
    }
}

use crate::types::PredictionCategory;
use thiserror::Error;

/// Errors surfaced by the acquisition, generation and pool stages
#[derive(Error, Debug)]
pub enum PipelineError {
    // Acquisition
    #[error("No usable data from any source: {0}")]
    AcquisitionDegraded(String),

    // Preconditions
    #[error("Not enough matches for {category}: need {required}, have {available}")]
    InsufficientData {
        category: PredictionCategory,
        required: usize,
        available: usize,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Model output
    #[error("Empty response from generative model")]
    EmptyModelResponse,

    #[error("Generative model returned non-JSON output")]
    ModelOutputNotJson { raw: String },

    #[error("Generative model output does not match schema: {0}")]
    ModelOutputSchema(String),

    // Upstream provider
    #[error("Model API quota exceeded")]
    QuotaExceeded,

    #[error("Model API rejected credentials")]
    AuthFailed,

    #[error("Model API requires payment")]
    PaymentRequired,

    #[error("Model API error (status {status:?}): {message}")]
    Provider { status: Option<u16>, message: String },

    // Serving
    #[error("No pooled {0} predictions available")]
    EmptyPool(PredictionCategory),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Infrastructure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Stable machine-readable code for consumers
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::AcquisitionDegraded(_) => "ACQUISITION_DEGRADED",
            PipelineError::InsufficientData { .. } => "NOT_ENOUGH_MATCHES",
            PipelineError::InvalidRequest(_) => "INVALID_REQUEST",
            PipelineError::EmptyModelResponse => "MODEL_EMPTY_RESPONSE",
            PipelineError::ModelOutputNotJson { .. } => "MODEL_INVALID_JSON",
            PipelineError::ModelOutputSchema(_) => "MODEL_SCHEMA_MISMATCH",
            PipelineError::QuotaExceeded => "MODEL_QUOTA_EXCEEDED",
            PipelineError::AuthFailed => "MODEL_AUTH_ERROR",
            PipelineError::PaymentRequired => "MODEL_PAYMENT_REQUIRED",
            PipelineError::Provider { .. } => "MODEL_PROVIDER_ERROR",
            PipelineError::EmptyPool(_) => "NO_PREDICTIONS",
            PipelineError::Forbidden(_) => "FORBIDDEN",
            PipelineError::Database(_)
            | PipelineError::Redis(_)
            | PipelineError::Http(_)
            | PipelineError::Json(_)
            | PipelineError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status used by the consumer surface
    pub fn http_status(&self) -> u16 {
        match self {
            PipelineError::InvalidRequest(_) => 400,
            PipelineError::AuthFailed => 401,
            PipelineError::PaymentRequired => 402,
            PipelineError::Forbidden(_) => 403,
            PipelineError::QuotaExceeded => 429,
            PipelineError::InsufficientData { .. } => 409,
            PipelineError::EmptyPool(_) | PipelineError::AcquisitionDegraded(_) => 503,
            PipelineError::EmptyModelResponse
            | PipelineError::ModelOutputNotJson { .. }
            | PipelineError::ModelOutputSchema(_)
            | PipelineError::Provider { .. } => 502,
            _ => 500,
        }
    }

    /// What an operator should do about an upstream provider failure
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            PipelineError::QuotaExceeded => Some(
                "Check the model API balance and billing limits at https://platform.openai.com/account/billing",
            ),
            PipelineError::AuthFailed => {
                Some("Check OPENAI_API_KEY (env var or /run/secrets/openai_api_key)")
            }
            PipelineError::PaymentRequired => {
                Some("Top up the model API account at https://platform.openai.com/account/billing")
            }
            _ => None,
        }
    }

    /// Message safe to show a consumer; internal failures are not echoed verbatim
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::EmptyPool(_) => {
                "Predictions are being refreshed. Try again in a few minutes.".to_string()
            }
            PipelineError::Provider { .. } => {
                "Model provider is unavailable. Try again later.".to_string()
            }
            PipelineError::Database(_)
            | PipelineError::Redis(_)
            | PipelineError::Http(_)
            | PipelineError::Json(_)
            | PipelineError::Other(_) => "Internal error".to_string(),
            other => match other.remediation() {
                Some(hint) => format!("{}. {}", other, hint),
                None => other.to_string(),
            },
        }
    }
}

/// Result type alias for PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

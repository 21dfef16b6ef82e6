//! Provider error types for chorus-llm.
//!
//! All provider and orchestration operations return [`Result<T>`] which uses
//! [`ProviderError`] as the error type.

use thiserror::Error;

use crate::ledger::ExceptionLedger;

/// Errors raised by provider adapters, the runtime bridge, or the orchestrator.
#[derive(Error, Debug)]
pub enum ProviderError {
    // ── Adapter failures (safe to fall back before output starts) ──
    /// The request to the provider failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Authentication with the provider was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The provider returned a rate-limit response.
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait time before retrying, in milliseconds.
        retry_after_ms: u64,
    },

    /// The requested model does not exist on the provider.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The provider has not been configured (e.g. missing credentials).
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// The provider returned a response that could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The provider invocation exceeded its deadline.
    #[error("timeout")]
    Timeout,

    /// Streaming was requested from a provider that cannot stream.
    #[error("streaming not supported: {0}")]
    StreamNotSupported(String),

    /// The provider is known to be broken.
    #[error("provider not working: {0}")]
    NotWorking(String),

    /// The provider finished without producing any content.
    #[error("provider returned no content")]
    EmptyResponse,

    // ── Runtime bridge ──
    /// A blocking call was made from inside an async runtime that cannot
    /// be re-entered.
    #[error(
        "nested runtime unsupported: blocking call made from inside a current-thread runtime"
    )]
    NestedRuntime,

    /// The bridge could not build or drive a runtime.
    #[error("runtime error: {0}")]
    Runtime(String),

    // ── Orchestration outcomes ──
    /// A provider failed after its output had already reached the caller.
    #[error("{provider} failed mid-stream: {source}")]
    MidStream {
        provider: String,
        #[source]
        source: Box<ProviderError>,
    },

    /// Every attempted provider failed before producing content.
    #[error("{ledger}")]
    AllProvidersFailed { ledger: ExceptionLedger },

    /// No candidate survived selection, so nothing was attempted.
    #[error("no eligible provider found")]
    NoEligibleProvider,

    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// A JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// Short, stable name of the error kind, used in aggregate reports and
    /// error markers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestFailed(_) => "RequestFailed",
            Self::AuthFailed(_) => "AuthFailed",
            Self::RateLimited { .. } => "RateLimited",
            Self::ModelNotFound(_) => "ModelNotFound",
            Self::NotConfigured(_) => "NotConfigured",
            Self::InvalidResponse(_) => "InvalidResponse",
            Self::Timeout => "Timeout",
            Self::StreamNotSupported(_) => "StreamNotSupported",
            Self::NotWorking(_) => "NotWorking",
            Self::EmptyResponse => "EmptyResponse",
            Self::NestedRuntime => "NestedRuntime",
            Self::Runtime(_) => "Runtime",
            Self::MidStream { .. } => "MidStream",
            Self::AllProvidersFailed { .. } => "AllProvidersFailed",
            Self::NoEligibleProvider => "NoEligibleProvider",
            Self::Config(_) => "Config",
            Self::Json(_) => "Json",
        }
    }

    /// Whether this is a provider-side failure that another provider (or
    /// another attempt) might not hit.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed(_)
                | Self::AuthFailed(_)
                | Self::RateLimited { .. }
                | Self::ModelNotFound(_)
                | Self::NotConfigured(_)
                | Self::InvalidResponse(_)
                | Self::Timeout
                | Self::StreamNotSupported(_)
                | Self::NotWorking(_)
                | Self::EmptyResponse
        )
    }

    /// Whether output had already started when this error was raised.
    pub fn is_mid_stream(&self) -> bool {
        matches!(self, Self::MidStream { .. })
    }

    /// The per-provider ledger, if this is an exhaustion error.
    pub fn ledger(&self) -> Option<&ExceptionLedger> {
        match self {
            Self::AllProvidersFailed { ledger } => Some(ledger),
            _ => None,
        }
    }

    /// Unwraps a mid-stream failure into the adapter's original error.
    pub fn into_inner(self) -> ProviderError {
        match self {
            Self::MidStream { source, .. } => *source,
            other => other,
        }
    }
}

/// A convenience type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

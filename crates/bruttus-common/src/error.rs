/// Errors shared across the Bruttus crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("{provider} key absent")]
    ConfigMissing { provider: String },

    #[error("{provider} HTTP {status}")]
    ProviderHttp { provider: String, status: u16 },

    #[error("{provider} request failed: {message}")]
    ProviderTransport { provider: String, message: String },

    #[error("{provider} returned a malformed payload: {message}")]
    ProviderPayload { provider: String, message: String },

    #[error("no LLM provider available")]
    NoProviderAvailable,

    #[error("dispatcher is shut down")]
    DispatcherClosed,

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures raised by a provider call itself (as opposed to
    /// configuration or local plumbing).
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Error::ProviderHttp { .. }
                | Error::ProviderTransport { .. }
                | Error::ProviderPayload { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

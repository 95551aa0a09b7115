use std::sync::Arc;

use bruttus_common::Error;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::providers::{LlmProvider, LlmRequest};

/// Availability of one provider, fixed for the rest of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub available: bool,
    pub tested: bool,
    pub error: Option<String>,
}

impl ProviderStatus {
    fn ok() -> Self {
        Self {
            available: true,
            tested: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            available: false,
            tested: true,
            error: Some(error.into()),
        }
    }
}

/// Send one `ping` through `provider` and report whether it answered with
/// text. Never fails: every outcome becomes a status record.
pub async fn probe(provider: &dyn LlmProvider) -> ProviderStatus {
    let name = provider.display_name().to_string();

    if !provider.api_key_present() {
        let err = Error::ConfigMissing {
            provider: name.clone(),
        };
        info!(provider = %name, "provider disabled: {err}");
        return ProviderStatus::failed(err.to_string());
    }

    match provider.complete(&LlmRequest::ping()).await {
        Ok(text) if !text.trim().is_empty() => {
            info!(provider = %name, "provider available");
            ProviderStatus::ok()
        }
        Ok(_) => {
            warn!(provider = %name, "provider answered the probe without text");
            ProviderStatus::failed("invalid response")
        }
        Err(e) => {
            warn!(provider = %name, "provider probe failed: {e}");
            ProviderStatus::failed(e.to_string())
        }
    }
}

/// Probe every provider concurrently, preserving input order.
pub async fn probe_all(providers: &[Arc<dyn LlmProvider>]) -> Vec<ProviderStatus> {
    join_all(providers.iter().map(|p| probe(p.as_ref()))).await
}

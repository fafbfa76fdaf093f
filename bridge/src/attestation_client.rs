//! Attestation store client.

use std::time::Duration;

use tracing::{debug, instrument, warn};
use vescrow_core::attestation::StatusReport;

use crate::error::{BridgeError, Result};

/// Where the bridge looks up attestation status.
///
/// Any failure is `None`: an unreachable or garbled store is a skip, never
/// an error.
#[async_trait::async_trait]
pub trait AttestationSource: Send + Sync {
    async fn fetch(&self, chain_id: u64, agreement_id: u64) -> Option<StatusReport>;
}

/// Reads `GET {base}/tasks/{chainId}/{agreementId}` from the store.
pub struct HttpAttestationSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAttestationSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl AttestationSource for HttpAttestationSource {
    #[instrument(skip(self))]
    async fn fetch(&self, chain_id: u64, agreement_id: u64) -> Option<StatusReport> {
        let url = format!("{}/tasks/{chain_id}/{agreement_id}", self.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Attestation store unreachable");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "Attestation store refused lookup");
            return None;
        }
        let report = match response.json::<StatusReport>().await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Unparseable attestation status");
                return None;
            }
        };
        if report.chain_id != chain_id || report.agreement_id != agreement_id {
            warn!(
                got_chain_id = report.chain_id,
                got_agreement_id = report.agreement_id,
                "Attestation status for a different key"
            );
            return None;
        }
        debug!(status = %report.status, "Attestation status fetched");
        Some(report)
    }
}

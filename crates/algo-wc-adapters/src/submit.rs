use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;

use algo_wc_core::{NetworkSubmitPort, PortError, SubmitError};

use crate::config::NetworkConfig;

pub const ALGOD_TOKEN_HEADER: &str = "X-Algo-API-Token";

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Debug, Deserialize)]
struct AlgodError {
    message: String,
}

/// Posts signed transaction groups to an algod node.
#[derive(Debug, Clone)]
pub struct AlgodSubmitAdapter {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl AlgodSubmitAdapter {
    pub fn with_config(config: &NetworkConfig, timeout_ms: u64) -> Result<Self, PortError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| PortError::Transport(format!("algod client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: config.algod_url.trim_end_matches('/').to_owned(),
            token: config.algod_token.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v2/transactions", self.base_url)
    }
}

impl NetworkSubmitPort for AlgodSubmitAdapter {
    async fn submit(&self, signed_payload: &[u8]) -> Result<String, SubmitError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/x-binary")
            .body(signed_payload.to_vec());
        if let Some(token) = &self.token {
            request = request.header(ALGOD_TOKEN_HEADER, token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SubmitError::Transport(format!("algod request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AlgodError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(SubmitError::Rejected(format!("algod {status}: {message}")));
        }
        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SubmitError::Transport(format!("algod response decode failed: {e}")))?;
        Ok(parsed.tx_id)
    }
}

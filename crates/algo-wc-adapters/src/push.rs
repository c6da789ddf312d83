use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use algo_wc_core::{PortError, PushSubscriptionPort, Session};

use crate::config::NetworkConfig;

#[derive(Debug, Serialize)]
struct SubscribeBody<'a> {
    topic_id: &'a str,
    dapp_name: &'a str,
    peer_url: &'a str,
    push_token: &'a str,
}

/// Registers v1 session topics with the wallet backend so the bridge can
/// wake the device when a request arrives.
#[derive(Debug, Clone)]
pub struct PushSubscriptionAdapter {
    client: Client,
    base_url: String,
}

impl PushSubscriptionAdapter {
    pub fn with_config(config: &NetworkConfig, timeout_ms: u64) -> Result<Self, PortError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| PortError::Transport(format!("push client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: config.push_backend_url.trim_end_matches('/').to_owned(),
        })
    }
}

impl PushSubscriptionPort for PushSubscriptionAdapter {
    async fn subscribe(&self, session: &Session, push_token: &str) -> Result<(), PortError> {
        let url = format!("{}/v1/wallet-connect/subscribe/", self.base_url);
        let body = SubscribeBody {
            topic_id: &session.topic,
            dapp_name: &session.peer_name,
            peer_url: &session.peer_url,
            push_token,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("push subscribe failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Transport(format!(
                "push subscribe status {status}"
            )));
        }
        debug!(topic = %session.topic, "push subscription registered");
        Ok(())
    }
}

//! OpenShock HTTP client.
//!
//! Sends control commands to `POST {api_url}/2/shockers/control`,
//! authenticated with the `OpenShockToken` header.

use anyhow::{Context, Result};
use serde::Serialize;
use uuid::Uuid;

use shocker_kernel::config::OpenShockConfig;
use shocker_kernel::{ControlCommand, ControlSink, ControlType};

/// Name shown to other users as the origin of our commands.
pub const CUSTOM_NAME: &str = "ShockOsc";

const TOKEN_HEADER: &str = "OpenShockToken";

/// OpenShock API client.
#[derive(Clone)]
pub struct OpenShockClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

/// Request body for /2/shockers/control.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ControlRequest<'a> {
    shocks: Vec<Shock>,
    custom_name: &'a str,
}

/// One entry of a control request.
#[derive(Debug, Serialize)]
struct Shock {
    id: Uuid,
    #[serde(rename = "type")]
    control_type: ControlType,
    intensity: u8,
    duration: u32,
    exclusive: bool,
}

impl From<&ControlCommand> for Shock {
    fn from(command: &ControlCommand) -> Self {
        Self {
            id: command.shocker_id,
            control_type: command.control_type,
            intensity: command.intensity.min(100),
            duration: command.duration,
            exclusive: true,
        }
    }
}

impl OpenShockClient {
    /// Create a new client.
    pub fn new(config: &OpenShockConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        }
    }

    fn control_url(&self) -> String {
        format!("{}/2/shockers/control", self.base_url)
    }

    /// Send a single command.
    pub async fn control(&self, command: &ControlCommand) -> Result<()> {
        let request = ControlRequest {
            shocks: vec![Shock::from(command)],
            custom_name: CUSTOM_NAME,
        };

        let response = self
            .client
            .post(self.control_url())
            .header(TOKEN_HEADER, &self.token)
            .json(&request)
            .send()
            .await
            .context("Failed to send control request to OpenShock")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenShock control failed with status {}: {}", status, body);
        }
        Ok(())
    }
}

impl ControlSink for OpenShockClient {
    async fn send(&self, command: &ControlCommand) -> Result<()> {
        self.control(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        let config = OpenShockConfig {
            api_url: "https://api.example.test/".to_string(),
            api_token: "secret".to_string(),
            connection_id: None,
        };
        let client = OpenShockClient::new(&config);
        assert_eq!(client.base_url, "https://api.example.test");
        assert_eq!(
            client.control_url(),
            "https://api.example.test/2/shockers/control"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let id = Uuid::parse_str("2f1e4b0c-8f57-4a4b-9d3c-6a3f5b9e1c01").unwrap();
        let command = ControlCommand::shock(id, 55, 2_000);
        let request = ControlRequest {
            shocks: vec![Shock::from(&command)],
            custom_name: CUSTOM_NAME,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "shocks": [{
                    "id": "2f1e4b0c-8f57-4a4b-9d3c-6a3f5b9e1c01",
                    "type": "Shock",
                    "intensity": 55,
                    "duration": 2000,
                    "exclusive": true
                }],
                "customName": "ShockOsc"
            })
        );
    }

    #[test]
    fn test_stop_serializes_type() {
        let shock = Shock::from(&ControlCommand::stop(Uuid::nil()));
        let value = serde_json::to_value(&shock).unwrap();
        assert_eq!(value["type"], "Stop");
        assert_eq!(value["intensity"], 0);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let config = OpenShockConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            api_token: String::new(),
            connection_id: None,
        };
        let client = OpenShockClient::new(&config);
        let result = client.control(&ControlCommand::stop(Uuid::nil())).await;
        assert!(result.is_err());
    }
}

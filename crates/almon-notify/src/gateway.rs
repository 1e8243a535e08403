use crate::error::SendError;
use crate::SmsSender;
use almon_common::types::ApiCredential;
use async_trait::async_trait;
use serde::Deserialize;

/// Maximum characters of a gateway error body carried into the error value.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// REST SMS gateway client.
///
/// Credentials map as: `username` = account id (basic-auth user),
/// `api_key` = auth token (basic-auth password), `api_secret` = the sending
/// phone number.
pub struct SmsGatewayClient {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

impl SmsGatewayClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for SmsGatewayClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SmsSender for SmsGatewayClient {
    async fn send(
        &self,
        creds: &ApiCredential,
        to: &str,
        body: &str,
    ) -> Result<String, SendError> {
        let from = creds.api_secret.as_deref().unwrap_or_default();
        let payload = serde_json::json!({
            "from": normalize_number(from),
            "to": normalize_number(to),
            "message": body,
        });

        let resp = self
            .client
            .post(format!("{}/messages", creds.api_url.trim_end_matches('/')))
            .basic_auth(&creds.username, Some(&creds.api_key))
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SendError::Auth(format!(
                "gateway rejected account {}",
                creds.username
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(SendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        let sent: SendResponse = serde_json::from_str(&text)?;
        tracing::info!(to = %to, message_id = %sent.id, "SMS accepted by gateway");
        Ok(sent.id)
    }

    async fn check_connection(&self, creds: &ApiCredential) -> bool {
        let result = self
            .client
            .get(format!("{}/account", creds.api_url.trim_end_matches('/')))
            .basic_auth(&creds.username, Some(&creds.api_key))
            .send()
            .await;
        match result {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::error!(error = %e, "SMS gateway connection check failed");
                false
            }
        }
    }
}

/// Ensure the number carries a leading `+`.
pub(crate) fn normalize_number(number: &str) -> String {
    if number.is_empty() || number.starts_with('+') {
        number.to_string()
    } else {
        format!("+{number}")
    }
}

#[cfg(test)]
pub(crate) use normalize_number as normalize_number_for_tests;

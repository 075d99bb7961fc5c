//! REST client for the relay
//!
//! Thin wrapper over the relay's HTTP API for one account. Every non-2xx
//! response becomes [`IngestError::Relay`] carrying the status and body.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use shared::{component_info, Component, SignalGroup, SignalMessage};

use crate::error::{IngestError, IngestResult};
use crate::traits::MessagingClient;

/// Request timeout for every relay call except the receive long-poll
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct RegisterRequest<'a> {
    use_voice: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    captcha: Option<&'a str>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: &'a str,
    number: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipients: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<&'a str>,
}

#[derive(Serialize)]
struct TypingRequest<'a> {
    recipient: &'a str,
    typing: bool,
}

/// Relay API client bound to one account number
#[derive(Clone)]
pub struct SignalClient {
    base_url: String,
    account: String,
    client: Client,
}

impl SignalClient {
    pub fn new(base_url: &str, account: &str) -> IngestResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            account: account.to_string(),
            client,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Start registration; the relay answers 402 when a captcha token is needed
    pub async fn register(&self, captcha: Option<&str>) -> IngestResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/v1/register/{}", self.account)))
            .json(&RegisterRequest {
                use_voice: false,
                captcha,
            })
            .send()
            .await?;

        if response.status() == StatusCode::PAYMENT_REQUIRED {
            return Err(IngestError::CaptchaRequired);
        }
        check_status(response).await?;

        component_info!(Component::Bridge, account = %self.account, "Signal registration initiated");
        Ok(())
    }

    /// Complete registration with the code received by SMS
    pub async fn verify(&self, code: &str) -> IngestResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/v1/register/{}/verify/{}", self.account, code)))
            .send()
            .await?;
        check_status(response).await?;

        component_info!(Component::Bridge, account = %self.account, "Signal account verified");
        Ok(())
    }

    /// Account details as reported by the relay
    pub async fn account_info(&self) -> IngestResult<Value> {
        let response = self
            .client
            .get(self.url(&format!("/v1/accounts/{}", self.account)))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Long-poll for queued messages
    ///
    /// Only served by a relay in normal or native mode; in json-rpc mode
    /// messages arrive on the websocket feed instead. A request that outlives
    /// the client timeout yields an empty batch.
    pub async fn receive_messages(&self, timeout_secs: u64) -> IngestResult<Vec<SignalMessage>> {
        let result = self
            .client
            .get(self.url(&format!("/v1/receive/{}", self.account)))
            .query(&[("timeout", timeout_secs)])
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let body: Option<Vec<SignalMessage>> = check_status(response).await?.json().await?;
        Ok(body.unwrap_or_default())
    }
}

#[async_trait]
impl MessagingClient for SignalClient {
    async fn list_groups(&self) -> IngestResult<Vec<SignalGroup>> {
        let response = self
            .client
            .get(self.url(&format!("/v1/groups/{}", self.account)))
            .send()
            .await?;
        let groups: Option<Vec<SignalGroup>> = check_status(response).await?.json().await?;
        Ok(groups.unwrap_or_default())
    }

    async fn send_message(&self, recipient: &str, text: &str, is_group: bool) -> IngestResult<()> {
        let body = if is_group {
            SendRequest {
                message: text,
                number: &self.account,
                recipients: None,
                group_id: Some(recipient),
            }
        } else {
            SendRequest {
                message: text,
                number: &self.account,
                recipients: Some(vec![recipient]),
                group_id: None,
            }
        };

        let response = self.client.post(self.url("/v2/send")).json(&body).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn set_typing(&self, recipient: &str, typing: bool) -> IngestResult<()> {
        let response = self
            .client
            .put(self.url(&format!("/v1/typing-indicator/{}", self.account)))
            .json(&TypingRequest { recipient, typing })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn health(&self) -> IngestResult<bool> {
        match self.client.get(self.url("/v1/health")).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

async fn check_status(response: Response) -> IngestResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IngestError::Relay {
        status: status.as_u16(),
        body,
    })
}

//! Blocking HTTP client for a Hugging Face compatible inference endpoint.
//!
//! Capabilities run on worker threads, never on the async runtime, so the blocking
//! client is used directly.

use crate::error::CapabilityError;
use crate::model::StudioConfig;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct HubClient {
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
    user_agent: String,
}

/// A client bound to one model URL; produced by `HubClient::connect`.
#[derive(Debug, Clone)]
pub(crate) struct ModelSession {
    client: Client,
    url: Url,
}

impl HubClient {
    pub fn new(cfg: &StudioConfig) -> Self {
        Self {
            endpoint: cfg.endpoint.clone(),
            token: cfg.token.clone(),
            timeout: cfg.timeout,
            user_agent: cfg.user_agent.clone(),
        }
    }

    pub fn connect(&self, model: &str) -> Result<ModelSession> {
        let url = model_url(&self.endpoint, model)?;

        let mut headers = HeaderMap::new();
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("access token contains invalid header characters")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
            .context("build inference http client")?;

        tracing::debug!(%url, "inference session ready");
        Ok(ModelSession { client, url })
    }
}

impl ModelSession {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn post_bytes(&self, body: Vec<u8>, content_type: &'static str) -> Result<Value> {
        let resp = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .with_context(|| format!("POST {}", self.url))?;
        read_response(resp)
    }

    pub fn post_json(&self, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(self.url.clone())
            .json(body)
            .send()
            .with_context(|| format!("POST {}", self.url))?;
        read_response(resp)
    }
}

fn read_response(resp: reqwest::blocking::Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().context("read inference response body")?;
    let body: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(_) if !status.is_success() => {
            return Err(CapabilityError::Endpoint {
                status: status.as_u16(),
                message: text.trim().to_string(),
            }
            .into())
        }
        Err(e) => return Err(CapabilityError::Decode(e.to_string()).into()),
    };
    check_error(status.as_u16(), &body)?;
    Ok(body)
}

/// Map an error payload or non-success status to a `CapabilityError`.
pub(crate) fn check_error(status: u16, body: &Value) -> Result<(), CapabilityError> {
    let message = body.get("error").map(|e| match e {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    match message {
        Some(message) => Err(CapabilityError::Endpoint { status, message }),
        None if !(200..300).contains(&status) => Err(CapabilityError::Endpoint {
            status,
            message: body.to_string(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn model_url(endpoint: &str, model: &str) -> Result<Url> {
    let raw = format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        model.trim_matches('/')
    );
    Url::parse(&raw).with_context(|| format!("invalid model url: {raw}"))
}

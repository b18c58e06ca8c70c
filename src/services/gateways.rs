//! HTTP-backed email, SMS and phone-directory gateways.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::notifications::{
    EmailGateway, EmailMessage, PhoneDirectory, SmsGateway, SmsMessage,
};

pub fn http_client() -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))
}

async fn ensure_success(response: reqwest::Response, service: &str) -> AppResult<reqwest::Response> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(AppError::Integration(format!(
            "{} error ({}): {}",
            service, status, error_text
        )));
    }
    Ok(response)
}

// ============================================================================
// Email
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailPayload<'a> {
    from: &'a str,
    to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

pub struct HttpEmailGateway {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
    reply_to: Option<String>,
}

impl HttpEmailGateway {
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        api_key: Option<String>,
        from: String,
        reply_to: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url,
            api_key,
            from,
            reply_to,
        }
    }
}

#[async_trait]
impl EmailGateway for HttpEmailGateway {
    async fn send_email(&self, message: &EmailMessage) -> AppResult<()> {
        let payload = EmailPayload {
            from: &self.from,
            to: format!("{} <{}>", message.to_name, message.to_email),
            reply_to: self.reply_to.as_deref(),
            subject: &message.subject,
            text: &message.text,
            html: &message.html,
        };

        let mut request = self.client.post(&self.api_url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Integration(format!("Failed to send email: {}", e)))?;
        ensure_success(response, "Email API").await?;
        Ok(())
    }
}

// ============================================================================
// SMS
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SmsPayload<'a> {
    mobile_phone: &'a str,
    email: &'a str,
    body: &'a str,
}

pub struct HttpSmsGateway {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpSmsGateway {
    pub fn new(client: reqwest::Client, api_url: String, api_key: String) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send_sms(&self, message: &SmsMessage) -> AppResult<()> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .json(&SmsPayload {
                mobile_phone: &message.to_phone,
                email: &message.email,
                body: &message.body,
            })
            .send()
            .await
            .map_err(|e| AppError::Integration(format!("Failed to send SMS: {}", e)))?;
        ensure_success(response, "SMS API").await?;
        Ok(())
    }
}

// ============================================================================
// Directory
// ============================================================================

#[derive(Debug, Deserialize)]
struct DirectoryResponse {
    #[serde(default)]
    data: Vec<DirectoryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryEntry {
    #[serde(default)]
    has_authorized_sms: bool,
    mobile_phone: Option<String>,
}

pub struct HttpPhoneDirectory {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpPhoneDirectory {
    pub fn new(client: reqwest::Client, api_url: String, api_key: String) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }
}

#[async_trait]
impl PhoneDirectory for HttpPhoneDirectory {
    async fn find_opted_in_phone(&self, email: &str) -> AppResult<Option<String>> {
        let response = self
            .client
            .get(&self.api_url)
            .header("x-api-key", &self.api_key)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|e| AppError::Integration(format!("Failed to query directory: {}", e)))?;
        let response = ensure_success(response, "Directory API").await?;

        let body: DirectoryResponse = response.json().await.map_err(|e| {
            AppError::Integration(format!("Failed to parse directory response: {}", e))
        })?;

        Ok(body.data.into_iter().next().and_then(opted_in_phone))
    }
}

fn opted_in_phone(entry: DirectoryEntry) -> Option<String> {
    if !entry.has_authorized_sms {
        return None;
    }
    entry.mobile_phone.filter(|p| !p.trim().is_empty())
}

// ============================================================================
// Unconfigured
// ============================================================================

/// Stand-in used when a gateway has no endpoint configured.
/// Sends fail (and are recorded as failed); lookups find nothing.
pub struct UnconfiguredGateway {
    name: &'static str,
}

impl UnconfiguredGateway {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }

    fn error(&self) -> AppError {
        AppError::Integration(format!("{} gateway is not configured", self.name))
    }
}

#[async_trait]
impl EmailGateway for UnconfiguredGateway {
    async fn send_email(&self, _message: &EmailMessage) -> AppResult<()> {
        Err(self.error())
    }
}

#[async_trait]
impl SmsGateway for UnconfiguredGateway {
    async fn send_sms(&self, _message: &SmsMessage) -> AppResult<()> {
        Err(self.error())
    }
}

#[async_trait]
impl PhoneDirectory for UnconfiguredGateway {
    async fn find_opted_in_phone(&self, _email: &str) -> AppResult<Option<String>> {
        Ok(None)
    }
}

pub struct Gateways {
    pub email: Arc<dyn EmailGateway>,
    pub sms: Arc<dyn SmsGateway>,
    pub directory: Arc<dyn PhoneDirectory>,
}

/// Build the gateways from configuration, logging which ones are disabled.
pub fn from_config(config: &Config, client: &reqwest::Client) -> Gateways {
    let email: Arc<dyn EmailGateway> = match &config.email.api_url {
        Some(url) => Arc::new(HttpEmailGateway::new(
            client.clone(),
            url.clone(),
            config.email.api_key.clone(),
            config.email.from.clone(),
            config.email.reply_to.clone(),
        )),
        None => {
            tracing::warn!("EMAIL_API_URL not set; email notifications will be recorded as failed");
            Arc::new(UnconfiguredGateway::new("Email"))
        }
    };

    let sms: Arc<dyn SmsGateway> = match (&config.sms.api_url, &config.sms.api_key) {
        (Some(url), Some(key)) => Arc::new(HttpSmsGateway::new(client.clone(), url.clone(), key.clone())),
        _ => {
            tracing::warn!("SMS_API_URL/SMS_API_KEY not set; SMS reminders are disabled");
            Arc::new(UnconfiguredGateway::new("SMS"))
        }
    };

    let directory: Arc<dyn PhoneDirectory> = match (&config.directory.api_url, &config.directory.api_key) {
        (Some(url), Some(key)) => Arc::new(HttpPhoneDirectory::new(client.clone(), url.clone(), key.clone())),
        _ => {
            tracing::info!("Phone directory not configured; only phones captured at booking are used");
            Arc::new(UnconfiguredGateway::new("Directory"))
        }
    };

    Gateways {
        email,
        sms,
        directory,
    }
}

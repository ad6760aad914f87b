//! Twilio REST transport for SMS and WhatsApp.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info};

use crate::channels::transport::{
    MessageStatus, NumberLookup, SMS_CHUNK_CHARS, SendReceipt, Transport, channel_address,
    chunk_message,
};
use crate::config::TwilioConfig;
use crate::error::ChannelError;
use crate::store::Channel;

#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioLookupResponse {
    phone_number: Option<String>,
    national_format: Option<String>,
    country_code: Option<String>,
}

pub struct TwilioTransport {
    config: TwilioConfig,
    client: reqwest::Client,
}

impl TwilioTransport {
    pub fn new(config: TwilioConfig) -> Self {
        info!("Twilio transport enabled");
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    fn endpoint(base: &str, segments: &[&str]) -> Result<reqwest::Url, ChannelError> {
        let mut url = reqwest::Url::parse(base)
            .map_err(|e| ChannelError::InvalidMessage(format!("Twilio base URL {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ChannelError::InvalidMessage(format!("Twilio base URL {base} has no path")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: reqwest::Url) -> Result<reqwest::Response, ChannelError> {
        self.client
            .get(url)
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))
    }

    async fn send_one(
        &self,
        from: &str,
        to: &str,
        body: &str,
        media_url: Option<&str>,
    ) -> Result<String, ChannelError> {
        let mut form = vec![("From", from), ("To", to), ("Body", body)];
        if let Some(url) = media_url {
            form.push(("MediaUrl", url));
        }

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "twilio".to_string(),
                reason: format!("Twilio error {status}: {error_text}"),
            });
        }

        let message: TwilioMessageResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(format!("Twilio response: {e}")))?;
        debug!(sid = %message.sid, status = ?message.status, "Twilio accepted message");
        Ok(message.sid)
    }
}

#[async_trait]
impl Transport for TwilioTransport {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send(
        &self,
        destination: &str,
        channel: Channel,
        text: &str,
        media_url: Option<&str>,
    ) -> Result<SendReceipt, ChannelError> {
        if !channel.is_messaging() {
            return Err(ChannelError::InvalidMessage(format!(
                "cannot push to {channel} channel"
            )));
        }

        let to = channel_address(destination, channel);
        let from = channel_address(&self.config.phone_number, channel);

        // WhatsApp carries long bodies itself; SMS is split into numbered parts.
        let parts = match channel {
            Channel::Sms => chunk_message(text, SMS_CHUNK_CHARS),
            _ => vec![text.to_string()],
        };

        let mut message_ids = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let media = if i == 0 { media_url } else { None };
            message_ids.push(self.send_one(&from, &to, part, media).await?);
        }

        info!(channel = %channel, parts = message_ids.len(), "Outbound message sent");
        Ok(SendReceipt { message_ids })
    }

    async fn message_status(&self, message_id: &str) -> Result<Option<MessageStatus>, ChannelError> {
        let resource = format!("{message_id}.json");
        let url = Self::endpoint(
            &self.config.api_base,
            &["2010-04-01", "Accounts", self.config.account_sid.as_str(), "Messages", resource.as_str()],
        )?;
        let response = self.get(url).await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChannelError::Http(format!("Twilio error {status}: {error_text}")));
        }

        let message: MessageStatus = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(format!("Twilio status response: {e}")))?;
        Ok(Some(message))
    }

    async fn lookup_number(&self, number: &str) -> Result<NumberLookup, ChannelError> {
        let url = Self::endpoint(&self.config.lookup_base, &["v1", "PhoneNumbers", number])?;
        let response = self.get(url).await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(NumberLookup::invalid("Number not found"));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChannelError::Http(format!("Twilio lookup error {status}: {error_text}")));
        }

        let found: TwilioLookupResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(format!("Twilio lookup response: {e}")))?;
        Ok(NumberLookup {
            valid: true,
            phone_number: found.phone_number,
            national_format: found.national_format,
            country_code: found.country_code,
            error: None,
        })
    }
}

//! Twilio SMS sender
//!
//! Sends messages through the Twilio Messages REST API with account SID and
//! auth token as basic-auth credentials.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use tracing::debug;
use url::Url;

use crate::config::TwilioSettings;
use crate::domain::result::{Error, Result};
use crate::ports::NotificationSender;

const API_BASE: &str = "https://api.twilio.com/2010-04-01/";

/// Notification sender backed by Twilio
#[derive(Debug)]
pub struct TwilioSender {
    client: Client,
    messages_url: Url,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioSender {
    pub fn new(settings: &TwilioSettings) -> Result<Self> {
        Self::with_api_base(settings, API_BASE)
    }

    /// Point the sender at another API root (a local mock, a regional edge)
    pub fn with_api_base(settings: &TwilioSettings, api_base: &str) -> Result<Self> {
        if settings.account_sid.is_empty() || settings.auth_token.is_empty() || settings.from.is_empty() {
            return Err(Error::config("Twilio account SID, auth token and sender number are required"));
        }

        let messages_url = Url::parse(api_base)?
            .join(&format!("Accounts/{}/Messages.json", settings.account_sid))?;

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            messages_url,
            account_sid: settings.account_sid.clone(),
            auth_token: settings.auth_token.clone(),
            from: settings.from.clone(),
        })
    }

    pub fn messages_url(&self) -> &Url {
        &self.messages_url
    }

    fn map_request_error(error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::upstream("Twilio request timed out after 30 seconds")
        } else if error.is_connect() {
            Error::upstream("unable to connect to Twilio")
        } else {
            Error::upstream(format!("Twilio request failed: {}", error))
        }
    }

    fn check_response_status(response: Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(Error::upstream("Twilio rejected the account credentials")),
            code => Err(Error::upstream(format!("Twilio API error: HTTP {} {}", code, body.trim()))),
        }
    }
}

impl NotificationSender for TwilioSender {
    fn send(&self, destination: &str, text: &str) -> Result<()> {
        let form = [("To", destination), ("From", self.from.as_str()), ("Body", text)];

        let response = self
            .client
            .post(self.messages_url.clone())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .map_err(Self::map_request_error)?;

        Self::check_response_status(response)?;
        debug!(destination, "sms accepted by Twilio");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::ErrorKind;

    fn settings() -> TwilioSettings {
        TwilioSettings {
            account_sid: "AC123".into(),
            auth_token: "token".into(),
            from: "+15550000000".into(),
        }
    }

    #[test]
    fn test_messages_url_includes_account() {
        let sender = TwilioSender::new(&settings()).unwrap();
        assert_eq!(
            sender.messages_url().as_str(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let mut incomplete = settings();
        incomplete.auth_token.clear();
        let err = TwilioSender::new(&incomplete).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_unreachable_api_is_upstream_error() {
        // Nothing listens on the loopback discard port
        let sender = TwilioSender::with_api_base(&settings(), "http://127.0.0.1:9/").unwrap();
        let err = sender.send("+15551234567", "hi").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }
}

use crate::error::AppError;
use crate::twilio_types::{TwilioErrorResponse, TwilioMessageResource, TwilioSmsForm};

use async_trait::async_trait;
use tracing::{debug, error};

#[derive(Clone, PartialEq, Debug)]
pub struct SmsReceipt {
    pub message_id: Option<String>,
    pub to: String,
    pub successful: bool,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, from: &str, to: &str, body: &str) -> Result<SmsReceipt, AppError>;
}

pub struct TwilioSms {
    pub http_client: reqwest::Client,
    pub account_sid: String,
    pub auth_token: String,
}

#[async_trait]
impl SmsSender for TwilioSms {
    async fn send(&self, from: &str, to: &str, body: &str) -> Result<SmsReceipt, AppError> {
        let account_sid = &self.account_sid;
        let url = format!("https://api.twilio.com/2010-04-01/Accounts/{account_sid}/Messages.json");
        let form = TwilioSmsForm { from, to, body };
        let resp = self
            .http_client
            .post(url)
            .basic_auth(account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to send sms request to twilio");
                AppError::Provider(format!("twilio sms api: {e}"))
            })?;
        let status = resp.status();
        let text = resp.text().await?;
        debug!(status=%status, body=%text, "twilio sms resp");
        Ok(receipt_from_response(status.is_success(), to, &text))
    }
}

fn receipt_from_response(success: bool, to: &str, text: &str) -> SmsReceipt {
    if success {
        match serde_json::from_str::<TwilioMessageResource>(text) {
            Ok(message) => SmsReceipt {
                successful: !message.is_failed(),
                message_id: Some(message.sid),
                to: message.to,
                error_message: message
                    .error_message
                    .map(|m| with_code(m, message.error_code)),
            },
            Err(e) => SmsReceipt {
                message_id: None,
                to: to.to_string(),
                successful: false,
                error_message: Some(format!("unreadable response: {e}")),
            },
        }
    } else {
        let error_message = serde_json::from_str::<TwilioErrorResponse>(text)
            .map(|e| with_code(e.message, e.code))
            .unwrap_or_else(|_| text.to_string());
        SmsReceipt {
            message_id: None,
            to: to.to_string(),
            successful: false,
            error_message: Some(error_message),
        }
    }
}

fn with_code(message: String, code: Option<i64>) -> String {
    match code {
        Some(code) => format!("{message} (code {code})"),
        None => message,
    }
}

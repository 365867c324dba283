use serde::{Deserialize, Serialize};

/// Form body of the Messages API.
#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct TwilioSmsForm<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub body: &'a str,
}

#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MessageStatus {
    Accepted,
    Scheduled,
    Queued,
    Sending,
    Sent,
    Delivered,
    Undelivered,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug)]
pub struct TwilioMessageResource {
    pub sid: String,
    pub to: String,
    pub status: MessageStatus,
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
}

impl TwilioMessageResource {
    pub fn is_failed(&self) -> bool {
        matches!(
            self.status,
            MessageStatus::Failed | MessageStatus::Undelivered | MessageStatus::Canceled
        )
    }
}

/// Error body returned with non-2xx statuses.
#[derive(Deserialize, Debug)]
pub struct TwilioErrorResponse {
    pub code: Option<i64>,
    pub message: String,
}

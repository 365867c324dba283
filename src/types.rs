use crate::call_automation::CallAutomation;
use crate::config::WorkflowConfig;
use crate::llm::LanguageModel;
use crate::sms::SmsSender;
use crate::store::CallStore;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the conversation should do next, as decided by one model turn.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    Continue,
    TalkToHuman,
    EndCall,
    NewClaim,
    UpdatedClaim,
    NewOrUpdatedReminder,
}

impl Intent {
    /// Intents that mutated the claim and want the model to keep going in the same turn.
    pub fn is_data_update(&self) -> bool {
        matches!(
            self,
            Intent::NewClaim | Intent::UpdatedClaim | Intent::NewOrUpdatedReminder
        )
    }
}

/// Outcome of a model turn: the text to speak and the intent to act on.
#[derive(Clone, PartialEq, Debug)]
pub struct Action {
    pub content: String,
    pub intent: Intent,
}

/// Correlation tag attached to a play so its completion event can be routed.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum CallContext {
    TransferFailed,
    ConnectAgent,
    Goodbye,
}

impl CallContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallContext::TransferFailed => "transfer_failed",
            CallContext::ConnectAgent => "connect_agent",
            CallContext::Goodbye => "goodbye",
        }
    }

    pub fn parse(s: &str) -> Option<CallContext> {
        match s {
            "transfer_failed" => Some(CallContext::TransferFailed),
            "connect_agent" => Some(CallContext::ConnectAgent),
            "goodbye" => Some(CallContext::Goodbye),
            _ => None,
        }
    }
}

/// Long-lived collaborators shared by every call.
pub struct AppState {
    pub events_domain: String,
    pub workflow: WorkflowConfig,
    pub store: Arc<dyn CallStore>,
    pub automation: Arc<dyn CallAutomation>,
    pub llm: Arc<dyn LanguageModel>,
    pub sms: Arc<dyn SmsSender>,
}

use crate::error::AppError;

use std::env;
use std::time::Duration;

/// Knobs that drive a single conversation.  Split out from `Config` so the call flow can be
/// exercised without any provider credentials.
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub agent_phone_number: String,
    pub bot_phone_number: String,
    pub conversation_lang: String,
    /// Base URL the telephony provider downloads sounds from
    pub resources_public_url: String,
    pub intelligence_soft_timeout: Duration,
    pub intelligence_hard_timeout: Duration,
    /// How long since its creation a call record still counts as the ongoing conversation
    pub conversation_timeout: Duration,
    pub max_chained_tool_turns: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            agent_phone_number: String::new(),
            bot_phone_number: String::new(),
            conversation_lang: "en-US".to_string(),
            resources_public_url: String::new(),
            intelligence_soft_timeout: Duration::from_secs(15),
            intelligence_hard_timeout: Duration::from_secs(180),
            conversation_timeout: Duration::from_secs(72 * 3_600),
            max_chained_tool_turns: 5,
        }
    }
}

pub struct Config {
    pub bind_addr: String,
    pub events_domain: String,
    pub database_url: String,
    pub call_automation_endpoint: String,
    pub call_automation_access_key: String,
    pub cognitive_service_endpoint: String,
    pub voice_name: String,
    pub openai_api_key: String,
    pub openai_endpoint: String,
    pub openai_model: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub log_level: String,
    pub workflow: WorkflowConfig,
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key).map_err(|_| AppError::Config(format!("{key} not set!")))
}

fn optional(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn seconds(key: &str, default: u64) -> Result<Duration, AppError> {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| AppError::Config(format!("{key}: {e}"))),
        _ => Ok(Duration::from_secs(default)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        // A missing .env file is fine; the environment may already be populated.
        let _ = dotenvy::dotenv();

        let defaults = WorkflowConfig::default();
        let max_chained_tool_turns = match env::var("MAX_CHAINED_TOOL_TURNS") {
            Ok(v) if !v.is_empty() => v
                .parse::<usize>()
                .map_err(|e| AppError::Config(format!("MAX_CHAINED_TOOL_TURNS: {e}")))?,
            _ => defaults.max_chained_tool_turns,
        };
        let workflow = WorkflowConfig {
            agent_phone_number: required("AGENT_PHONE_NUMBER")?,
            bot_phone_number: required("BOT_PHONE_NUMBER")?,
            conversation_lang: optional("CONVERSATION_LANG", &defaults.conversation_lang),
            resources_public_url: required("RESOURCES_PUBLIC_URL")?,
            intelligence_soft_timeout: seconds("INTELLIGENCE_SOFT_TIMEOUT_SEC", 15)?,
            intelligence_hard_timeout: seconds("INTELLIGENCE_HARD_TIMEOUT_SEC", 180)?,
            conversation_timeout: seconds("CONVERSATION_TIMEOUT_HOUR", 72)? * 3_600,
            max_chained_tool_turns,
        };
        workflow.validate()?;

        Ok(Self {
            bind_addr: optional("BIND_ADDR", "0.0.0.0:3000"),
            events_domain: required("EVENTS_DOMAIN")?,
            database_url: optional("DATABASE_URL", "sqlite://.local.sqlite?mode=rwc"),
            call_automation_endpoint: required("CALL_AUTOMATION_ENDPOINT")?,
            call_automation_access_key: required("CALL_AUTOMATION_ACCESS_KEY")?,
            cognitive_service_endpoint: required("COGNITIVE_SERVICE_ENDPOINT")?,
            voice_name: optional("VOICE_NAME", "en-US-JennyNeural"),
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_endpoint: optional(
                "OPENAI_ENDPOINT",
                "https://api.openai.com/v1/chat/completions",
            ),
            openai_model: optional("OPENAI_MODEL", "gpt-4-turbo"),
            twilio_account_sid: required("TWILIO_ACCOUNT_SID")?,
            twilio_auth_token: required("TWILIO_AUTH_TOKEN")?,
            log_level: optional("LOG_LEVEL", "debug"),
            workflow,
        })
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.intelligence_hard_timeout <= self.intelligence_soft_timeout {
            return Err(AppError::Config(
                "hard intelligence timeout must exceed the soft one".to_string(),
            ));
        }
        if self.max_chained_tool_turns == 0 {
            return Err(AppError::Config(
                "MAX_CHAINED_TOOL_TURNS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

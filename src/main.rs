mod call_automation;
mod call_automation_types;
mod call_events;
mod call_types;
mod config;
mod conversation;
mod error;
mod handlers;
mod intelligence;
mod llm;
mod openai_types;
mod prompts;
mod sms;
mod store;
mod tasks;
#[cfg(test)]
mod test_support;
mod twilio_types;
mod types;
mod utils;

use crate::call_automation::AcsCallAutomation;
use crate::config::Config;
use crate::error::AppError;
use crate::llm::OpenAiClient;
use crate::sms::TwilioSms;
use crate::store::SqliteStore;
use crate::types::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use base64::{engine, Engine};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

pub mod consts {
    use std::time::Duration;

    /// Pause between two checks of the model turn, and between two loading sounds
    pub const INTELLIGENCE_POLL_INTERVAL: Duration = Duration::from_secs(5);
    pub const MAX_RECOGNITION_RETRY: u32 = 10;
    /// 8510: initial silence timeout, 8532: inter-digit silence timeout, 8512: internal error
    pub const RETRYABLE_RECOGNITION_SUB_CODES: &[u32] = &[8510, 8532, 8512];
    pub const RECOGNITION_END_SILENCE: Duration = Duration::from_secs(3);
    /// Speech synthesis limit of a single prompt
    pub const TTS_MAX_CHARS: usize = 400;
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    let level = config
        .log_level
        .parse::<LevelFilter>()
        .map_err(|e| AppError::Config(format!("LOG_LEVEL: {e}")))?;
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", LevelFilter::OFF),
            ("sqlx", LevelFilter::WARN),
            ("claim_bot_rs", level),
        ]));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Config(format!("tracing: {e}")))?;

    let store = SqliteStore::connect(&config.database_url).await?;
    let http_client = reqwest::Client::new();
    let access_key = engine::general_purpose::STANDARD
        .decode(&config.call_automation_access_key)
        .map_err(|e| AppError::Config(format!("CALL_AUTOMATION_ACCESS_KEY: {e}")))?;
    let resources_public_url = config.workflow.resources_public_url.trim_end_matches('/');
    let automation = AcsCallAutomation {
        http_client: http_client.clone(),
        endpoint: config.call_automation_endpoint,
        access_key,
        source_phone_number: config.workflow.bot_phone_number.clone(),
        cognitive_service_endpoint: config.cognitive_service_endpoint,
        voice_name: config.voice_name,
        conversation_lang: config.workflow.conversation_lang.clone(),
        lexicon_url: format!("{resources_public_url}/lexicon.xml"),
    };
    let llm = OpenAiClient {
        http_client: http_client.clone(),
        endpoint: config.openai_endpoint,
        api_key: config.openai_api_key,
        model: config.openai_model,
    };
    let sms = TwilioSms {
        http_client,
        account_sid: config.twilio_account_sid,
        auth_token: config.twilio_auth_token,
    };

    let app_state = Arc::new(AppState {
        events_domain: config.events_domain,
        workflow: config.workflow,
        store: Arc::new(store),
        automation: Arc::new(automation),
        llm: Arc::new(llm),
        sms: Arc::new(sms),
    });

    let app = Router::new()
        .route("/health/liveness", get(handlers::health_liveness))
        .route("/call", get(handlers::call_get))
        .route("/call/initiate", get(handlers::call_initiate_get))
        .route("/call/inbound", post(handlers::call_inbound_post))
        .route("/call/event/:call_id", post(handlers::call_event_post))
        .with_state(app_state);

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|e| AppError::Config(format!("BIND_ADDR: {e}")))?;
    info!(addr=%addr, "listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| AppError::Provider(format!("server: {e}")))?;
    Ok(())
}

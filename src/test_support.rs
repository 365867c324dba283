//! In-memory stand-ins for the store and the providers, recording what the call flow asked of them.

use crate::call_automation::{CallAutomation, CallConnection, PlaySource, RecognizeOptions};
use crate::call_types::CallRecord;
use crate::config::WorkflowConfig;
use crate::error::AppError;
use crate::llm::{ChatCompletion, LanguageModel};
use crate::openai_types::{OpenAIFunctionCall, OpenAIMessage, OpenAITool, OpenAIToolCall};
use crate::sms::{SmsReceipt, SmsSender};
use crate::store::CallStore;
use crate::types::{AppState, CallContext};

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

pub const CONNECTION_ID: &str = "conn-1";

#[derive(Default)]
pub struct MemoryStore {
    calls: Mutex<HashMap<Uuid, CallRecord>>,
}

impl MemoryStore {
    pub fn saved(&self, call_id: Uuid) -> Option<CallRecord> {
        self.calls.lock().unwrap().get(&call_id).cloned()
    }
}

#[async_trait]
impl CallStore for MemoryStore {
    async fn get(&self, call_id: Uuid) -> Result<Option<CallRecord>, AppError> {
        Ok(self.saved(call_id))
    }

    async fn get_most_recent_by_phone(
        &self,
        phone_number: &str,
        window: Duration,
    ) -> Result<Option<CallRecord>, AppError> {
        let since = OffsetDateTime::now_utc() - window;
        Ok(self
            .list_by_phone(phone_number)
            .await?
            .into_iter()
            .find(|c| c.created_at > since))
    }

    async fn upsert(&self, call: &CallRecord) -> Result<(), AppError> {
        self.calls.lock().unwrap().insert(call.id, call.clone());
        Ok(())
    }

    async fn list_by_phone(&self, phone_number: &str) -> Result<Vec<CallRecord>, AppError> {
        let mut calls: Vec<CallRecord> = self
            .calls
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.phone_number == phone_number)
            .cloned()
            .collect();
        calls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(calls)
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Command {
    Answer { incoming_call_context: String },
    Create { target: String },
    Play { source: PlaySource, context: Option<CallContext> },
    Recognize { prompt: PlaySource },
    Transfer { target: String },
    HangUp,
}

#[derive(Default)]
pub struct RecordingAutomation {
    commands: Mutex<Vec<Command>>,
    /// Every command fails as if the caller already hung up
    gone: bool,
}

impl RecordingAutomation {
    pub fn gone() -> Self {
        Self {
            gone: true,
            ..Default::default()
        }
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub fn played_texts(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::Play {
                    source: PlaySource::Text(text),
                    ..
                } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn loading_sounds(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| {
                matches!(c, Command::Play { source: PlaySource::File(uri), .. } if uri.ends_with("loading.wav"))
            })
            .count()
    }

    pub fn recognitions(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| matches!(c, Command::Recognize { .. }))
            .count()
    }

    fn record(&self, command: Command) -> Result<(), AppError> {
        self.commands.lock().unwrap().push(command);
        if self.gone {
            return Err(AppError::TargetGone);
        }
        Ok(())
    }
}

#[async_trait]
impl CallAutomation for RecordingAutomation {
    async fn answer_call(
        &self,
        incoming_call_context: &str,
        _callback_url: &str,
    ) -> Result<String, AppError> {
        self.record(Command::Answer {
            incoming_call_context: incoming_call_context.to_string(),
        })?;
        Ok(CONNECTION_ID.to_string())
    }

    async fn create_call(
        &self,
        target_phone_number: &str,
        _callback_url: &str,
    ) -> Result<String, AppError> {
        self.record(Command::Create {
            target: target_phone_number.to_string(),
        })?;
        Ok(CONNECTION_ID.to_string())
    }

    async fn play(
        &self,
        _connection_id: &str,
        source: PlaySource,
        context: Option<CallContext>,
    ) -> Result<(), AppError> {
        self.record(Command::Play { source, context })
    }

    async fn start_recognizing(
        &self,
        _connection_id: &str,
        options: RecognizeOptions,
    ) -> Result<(), AppError> {
        self.record(Command::Recognize {
            prompt: options.prompt,
        })
    }

    async fn transfer_to_participant(
        &self,
        _connection_id: &str,
        target_phone_number: &str,
    ) -> Result<(), AppError> {
        self.record(Command::Transfer {
            target: target_phone_number.to_string(),
        })
    }

    async fn hang_up(&self, _connection_id: &str) -> Result<(), AppError> {
        self.record(Command::HangUp)
    }
}

/// One canned model answer, delivered after `delay`.
pub struct ScriptedTurn {
    pub delay: Duration,
    pub result: Result<ChatCompletion, AppError>,
}

impl ScriptedTurn {
    pub fn now(result: Result<ChatCompletion, AppError>) -> Self {
        Self::after(Duration::ZERO, result)
    }

    pub fn after(delay: Duration, result: Result<ChatCompletion, AppError>) -> Self {
        Self { delay, result }
    }
}

pub fn tool_completion(name: &str, arguments: &str) -> ChatCompletion {
    ChatCompletion {
        content: String::new(),
        tool_calls: vec![OpenAIToolCall {
            id: format!("call_{name}"),
            kind: "function".to_string(),
            function: OpenAIFunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }],
    }
}

#[derive(Default)]
pub struct ScriptedModel {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    /// Summary returned by `complete`; `None` fails the completion
    summary: Mutex<Option<String>>,
    completed: AtomicUsize,
    summaries: AtomicUsize,
}

impl ScriptedModel {
    pub fn push_turns(&self, turns: Vec<ScriptedTurn>) {
        self.turns.lock().unwrap().extend(turns);
    }

    pub fn set_summary(&self, summary: Option<&str>) {
        *self.summary.lock().unwrap() = summary.map(str::to_string);
    }

    /// Chat turns that ran to completion, cancelled ones excluded
    pub fn completed_turns(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn summaries(&self) -> usize {
        self.summaries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn chat(
        &self,
        _messages: Vec<OpenAIMessage>,
        _tools: Vec<OpenAITool>,
    ) -> Result<ChatCompletion, AppError> {
        let turn = self.turns.lock().unwrap().pop_front();
        let Some(turn) = turn else {
            return Err(AppError::Model("no scripted turn left".to_string()));
        };
        tokio::time::sleep(turn.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        turn.result
    }

    async fn complete(&self, _messages: Vec<OpenAIMessage>) -> Result<String, AppError> {
        self.summaries.fetch_add(1, Ordering::SeqCst);
        self.summary
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::Model("summary unavailable".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingSms {
    sent: Mutex<Vec<(String, String, String)>>,
    fail: bool,
}

impl RecordingSms {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// (from, to, body) of every attempt
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsSender for RecordingSms {
    async fn send(&self, from: &str, to: &str, body: &str) -> Result<SmsReceipt, AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((from.to_string(), to.to_string(), body.to_string()));
        if self.fail {
            return Ok(SmsReceipt {
                message_id: None,
                to: to.to_string(),
                successful: false,
                error_message: Some("The 'To' number is not a valid phone number.".to_string()),
            });
        }
        Ok(SmsReceipt {
            message_id: Some("SM123".to_string()),
            to: to.to_string(),
            successful: true,
            error_message: None,
        })
    }
}

pub fn workflow() -> WorkflowConfig {
    WorkflowConfig {
        agent_phone_number: "+33100000000".to_string(),
        bot_phone_number: "+33199999999".to_string(),
        conversation_lang: "en-US".to_string(),
        resources_public_url: "https://cdn.example.com".to_string(),
        intelligence_soft_timeout: Duration::from_secs(10),
        intelligence_hard_timeout: Duration::from_secs(60),
        conversation_timeout: Duration::from_secs(72 * 3_600),
        max_chained_tool_turns: 3,
    }
}

pub struct TestHarness {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub automation: Arc<RecordingAutomation>,
    pub llm: Arc<ScriptedModel>,
    pub sms: Arc<RecordingSms>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_sms(RecordingSms::default())
    }

    pub fn with_sms(sms: RecordingSms) -> Self {
        Self::with_parts(RecordingAutomation::default(), sms)
    }

    pub fn with_parts(automation: RecordingAutomation, sms: RecordingSms) -> Self {
        let store = Arc::new(MemoryStore::default());
        let automation = Arc::new(automation);
        let llm = Arc::new(ScriptedModel::default());
        let sms = Arc::new(sms);
        let state = Arc::new(AppState {
            events_domain: "https://bot.example.com".to_string(),
            workflow: workflow(),
            store: store.clone(),
            automation: automation.clone(),
            llm: llm.clone(),
            sms: sms.clone(),
        });
        Self {
            state,
            store,
            automation,
            llm,
            sms,
        }
    }

    pub fn connection(&self) -> CallConnection {
        CallConnection::new(
            CONNECTION_ID.to_string(),
            self.automation.clone(),
            &self.state.workflow,
        )
    }
}

use crate::call_automation_types::{
    AnswerCallRequest, CallConnectionProperties, CallIntelligenceOptions, CommunicationIdentifier,
    CreateCallRequest, FileSourceBody, Lexicon, PhoneNumberValue, PlayRequest, PlaySourceBody,
    Prosody, RecognizeOptionsBody, RecognizeRequest, Speak, SsmlSourceBody,
    TransferToParticipantRequest, Voice,
};
use crate::call_types::{CallRecord, Message};
use crate::config::WorkflowConfig;
use crate::consts::{RECOGNITION_END_SILENCE, TTS_MAX_CHARS};
use crate::error::AppError;
use crate::prompts::Sound;
use crate::types::CallContext;
use crate::utils::{split_text_chunks, truncate_chars};

use async_trait::async_trait;
use base64::{engine, Engine};
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use time::{macros::format_description, OffsetDateTime};
use tracing::{debug, warn};

const API_VERSION: &str = "2023-10-15";

#[derive(Clone, PartialEq, Debug)]
pub enum PlaySource {
    /// Spoken with the configured voice
    Text(String),
    /// Audio file the provider downloads
    File(String),
}

#[derive(Clone, PartialEq, Debug)]
pub struct RecognizeOptions {
    pub prompt: PlaySource,
    pub target_phone_number: String,
    pub speech_language: String,
    pub end_silence_timeout: Duration,
}

/// Commands accepted by the telephony provider.  Every operation on a connection that no longer
/// exists fails with `AppError::TargetGone`.
#[async_trait]
pub trait CallAutomation: Send + Sync {
    /// Returns the new connection id.
    async fn answer_call(
        &self,
        incoming_call_context: &str,
        callback_url: &str,
    ) -> Result<String, AppError>;
    /// Returns the new connection id.
    async fn create_call(
        &self,
        target_phone_number: &str,
        callback_url: &str,
    ) -> Result<String, AppError>;
    async fn play(
        &self,
        connection_id: &str,
        source: PlaySource,
        context: Option<CallContext>,
    ) -> Result<(), AppError>;
    async fn start_recognizing(
        &self,
        connection_id: &str,
        options: RecognizeOptions,
    ) -> Result<(), AppError>;
    async fn transfer_to_participant(
        &self,
        connection_id: &str,
        target_phone_number: &str,
    ) -> Result<(), AppError>;
    async fn hang_up(&self, connection_id: &str) -> Result<(), AppError>;
}

pub struct AcsCallAutomation {
    pub http_client: reqwest::Client,
    pub endpoint: String,
    /// Decoded access key
    pub access_key: Vec<u8>,
    pub source_phone_number: String,
    pub cognitive_service_endpoint: String,
    pub voice_name: String,
    pub conversation_lang: String,
    pub lexicon_url: String,
}

/// Compute the `x-ms-content-sha256` and `Authorization` headers of a signed request.
pub fn sign_request(
    access_key: &[u8],
    method: &str,
    host: &str,
    path_and_query: &str,
    date: &str,
    body: &[u8],
) -> Result<(String, String), AppError> {
    let content_hash = engine::general_purpose::STANDARD.encode(Sha256::digest(body));
    let string_to_sign = format!("{method}\n{path_and_query}\n{date};{host};{content_hash}");
    let mut mac = Hmac::<Sha256>::new_from_slice(access_key)
        .map_err(|e| AppError::Config(format!("call automation access key: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let signature = engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    let authorization =
        format!("HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature={signature}");
    Ok((content_hash, authorization))
}

pub fn render_ssml(text: &str, lang: &str, voice_name: &str, lexicon_url: &str) -> String {
    let len = text.chars().count();
    let text = if len > TTS_MAX_CHARS {
        warn!(len, "text too long for speech synthesis, truncating");
        truncate_chars(text, TTS_MAX_CHARS)
    } else {
        text
    };
    let speak = Speak {
        version: "1.0".to_string(),
        xmlns: "http://www.w3.org/2001/10/synthesis".to_string(),
        lang: lang.to_string(),
        voice: Voice {
            name: voice_name.to_string(),
            // Narrow band equalizer for phone lines
            effect: "eq_telecomhp8k".to_string(),
            lexicon: Lexicon {
                uri: lexicon_url.to_string(),
            },
            prosody: Prosody {
                // Slightly slower, easier to follow on the phone
                rate: "0.95".to_string(),
                text: text.to_string(),
            },
        },
    };
    xmlserde::xml_serialize(speak)
}

impl AcsCallAutomation {
    fn play_source_body(&self, source: PlaySource) -> PlaySourceBody {
        match source {
            PlaySource::Text(text) => PlaySourceBody::Ssml {
                ssml: SsmlSourceBody {
                    ssml_text: render_ssml(
                        &text,
                        &self.conversation_lang,
                        &self.voice_name,
                        &self.lexicon_url,
                    ),
                },
            },
            PlaySource::File(uri) => PlaySourceBody::File {
                file: FileSourceBody { uri },
            },
        }
    }

    fn intelligence_options(&self) -> CallIntelligenceOptions {
        CallIntelligenceOptions {
            cognitive_services_endpoint: self.cognitive_service_endpoint.clone(),
        }
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, AppError> {
        let url = format!(
            "{}{path}?api-version={API_VERSION}",
            self.endpoint.trim_end_matches('/')
        );
        let url = reqwest::Url::parse(&url)
            .map_err(|e| AppError::Config(format!("call automation endpoint: {e}")))?;
        let body = match body {
            Some(b) => serde_json::to_vec(b)?,
            None => vec![],
        };
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            _ => return Err(AppError::Config("call automation endpoint has no host".to_string())),
        };
        let path_and_query = format!("{}?{}", url.path(), url.query().unwrap_or_default());
        let date = OffsetDateTime::now_utc()
            .format(format_description!(
                "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
            ))
            .map_err(|e| AppError::Provider(format!("date formatting: {e}")))?;
        let (content_hash, authorization) = sign_request(
            &self.access_key,
            method.as_str(),
            &host,
            &path_and_query,
            &date,
            &body,
        )?;

        let resp = self
            .http_client
            .request(method, url)
            .header("x-ms-date", date)
            .header("x-ms-content-sha256", content_hash)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::TargetGone);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "call automation returned {status}: {text}"
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl CallAutomation for AcsCallAutomation {
    async fn answer_call(
        &self,
        incoming_call_context: &str,
        callback_url: &str,
    ) -> Result<String, AppError> {
        let body = AnswerCallRequest {
            incoming_call_context: incoming_call_context.to_string(),
            callback_uri: callback_url.to_string(),
            call_intelligence_options: self.intelligence_options(),
        };
        let resp = self
            .send(Method::POST, "/calling/callConnections:answer", Some(&body))
            .await?;
        let props = resp.json::<CallConnectionProperties>().await?;
        Ok(props.call_connection_id)
    }

    async fn create_call(
        &self,
        target_phone_number: &str,
        callback_url: &str,
    ) -> Result<String, AppError> {
        let body = CreateCallRequest {
            targets: vec![CommunicationIdentifier::phone_number(target_phone_number)],
            source_caller_id_number: PhoneNumberValue {
                value: self.source_phone_number.clone(),
            },
            callback_uri: callback_url.to_string(),
            call_intelligence_options: self.intelligence_options(),
        };
        let resp = self
            .send(Method::POST, "/calling/callConnections", Some(&body))
            .await?;
        let props = resp.json::<CallConnectionProperties>().await?;
        Ok(props.call_connection_id)
    }

    async fn play(
        &self,
        connection_id: &str,
        source: PlaySource,
        context: Option<CallContext>,
    ) -> Result<(), AppError> {
        let body = PlayRequest {
            play_sources: vec![self.play_source_body(source)],
            operation_context: context.map(|c| c.as_str().to_string()),
        };
        let path = format!("/calling/callConnections/{connection_id}:play");
        self.send(Method::POST, &path, Some(&body)).await?;
        Ok(())
    }

    async fn start_recognizing(
        &self,
        connection_id: &str,
        options: RecognizeOptions,
    ) -> Result<(), AppError> {
        let body = RecognizeRequest {
            recognize_input_type: "speech".to_string(),
            play_prompt: self.play_source_body(options.prompt),
            interrupt_call_media_operation: false,
            recognize_options: RecognizeOptionsBody {
                target_participant: CommunicationIdentifier::phone_number(
                    &options.target_phone_number,
                ),
                speech_language: options.speech_language,
                end_silence_timeout_in_ms: options.end_silence_timeout.as_millis() as u64,
            },
        };
        let path = format!("/calling/callConnections/{connection_id}:recognize");
        self.send(Method::POST, &path, Some(&body)).await?;
        Ok(())
    }

    async fn transfer_to_participant(
        &self,
        connection_id: &str,
        target_phone_number: &str,
    ) -> Result<(), AppError> {
        let body = TransferToParticipantRequest {
            target_participant: CommunicationIdentifier::phone_number(target_phone_number),
        };
        let path = format!("/calling/callConnections/{connection_id}:transferToParticipant");
        self.send(Method::POST, &path, Some(&body)).await?;
        Ok(())
    }

    async fn hang_up(&self, connection_id: &str) -> Result<(), AppError> {
        // Terminate for every participant, not only the bot leg
        let path = format!("/calling/callConnections/{connection_id}:terminate");
        self.send::<()>(Method::POST, &path, None).await?;
        Ok(())
    }
}

/// A live connection to one call, with the helpers the conversation flow uses.  Provider
/// failures never propagate from here: a vanished call is expected, anything else is logged.
pub struct CallConnection {
    pub id: String,
    automation: Arc<dyn CallAutomation>,
    workflow: WorkflowConfig,
}

fn log_failure(call: &CallRecord, action: &str, e: AppError) {
    match e {
        AppError::TargetGone => debug!(call_id=%call.id, "call hung up before {action}"),
        e => warn!(call_id=%call.id, error=%e, "failed to {action}"),
    }
}

impl CallConnection {
    pub fn new(id: String, automation: Arc<dyn CallAutomation>, workflow: &WorkflowConfig) -> Self {
        Self {
            id,
            automation,
            workflow: workflow.clone(),
        }
    }

    /// Speak text to the caller.  When `store` is set the text is recorded as an assistant turn.
    /// Long text is played as a sequence of sentence-aligned chunks.
    pub async fn play_text(
        &self,
        call: &mut CallRecord,
        text: &str,
        context: Option<CallContext>,
        store: bool,
    ) {
        if store {
            call.messages.push(Message::assistant(text));
        }
        for chunk in split_text_chunks(text, TTS_MAX_CHARS) {
            debug!(call_id=%call.id, chunk=%chunk, "playing chunk");
            let res = self
                .automation
                .play(&self.id, PlaySource::Text(chunk), context)
                .await;
            if let Err(e) = res {
                log_failure(call, "playing", e);
                return;
            }
        }
    }

    pub async fn play_media(&self, call: &CallRecord, sound: Sound) {
        let source = PlaySource::File(sound.url(&self.workflow.resources_public_url));
        if let Err(e) = self.automation.play(&self.id, source, None).await {
            log_failure(call, "playing", e);
        }
    }

    /// Listen to the caller, signalled by the "ready" sound.
    pub async fn recognize(&self, call: &CallRecord) {
        debug!(call_id=%call.id, "recognizing");
        let options = RecognizeOptions {
            prompt: PlaySource::File(Sound::Ready.url(&self.workflow.resources_public_url)),
            target_phone_number: call.phone_number.clone(),
            speech_language: self.workflow.conversation_lang.clone(),
            end_silence_timeout: RECOGNITION_END_SILENCE,
        };
        if let Err(e) = self.automation.start_recognizing(&self.id, options).await {
            log_failure(call, "recognizing", e);
        }
    }

    /// Speak text, then listen to the answer.
    pub async fn recognize_text(&self, call: &mut CallRecord, text: &str, store: bool) {
        self.play_text(call, text, None, store).await;
        self.recognize(call).await;
    }

    pub async fn transfer_to_agent(&self, call: &CallRecord) {
        let agent = &self.workflow.agent_phone_number;
        if let Err(e) = self.automation.transfer_to_participant(&self.id, agent).await {
            log_failure(call, "transferring", e);
        }
    }

    pub async fn hang_up(&self, call: &CallRecord) {
        debug!(call_id=%call.id, "hanging up call");
        if let Err(e) = self.automation.hang_up(&self.id).await {
            log_failure(call, "hanging up", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Command, RecordingAutomation};

    #[test]
    fn request_signature_matches_reference() {
        let (content_hash, authorization) = sign_request(
            b"secret-access-key",
            "POST",
            "acs.example.com",
            "/calling/callConnections/abc:play?api-version=2023-10-15",
            "Tue, 20 Oct 2026 10:00:00 GMT",
            br#"{"operationContext":"goodbye"}"#,
        )
        .unwrap();
        assert_eq!(content_hash, "bruHLxdkisfDuCoN2T9TWXv3gMeW8TFsTKQgIV6gfZM=");
        assert_eq!(
            authorization,
            "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256\
             &Signature=IwaoAa+2StFF09G2aR4G1K5Fp6rb0PVbWyaOhhnkuzE="
        );
    }

    #[test]
    fn ssml_carries_voice_and_text() {
        let ssml = render_ssml(
            "Hello there.",
            "en-US",
            "en-US-JennyNeural",
            "https://cdn.example.com/lexicon.xml",
        );
        assert!(ssml.starts_with("<speak"));
        assert!(ssml.contains("en-US-JennyNeural"));
        assert!(ssml.contains("https://cdn.example.com/lexicon.xml"));
        assert!(ssml.contains("Hello there."));
    }

    #[test]
    fn ssml_truncates_long_text() {
        let ssml = render_ssml(&"a".repeat(500), "en-US", "voice", "lexicon");
        assert!(ssml.contains(&"a".repeat(TTS_MAX_CHARS)));
        assert!(!ssml.contains(&"a".repeat(TTS_MAX_CHARS + 1)));
    }

    #[test]
    fn ssml_limit_counts_characters() {
        let ssml = render_ssml(&"é".repeat(500), "fr-FR", "voice", "lexicon");
        assert!(ssml.contains(&"é".repeat(TTS_MAX_CHARS)));
        assert!(!ssml.contains(&"é".repeat(TTS_MAX_CHARS + 1)));
    }

    #[test]
    fn ssml_escapes_markup_in_text() {
        let ssml = render_ssml("Tom & Jerry <b>", "en-US", "voice", "lexicon");
        assert!(ssml.contains("Tom &amp; Jerry &lt;b&gt;"));
        assert!(!ssml.contains("<b>"));
    }

    #[test]
    fn play_request_body_shape() {
        let body = PlayRequest {
            play_sources: vec![PlaySourceBody::File {
                file: FileSourceBody {
                    uri: "https://cdn.example.com/ready.wav".to_string(),
                },
            }],
            operation_context: Some(CallContext::Goodbye.as_str().to_string()),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["playSources"][0]["kind"], "file");
        assert_eq!(
            json["playSources"][0]["file"]["uri"],
            "https://cdn.example.com/ready.wav"
        );
        assert_eq!(json["operationContext"], "goodbye");
    }

    #[tokio::test]
    async fn vanished_call_is_not_an_error() {
        let automation = Arc::new(RecordingAutomation::gone());
        let connection = CallConnection::new(
            "conn-1".to_string(),
            automation.clone(),
            &WorkflowConfig::default(),
        );
        let mut call = CallRecord::new("+33612345678");
        connection.play_text(&mut call, "Hello.", None, true).await;
        connection.hang_up(&call).await;
        assert_eq!(call.messages.len(), 1);
        assert_eq!(automation.commands().last(), Some(&Command::HangUp));
    }

    #[tokio::test]
    async fn long_text_is_played_in_chunks() {
        let automation = Arc::new(RecordingAutomation::default());
        let connection = CallConnection::new(
            "conn-1".to_string(),
            automation.clone(),
            &WorkflowConfig::default(),
        );
        let mut call = CallRecord::new("+33612345678");
        let text = "A sentence of about forty characters here. ".repeat(20);
        connection.play_text(&mut call, &text, None, false).await;
        assert!(call.messages.is_empty());
        assert!(automation.played_texts().len() > 1);
    }
}

use crate::call_automation::CallConnection;
use crate::call_automation_types::CloudEvent;
use crate::call_types::{CallRecord, Message};
use crate::consts::{MAX_RECOGNITION_RETRY, RETRYABLE_RECOGNITION_SUB_CODES};
use crate::error::AppError;
use crate::intelligence::intelligence;
use crate::prompts::tts;
use crate::tasks::handle_hangup;
use crate::types::{AppState, CallContext};

use tracing::{debug, info, warn};

/// Telephony callbacks the call flow reacts to.
#[derive(Clone, PartialEq, Debug)]
pub enum CallEvent {
    Connected,
    Disconnected,
    RecognizeCompleted {
        recognition_type: Option<String>,
        speech: Option<String>,
    },
    RecognizeFailed {
        sub_code: Option<u32>,
    },
    PlayCompleted {
        context: Option<CallContext>,
    },
    PlayFailed {
        sub_code: Option<u32>,
    },
    TransferAccepted,
    TransferFailed {
        sub_code: Option<u32>,
    },
    Other(String),
}

impl CallEvent {
    /// Split a callback into its connection id and event.  Callbacks without a connection id
    /// cannot be acted upon and yield `None`.
    pub fn from_cloud_event(event: CloudEvent) -> Option<(String, CallEvent)> {
        let data = event.data;
        let connection_id = data.call_connection_id?;
        let sub_code = data.result_information.as_ref().and_then(|r| r.sub_code);
        let call_event = match event.event_type.as_str() {
            "Microsoft.Communication.CallConnected" => CallEvent::Connected,
            "Microsoft.Communication.CallDisconnected" => CallEvent::Disconnected,
            "Microsoft.Communication.RecognizeCompleted" => CallEvent::RecognizeCompleted {
                recognition_type: data.recognition_type,
                speech: data.speech_result.and_then(|r| r.speech),
            },
            "Microsoft.Communication.RecognizeFailed" => CallEvent::RecognizeFailed { sub_code },
            "Microsoft.Communication.PlayCompleted" => CallEvent::PlayCompleted {
                context: data.operation_context.as_deref().and_then(CallContext::parse),
            },
            "Microsoft.Communication.PlayFailed" => CallEvent::PlayFailed { sub_code },
            "Microsoft.Communication.CallTransferAccepted" => CallEvent::TransferAccepted,
            "Microsoft.Communication.CallTransferFailed" => CallEvent::TransferFailed { sub_code },
            other => CallEvent::Other(other.to_string()),
        };
        Some((connection_id, call_event))
    }
}

/// Drive the call forward for one callback.  The record is persisted whatever the outcome.
pub async fn dispatch(
    app_state: &AppState,
    call: &mut CallRecord,
    connection: &CallConnection,
    event: CallEvent,
) -> Result<(), AppError> {
    debug!(call_id=%call.id, event=?event, "call event");
    match event {
        CallEvent::Connected => {
            info!(call_id=%call.id, "call connected");
            call.recognition_retry = 0;
            call.call_ended = false;
            if call.messages.is_empty() {
                connection.recognize_text(call, tts::HELLO, true).await;
            } else {
                call.messages.push(Message::human("Customer called again."));
                connection.play_text(call, tts::WELCOME_BACK, None, true).await;
                intelligence(app_state, call, connection).await;
            }
        }
        CallEvent::Disconnected => {
            info!(call_id=%call.id, "call disconnected");
            handle_hangup(app_state, call, connection).await;
        }
        CallEvent::RecognizeCompleted {
            recognition_type,
            speech,
        } => {
            // Anything but speech, like DTMF tones, is not part of the conversation
            if recognition_type.as_deref().map_or(true, |t| t == "speech") {
                match speech.as_deref().map(str::trim) {
                    Some(text) if !text.is_empty() => {
                        info!(call_id=%call.id, speech=%text, "recognition completed");
                        call.messages.push(Message::human(text));
                        intelligence(app_state, call, connection).await;
                    }
                    _ => debug!(call_id=%call.id, "empty recognition"),
                }
            } else {
                debug!(call_id=%call.id, recognition_type=?recognition_type, "ignoring recognition");
            }
        }
        CallEvent::RecognizeFailed { sub_code } => {
            let retryable =
                sub_code.map_or(false, |c| RETRYABLE_RECOGNITION_SUB_CODES.contains(&c));
            if retryable && call.recognition_retry < MAX_RECOGNITION_RETRY {
                debug!(call_id=%call.id, sub_code=?sub_code, retry=call.recognition_retry, "recognition timeout, retrying");
                connection
                    .recognize_text(call, tts::TIMEOUT_SILENCE, true)
                    .await;
                call.recognition_retry += 1;
            } else {
                info!(call_id=%call.id, sub_code=?sub_code, retry=call.recognition_retry, "recognition failed, ending call");
                connection
                    .play_text(call, tts::GOODBYE, Some(CallContext::Goodbye), true)
                    .await;
            }
        }
        CallEvent::PlayCompleted { context } => {
            debug!(call_id=%call.id, context=?context, "play completed");
            match context {
                Some(CallContext::TransferFailed | CallContext::Goodbye) => {
                    info!(call_id=%call.id, "ending call");
                    handle_hangup(app_state, call, connection).await;
                }
                Some(CallContext::ConnectAgent) => {
                    info!(call_id=%call.id, "initiating transfer");
                    connection.transfer_to_agent(call).await;
                }
                None => (),
            }
        }
        CallEvent::PlayFailed { sub_code } => match sub_code {
            Some(8535) => warn!(call_id=%call.id, "error during media play, file format is invalid"),
            Some(8536) => {
                warn!(call_id=%call.id, "error during media play, file could not be downloaded")
            }
            Some(9999) => {
                warn!(call_id=%call.id, "error during media play, unknown internal server error")
            }
            other => warn!(call_id=%call.id, sub_code=?other, "error during media play"),
        },
        CallEvent::TransferAccepted => {
            info!(call_id=%call.id, "call transfer accepted");
        }
        CallEvent::TransferFailed { sub_code } => {
            info!(call_id=%call.id, sub_code=?sub_code, "error during call transfer");
            connection
                .play_text(
                    call,
                    tts::CALLTRANSFER_FAILURE,
                    Some(CallContext::TransferFailed),
                    true,
                )
                .await;
        }
        CallEvent::Other(event_type) => {
            debug!(call_id=%call.id, event_type=%event_type, "unhandled call event");
        }
    }

    app_state.store.upsert(call).await
}

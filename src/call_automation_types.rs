mod ssml {
    use xmlserde_derives::XmlSerialize;

    #[derive(PartialEq, Eq, XmlSerialize)]
    #[xmlserde(root = b"speak")]
    pub struct Speak {
        #[xmlserde(name = b"version", ty = "attr")]
        pub version: String,
        #[xmlserde(name = b"xmlns", ty = "attr")]
        pub xmlns: String,
        #[xmlserde(name = b"xml:lang", ty = "attr")]
        pub lang: String,
        #[xmlserde(name = b"voice", ty = "child")]
        pub voice: Voice,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub struct Voice {
        #[xmlserde(name = b"name", ty = "attr")]
        pub name: String,
        #[xmlserde(name = b"effect", ty = "attr")]
        pub effect: String,
        #[xmlserde(name = b"lexicon", ty = "child")]
        pub lexicon: Lexicon,
        #[xmlserde(name = b"prosody", ty = "child")]
        pub prosody: Prosody,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub struct Lexicon {
        #[xmlserde(name = b"uri", ty = "attr")]
        pub uri: String,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub struct Prosody {
        #[xmlserde(name = b"rate", ty = "attr")]
        pub rate: String,
        #[xmlserde(ty = "text")]
        pub text: String,
    }
}
pub use ssml::*;

mod rest {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Clone, Debug)]
    pub struct PhoneNumberValue {
        pub value: String,
    }

    #[derive(Serialize, Deserialize, Clone, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct CommunicationIdentifier {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub kind: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub raw_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub phone_number: Option<PhoneNumberValue>,
    }

    impl CommunicationIdentifier {
        pub fn phone_number(number: &str) -> Self {
            Self {
                kind: Some("phoneNumber".to_string()),
                raw_id: Some(format!("4:{number}")),
                phone_number: Some(PhoneNumberValue {
                    value: number.to_string(),
                }),
            }
        }
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct CallIntelligenceOptions {
        pub cognitive_services_endpoint: String,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct AnswerCallRequest {
        pub incoming_call_context: String,
        pub callback_uri: String,
        pub call_intelligence_options: CallIntelligenceOptions,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct CreateCallRequest {
        pub targets: Vec<CommunicationIdentifier>,
        pub source_caller_id_number: PhoneNumberValue,
        pub callback_uri: String,
        pub call_intelligence_options: CallIntelligenceOptions,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct CallConnectionProperties {
        pub call_connection_id: String,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct FileSourceBody {
        pub uri: String,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct SsmlSourceBody {
        pub ssml_text: String,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase", tag = "kind")]
    pub enum PlaySourceBody {
        #[serde(rename = "file")]
        File { file: FileSourceBody },
        #[serde(rename = "ssml")]
        Ssml { ssml: SsmlSourceBody },
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct PlayRequest {
        pub play_sources: Vec<PlaySourceBody>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub operation_context: Option<String>,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct RecognizeOptionsBody {
        pub target_participant: CommunicationIdentifier,
        pub speech_language: String,
        pub end_silence_timeout_in_ms: u64,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct RecognizeRequest {
        pub recognize_input_type: String,
        pub play_prompt: PlaySourceBody,
        pub interrupt_call_media_operation: bool,
        pub recognize_options: RecognizeOptionsBody,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct TransferToParticipantRequest {
        pub target_participant: CommunicationIdentifier,
    }
}
pub use rest::*;

mod events {
    use super::rest::CommunicationIdentifier;
    use serde::Deserialize;
    use serde_json::Value;

    /// Callback posted by the call automation service, one per call event.
    #[derive(Deserialize, Debug)]
    pub struct CloudEvent {
        #[serde(rename = "type")]
        pub event_type: String,
        #[serde(default)]
        pub data: CallEventData,
    }

    #[derive(Deserialize, Default, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct CallEventData {
        pub call_connection_id: Option<String>,
        pub operation_context: Option<String>,
        pub result_information: Option<ResultInformation>,
        pub recognition_type: Option<String>,
        pub speech_result: Option<SpeechResult>,
    }

    #[derive(Deserialize, Default, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct ResultInformation {
        pub code: Option<u32>,
        pub sub_code: Option<u32>,
        pub message: Option<String>,
    }

    #[derive(Deserialize, Default, Debug)]
    pub struct SpeechResult {
        pub speech: Option<String>,
    }

    /// Envelope of the inbound-call notifications.
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct EventGridEvent {
        pub event_type: String,
        #[serde(default)]
        pub data: Value,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct SubscriptionValidationData {
        pub validation_code: String,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct IncomingCallData {
        pub from: CommunicationIdentifier,
        pub incoming_call_context: String,
    }

    impl IncomingCallData {
        /// Caller id: the phone number when the caller is on the phone network, the raw id
        /// otherwise.
        pub fn caller_id(&self) -> Option<String> {
            match (&self.from.kind, &self.from.phone_number) {
                (Some(kind), Some(number)) if kind == "phoneNumber" => Some(number.value.clone()),
                _ => self.from.raw_id.clone(),
            }
        }
    }

    pub const SUBSCRIPTION_VALIDATION_EVENT: &str = "Microsoft.EventGrid.SubscriptionValidationEvent";
    pub const INCOMING_CALL_EVENT: &str = "Microsoft.Communication.IncomingCall";
}
pub use events::*;

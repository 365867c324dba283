//! Everything between a call record and the language model: the message list and tool schema
//! sent for a turn, and the interpretation of the tool calls that come back.

use crate::call_types::{
    CallRecord, Claim, ClaimField, Message, Persona, Reminder, ToolCallRecord,
};
use crate::error::AppError;
use crate::llm::ChatCompletion;
use crate::openai_types::{
    OpenAIFunction, OpenAIFunctionCall, OpenAIMessage, OpenAITool, OpenAIToolCall,
};
use crate::prompts;
use crate::types::{Action, Intent};

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use time::{macros::format_description, OffsetDateTime};
use tracing::{info, warn};

const CUSTOMER_RESPONSE_PROP: &str = "customer_response";

pub mod tool_names {
    pub const TALK_TO_HUMAN: &str = "talk_to_human";
    pub const END_CALL: &str = "end_call";
    pub const NEW_CLAIM: &str = "new_claim";
    pub const UPDATED_CLAIM: &str = "updated_claim";
    pub const NEW_OR_UPDATED_REMINDER: &str = "new_or_updated_reminder";
}

fn today() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[weekday] [day] [month repr:long] [year] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default()
}

fn system_messages(call: &CallRecord, task_prompt: String) -> Vec<OpenAIMessage> {
    vec![
        OpenAIMessage::new(
            "system",
            prompts::default_system(&today(), &call.phone_number),
        ),
        OpenAIMessage::new("system", task_prompt),
    ]
}

/// Message list for a conversational turn: both system prompts, then the whole transcript with
/// past tool invocations re-expanded into function-call messages.
pub fn build_chat_messages(call: &CallRecord) -> Result<Vec<OpenAIMessage>, AppError> {
    let claim = serde_json::to_string(&call.claim)?;
    let reminders = serde_json::to_string(&call.reminders)?;
    let mut messages = system_messages(call, prompts::chat_system(&claim, &reminders));

    for message in &call.messages {
        match message.persona {
            Persona::Human => messages.push(OpenAIMessage::new("user", &message.content)),
            Persona::System => messages.push(OpenAIMessage::new("system", &message.content)),
            Persona::Assistant if message.tool_calls.is_empty() => {
                messages.push(OpenAIMessage::new("assistant", &message.content))
            }
            Persona::Assistant => {
                let tool_calls = message
                    .tool_calls
                    .iter()
                    .map(|t| OpenAIToolCall {
                        id: t.id.clone(),
                        kind: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: t.function_name.clone(),
                            arguments: t.function_arguments.clone(),
                        },
                    })
                    .collect();
                messages.push(OpenAIMessage {
                    tool_calls: Some(tool_calls),
                    ..OpenAIMessage::new("assistant", &message.content)
                });
                for tool_call in &message.tool_calls {
                    messages.push(OpenAIMessage {
                        tool_call_id: Some(tool_call.id.clone()),
                        ..OpenAIMessage::new("tool", &tool_call.content)
                    });
                }
            }
        }
    }

    Ok(messages)
}

/// Message list asking for the end-of-call SMS summary.
pub fn build_summary_messages(call: &CallRecord) -> Result<Vec<OpenAIMessage>, AppError> {
    let claim = serde_json::to_string(&call.claim)?;
    let reminders = serde_json::to_string(&call.reminders)?;
    let conversation = serde_json::to_string(&call.messages)?;
    Ok(system_messages(
        call,
        prompts::sms_summary_system(&claim, &reminders, &conversation),
    ))
}

fn customer_response_schema(example: &str) -> serde_json::Value {
    json!({
        "description": format!("The text to be read to the customer to confirm the action. Only speak about this action. Use an imperative sentence. Example: '{example}'."),
        "type": "string",
    })
}

pub fn tools() -> Vec<OpenAITool> {
    let editable: Vec<&str> = ClaimField::EDITABLE.iter().map(|f| f.as_str()).collect();
    let tool = |name, description, parameters| OpenAITool {
        kind: "function",
        function: OpenAIFunction {
            name,
            description,
            parameters,
        },
    };
    vec![
        tool(
            tool_names::TALK_TO_HUMAN,
            "Use this if the user wants to talk to a human and Assistant is unable to help. \
             This will transfer the customer to a human agent. Approval from the customer must \
             be explicitly given. Example: 'I want to talk to a human'.",
            json!({"type": "object", "properties": {}, "required": []}),
        ),
        tool(
            tool_names::END_CALL,
            "Use this if the user wants to end the call, or if the user is satisfied with the \
             answer and confirmed the end of the call.",
            json!({"type": "object", "properties": {}, "required": []}),
        ),
        tool(
            tool_names::NEW_CLAIM,
            "Use this if the user wants to create a new claim. This will reset the claim and \
             reminder data. Approval from the customer must be explicitly given. \
             Example: 'I want to create a new claim'.",
            json!({
                "type": "object",
                "properties": {
                    CUSTOMER_RESPONSE_PROP: customer_response_schema("I am creating a new claim"),
                },
                "required": [CUSTOMER_RESPONSE_PROP],
            }),
        ),
        tool(
            tool_names::UPDATED_CLAIM,
            "Use this if the user wants to update a claim field with a new value. \
             Example: 'Update claim explanation to: I was driving on the highway when a car \
             hit me from behind'.",
            json!({
                "type": "object",
                "properties": {
                    "field": {
                        "description": "The claim field to update.",
                        "enum": editable,
                        "type": "string",
                    },
                    "value": {
                        "description": "The claim field value to update.",
                        "type": "string",
                    },
                    CUSTOMER_RESPONSE_PROP: customer_response_schema(
                        "I am updating the involved parties to Marie-Jeanne and Jean-Pierre"
                    ),
                },
                "required": [CUSTOMER_RESPONSE_PROP, "field", "value"],
            }),
        ),
        tool(
            tool_names::NEW_OR_UPDATED_REMINDER,
            "Use this if you think there is something important to do in the future, and you \
             want to be reminded about it. If it already exists, it will be updated with the \
             new values. Example: 'Remind Assistant next week to send the report'.",
            json!({
                "type": "object",
                "properties": {
                    "description": {
                        "description": "Contextual description of the reminder. Should be detailed enough to be understood by anyone.",
                        "type": "string",
                    },
                    "due_date_time": {
                        "description": "Datetime when the reminder should be triggered. Should be in the future, in the ISO format.",
                        "type": "string",
                    },
                    "title": {
                        "description": "Short title of the reminder, in the format 'Verb + Subject'. Title is unique and allows the reminder to be updated.",
                        "type": "string",
                    },
                    CUSTOMER_RESPONSE_PROP: customer_response_schema(
                        "I am creating a reminder for next week to call back the customer"
                    ),
                },
                "required": [CUSTOMER_RESPONSE_PROP, "description", "due_date_time", "title"],
            }),
        ),
    ]
}

#[derive(Deserialize)]
struct NewClaimArgs {
    customer_response: Option<String>,
}

#[derive(Deserialize)]
struct UpdatedClaimArgs {
    field: String,
    value: String,
    customer_response: Option<String>,
}

#[derive(Deserialize)]
struct ReminderArgs {
    title: String,
    description: String,
    due_date_time: String,
    customer_response: Option<String>,
}

fn parse_args<T: DeserializeOwned>(tool_call: &OpenAIToolCall) -> Result<T, AppError> {
    let raw = tool_call.function.arguments.trim();
    let raw = if raw.is_empty() { "{}" } else { raw };
    serde_json::from_str(raw).map_err(|e| {
        AppError::Model(format!(
            "malformed arguments for {}: {e}",
            tool_call.function.name
        ))
    })
}

/// Append the confirmation the model wants spoken.  When the model omits it the action still goes
/// through silently.
fn push_confirmation(content: &mut String, response: Option<String>, tool_call: &OpenAIToolCall) {
    match response {
        Some(response) if !response.trim().is_empty() => {
            if !content.is_empty() && !content.ends_with(char::is_whitespace) {
                content.push(' ');
            }
            content.push_str(response.trim());
        }
        _ => warn!(
            arguments=%tool_call.function.arguments,
            "missing {CUSTOMER_RESPONSE_PROP} prop in {} call",
            tool_call.function.name
        ),
    }
}

/// Apply the model's answer to the call.  Tool calls are processed in order; the last one
/// decides the intent.  The record is only changed if every tool call could be applied, in which
/// case the answer is appended as an assistant turn carrying the tool outcomes.
pub fn interpret(call: &mut CallRecord, completion: ChatCompletion) -> Result<Action, AppError> {
    let mut draft = call.clone();
    let mut content = completion.content.trim().to_string();
    let mut intent = Intent::Continue;
    let mut records = Vec::with_capacity(completion.tool_calls.len());

    for tool_call in &completion.tool_calls {
        let name = tool_call.function.name.as_str();
        info!(call_id=%call.id, arguments=%tool_call.function.arguments, "tool call {name}");

        let outcome = match name {
            tool_names::TALK_TO_HUMAN => {
                intent = Intent::TalkToHuman;
                String::new()
            }
            tool_names::END_CALL => {
                intent = Intent::EndCall;
                String::new()
            }
            tool_names::UPDATED_CLAIM => {
                intent = Intent::UpdatedClaim;
                let args: UpdatedClaimArgs = parse_args(tool_call)?;
                push_confirmation(&mut content, args.customer_response, tool_call);
                let field = ClaimField::parse(&args.field).ok_or_else(|| {
                    AppError::Model(format!("claim field {} is not editable", args.field))
                })?;
                draft.claim.set(field, args.value.clone());
                format!(
                    "Updated claim field \"{}\" with value \"{}\".",
                    args.field, args.value
                )
            }
            tool_names::NEW_CLAIM => {
                intent = Intent::NewClaim;
                let args: NewClaimArgs = parse_args(tool_call)?;
                push_confirmation(&mut content, args.customer_response, tool_call);
                draft.claim = Claim::for_caller(&draft.phone_number);
                draft.reminders.clear();
                "Claim and reminders reset.".to_string()
            }
            tool_names::NEW_OR_UPDATED_REMINDER => {
                intent = Intent::NewOrUpdatedReminder;
                let args: ReminderArgs = parse_args(tool_call)?;
                push_confirmation(&mut content, args.customer_response, tool_call);
                let title = args.title.clone();
                let updated = draft.upsert_reminder(Reminder {
                    title: args.title,
                    description: args.description,
                    due_date_time: args.due_date_time,
                });
                if updated {
                    format!("Reminder \"{title}\" updated.")
                } else {
                    format!("Reminder \"{title}\" created.")
                }
            }
            other => {
                warn!(call_id=%call.id, "model called unknown tool {other}");
                format!("Unknown tool \"{other}\", nothing done.")
            }
        };

        records.push(ToolCallRecord {
            id: tool_call.id.clone(),
            function_name: tool_call.function.name.clone(),
            function_arguments: tool_call.function.arguments.clone(),
            content: outcome,
        });
    }

    draft.messages.push(Message {
        tool_calls: records,
        ..Message::assistant(content.clone())
    });
    *call = draft;

    Ok(Action { content, intent })
}

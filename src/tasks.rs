use crate::call_automation::CallConnection;
use crate::call_types::{CallRecord, Message};
use crate::conversation::build_summary_messages;
use crate::error::AppError;
use crate::types::AppState;

use tokio::time::timeout;
use tracing::{debug, info, warn};

/// End the call and run the end-of-call side effects: summary by SMS, with the outcome noted in
/// the transcript.  Side effects run once per connection, however many times the call is hung up.
pub async fn handle_hangup(
    app_state: &AppState,
    call: &mut CallRecord,
    connection: &CallConnection,
) {
    connection.hang_up(call).await;

    if call.call_ended {
        debug!(call_id=%call.id, "end of call already handled");
        return;
    }
    call.call_ended = true;
    call.messages.push(Message::human("Customer ended the call."));

    let summary = summarize(app_state, call).await;
    info!(call_id=%call.id, summary=%summary, "sms report");

    let from = &app_state.workflow.bot_phone_number;
    let note = match app_state.sms.send(from, &call.phone_number, &summary).await {
        Ok(receipt) if receipt.successful => {
            info!(call_id=%call.id, message_id=?receipt.message_id, to=%receipt.to, "sms report sent");
            format!("SMS report sent to {}: {summary}", receipt.to)
        }
        Ok(receipt) => {
            let error = receipt.error_message.unwrap_or_else(|| "unknown error".to_string());
            warn!(call_id=%call.id, to=%receipt.to, error=%error, "failed sms report");
            format!("Failed to send SMS report to {}: {error}", receipt.to)
        }
        Err(e) => {
            warn!(call_id=%call.id, error=%e, "failed sms report");
            format!("Failed to send SMS report to {}: {e}", call.phone_number)
        }
    };
    call.messages.push(Message::assistant(note));
}

/// Best effort, an empty summary on any failure.
async fn summarize(app_state: &AppState, call: &CallRecord) -> String {
    match request_summary(app_state, call).await {
        Ok(summary) => summary.trim().to_string(),
        Err(e) => {
            warn!(call_id=%call.id, error=%e, "failed to summarize call");
            String::new()
        }
    }
}

async fn request_summary(app_state: &AppState, call: &CallRecord) -> Result<String, AppError> {
    let messages = build_summary_messages(call)?;
    timeout(
        app_state.workflow.intelligence_hard_timeout,
        app_state.llm.complete(messages),
    )
    .await
    .map_err(|_| AppError::ModelTimeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_types::Persona;
    use crate::test_support::{Command, RecordingSms, TestHarness};

    #[tokio::test]
    async fn summary_is_sent_to_caller() {
        let harness = TestHarness::new();
        harness.llm.set_summary(Some("Claim for a car accident in Paris."));
        let mut call = CallRecord::new("+33612345678");
        let connection = harness.connection();

        handle_hangup(&harness.state, &mut call, &connection).await;

        assert_eq!(harness.automation.commands(), vec![Command::HangUp]);
        assert_eq!(
            harness.sms.sent(),
            vec![(
                "+33199999999".to_string(),
                "+33612345678".to_string(),
                "Claim for a car accident in Paris.".to_string()
            )]
        );
        let contents: Vec<&str> = call.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "Customer ended the call.",
                "SMS report sent to +33612345678: Claim for a car accident in Paris.",
            ]
        );
        assert!(call.call_ended);
    }

    #[tokio::test]
    async fn sms_failure_is_noted() {
        let harness = TestHarness::with_sms(RecordingSms::failing());
        // No summary: the model fails and the report is empty
        let mut call = CallRecord::new("+33612345678");
        let connection = harness.connection();

        handle_hangup(&harness.state, &mut call, &connection).await;

        assert_eq!(harness.sms.sent()[0].2, "");
        let note = call.messages.last().unwrap();
        assert_eq!(note.persona, Persona::Assistant);
        assert_eq!(
            note.content,
            "Failed to send SMS report to +33612345678: The 'To' number is not a valid phone number."
        );
    }

    #[tokio::test]
    async fn side_effects_run_once() {
        let harness = TestHarness::new();
        harness.llm.set_summary(Some("Summary"));
        let mut call = CallRecord::new("+33612345678");
        let connection = harness.connection();

        handle_hangup(&harness.state, &mut call, &connection).await;
        handle_hangup(&harness.state, &mut call, &connection).await;

        assert_eq!(harness.sms.sent().len(), 1);
        assert_eq!(harness.llm.summaries(), 1);
        assert_eq!(call.messages.len(), 2);
        // Hang up is still attempted every time
        assert_eq!(harness.automation.commands(), vec![Command::HangUp, Command::HangUp]);
    }
}

use crate::call_automation::CallConnection;
use crate::call_types::CallRecord;
use crate::consts::INTELLIGENCE_POLL_INTERVAL;
use crate::conversation::{build_chat_messages, interpret, tools};
use crate::error::AppError;
use crate::llm::ChatCompletion;
use crate::prompts::{tts, Sound};
use crate::types::{Action, AppState, CallContext, Intent};

use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Run model turns for the call until the model yields something other than a data update, then
/// act on it.  Data updates are persisted and confirmed out loud, and the model is asked again so
/// one caller utterance can trigger several updates followed by a single spoken answer.
pub async fn intelligence(app_state: &AppState, call: &mut CallRecord, connection: &CallConnection) {
    let max_turns = app_state.workflow.max_chained_tool_turns;
    for turn in 1..=max_turns {
        let action = match model_turn(app_state, call, connection).await {
            Ok(action) => action,
            Err(e) => {
                warn!(call_id=%call.id, error=%e, "error loading intelligence, answering with default error");
                Action {
                    content: tts::ERROR.to_string(),
                    intent: Intent::Continue,
                }
            }
        };
        info!(call_id=%call.id, intent=?action.intent, content=%action.content, "chat");

        match action.intent {
            Intent::TalkToHuman => {
                connection
                    .play_text(
                        call,
                        tts::END_CALL_TO_CONNECT_AGENT,
                        Some(CallContext::ConnectAgent),
                        true,
                    )
                    .await;
                return;
            }
            Intent::EndCall => {
                connection
                    .play_text(call, tts::GOODBYE, Some(CallContext::Goodbye), true)
                    .await;
                return;
            }
            intent if intent.is_data_update() => {
                // Persist right away so the update is visible before the call ends
                if let Err(e) = app_state.store.upsert(call).await {
                    warn!(call_id=%call.id, error=%e, "failed to save intermediate update");
                }
                // Already in the transcript as the model's turn
                connection
                    .play_text(call, &action.content, None, false)
                    .await;
                if turn == max_turns {
                    warn!(call_id=%call.id, "{max_turns} chained tool turns reached, listening again");
                    connection.recognize(call).await;
                    return;
                }
            }
            _ => {
                connection
                    .recognize_text(call, &action.content, false)
                    .await;
                return;
            }
        }
    }
}

/// One model turn raced against the soft and hard timeouts, with a loading sound in between.
async fn model_turn(
    app_state: &AppState,
    call: &mut CallRecord,
    connection: &CallConnection,
) -> Result<Action, AppError> {
    let completion = race_completion(app_state, call, connection).await?;
    interpret(call, completion)
}

async fn race_completion(
    app_state: &AppState,
    call: &mut CallRecord,
    connection: &CallConnection,
) -> Result<ChatCompletion, AppError> {
    let messages = build_chat_messages(call)?;
    let llm = app_state.llm.clone();
    let mut chat_task = tokio::spawn(async move { llm.chat(messages, tools()).await });
    let soft_timeout = app_state.workflow.intelligence_soft_timeout;
    let hard_timeout = app_state.workflow.intelligence_hard_timeout;
    let soft_timer = tokio::spawn(sleep(soft_timeout));
    let hard_timer = tokio::spawn(sleep(hard_timeout));
    let mut soft_timeout_triggered = false;

    loop {
        debug!(call_id=%call.id, done = chat_task.is_finished(), "chat task status");
        connection.play_media(call, Sound::Loading).await;

        if chat_task.is_finished() {
            soft_timer.abort();
            hard_timer.abort();
            return (&mut chat_task)
                .await
                .map_err(|e| AppError::Model(format!("chat task failed: {e}")))?;
        }
        if hard_timer.is_finished() {
            warn!(call_id=%call.id, "hard timeout of {}s reached", hard_timeout.as_secs());
            chat_task.abort();
            soft_timer.abort();
            return Err(AppError::ModelTimeout);
        }
        if soft_timer.is_finished() && !soft_timeout_triggered {
            warn!(call_id=%call.id, "soft timeout of {}s reached", soft_timeout.as_secs());
            soft_timeout_triggered = true;
            connection
                .play_text(call, tts::TIMEOUT_LOADING, None, true)
                .await;
        }

        // Do not flood the line with loading sounds
        sleep(INTELLIGENCE_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_types::{ClaimField, Message};
    use crate::conversation::tool_names;
    use crate::test_support::{tool_completion, Command, ScriptedTurn, TestHarness};
    use std::time::Duration;

    fn harness_with(turns: Vec<ScriptedTurn>) -> TestHarness {
        let harness = TestHarness::new();
        harness.llm.push_turns(turns);
        harness
    }

    #[tokio::test(start_paused = true)]
    async fn fast_model_never_triggers_soft_prompt() {
        let harness = harness_with(vec![ScriptedTurn::after(
            Duration::from_secs(1),
            Ok(ChatCompletion {
                content: "What happened?".to_string(),
                tool_calls: vec![],
            }),
        )]);
        let mut call = CallRecord::new("+33612345678");
        call.messages.push(Message::human("Hello"));
        let connection = harness.connection();

        intelligence(&harness.state, &mut call, &connection).await;

        let texts = harness.automation.played_texts();
        assert!(!texts.iter().any(|t| t == tts::TIMEOUT_LOADING));
        assert_eq!(texts.last().map(String::as_str), Some("What happened?"));
        assert!(matches!(
            harness.automation.commands().last(),
            Some(Command::Recognize { .. })
        ));
        assert!(harness.automation.loading_sounds() >= 1);
        // Human turn plus the model's answer
        assert_eq!(call.messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_triggers_soft_prompt_once() {
        let harness = harness_with(vec![ScriptedTurn::after(
            Duration::from_secs(40),
            Ok(ChatCompletion {
                content: "Thanks for waiting.".to_string(),
                tool_calls: vec![],
            }),
        )]);
        let mut call = CallRecord::new("+33612345678");
        let connection = harness.connection();

        intelligence(&harness.state, &mut call, &connection).await;

        let texts = harness.automation.played_texts();
        let soft = texts.iter().filter(|t| *t == tts::TIMEOUT_LOADING).count();
        assert_eq!(soft, 1);
        assert_eq!(texts.last().map(String::as_str), Some("Thanks for waiting."));
    }

    #[tokio::test(start_paused = true)]
    async fn hard_timeout_cancels_model_and_apologizes() {
        let harness = harness_with(vec![ScriptedTurn::after(
            Duration::from_secs(1_000),
            Ok(ChatCompletion {
                content: "Too late".to_string(),
                tool_calls: vec![],
            }),
        )]);
        let mut call = CallRecord::new("+33612345678");
        let connection = harness.connection();

        intelligence(&harness.state, &mut call, &connection).await;

        let texts = harness.automation.played_texts();
        assert_eq!(texts.last().map(String::as_str), Some(tts::ERROR));
        assert!(matches!(
            harness.automation.commands().last(),
            Some(Command::Recognize { .. })
        ));

        // Give an uncancelled model task every chance to finish
        sleep(Duration::from_secs(2_000)).await;
        assert_eq!(harness.llm.completed_turns(), 0);
        // The apology is not part of the transcript, the soft prompt is
        assert!(!call.messages.iter().any(|m| m.content == tts::ERROR));
        assert!(call.messages.iter().any(|m| m.content == tts::TIMEOUT_LOADING));
    }

    #[tokio::test(start_paused = true)]
    async fn model_failure_apologizes() {
        let harness = harness_with(vec![ScriptedTurn::now(Err(AppError::Model(
            "503".to_string(),
        )))]);
        let mut call = CallRecord::new("+33612345678");
        let connection = harness.connection();

        intelligence(&harness.state, &mut call, &connection).await;

        assert_eq!(
            harness.automation.played_texts().last().map(String::as_str),
            Some(tts::ERROR)
        );
        assert!(call.messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn chained_updates_then_answer() {
        let harness = harness_with(vec![
            ScriptedTurn::now(Ok(tool_completion(
                tool_names::UPDATED_CLAIM,
                r#"{"field":"incident_location","value":"Paris","customer_response":"I am noting Paris."}"#,
            ))),
            ScriptedTurn::now(Ok(tool_completion(
                tool_names::UPDATED_CLAIM,
                r#"{"field":"vehicle_info","value":"Red Clio","customer_response":"I am noting the red Clio."}"#,
            ))),
            ScriptedTurn::now(Ok(ChatCompletion {
                content: "Was anyone injured?".to_string(),
                tool_calls: vec![],
            })),
        ]);
        let mut call = CallRecord::new("+33612345678");
        let connection = harness.connection();

        intelligence(&harness.state, &mut call, &connection).await;

        let texts = harness.automation.played_texts();
        assert_eq!(
            texts,
            vec![
                "I am noting Paris.".to_string(),
                "I am noting the red Clio.".to_string(),
                "Was anyone injured?".to_string(),
            ]
        );
        assert_eq!(call.claim.get(ClaimField::VehicleInfo), Some("Red Clio"));
        // Intermediate updates were saved before the final answer
        let saved = harness.store.saved(call.id).unwrap();
        assert_eq!(saved.claim.get(ClaimField::IncidentLocation), Some("Paris"));
        assert_eq!(harness.automation.recognitions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn chained_updates_are_bounded() {
        let harness = TestHarness::new();
        let turns = (0..10)
            .map(|i| {
                ScriptedTurn::now(Ok(tool_completion(
                    tool_names::NEW_OR_UPDATED_REMINDER,
                    &format!(
                        r#"{{"title":"Task {i}","description":"d","due_date_time":"2026-11-01","customer_response":"Noted {i}."}}"#
                    ),
                )))
            })
            .collect();
        harness.llm.push_turns(turns);
        let mut call = CallRecord::new("+33612345678");
        let connection = harness.connection();

        intelligence(&harness.state, &mut call, &connection).await;

        let max = harness.state.workflow.max_chained_tool_turns;
        assert_eq!(call.reminders.len(), max);
        assert_eq!(harness.automation.recognitions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn talk_to_human_plays_transfer_line() {
        let harness = harness_with(vec![ScriptedTurn::now(Ok(tool_completion(
            tool_names::TALK_TO_HUMAN,
            "{}",
        )))]);
        let mut call = CallRecord::new("+33612345678");
        let connection = harness.connection();

        intelligence(&harness.state, &mut call, &connection).await;

        assert!(harness.automation.commands().contains(&Command::Play {
            source: crate::call_automation::PlaySource::Text(
                tts::END_CALL_TO_CONNECT_AGENT.to_string()
            ),
            context: Some(CallContext::ConnectAgent),
        }));
        assert_eq!(harness.automation.recognitions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn end_call_plays_goodbye() {
        let harness = harness_with(vec![ScriptedTurn::now(Ok(tool_completion(
            tool_names::END_CALL,
            "{}",
        )))]);
        let mut call = CallRecord::new("+33612345678");
        let connection = harness.connection();

        intelligence(&harness.state, &mut call, &connection).await;

        assert!(harness.automation.commands().iter().any(|c| matches!(
            c,
            Command::Play {
                context: Some(CallContext::Goodbye),
                ..
            }
        )));
        assert_eq!(call.messages.last().unwrap().content, tts::GOODBYE);
    }
}

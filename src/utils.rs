use crate::error::AppError;
use crate::call_types::CallRecord;
use crate::types::AppState;

use tracing::debug;

/// Split text on sentence boundaries into chunks no longer than `max_len` characters
/// each.  A single
/// sentence longer than `max_len` gets its own chunk.
pub fn split_text_chunks(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = vec![];
    let mut chunk = String::new();
    for sentence in text.split_inclusive(['.', '!', '?']) {
        if sentence.trim().is_empty() {
            continue;
        }
        if !chunk.is_empty() && chunk.chars().count() + sentence.chars().count() > max_len {
            chunks.push(chunk.trim().to_string());
            chunk.clear();
        }
        chunk.push_str(sentence);
    }
    if !chunk.trim().is_empty() {
        chunks.push(chunk.trim().to_string());
    }
    chunks
}

/// Truncate to at most `max_len` characters.
pub fn truncate_chars(text: &str, max_len: usize) -> &str {
    match text.char_indices().nth(max_len) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Callback URL for a phone number.  A caller who called recently keeps the same call record,
/// and thus the conversation history; otherwise a new record is created.
pub async fn callback_url(app_state: &AppState, phone_number: &str) -> Result<String, AppError> {
    let existing = app_state
        .store
        .get_most_recent_by_phone(phone_number, app_state.workflow.conversation_timeout)
        .await?;
    let call = match existing {
        Some(call) => call,
        None => {
            let call = CallRecord::new(phone_number);
            app_state.store.upsert(&call).await?;
            debug!(call_id=%call.id, "created call record");
            call
        }
    };
    Ok(format!(
        "{}/call/event/{}",
        app_state.events_domain.trim_end_matches('/'),
        call.id
    ))
}

use crate::call_automation::CallConnection;
use crate::call_automation_types::{
    CloudEvent, EventGridEvent, IncomingCallData, SubscriptionValidationData,
    INCOMING_CALL_EVENT, SUBSCRIPTION_VALIDATION_EVENT,
};
use crate::call_events::{dispatch, CallEvent};
use crate::call_types::CallRecord;
use crate::error::AppError;
use crate::types::AppState;
use crate::utils::callback_url;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct PhoneNumberQuery {
    pub phone_number: String,
}

#[derive(Serialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    pub validation_response: String,
}

/// Always 204, tells the platform the process is up.
pub async fn health_liveness() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// All calls with a phone number, newest first.
pub async fn call_get(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<PhoneNumberQuery>,
) -> Result<Json<Vec<CallRecord>>, AppError> {
    let calls = app_state.store.list_by_phone(&query.phone_number).await?;
    Ok(Json(calls))
}

pub async fn call_initiate_get(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<PhoneNumberQuery>,
) -> Result<StatusCode, AppError> {
    info!(phone_number=%query.phone_number, "initiating outbound call");
    let url = callback_url(&app_state, &query.phone_number).await?;
    let connection_id = app_state
        .automation
        .create_call(&query.phone_number, &url)
        .await?;
    info!(connection_id=%connection_id, "created call");
    Ok(StatusCode::NO_CONTENT)
}

/// Event Grid notifications: subscription handshake and incoming calls.
pub async fn call_inbound_post(
    State(app_state): State<Arc<AppState>>,
    Json(events): Json<Vec<EventGridEvent>>,
) -> Result<Response, AppError> {
    match inbound_events(&app_state, events).await? {
        Some(validation) => Ok(Json(validation).into_response()),
        None => Ok(StatusCode::OK.into_response()),
    }
}

async fn inbound_events(
    app_state: &AppState,
    events: Vec<EventGridEvent>,
) -> Result<Option<ValidationResponse>, AppError> {
    for event in events {
        debug!(event_type=%event.event_type, data=%event.data, "call inbound event");
        match event.event_type.as_str() {
            SUBSCRIPTION_VALIDATION_EVENT => {
                let data: SubscriptionValidationData = serde_json::from_value(event.data)?;
                info!(validation_code=%data.validation_code, "validating event grid subscription");
                return Ok(Some(ValidationResponse {
                    validation_response: data.validation_code,
                }));
            }
            INCOMING_CALL_EVENT => {
                let data: IncomingCallData = serde_json::from_value(event.data)?;
                let Some(caller_id) = data.caller_id() else {
                    warn!("incoming call without caller id, ignoring");
                    continue;
                };
                let url = callback_url(app_state, &caller_id).await?;
                let connection_id = app_state
                    .automation
                    .answer_call(&data.incoming_call_context, &url)
                    .await?;
                info!(caller_id=%caller_id, connection_id=%connection_id, "answered call");
            }
            other => debug!(event_type=%other, "ignoring inbound event"),
        }
    }
    Ok(None)
}

/// Callbacks of the call automation service for one call record.
pub async fn call_event_post(
    State(app_state): State<Arc<AppState>>,
    Path(call_id): Path<Uuid>,
    Json(events): Json<Vec<CloudEvent>>,
) -> Result<StatusCode, AppError> {
    for event in events {
        let mut call = app_state
            .store
            .get(call_id)
            .await?
            .ok_or(AppError::CallNotFound(call_id))?;
        let event_type = event.event_type.clone();
        let Some((connection_id, call_event)) = CallEvent::from_cloud_event(event) else {
            warn!(call_id=%call_id, event_type=%event_type, "call event without connection id");
            continue;
        };
        let connection = CallConnection::new(
            connection_id,
            app_state.automation.clone(),
            &app_state.workflow,
        );
        dispatch(&app_state, &mut call, &connection, call_event).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

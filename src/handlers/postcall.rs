//! Post-call webhook.
//!
//! The agent platform posts a signed analysis payload after each call. The
//! raw body is verified against the shared webhook secret before any parsing;
//! every rejection gets the same configured status so the response does not
//! reveal which check failed. Ticketing runs in a background task so the
//! webhook can be acknowledged immediately.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

use crate::{auth, core::ticketing::WebhookEvent, state::AppState};

const SIGNATURE_HEADER: &str = "elevenlabs-signature";

#[derive(Debug, Deserialize)]
pub struct PostCallPayload {
    pub data: PostCallData,
}

#[derive(Debug, Deserialize)]
pub struct PostCallData {
    #[serde(default)]
    pub metadata: Option<PostCallMetadata>,
    #[serde(default)]
    pub analysis: Option<PostCallAnalysis>,
}

#[derive(Debug, Deserialize)]
pub struct PostCallMetadata {
    #[serde(default)]
    pub phone_call: Option<PhoneCallMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct PhoneCallMetadata {
    pub external_number: String,
}

#[derive(Debug, Deserialize)]
pub struct PostCallAnalysis {
    #[serde(default)]
    pub transcript_summary: Option<String>,
    // The platform ships this field misspelled; accept the corrected
    // spelling too in case it ever gets fixed.
    #[serde(
        default,
        rename = "evalutation_criteria_results",
        alias = "evaluation_criteria_results"
    )]
    pub evaluation_criteria_results: Option<CriteriaResults>,
}

#[derive(Debug, Deserialize)]
pub struct CriteriaResults {
    #[serde(default)]
    pub should_support: bool,
}

pub async fn postcall_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    if let Err(e) = auth::verify(
        &body,
        signature,
        &state.config.elevenlabs_webhook_secret,
        now,
    ) {
        warn!("Rejected post-call webhook: {e}");
        return state.config.webhook_reject_status.into_response();
    }

    let payload: PostCallPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            // Authenticated but unusable; acknowledge so the platform does
            // not retry a payload that will never parse.
            warn!("Unparseable post-call payload: {e}");
            return Json(json!({"status": "ignored"})).into_response();
        }
    };

    let event = match extract_event(payload) {
        Some(event) => event,
        None => {
            warn!("Post-call payload missing caller number, skipping ticketing");
            return Json(json!({"status": "ignored"})).into_response();
        }
    };

    info!(
        external_number = %event.external_number,
        should_support = event.should_support,
        "Post-call webhook verified, starting ticketing workflow"
    );

    let workflow = state.workflow.clone();
    tokio::spawn(async move {
        match workflow.run(&event).await {
            Ok(outcome) => info!(
                contact_id = %outcome.contact_id,
                conversation_id = %outcome.conversation_id,
                assigned = outcome.assigned,
                closed = outcome.closed,
                "Ticketing workflow completed"
            ),
            Err(e) => error!("Ticketing workflow failed: {e}"),
        }
    });

    Json(json!({"status": "received"})).into_response()
}

/// Pull the workflow inputs out of a verified payload.
fn extract_event(payload: PostCallPayload) -> Option<WebhookEvent> {
    let external_number = payload
        .data
        .metadata
        .and_then(|m| m.phone_call)
        .map(|p| p.external_number)?;

    let analysis = payload.data.analysis;
    let transcript_summary = analysis
        .as_ref()
        .and_then(|a| a.transcript_summary.clone())
        .unwrap_or_else(|| "No summary available.".to_string());
    let should_support = analysis
        .as_ref()
        .and_then(|a| a.evaluation_criteria_results.as_ref())
        .map(|c| c.should_support)
        .unwrap_or(false);

    Some(WebhookEvent {
        external_number,
        transcript_summary,
        should_support,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_event_from_full_payload() {
        let payload: PostCallPayload = serde_json::from_str(
            r#"{
                "data": {
                    "metadata": {"phone_call": {"external_number": "+15551234567"}},
                    "analysis": {
                        "transcript_summary": "caller asked about billing",
                        "evalutation_criteria_results": {"should_support": true}
                    }
                }
            }"#,
        )
        .unwrap();

        let event = extract_event(payload).unwrap();
        assert_eq!(event.external_number, "+15551234567");
        assert_eq!(event.transcript_summary, "caller asked about billing");
        assert!(event.should_support);
    }

    #[test]
    fn accepts_corrected_criteria_spelling() {
        let payload: PostCallPayload = serde_json::from_str(
            r#"{
                "data": {
                    "metadata": {"phone_call": {"external_number": "+15550000000"}},
                    "analysis": {
                        "transcript_summary": "s",
                        "evaluation_criteria_results": {"should_support": true}
                    }
                }
            }"#,
        )
        .unwrap();

        assert!(extract_event(payload).unwrap().should_support);
    }

    #[test]
    fn missing_number_yields_no_event() {
        let payload: PostCallPayload =
            serde_json::from_str(r#"{"data": {"analysis": {"transcript_summary": "s"}}}"#).unwrap();
        assert!(extract_event(payload).is_none());
    }

    #[test]
    fn missing_analysis_defaults_to_no_support() {
        let payload: PostCallPayload = serde_json::from_str(
            r#"{"data": {"metadata": {"phone_call": {"external_number": "+15551112222"}}}}"#,
        )
        .unwrap();

        let event = extract_event(payload).unwrap();
        assert!(!event.should_support);
        assert_eq!(event.transcript_summary, "No summary available.");
    }
}

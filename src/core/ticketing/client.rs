//! Minimal Intercom REST client.
//!
//! Only the three operations the post-call workflow needs: contact
//! create-or-fetch, conversation creation, and conversation parts (assignment
//! and close share the endpoint and differ by `message_type`). All requests
//! are bearer-token authenticated JSON over the shared HTTP client.

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

/// Errors from the ticketing API boundary.
#[derive(Debug, Error)]
pub enum TicketingError {
    #[error("ticketing request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ticketing API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("ticketing response missing `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct ContactRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContactSearchResponse {
    #[serde(default)]
    data: Vec<ContactRef>,
}

pub struct IntercomClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl IntercomClient {
    pub fn new(http: reqwest::Client, base_url: String, token: String) -> Self {
        // Trailing slash would double up when joining paths.
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            token,
        }
    }

    /// Look up an existing contact by phone number.
    ///
    /// Runs before creation so webhook redelivery never creates duplicates.
    pub async fn find_contact_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<String>, TicketingError> {
        let body = json!({
            "query": {
                "field": "phone",
                "operator": "=",
                "value": phone,
            }
        });

        let response: ContactSearchResponse =
            self.post_json("/contacts/search", &body).await?;

        Ok(response.data.into_iter().next().map(|c| c.id))
    }

    /// Create a user contact keyed by phone number.
    pub async fn create_contact(&self, phone: &str) -> Result<String, TicketingError> {
        let body = json!({
            "role": "user",
            "phone": phone,
        });

        let response: Value = self.post_json("/contacts", &body).await?;
        extract_id(&response, &["id"]).ok_or(TicketingError::MissingField("id"))
    }

    /// Create a conversation from a contact, seeded with the call summary.
    pub async fn create_conversation(
        &self,
        contact_id: &str,
        summary: &str,
    ) -> Result<String, TicketingError> {
        let body = json!({
            "from": {
                "type": "user",
                "id": contact_id,
            },
            "body": summary,
        });

        let response: Value = self.post_json("/conversations", &body).await?;
        // The create endpoint answers with a message object; the conversation
        // id lives under `conversation_id` there.
        extract_id(&response, &["conversation_id", "id"])
            .ok_or(TicketingError::MissingField("conversation_id"))
    }

    /// Assign a conversation from `admin_id` to `assignee_id`.
    pub async fn assign_conversation(
        &self,
        conversation_id: &str,
        admin_id: &str,
        assignee_id: &str,
    ) -> Result<(), TicketingError> {
        let body = json!({
            "message_type": "assignment",
            "type": "admin",
            "admin_id": admin_id,
            "assignee_id": assignee_id,
        });

        let path = format!("/conversations/{conversation_id}/parts");
        let _: Value = self.post_json(&path, &body).await?;
        Ok(())
    }

    /// Close a conversation as `admin_id`.
    pub async fn close_conversation(
        &self,
        conversation_id: &str,
        admin_id: &str,
    ) -> Result<(), TicketingError> {
        let body = json!({
            "message_type": "close",
            "type": "admin",
            "admin_id": admin_id,
        });

        let path = format!("/conversations/{conversation_id}/parts");
        let _: Value = self.post_json(&path, &body).await?;
        Ok(())
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, TicketingError> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "Ticketing API request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TicketingError::Api {
                status: status.as_u16(),
                body: truncate_error_body(body),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

const ERROR_BODY_LIMIT_CHARS: usize = 200;

/// Shorten an error body for logging. Cuts on character boundaries, not
/// bytes, so localized API error messages cannot split a multibyte sequence.
fn truncate_error_body(body: String) -> String {
    if body.chars().count() <= ERROR_BODY_LIMIT_CHARS {
        return body;
    }
    let cut: String = body.chars().take(ERROR_BODY_LIMIT_CHARS).collect();
    format!("{cut}...")
}

/// Pull a string id out of a response, trying `keys` in order.
fn extract_id(value: &Value, keys: &[&'static str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_id_tries_keys_in_order() {
        let value = json!({"conversation_id": "c1", "id": "m1"});
        assert_eq!(
            extract_id(&value, &["conversation_id", "id"]),
            Some("c1".to_string())
        );

        let value = json!({"id": "m1"});
        assert_eq!(
            extract_id(&value, &["conversation_id", "id"]),
            Some("m1".to_string())
        );

        let value = json!({"id": 42});
        assert_eq!(extract_id(&value, &["id"]), None);
    }

    #[test]
    fn error_body_truncation_respects_char_boundaries() {
        // Multibyte character straddling the old byte cutoff.
        let mut body = "x".repeat(151);
        body.push_str(&"é".repeat(60));
        let truncated = truncate_error_body(body);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), ERROR_BODY_LIMIT_CHARS + 3);

        let short = "réponse courte".to_string();
        assert_eq!(truncate_error_body(short.clone()), short);

        let exact = "y".repeat(ERROR_BODY_LIMIT_CHARS);
        assert_eq!(truncate_error_body(exact.clone()), exact);
    }

    #[test]
    fn base_url_is_normalized() {
        let client = IntercomClient::new(
            reqwest::Client::new(),
            "https://api.intercom.io/".to_string(),
            "token".to_string(),
        );
        assert_eq!(client.base_url, "https://api.intercom.io");
    }
}

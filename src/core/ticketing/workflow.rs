//! Post-call ticketing workflow.
//!
//! Runs after a verified post-call webhook: resolve or create the caller's
//! contact, open a conversation seeded with the call summary, assign it, and
//! close it unless the agent flagged the call for human follow-up. Steps run
//! strictly in order; each step only starts once the previous one yielded the
//! id it depends on.

use thiserror::Error;
use tracing::{info, warn};

use super::client::{IntercomClient, TicketingError};

/// Verified post-call data the workflow consumes.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Caller phone number in E.164 form.
    pub external_number: String,
    /// Agent-written summary of the call.
    pub transcript_summary: String,
    /// Whether the agent judged the call to need human support.
    pub should_support: bool,
}

/// Identifiers accumulated across one workflow invocation. Never shared
/// between invocations; on early failure the populated ids show how far the
/// workflow got.
#[derive(Debug, Default)]
pub struct TicketContext {
    pub contact_id: Option<String>,
    pub conversation_id: Option<String>,
}

/// What the workflow accomplished for one webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowOutcome {
    pub contact_id: String,
    pub conversation_id: String,
    pub assigned: bool,
    pub closed: bool,
}

/// Workflow failures, tagged by the step that failed.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("contact resolution failed: {0}")]
    ContactResolutionFailed(#[source] TicketingError),

    #[error("conversation creation failed: {0}")]
    ConversationCreationFailed(#[source] TicketingError),

    #[error("conversation assignment failed: {0}")]
    AssignmentFailed(#[source] TicketingError),

    #[error("conversation close failed: {0}")]
    CloseFailed(#[source] TicketingError),
}

pub struct TicketWorkflow {
    client: IntercomClient,
    admin_id: String,
    assignee_id: String,
    /// When true, an assignment failure is logged and the close step still
    /// runs; when false it aborts the workflow.
    close_despite_assignment_failure: bool,
}

impl TicketWorkflow {
    pub fn new(
        client: IntercomClient,
        admin_id: String,
        assignee_id: String,
        close_despite_assignment_failure: bool,
    ) -> Self {
        Self {
            client,
            admin_id,
            assignee_id,
            close_despite_assignment_failure,
        }
    }

    /// Run the full ticketing sequence for one post-call event.
    pub async fn run(&self, event: &WebhookEvent) -> Result<WorkflowOutcome, WorkflowError> {
        let mut ctx = TicketContext::default();
        let result = self.run_steps(event, &mut ctx).await;
        if let Err(e) = &result {
            warn!(
                contact_id = ctx.contact_id.as_deref().unwrap_or("-"),
                conversation_id = ctx.conversation_id.as_deref().unwrap_or("-"),
                "Ticketing workflow stopped early: {e}"
            );
        }
        result
    }

    async fn run_steps(
        &self,
        event: &WebhookEvent,
        ctx: &mut TicketContext,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let contact_id = self
            .ensure_contact(&event.external_number)
            .await
            .map_err(WorkflowError::ContactResolutionFailed)?;
        info!(contact_id = %contact_id, "Resolved ticketing contact");
        ctx.contact_id = Some(contact_id.clone());

        let conversation_id = self
            .client
            .create_conversation(&contact_id, &event.transcript_summary)
            .await
            .map_err(WorkflowError::ConversationCreationFailed)?;
        info!(conversation_id = %conversation_id, "Created ticketing conversation");
        ctx.conversation_id = Some(conversation_id.clone());

        let assigned = match self
            .client
            .assign_conversation(&conversation_id, &self.admin_id, &self.assignee_id)
            .await
        {
            Ok(()) => true,
            Err(e) if self.close_despite_assignment_failure => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Conversation assignment failed, continuing"
                );
                false
            }
            Err(e) => return Err(WorkflowError::AssignmentFailed(e)),
        };

        // A call flagged for human support stays open for the assignee.
        let closed = if event.should_support {
            false
        } else {
            self.client
                .close_conversation(&conversation_id, &self.admin_id)
                .await
                .map_err(WorkflowError::CloseFailed)?;
            true
        };

        Ok(WorkflowOutcome {
            contact_id,
            conversation_id,
            assigned,
            closed,
        })
    }

    /// Find the contact for a phone number, creating it if absent.
    ///
    /// Search-then-create keeps webhook redelivery idempotent at the contact
    /// level.
    async fn ensure_contact(&self, phone: &str) -> Result<String, TicketingError> {
        if let Some(existing) = self.client.find_contact_by_phone(phone).await? {
            return Ok(existing);
        }
        self.client.create_contact(phone).await
    }
}

//! Intercom-backed post-call ticketing.

pub mod client;
pub mod workflow;

pub use client::{IntercomClient, TicketingError};
pub use workflow::{TicketContext, TicketWorkflow, WebhookEvent, WorkflowError, WorkflowOutcome};

use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::core::convai::{ConversationObserver, LoggingObserver};
use crate::core::ticketing::{IntercomClient, TicketWorkflow};

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Shared HTTP client for the agent platform and the ticketing API.
    pub http: reqwest::Client,
    /// Post-call ticketing workflow.
    pub workflow: Arc<TicketWorkflow>,
    /// Sink for conversation text events.
    pub observer: Arc<dyn ConversationObserver>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;

        let intercom = IntercomClient::new(
            http.clone(),
            config.intercom_base_url.clone(),
            config.intercom_access_token.clone(),
        );
        let workflow = Arc::new(TicketWorkflow::new(
            intercom,
            config.intercom_admin_id.clone(),
            config.intercom_assignee_id.clone(),
            config.close_despite_assignment_failure,
        ));

        Ok(Arc::new(Self {
            config,
            http,
            workflow,
            observer: Arc::new(LoggingObserver),
        }))
    }
}

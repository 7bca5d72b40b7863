use axum::http::StatusCode;
use std::env;
use std::time::Duration;

use crate::core::convai::ConvaiConfig;

const DEFAULT_ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io";
const DEFAULT_INTERCOM_BASE_URL: &str = "https://api.intercom.io";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable hostname, used in TwiML stream URLs.
    pub public_host: String,

    pub elevenlabs_api_key: String,
    pub elevenlabs_agent_id: String,
    pub elevenlabs_api_base: String,
    pub elevenlabs_webhook_secret: String,

    pub intercom_access_token: String,
    pub intercom_base_url: String,
    pub intercom_admin_id: String,
    pub intercom_assignee_id: String,

    /// Upper bound on waiting for the agent session to wind down at hangup.
    pub session_end_timeout: Duration,
    /// Status returned for any webhook signature rejection.
    pub webhook_reject_status: StatusCode,
    /// Whether a failed assignment still lets the close step run.
    pub close_despite_assignment_failure: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {e}"))?;
        let public_host = env::var("PUBLIC_HOST")
            .unwrap_or_else(|_| format!("localhost:{port}"));

        let elevenlabs_api_key = require_env("ELEVENLABS_API_KEY")?;
        let elevenlabs_agent_id = require_env("ELEVENLABS_AGENT_ID")?;
        let elevenlabs_api_base = env::var("ELEVENLABS_API_BASE")
            .unwrap_or_else(|_| DEFAULT_ELEVENLABS_API_BASE.to_string());
        let elevenlabs_webhook_secret = require_env("ELEVENLABS_WEBHOOK_SECRET")?;

        let intercom_access_token = require_env("INTERCOM_ACCESS_TOKEN")?;
        let intercom_base_url = env::var("INTERCOM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_INTERCOM_BASE_URL.to_string());
        let intercom_admin_id = require_env("INTERCOM_ADMIN_ID")?;
        let intercom_assignee_id = require_env("INTERCOM_ASSIGNEE_ID")?;

        let session_end_timeout = env::var("SESSION_END_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        let webhook_reject_status = match env::var("WEBHOOK_REJECT_STATUS") {
            Ok(raw) => {
                let code = raw
                    .parse::<u16>()
                    .map_err(|e| format!("Invalid WEBHOOK_REJECT_STATUS: {e}"))?;
                StatusCode::from_u16(code)
                    .map_err(|e| format!("Invalid WEBHOOK_REJECT_STATUS: {e}"))?
            }
            Err(_) => StatusCode::UNAUTHORIZED,
        };

        let close_despite_assignment_failure = env::var("CLOSE_DESPITE_ASSIGNMENT_FAILURE")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(ServerConfig {
            host,
            port,
            public_host,
            elevenlabs_api_key,
            elevenlabs_agent_id,
            elevenlabs_api_base,
            elevenlabs_webhook_secret,
            intercom_access_token,
            intercom_base_url,
            intercom_admin_id,
            intercom_assignee_id,
            session_end_timeout,
            webhook_reject_status,
            close_despite_assignment_failure,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Conversation session settings for the agent platform.
    pub fn convai_config(&self) -> ConvaiConfig {
        ConvaiConfig {
            api_key: self.elevenlabs_api_key.clone(),
            agent_id: self.elevenlabs_agent_id.clone(),
            api_base: self.elevenlabs_api_base.clone(),
        }
    }
}

fn require_env(name: &'static str) -> Result<String, String> {
    env::var(name).map_err(|_| format!("{name} must be set"))
}

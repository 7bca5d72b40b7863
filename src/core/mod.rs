pub mod audio;
pub mod convai;
pub mod ticketing;

// Re-export commonly used types for convenience
pub use audio::{AgentAudioFormat, CodecError};
pub use convai::{
    ConvaiConfig, ConvaiError, ConvaiEvent, ConvaiSession, ConversationObserver, LoggingObserver,
};
pub use ticketing::{
    IntercomClient, TicketContext, TicketWorkflow, TicketingError, WebhookEvent, WorkflowError,
    WorkflowOutcome,
};

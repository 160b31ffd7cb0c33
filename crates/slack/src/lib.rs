//! Slack integration for the MooAI assistant.
//!
//! This crate connects Slack to the agent runtime:
//! - **Socket Mode** (`socket`) - websocket connection to Slack (no public URL needed)
//! - **Events** (`events`) - envelope decoding and per-type dispatch
//! - **Web API** (`api`, `sink`) - replies, assistant thread surfaces, history, file downloads
//! - **Conversation** (`attachments`, `formatter`, `assistant`) - files become content parts,
//!   threads become turns, and the flows hand both to the model
//! - **Rendering** (`markdown`, `blocks`, `presentation`) - mrkdwn conversion and Block Kit replies
//!
//! # Architecture
//!
//! ```text
//! Slack → SocketModeRunner → EventDispatcher → AssistantService → AgentInvoker
//!                                                   ↓
//!                                 PresentationTarget ← AgentReply
//! ```
//!
//! # Key Types
//!
//! - `SocketModeRunner` - websocket event loop with reconnection logic
//! - `EventDispatcher` - routes events to the conversation service
//! - `AssistantService` - greeting, thinking status, mention and reply flows
//! - `SlackWebClient` - the handful of Web API methods the assistant calls

pub mod api;
pub mod assistant;
pub mod attachments;
pub mod blocks;
pub mod events;
pub mod formatter;
pub mod markdown;
pub mod presentation;
pub mod sink;
pub mod socket;
pub mod thread;

pub use api::{SlackApiError, SlackWebClient};
pub use assistant::{AssistantService, AssistantSettings};
pub use events::{conversation_dispatcher, EventDispatcher};
pub use sink::SlackSinks;
pub use socket::{ReconnectPolicy, SocketModeRunner, WebSocketTransport};

//! Transport client for the workflow API.
//!
//! - **Client (`client.rs`)**: request/response calls over HTTP (`WorkflowApi`).
//! - **Channel (`channel.rs`)**: one push channel per session (`PushConnector`).
//! - **Protocol (`protocol.rs`, `push.rs`)**: wire records and push messages.
//! - **Error (`error.rs`)**: the single normalized transport error.

pub mod channel;
pub mod client;
pub mod error;
pub mod protocol;
pub mod push;

pub use channel::{PushChannel, PushCloser, PushConnector, PushEvent, WsConnector};
pub use client::{HttpWorkflowApi, WorkflowApi};
pub use error::TransportError;
pub use protocol::{
    HealthStatus, PendingInterrupt, RespondRequest, ReviewItem, SessionSummary, StartRequest,
    StatusSnapshot, TestSuite, UserStory, WorkflowStatus,
};
pub use push::PushMessage;

//! # mergealert-notify
//!
//! Turns GitLab merge-request events into chat messages: recipient
//! resolution, message formatting, per-channel senders with signing,
//! throttling and monthly quotas, and the dispatch engine that fans one
//! event out to every linked destination.

pub mod dispatcher;
pub mod formatter;
pub mod payload;
pub mod quota;
pub mod ratelimit;
pub mod router;
pub mod sender;

pub use dispatcher::{DispatchEngine, DispatchOutcome};
pub use payload::MergeRequestPayload;
pub use router::SenderRouter;
pub use sender::{ChannelSender, SendError};

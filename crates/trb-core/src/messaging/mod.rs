//! Messenger abstractions shared by the Bot API and MTProto adapters.

pub mod port;
pub mod throttled;
pub mod types;

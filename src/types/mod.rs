//! Data types shared by the relay, the auth layer and the ingest bridge

mod identity;
mod message;

pub use identity::{UserId, VerifiedIdentity};
pub use message::MessageEvent;

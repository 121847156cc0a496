//! Shared data types for chat sessions and the model catalog.
//!
//! This crate defines the serializable session/message/catalog structures and
//! the strongly-typed error enums shared across the workspace.

pub mod catalog;
pub mod error;
pub mod message;

/// Re-export of model catalog entry types.
pub use catalog::{ModelArchitecture, ModelCatalogEntry, ModelPricing};
/// Re-export of all error types.
pub use error::*;
/// Re-export of session/message identity types.
pub use message::{Message, MessageId, MessageStatus, NewMessage, Sender, SessionId};

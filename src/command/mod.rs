//! Command layer
//!
//! Request flow: [`schema`] lookup, [`args`] validation into a typed
//! [`Command`], [`dispatcher`] execution against the storage session, and
//! [`format`] rendering into a [`Response`].

pub mod args;
pub mod dispatcher;
pub mod format;
pub mod schema;

pub use args::Command;
pub use dispatcher::Dispatcher;
pub use format::{CommandOutput, ContentItem, ErrorTag, Response};
pub use schema::{CommandSpec, FieldKind, FieldSpec};

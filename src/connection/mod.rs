//! Connection Management Module
//!
//! One handler task per accepted client. Handlers share the command layer
//! through cheap clones and report into a common [`ConnectionStats`].

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};

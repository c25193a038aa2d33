//! Wire types for the local-model discovery dialect spoken by IDE plugins.
//!
//! Only the discovery surface is typed here. Chat bodies are forwarded as
//! open documents by `zproxy-core` and never bound to a schema.

pub mod ps;
pub mod show;
pub mod tags;
pub mod types;
pub mod version;

//! Shared types for Token Hawk.
//!
//! Wire payloads, the observer stream protocol, body signing, and (behind the
//! `client` feature) the typed client for the chat gateway.

pub mod config;
pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;

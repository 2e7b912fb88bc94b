#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod action;
pub mod address;
pub mod auth;
pub mod config;
pub mod dedup;
pub mod entities;
pub mod events;
pub mod framework;
pub mod message;
pub mod processors;
pub mod registry;
pub mod sources;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

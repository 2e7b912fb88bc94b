//! Configuration types shared between crates.
//!
//! Loading and parsing is handled by the server crate.

mod observer;

pub use observer::ObserverSecret;

//! Cargoplane chat demo, library crate.
//!
//! The binary wires these together; they live here so the pieces can be
//! tested without a broker.

pub mod chat;
pub mod config;
pub mod credentials;

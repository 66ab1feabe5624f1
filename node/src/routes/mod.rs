//! HTTP handlers for the node API.

pub mod health;
pub mod status;
pub mod txs;

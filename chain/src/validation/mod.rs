//! Block validity predicates for the chain.
//!
//! This module implements concrete block validators that plug into the
//! consensus layer via [`crate::consensus::validator::BlockValidator`].
//!
//! It currently provides:
//!
//! - [`base::BaseValidity`]: cheap structural and size checks.
//! - [`injected::InjectedTxValidity`]: placement and structure of the
//!   injected attestation transaction.

pub mod base;
pub mod injected;

pub use base::BaseValidity;
pub use injected::InjectedTxValidity;

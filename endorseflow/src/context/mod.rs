//! Request context for pipeline operations.

mod identity;

pub use identity::ActingIdentity;

//! Share links
//!
//! Time/quota/password-gated anonymous access to files and folder
//! archives. The gate is a fixed-order linear check so the reported
//! status is deterministic when several conditions hold at once.

mod gate;

pub use gate::{hash_password, ShareGate};

//! External provider integrations
//!
//! Supports:
//! - Linear: attachment mutations linking mirrored issues back to GitHub

pub mod linear;

pub use linear::{build_attachment_mutation, AttachmentMutation, LinearClient};

//! Detection module - turns raw feed payloads into launch events.

pub mod extractor;
pub mod walker;

pub use extractor::extract;
pub use walker::PayloadWalker;

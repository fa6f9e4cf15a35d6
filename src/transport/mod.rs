//! Event transport - the real-time feed that announces new sales.

pub mod client;
pub mod packet;

pub use client::{FeedClient, FeedConfig, FeedEvent};
pub use packet::PacketError;

//! Data models for Budget Guard

pub mod alert;
pub mod mitigation;
pub mod spend;

pub use alert::*;
pub use mitigation::*;
pub use spend::*;

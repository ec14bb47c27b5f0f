//! Core data types for the price watcher.

pub mod alert;
pub mod extraction;
pub mod item;
pub mod price;

pub use alert::*;
pub use extraction::*;
pub use item::*;
pub use price::*;

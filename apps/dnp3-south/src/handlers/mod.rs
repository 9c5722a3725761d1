//! Handlers 模块

pub mod channels;
pub mod system;

pub use channels::*;
pub use system::*;

//! # Contracts
//!
//! Frozen interface contracts shared by the output stage.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Ownership model
//! - A batch pulled from the delivery queue is a linear resource: it is either
//!   moved into [`Client::publish`] or handed back through [`Batch::cancel`]
//! - A sink handle is owned by exactly one worker

mod batch;
mod blueprint;
mod client;
mod error;
mod observer;

pub use batch::*;
pub use blueprint::*;
pub use client::*;
pub use error::*;
pub use observer::*;

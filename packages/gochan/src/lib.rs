//! Go-style concurrency primitives for cooperative async tasks.
//!
//! - [`Channel`]: bounded FIFO channel with blocking push and pop, and one-way close.
//! - [`Selector`]: offer several channel operations at once and commit to exactly one of them.
//! - [`WaitGroup`]: spawn tasks and wait for all of them, surfacing their failures.

#[macro_use]
extern crate tracing;

mod channel;
mod select;
mod wait_group;

pub use crate::{
    channel::api::*,
    select::{Selector, Selected},
    wait_group::{WaitGroup, TaskOutput},
};

/// Error types
pub mod error {
    pub use crate::{
        channel::error::*,
        select::SelectError,
        wait_group::{TaskError, WaitError},
    };
}

/// Future and stream types
pub mod future {
    pub use crate::channel::api::future::*;
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel cooperative kernel
//!
//! The execution substrate the NWK engine is built on:
//!
//! - **Queue**: index-linked FIFO queues over fixed slot arenas
//! - **Scheduler**: bitmask task dispatcher with round-robin fairness
//! - **Timer**: application timers polled against a millisecond clock
//!
//! Everything is run-to-completion. Nothing blocks, nothing allocates.
//! Interrupt handlers may only post scheduler tasks; every other structure
//! is owned and mutated by the task context.
//!
//! # Usage
//!
//! ```rust,ignore
//! use q_kernel::{TaskId, TaskScheduler};
//!
//! let scheduler: TaskScheduler<MyTask> = TaskScheduler::new();
//! scheduler.post(MyTask::Rx);
//! while scheduler.dispatch(|task| run(task)) {}
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod queue;
pub mod scheduler;
pub mod timer;

// Re-export commonly used types
pub use queue::{Pool, Queue, RequestQueue};
pub use scheduler::{TaskId, TaskScheduler, MAX_TASKS};
pub use timer::Timers;

/// Kernel version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

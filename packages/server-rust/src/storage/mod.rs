//! Storage layer for the Wharf server.
//!
//! - [`driver`]: the [`DataDriver`] contract and its three controllers
//! - [`engines`]: concrete backends ([`MemoryDriver`])
//! - [`factory`]: [`DriverRegistry`], mapping URI schemes to backends
//! - [`pipeline`]: [`Pipeline`], stages composed over a terminal driver
//! - [`stages`]: built-in stages and the [`StageRegistry`]

pub mod driver;
pub mod engines;
pub mod factory;
pub mod pipeline;
pub mod stages;

pub use driver::{ClaimController, DataDriver, MessageController, QueueController};
pub use engines::MemoryDriver;
pub use factory::{scheme_of, DriverContext, DriverRegistry, StorageLimits};
pub use pipeline::{ClaimStage, MessageStage, Pipeline, QueueStage, Stage};
pub use stages::{LoggingStage, MetricsStage, StageRegistry};

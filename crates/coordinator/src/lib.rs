//! Upload coordination for hoist.
//!
//! This crate ties the pieces together: it drives upload sessions through
//! their lifecycle, moves bytes into the object store (whole files or
//! assembled chunks), wraps every remote call in retry and circuit-breaker
//! policies, and reclaims what expires.
//!
//! The entry point is [`UploadCoordinator`]; long-running deployments pair
//! it with [`spawn_cleanup_task`].

pub mod assembler;
pub mod breaker;
mod classify;
pub mod coordinator;
pub mod executor;
pub mod sweep;

pub use assembler::ChunkAssembler;
pub use breaker::{BreakerState, CircuitBreaker};
pub use coordinator::{OperationPolicies, UploadCoordinator};
pub use executor::RetryExecutor;
pub use sweep::spawn_cleanup_task;

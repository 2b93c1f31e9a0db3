//! Deterministic test harness for the Skein client core.
//!
//! Seeded and scripted implementations of the `Environment`, `Transport` and
//! `SessionBackend` seams, so session behaviour can be exercised end to end
//! without a network or a database.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation of space graph
//! flattening. Operations are applied to both the model and a real store,
//! and the resolver's output is compared against the model's.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod mock_backend;
mod mock_transport;
pub mod model;
mod sim_env;

pub use mock_backend::MockBackend;
pub use mock_transport::MockTransport;
pub use model::{GraphOperation, ModelGraph, ModelMembership, ModelNodeId};
pub use sim_env::SimEnv;

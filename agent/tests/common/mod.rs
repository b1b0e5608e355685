//! Common test utilities for the agent integration suites

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::AgentBuilder;

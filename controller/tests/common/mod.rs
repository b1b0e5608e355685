//! Common test utilities for the controller integration suites

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::{ControlPlane, LiveAgent};

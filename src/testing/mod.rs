//! Test doubles and fixtures shared by the unit tests.

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::InMemoryGitHost;

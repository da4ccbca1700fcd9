//! Test utilities.
//!
//! - Test data factories with override closures
//! - In-memory ledger and a recording Paddle API mock
//! - `TestAppStateBuilder` for route tests

mod app_state_builder;
mod factories;
mod ledger_mocks;
mod paddle_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use ledger_mocks::*;
pub use paddle_mocks::*;

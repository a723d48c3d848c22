//! Common test infrastructure
//!
//! Every test gets a [`TestEnv`]: a temporary db dir with its own event log,
//! catalog and metrics database, plus helpers to run jobs and drive the HTTP
//! router. Tests should only import from this module.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{purchase, TestEnv};
//!
//! #[test]
//! fn test_daily_revenue() {
//!     let env = TestEnv::new();
//!     env.append(vec![purchase("e1", "P1", "2025-07-26T10:00:00Z", 150.0, 1)]);
//!     env.run("daily_revenue").unwrap();
//! }
//! ```

mod constants;
mod env;
mod fixtures;

pub use constants::*;
#[allow(unused_imports)]
pub use env::{get_json, request_json, TestEnv};
#[allow(unused_imports)]
pub use fixtures::{days_of_views, product, purchase, return_item, view};

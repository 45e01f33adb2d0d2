//! A redundant-request dispatcher that races interchangeable backends.
//!
//! Given a primary and a secondary endpoint serving the same resource, the
//! dispatcher issues requests under one of three race policies and returns
//! the first successful payload, cancelling the losing request.
//!
//! # Quick Start
//!
//! ```no_run
//! use hedged_fetch::{HttpCaller, RaceConfig, RacingDispatcher};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = RacingDispatcher::new(HttpCaller::new());
//!
//! let cfg = RaceConfig::hedged(
//!     "http://localhost:8081",
//!     "http://localhost:8082",
//!     Duration::from_millis(94),
//! );
//!
//! match dispatcher.dispatch(&cfg).await? {
//!     Some(payload) => println!("got {payload}"),
//!     None => println!("every attempt failed"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Race Policies
//!
//! - **standard**: one attempt against the primary.
//! - **tied**: primary and secondary at once, sharing a cancellation token.
//!   The first success wins and cancels the other.
//! - **hedged**: primary first; if it has not succeeded after `hedge_after`,
//!   the secondary is issued and the two race as in `tied`.
//!
//! A failed attempt never ends a race early: the dispatch waits for the
//! remaining attempt, and only resolves to `None` once every attempt failed.

pub mod aggregator;
pub mod backend;
pub mod call;
pub mod client;
pub mod config;
pub mod errors;
pub mod telemetry;

pub use call::{Caller, HttpCaller};
pub use client::{EndpointStatsSnapshot, RaceOutcome, RacingDispatcher, Slot};
pub use config::{Endpoint, RaceConfig, RaceMode, DEFAULT_HEDGE_DELAY};
pub use errors::{CallError, ConfigError, ServeError};

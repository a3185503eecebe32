//! Distributed HTTP load generation.
//!
//! A [`Plan`](types::Plan) of scenarios is executed by
//! [`engine::execute`]: each scenario's rate generator feeds a bounded
//! ticket queue drained by a fixed worker pool, every response is checked,
//! and thresholds decide pass/fail once the scenario ends. Attempts fan out
//! to [`engine::Listener`]s, one of which can be a
//! [`distributed::Sender`] streaming to a remote
//! [`distributed::Collector`].

pub mod checker;
pub mod cli;
pub mod config;
pub mod distributed;
pub mod engine;
pub mod error;
pub mod http;
pub mod output;
pub mod types;

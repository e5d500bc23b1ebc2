//! # veilmatch-matchcore
//!
//! **Pure deterministic matching engine for VeilMatch.**
//!
//! MatchCore takes the frozen order set of a matching task and produces a
//! [`MatchResult`](veilmatch_types::MatchResult). It has:
//!
//! - **Zero side effects**: no I/O, no clocks, no randomness
//! - **Arrival-order independence**: orders are canonically sorted first
//! - **One fixed clearing rule**: tick-floored midpoint of bid and ask
//! - **Deterministic remainders**: partial fills derive the same remainder on every operator

pub mod clearing;
pub mod determinism;
pub mod matcher;
pub mod orderbook;
pub mod price_level;

pub use clearing::compute_clearing_price;
pub use determinism::{compute_result_hash, verify_result_hash};
pub use matcher::{match_order_set, match_task};
pub use orderbook::OrderBook;
pub use price_level::PriceLevel;

//! advsift library: BLE advertisement decoding, filtering and deduplication.
//!
//! Turns a stream of raw advertisement reports into a much smaller stream of
//! device reports: each payload is decoded into its AD structures, run
//! through an allow/deny pattern filter, and checked against a bounded
//! per-session device cache so that only new or changed devices come out.
//! All logic lives here with no platform dependencies, testable on any host
//! with `cargo test`. Binaries (the `advsift-host` replay tool, radio
//! firmware) are thin consumers that provide advertisements and output sinks.
//!
//! Modules, leaf to root:
//! - `ad`: AD structure decoder
//! - `scanner`: advertisement reports and derived observations
//! - `filter`, `defaults`: allow/deny lists and the built-in deny-list
//! - `cache`: per-session device cache
//! - `engine`: the session object tying the above together
//! - `protocol`, `comm`: NDJSON messages, host commands, report input
//!
//! Everything is `no_std` with no allocator; storage is fixed-capacity
//! (`heapless`).

#![cfg_attr(not(test), no_std)]

pub mod ad;
pub mod cache;
pub mod comm;
pub mod defaults;
pub mod engine;
pub mod filter;
pub mod protocol;
pub mod scanner;

//! Smart playlist and collection engine.
//!
//! Users describe a list with rules ([`definition::Definition`]); the engine
//! evaluates those rules against a host media library, sorts and trims the
//! matches, drops what users chose to ignore, and writes the result back to
//! the host. Refreshes run on a deduplicating queue, triggered manually, on
//! a schedule, or when the library changes.

pub mod cli;
pub mod config;
pub mod db;
pub mod definition;
pub mod error;
pub mod host;
pub mod ignore;
pub mod model;
pub mod ordering;
pub mod refresh;
pub mod rules;
pub mod schedule;
pub mod service;
#[cfg(test)]
pub mod test_utils;

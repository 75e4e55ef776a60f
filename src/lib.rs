//! Task dependency graph and recurrence engine.
//!
//! The pure engine lives in [`recurrence`] and [`graph`]; [`dependencies`],
//! [`instances`] and [`tasks`] apply it against a [`storage::TaskStore`].

pub mod cli;
pub mod cli_handlers;
pub mod db;
pub mod dependencies;
pub mod error;
pub mod graph;
pub mod instances;
pub mod locks;
pub mod logging;
pub mod project;
pub mod recurrence;
pub mod storage;
pub mod tasks;

#[cfg(test)]
pub mod test_utils;

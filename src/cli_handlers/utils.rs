//! Helpers shared by the CLI handlers.

use crate::db::models::RecurrencePattern;
use crate::error::{EngineError, Result};
use crate::recurrence;
use serde::Serialize;
use std::io::{self, Read};

/// Read all of stdin, trimmed.
pub fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer.trim().to_string())
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse and validate a pattern given inline or as `-` (stdin).
pub fn parse_pattern(arg: &str) -> Result<RecurrencePattern> {
    let raw = if arg == "-" {
        read_stdin()?
    } else {
        arg.to_string()
    };

    let pattern: RecurrencePattern = serde_json::from_str(&raw)
        .map_err(|e| EngineError::InvalidPattern(format!("Invalid pattern JSON: {}", e)))?;
    recurrence::validate_rule(&pattern)?;
    Ok(pattern)
}

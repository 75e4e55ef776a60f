use crate::cli::ConfigCommands;
use crate::error::{EngineError, Result};
use crate::project::ProjectContext;
use serde_json::json;
use sqlx::SqlitePool;

/// Keys managed by migrations, not by users.
const PROTECTED_KEYS: &[&str] = &["schema_version"];

/// Default look-ahead window of `recur preview`.
pub const LOOKAHEAD_DAYS_KEY: &str = "recurrence.lookahead_days";
pub const DEFAULT_LOOKAHEAD_DAYS: u32 = 30;

fn parse_lookahead(value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(days) if days >= 1 => Ok(days),
        _ => Err(EngineError::InvalidInput(format!(
            "{} must be a positive whole number of days, got '{}'",
            LOOKAHEAD_DAYS_KEY, value
        ))),
    }
}

fn check_value(key: &str, value: &str) -> Result<()> {
    if key == LOOKAHEAD_DAYS_KEY {
        parse_lookahead(value)?;
    }
    Ok(())
}

fn ensure_not_protected(key: &str, action: &str) -> Result<()> {
    if PROTECTED_KEYS.contains(&key) {
        return Err(EngineError::InvalidInput(format!(
            "Cannot {} protected key: '{}'",
            action, key
        )));
    }
    Ok(())
}

/// Handle all `tfe config` subcommands
pub async fn handle_config_command(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value, format } => handle_set(&key, &value, &format).await,
        ConfigCommands::Get { key, format } => handle_get(&key, &format).await,
        ConfigCommands::List { prefix, format } => handle_list(prefix.as_deref(), &format).await,
        ConfigCommands::Unset { key, format } => handle_unset(&key, &format).await,
    }
}

async fn handle_set(key: &str, value: &str, format: &str) -> Result<()> {
    ensure_not_protected(key, "modify")?;
    check_value(key, value)?;

    let ctx = ProjectContext::load_or_init().await?;
    config_set(&ctx.pool, key, value).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "key": key,
                "value": value,
                "set": true,
            }))?
        );
    } else {
        println!("Set {} = {}", key, value);
    }

    Ok(())
}

async fn handle_get(key: &str, format: &str) -> Result<()> {
    let ctx = ProjectContext::load_or_init().await?;
    let value = config_get(&ctx.pool, key).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "key": key,
                "value": value,
            }))?
        );
    } else {
        match value {
            Some(v) => println!("{} = {}", key, v),
            None => println!("{}: (not set)", key),
        }
    }

    Ok(())
}

async fn handle_list(prefix: Option<&str>, format: &str) -> Result<()> {
    let ctx = ProjectContext::load_or_init().await?;
    let entries = config_list(&ctx.pool, prefix).await?;

    if format == "json" {
        let items: Vec<serde_json::Value> = entries
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "config": items }))?
        );
    } else if entries.is_empty() {
        println!("No configuration entries found.");
    } else {
        for (key, value) in &entries {
            println!("{} = {}", key, value);
        }
    }

    Ok(())
}

async fn handle_unset(key: &str, format: &str) -> Result<()> {
    ensure_not_protected(key, "delete")?;

    let ctx = ProjectContext::load_or_init().await?;
    let deleted = config_delete(&ctx.pool, key).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "key": key,
                "deleted": deleted,
            }))?
        );
    } else if deleted {
        println!("Unset {}", key);
    } else {
        println!("{}: (not found)", key);
    }

    Ok(())
}

// ============================================================================
// Database operations
// ============================================================================

pub async fn config_set(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO config (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn config_get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM config WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn config_list(pool: &SqlitePool, prefix: Option<&str>) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = if let Some(p) = prefix {
        sqlx::query_as(
            "SELECT key, value FROM config WHERE key != 'schema_version' AND key LIKE ? ORDER BY key",
        )
        .bind(format!("{}%", p))
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as("SELECT key, value FROM config WHERE key != 'schema_version' ORDER BY key")
            .fetch_all(pool)
            .await?
    };
    Ok(rows)
}

pub async fn config_delete(pool: &SqlitePool, key: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM config WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Look-ahead window for previews: the stored setting, else 30 days.
pub async fn lookahead_days(pool: &SqlitePool) -> Result<u32> {
    match config_get(pool, LOOKAHEAD_DAYS_KEY).await? {
        Some(value) => parse_lookahead(&value),
        None => Ok(DEFAULT_LOOKAHEAD_DAYS),
    }
}

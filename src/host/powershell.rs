//! PowerShell Bridge
//!
//! Management-client (WMI/CIM) and directory (ADSI) queries run through
//! `powershell.exe` and come back as JSON.

// Only the Windows bindings run scripts; the parsers are tested everywhere
#![cfg_attr(not(windows), allow(dead_code))]

use super::CatalogEntry;
use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use serde_json::Value;
use std::process::Command;
use tracing::debug;

/// Timestamp format the scripts emit (`ToString('yyyy-MM-ddTHH:mm:ss')`)
const DEADLINE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Runs a script and returns its standard output
pub fn run(script: &str) -> Result<String> {
    let script = format!("[Console]::OutputEncoding = [Text.Encoding]::UTF8; {}", script);
    let output = Command::new("powershell.exe")
        .args([
            "-NoProfile",
            "-NonInteractive",
            "-ExecutionPolicy",
            "Bypass",
            "-Command",
            &script,
        ])
        .output()
        .context("could not start powershell.exe")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("powershell exited with {}: {}", output.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs a script ending in `ConvertTo-Json` and parses the result
pub fn run_json(script: &str) -> Result<Value> {
    let stdout = run(script)?;
    let stdout = stdout.trim();
    debug!("powershell returned {} bytes of JSON", stdout.len());
    if stdout.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(stdout).context("powershell returned invalid JSON")
}

/// `ConvertTo-Json` emits a bare object for one row and an array for many
pub fn rows(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Rows with `Id` and optional `Deadline`
pub fn parse_catalog(value: Value) -> Vec<CatalogEntry> {
    rows(value)
        .into_iter()
        .filter_map(|row| {
            let id = row.get("Id")?.as_str()?.trim().to_string();
            let deadline = row
                .get("Deadline")
                .and_then(Value::as_str)
                .and_then(|text| NaiveDateTime::parse_from_str(text, DEADLINE_FORMAT).ok());
            Some(CatalogEntry { id, deadline })
        })
        .collect()
}

/// Rows with a `UserSID` column
pub fn parse_sids(value: Value) -> Vec<String> {
    rows(value)
        .into_iter()
        .filter_map(|row| row.get("UserSID")?.as_str().map(str::to_string))
        .collect()
}

/// Single-quoted PowerShell string literal
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Escapes a value for use inside an LDAP filter (RFC 4515)
pub fn ldap_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\5c"),
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

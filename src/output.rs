//! CLI output formatting.

use anyhow::Result;
use serde::Serialize;

/// Output format for CLI commands: human text, compact JSON, or pretty JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
    Pretty,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "pretty" => Ok(OutputFormat::Pretty),
            _ => Err(anyhow::anyhow!("Invalid output format: {}", value)),
        }
    }
}

/// Serialize `value` to stdout per the chosen format. Human formatting is
/// each command's own business; calling this with `Human` prints compact
/// JSON as a fallback.
pub fn print_serialized<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        _ => serde_json::to_string(value)?,
    };
    println!("{rendered}");
    Ok(())
}

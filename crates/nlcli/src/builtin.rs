//! Pattern table compiled into the binary

use crate::cli::CliError;
use nlcli_resolver::{PatternRecord, PatternTable};
use serde::Deserialize;

const BUILTIN_PATTERNS: &str = include_str!("../data/patterns.toml");

#[derive(Debug, Deserialize)]
struct PatternFile {
    #[serde(default)]
    patterns: Vec<PatternRecord>,
}

/// Parse a `[[patterns]]` document
pub fn parse_table(text: &str) -> Result<PatternTable, CliError> {
    let file: PatternFile = toml::from_str(text)
        .map_err(|e| CliError::other(format!("Invalid pattern table: {e}")))?;
    Ok(PatternTable::new(file.patterns))
}

/// The table shipped with nlcli
pub fn builtin_table() -> Result<PatternTable, CliError> {
    parse_table(BUILTIN_PATTERNS)
}

//! Input table reader

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Identifier;

/// Identifiers from the first column of every line after the header.
///
/// Values are trimmed and blanks dropped. Order and duplicates are preserved.
pub fn parse_identifiers(content: &str) -> Vec<Identifier> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let first = line.split(',').next().unwrap_or_default().trim();
            (!first.is_empty()).then(|| Identifier::from(first))
        })
        .collect()
}

/// Read the input table at `path`.
pub async fn read_identifiers(path: impl AsRef<Path>) -> Result<Vec<Identifier>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::InputTable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let identifiers = parse_identifiers(&content);
    tracing::info!(
        path = %path.display(),
        identifiers = identifiers.len(),
        "Input table loaded"
    );
    Ok(identifiers)
}

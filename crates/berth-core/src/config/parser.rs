//! TOML parser with helpful error messages

use std::path::Path;

use anyhow::Context;

use super::schema::ProjectConfig;
use super::tree::ConfigTree;
use crate::error::{Error, Result};

/// Parsed project configuration: the typed schema plus the raw tree
#[derive(Debug, Clone)]
pub struct ProjectDocument {
    pub config: ProjectConfig,
    pub tree: ConfigTree,
}

/// Parse berth.toml with detailed error messages
pub fn parse_berth_toml(path: &Path) -> Result<ProjectDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_berth_toml_str(&content)
        .map_err(|e| Error::serialization(format!("{}: {}", path.display(), e)))
}

/// Parse berth.toml content from string
pub fn parse_berth_toml_str(content: &str) -> Result<ProjectDocument> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;
    let table: toml::Table = toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    config.validate()?;

    Ok(ProjectDocument {
        config,
        tree: ConfigTree::new(table),
    })
}

/// Enhance TOML parsing errors with helpful context
fn enhance_toml_error(error: toml::de::Error, content: &str) -> Error {
    let error_msg = error.message().to_string();

    let line_hint = error.span().map(|span| {
        content[..span.start.min(content.len())]
            .chars()
            .filter(|c| *c == '\n')
            .count()
            + 1
    });

    if let Some(line_num) = line_hint {
        let context = get_line_context(content, line_num);
        Error::serialization(format!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num, context, error_msg
        ))
    } else {
        Error::serialization(format!("TOML parsing error: {}", error_msg))
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 2).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

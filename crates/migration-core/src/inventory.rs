//! Inventory loading.
//!
//! One repository per line: `source_ref[,target_ref]`. Blank lines and lines
//! starting with `#` are ignored. When no target is given the last path
//! segment of the source is used. Item ids are the target names,
//! which must be unique ignoring case.

use std::collections::HashSet;
use std::path::Path;

use crate::domain::WorkItem;
use crate::error::{MigrationError, Result};

pub async fn load_inventory(path: &Path) -> Result<Vec<WorkItem>> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        MigrationError::Configuration(format!("cannot read inventory {}: {e}", path.display()))
    })?;
    parse_inventory(&text)
}

pub fn parse_inventory(text: &str) -> Result<Vec<WorkItem>> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (source, target) = match line.split_once(',') {
            Some((s, t)) => (s.trim(), t.trim()),
            None => (line, ""),
        };
        if source.is_empty() {
            return Err(MigrationError::Configuration(format!(
                "inventory line {}: missing source reference",
                lineno + 1
            )));
        }
        let target = if target.is_empty() {
            default_target(source)
        } else {
            target
        };
        // Target platforms treat repository names case-insensitively.
        if !seen.insert(target.to_lowercase()) {
            return Err(MigrationError::Configuration(format!(
                "inventory line {}: duplicate item {target:?}",
                lineno + 1
            )));
        }
        items.push(WorkItem::new(target, source, target));
    }
    Ok(items)
}

fn default_target(source: &str) -> &str {
    source
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_comments_and_defaults() {
        let text = "\
# project Payments
payments/api-gateway
payments/ledger, ledger-service

  # trailing comment
billing
";
        let items = parse_inventory(text).unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["api-gateway", "ledger-service", "billing"]);
        assert_eq!(items[0].source_ref, "payments/api-gateway");
        assert_eq!(items[1].target_ref, "ledger-service");
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let err = parse_inventory("a/web\nb/web\n").unwrap_err();
        assert!(matches!(err, MigrationError::Configuration(msg) if msg.contains("line 2")));
    }

    #[test]
    fn test_duplicate_target_differing_only_in_case_rejected() {
        let err = parse_inventory("a/Web\nb/web\n").unwrap_err();
        assert!(matches!(err, MigrationError::Configuration(msg) if msg.contains("line 2")));

        let err = parse_inventory("a/api,Shared\nb/tools,SHARED\n").unwrap_err();
        assert!(matches!(err, MigrationError::Configuration(msg) if msg.contains("\"SHARED\"")));
    }

    #[tokio::test]
    async fn test_missing_file_is_configuration_error() {
        let err = load_inventory(Path::new("/nonexistent/inventory.txt"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}

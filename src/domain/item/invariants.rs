use super::entity::Item;
use crate::domain::{DomainError, DomainResult};
use std::collections::HashSet;

/// Validates the invariants of a candidate item list
pub fn validate_items(items: &[Item]) -> DomainResult<()> {
    let mut seen = HashSet::with_capacity(items.len());

    for item in items {
        validate_path(item)?;

        if !seen.insert(item.path.as_path()) {
            return Err(DomainError::InvariantViolation(format!(
                "Duplicate item path: {:?}",
                item.path
            )));
        }
    }

    Ok(())
}

/// Path must be non-empty and name a file
fn validate_path(item: &Item) -> DomainResult<()> {
    if item.path.as_os_str().is_empty() {
        return Err(DomainError::InvariantViolation(
            "Item path cannot be empty".to_string(),
        ));
    }

    if item.path.file_name().is_none() {
        return Err(DomainError::InvariantViolation(format!(
            "Item path has no file name: {:?}",
            item.path
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_items() {
        let items = vec![Item::new("/pages/a.png"), Item::new("/pages/b.png")];
        assert!(validate_items(&items).is_ok());
        assert!(validate_items(&[]).is_ok());
    }

    #[test]
    fn test_duplicate_path_fails() {
        let items = vec![Item::new("/pages/a.png"), Item::new("/pages/a.png")];

        match validate_items(&items) {
            Err(DomainError::InvariantViolation(msg)) => assert!(msg.contains("Duplicate")),
            other => panic!("Expected InvariantViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_path_without_file_name_fails() {
        assert!(validate_items(&[Item::new("/")]).is_err());
        assert!(validate_items(&[Item::new("")]).is_err());
    }
}

use super::plan::RenamePlan;
use crate::domain::{DomainError, DomainResult};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Validates a plan against the paths currently present in its directory.
///
/// - Sources are unique
/// - Targets are pairwise distinct
/// - No target overwrites an existing path that is not itself a source
pub fn validate_plan(plan: &RenamePlan, existing_paths: &[PathBuf]) -> DomainResult<()> {
    let mut sources = HashSet::with_capacity(plan.len());
    for source in plan.sources() {
        if !sources.insert(source) {
            return Err(DomainError::InvariantViolation(format!(
                "Duplicate source path: {:?}",
                source
            )));
        }
    }

    let mut claimed: HashMap<&Path, &Path> = HashMap::with_capacity(plan.len());
    for entry in &plan.entries {
        if let Some(other) = claimed.insert(entry.target.as_path(), entry.source.as_path()) {
            return Err(DomainError::Collision(format!(
                "{:?} and {:?} both map to {:?}",
                other, entry.source, entry.target
            )));
        }
    }

    for existing in existing_paths {
        let existing = existing.as_path();
        if claimed.contains_key(existing) && !sources.contains(existing) {
            return Err(DomainError::Collision(format!(
                "target {:?} already exists and is not part of the plan",
                existing
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rename::NamingConfig;

    fn plan(sources: &[&str], naming: &NamingConfig) -> RenamePlan {
        let sources: Vec<PathBuf> = sources.iter().map(PathBuf::from).collect();
        RenamePlan::build(Path::new("/book"), &sources, naming)
    }

    #[test]
    fn test_valid_plan() {
        let plan = plan(&["/book/b.png", "/book/a.png"], &NamingConfig::default());
        let existing = vec![PathBuf::from("/book/a.png"), PathBuf::from("/book/b.png")];
        assert!(validate_plan(&plan, &existing).is_ok());
    }

    #[test]
    fn test_swap_between_sources_is_allowed() {
        // a.png is both a source and the target of b.png
        let naming = NamingConfig {
            prefix: String::new(),
            digits: 1,
            start_index: 1,
        };
        let plan = plan(&["/book/2.png", "/book/1.png"], &naming);
        let existing = vec![PathBuf::from("/book/1.png"), PathBuf::from("/book/2.png")];

        assert!(validate_plan(&plan, &existing).is_ok());
    }

    #[test]
    fn test_identical_targets_collide() {
        let mut plan = plan(&["/book/a.png", "/book/b.png"], &NamingConfig::default());
        plan.entries[1].target = plan.entries[0].target.clone();

        assert!(matches!(
            validate_plan(&plan, &[]),
            Err(DomainError::Collision(_))
        ));
    }

    #[test]
    fn test_foreign_file_at_target_collides() {
        let plan = plan(&["/book/a.png"], &NamingConfig::default());
        let existing = vec![
            PathBuf::from("/book/a.png"),
            PathBuf::from("/book/page_001.png"),
        ];

        match validate_plan(&plan, &existing) {
            Err(DomainError::Collision(msg)) => assert!(msg.contains("page_001.png")),
            other => panic!("Expected Collision, got {:?}", other),
        }
    }
}

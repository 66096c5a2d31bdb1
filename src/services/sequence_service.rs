// src/services/sequence_service.rs
//
// Sequence analysis over numeric file-name hints.
// Advisory only: nothing here influences the resolved order.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::Item;

/// Cap on the missing-number list; wild hints (e.g. dates) would
/// otherwise produce enormous ranges
pub const MAX_REPORTED_MISSING: usize = 10_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SequenceReport {
    /// No gaps and no duplicates
    pub is_valid: bool,
    pub missing: Vec<u64>,
    pub duplicates: BTreeMap<u64, Vec<String>>,
    pub gaps: Vec<(u64, u64)>,
    pub total: usize,
    pub with_hint: usize,
    pub min: Option<u64>,
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceService;

impl SequenceService {
    pub fn new() -> Self {
        Self
    }

    fn sorted_hints(items: &[Item]) -> Vec<u64> {
        let mut hints: Vec<u64> = items.iter().filter_map(|i| i.hint).collect();
        hints.sort_unstable();
        hints
    }

    /// Numbers between the smallest and largest hint that no item carries
    pub fn detect_missing(&self, items: &[Item]) -> Vec<u64> {
        let mut hints = Self::sorted_hints(items);
        hints.dedup();

        let mut missing = Vec::new();
        for pair in hints.windows(2) {
            for n in (pair[0] + 1)..pair[1] {
                if missing.len() == MAX_REPORTED_MISSING {
                    log::warn!("More than {} missing numbers, list truncated", MAX_REPORTED_MISSING);
                    return missing;
                }
                missing.push(n);
            }
        }
        missing
    }

    /// Hints carried by more than one item, with the file names involved
    pub fn detect_duplicates(&self, items: &[Item]) -> BTreeMap<u64, Vec<String>> {
        let mut by_hint: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        for item in items {
            if let Some(hint) = item.hint {
                by_hint.entry(hint).or_default().push(item.file_name());
            }
        }
        by_hint.retain(|_, names| names.len() > 1);
        by_hint
    }

    /// Adjacent sorted hints more than one apart
    pub fn sequence_gaps(&self, items: &[Item]) -> Vec<(u64, u64)> {
        Self::sorted_hints(items)
            .windows(2)
            .filter(|pair| pair[1] - pair[0] > 1)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    pub fn validate_sequence(&self, items: &[Item]) -> SequenceReport {
        let hints = Self::sorted_hints(items);
        let missing = self.detect_missing(items);
        let duplicates = self.detect_duplicates(items);

        let report = SequenceReport {
            is_valid: missing.is_empty() && duplicates.is_empty(),
            gaps: self.sequence_gaps(items),
            total: items.len(),
            with_hint: hints.len(),
            min: hints.first().copied(),
            max: hints.last().copied(),
            missing,
            duplicates,
        };

        if report.with_hint == 0 {
            log::debug!("No numeric hints found; sequence check skipped");
        } else if !report.is_valid {
            log::warn!(
                "Numbering has {} missing and {} duplicated numbers",
                report.missing.len(),
                report.duplicates.len()
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(hints: &[Option<u64>]) -> Vec<Item> {
        hints
            .iter()
            .enumerate()
            .map(|(i, hint)| Item::with_hint(format!("/book/f{}.png", i), *hint))
            .collect()
    }

    #[test]
    fn test_missing_and_gaps() {
        let items = items(&[Some(1), Some(2), Some(5), Some(7), None]);
        let service = SequenceService::new();

        assert_eq!(service.detect_missing(&items), vec![3, 4, 6]);
        assert_eq!(service.sequence_gaps(&items), vec![(2, 5), (5, 7)]);
    }

    #[test]
    fn test_duplicates_name_the_files() {
        let items = items(&[Some(3), Some(3), Some(4)]);
        let duplicates = SequenceService::new().detect_duplicates(&items);

        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[&3], vec!["f0.png", "f1.png"]);
    }

    #[test]
    fn test_validate_complete_sequence() {
        let report = SequenceService::new().validate_sequence(&items(&[Some(2), Some(1), Some(3)]));

        assert!(report.is_valid);
        assert_eq!(report.total, 3);
        assert_eq!(report.min, Some(1));
        assert_eq!(report.max, Some(3));
        assert!(report.gaps.is_empty());
    }

    #[test]
    fn test_validate_without_hints() {
        let report = SequenceService::new().validate_sequence(&items(&[None, None]));

        assert!(report.is_valid);
        assert_eq!(report.with_hint, 0);
        assert_eq!(report.min, None);
    }

    #[test]
    fn test_missing_list_is_capped() {
        let items = items(&[Some(0), Some(1_000_000)]);
        assert_eq!(
            SequenceService::new().detect_missing(&items).len(),
            MAX_REPORTED_MISSING
        );
    }
}

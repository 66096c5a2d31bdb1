// src/domain/judgment/value_objects.rs
//
// Judgment Value Objects
//
// Pairwise ordering judgments keyed by an unordered item pair.
//
// CRITICAL INVARIANTS:
// - A PairKey is canonical: `first` sorts before `second`
// - (A, B) and (B, A) produce the same key
// - A verdict is always expressed relative to the canonical orientation
// - A JudgmentSet holds at most one judgment per key

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

// ============================================================================
// PAIR KEY
// ============================================================================

/// Canonical key of an unordered item pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    first: PathBuf,
    second: PathBuf,
}

impl PairKey {
    /// Builds the canonical key for two paths, in either order
    pub fn new(a: &Path, b: &Path) -> Self {
        if a <= b {
            Self {
                first: a.to_path_buf(),
                second: b.to_path_buf(),
            }
        } else {
            Self {
                first: b.to_path_buf(),
                second: a.to_path_buf(),
            }
        }
    }

    pub fn first(&self) -> &Path {
        &self.first
    }

    pub fn second(&self) -> &Path {
        &self.second
    }

    /// True when `a` is the canonical first element of this key
    pub fn is_first(&self, a: &Path) -> bool {
        self.first == a
    }

    /// Number of distinct unordered pairs among `n` items
    pub fn pair_count(n: usize) -> usize {
        n * n.saturating_sub(1) / 2
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <> {}", self.first.display(), self.second.display())
    }
}

// ============================================================================
// VERDICT
// ============================================================================

/// Outcome of one pairwise comparison, relative to the canonical key.
/// `ABeforeB` means `key.first` precedes `key.second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    ABeforeB,
    BBeforeA,
    Uncertain,
    Failed,
}

impl Verdict {
    /// The same verdict seen from the opposite orientation
    pub fn reversed(self) -> Self {
        match self {
            Verdict::ABeforeB => Verdict::BBeforeA,
            Verdict::BBeforeA => Verdict::ABeforeB,
            other => other,
        }
    }

    /// True for verdicts that carry no ordering information
    pub fn is_unresolved(self) -> bool {
        matches!(self, Verdict::Uncertain | Verdict::Failed)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::ABeforeB => write!(f, "a_before_b"),
            Verdict::BBeforeA => write!(f, "b_before_a"),
            Verdict::Uncertain => write!(f, "uncertain"),
            Verdict::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a_before_b" => Ok(Verdict::ABeforeB),
            "b_before_a" => Ok(Verdict::BBeforeA),
            "uncertain" => Ok(Verdict::Uncertain),
            "failed" => Ok(Verdict::Failed),
            other => Err(format!("Invalid verdict: {}", other)),
        }
    }
}

// ============================================================================
// JUDGMENT
// ============================================================================

/// One stored oracle answer for an unordered pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    pub key: PairKey,

    /// Verdict relative to `key`
    pub verdict: Verdict,

    /// Confidence in [0, 1], if the oracle scored its answer
    pub confidence: Option<f64>,

    /// Oracle calls spent on this pair (0 when synthesized)
    pub attempts: u32,

    pub judged_at: DateTime<Utc>,
}

impl Judgment {
    /// Records a verdict given in the caller's orientation (`a` vs `b`).
    /// The verdict is flipped when `a` is not the canonical first element.
    pub fn oriented(
        a: &Path,
        b: &Path,
        verdict: Verdict,
        confidence: Option<f64>,
        attempts: u32,
    ) -> Self {
        let key = PairKey::new(a, b);
        let verdict = if key.is_first(a) {
            verdict
        } else {
            verdict.reversed()
        };

        Self {
            key,
            verdict,
            confidence: sanitize_confidence(confidence),
            attempts,
            judged_at: Utc::now(),
        }
    }

    /// A pair whose oracle calls were exhausted without an answer
    pub fn failed(a: &Path, b: &Path, attempts: u32) -> Self {
        Self::oriented(a, b, Verdict::Failed, None, attempts)
    }

    /// Edge weight used by resolution; unscored judgments weigh 1.0
    pub fn weight(&self) -> f64 {
        self.confidence.unwrap_or(1.0)
    }

    /// Returns `(earlier, later, weight)` for judgments that order the pair
    pub fn precedence(&self) -> Option<(&Path, &Path, f64)> {
        match self.verdict {
            Verdict::ABeforeB => Some((self.key.first(), self.key.second(), self.weight())),
            Verdict::BBeforeA => Some((self.key.second(), self.key.first(), self.weight())),
            Verdict::Uncertain | Verdict::Failed => None,
        }
    }
}

/// Clamps to [0, 1]; NaN is treated as unscored
fn sanitize_confidence(confidence: Option<f64>) -> Option<f64> {
    confidence
        .filter(|c| !c.is_nan())
        .map(|c| c.clamp(0.0, 1.0))
}

// ============================================================================
// JUDGMENT SET
// ============================================================================

/// Mapping from unordered pair to its judgment.
/// Backed by a BTreeMap so iteration order never depends on hashing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgmentSet {
    entries: BTreeMap<PairKey, Judgment>,
}

impl JudgmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a judgment, replacing any previous one for the same pair
    pub fn insert(&mut self, judgment: Judgment) {
        self.entries.insert(judgment.key.clone(), judgment);
    }

    pub fn get(&self, a: &Path, b: &Path) -> Option<&Judgment> {
        self.entries.get(&PairKey::new(a, b))
    }

    /// Verdict for the pair in the caller's orientation; missing pairs are uncertain
    pub fn verdict(&self, a: &Path, b: &Path) -> Verdict {
        match self.get(a, b) {
            Some(j) if j.key.is_first(a) => j.verdict,
            Some(j) => j.verdict.reversed(),
            None => Verdict::Uncertain,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when every distinct pair among `n` items has an entry
    pub fn is_complete(&self, n: usize) -> bool {
        self.entries.len() >= PairKey::pair_count(n)
    }

    /// Judgments in canonical key order
    pub fn iter(&self) -> impl Iterator<Item = &Judgment> {
        self.entries.values()
    }

    /// Judgments that contribute no ordering edge
    pub fn unresolved(&self) -> Vec<&Judgment> {
        self.entries
            .values()
            .filter(|j| j.verdict.is_unresolved())
            .collect()
    }

    pub fn count_by(&self, verdict: Verdict) -> usize {
        self.entries.values().filter(|j| j.verdict == verdict).count()
    }
}

impl FromIterator<Judgment> for JudgmentSet {
    fn from_iter<T: IntoIterator<Item = Judgment>>(iter: T) -> Self {
        let mut set = JudgmentSet::new();
        for judgment in iter {
            set.insert(judgment);
        }
        set
    }
}

// ============================================================================
// PATH MOVES
// ============================================================================

/// Renames applied to disk, old path -> new path.
///
/// Judgments follow the file, not the name: after a commit a judgment on
/// {old_a, old_b} describes the files now at {new_a, new_b}. A path that
/// only appears as a destination held nothing before the move, so any
/// judgment still keyed on it is stale.
#[derive(Debug, Clone, Default)]
pub struct PathMoves {
    moves: HashMap<PathBuf, PathBuf>,
    fresh: HashSet<PathBuf>,
}

impl PathMoves {
    pub fn new(moves: impl IntoIterator<Item = (PathBuf, PathBuf)>) -> Self {
        let moves: HashMap<PathBuf, PathBuf> = moves
            .into_iter()
            .filter(|(from, to)| from != to)
            .collect();
        let fresh = moves
            .values()
            .filter(|to| !moves.contains_key(*to))
            .cloned()
            .collect();

        Self { moves, fresh }
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Every path whose cached judgments change meaning
    pub fn touched_paths(&self) -> impl Iterator<Item = &Path> {
        self.moves
            .keys()
            .chain(self.fresh.iter())
            .map(PathBuf::as_path)
    }

    pub fn touches(&self, key: &PairKey) -> bool {
        [key.first(), key.second()]
            .iter()
            .any(|p| self.moves.contains_key(*p) || self.fresh.contains(*p))
    }

    /// The judgment re-keyed to where its files are now; None when it was stale
    pub fn apply(&self, judgment: &Judgment) -> Option<Judgment> {
        let first = self.follow(judgment.key.first())?;
        let second = self.follow(judgment.key.second())?;

        let key = PairKey::new(first, second);
        let verdict = if key.is_first(first) {
            judgment.verdict
        } else {
            judgment.verdict.reversed()
        };

        Some(Judgment {
            key,
            verdict,
            ..judgment.clone()
        })
    }

    fn follow<'a>(&'a self, path: &'a Path) -> Option<&'a Path> {
        if let Some(to) = self.moves.get(path) {
            return Some(to.as_path());
        }
        if self.fresh.contains(path) {
            return None;
        }
        Some(path)
    }
}

// ============================================================================
// TESTS
// ============================================================================

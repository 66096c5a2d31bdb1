// src/repositories/judgment_repository.rs
//
// Judgment Repository - the comparison cache
//
// CRITICAL RULES:
// - Keyed by canonical PairKey; (A, B) and (B, A) hit the same row
// - Verdicts are stored relative to the canonical orientation
// - Every write takes exactly one exclusive section (mutex or SQLite write lock)
// - Keys are file paths, so committed renames must be replayed with `rekey`

use crate::db::{get_connection, initialize_database, ConnectionPool};
use crate::domain::{Judgment, PairKey, PathMoves, Verdict};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub trait JudgmentRepository: Send + Sync {
    fn get(&self, key: &PairKey) -> AppResult<Option<Judgment>>;

    /// Insert or replace the judgment for its pair
    fn save(&self, judgment: &Judgment) -> AppResult<()>;

    /// All stored judgments in canonical key order
    fn list_all(&self) -> AppResult<Vec<Judgment>>;

    /// Deletes FAILED judgments, returning how many were removed
    fn remove_failed(&self) -> AppResult<usize>;

    /// Deletes everything, returning how many were removed
    fn clear(&self) -> AppResult<usize>;

    fn count(&self) -> AppResult<usize>;

    /// Moves judgments along with renamed files and drops the ones left
    /// stale. Returns how many judgments were rewritten.
    fn rekey(&self, moves: &PathMoves) -> AppResult<usize>;

    /// Deletes every judgment involving one of `paths`
    fn forget(&self, paths: &[PathBuf]) -> AppResult<usize>;
}

// ---------------------------------------------------------------------
// In-memory Implementation
// ---------------------------------------------------------------------

/// Process-local cache behind a single mutex
#[derive(Default)]
pub struct InMemoryJudgmentRepository {
    entries: Mutex<HashMap<PairKey, Judgment>>,
}

impl InMemoryJudgmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, HashMap<PairKey, Judgment>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Other("Judgment cache lock poisoned".to_string()))
    }
}

impl JudgmentRepository for InMemoryJudgmentRepository {
    fn get(&self, key: &PairKey) -> AppResult<Option<Judgment>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn save(&self, judgment: &Judgment) -> AppResult<()> {
        self.lock()?.insert(judgment.key.clone(), judgment.clone());
        Ok(())
    }

    fn list_all(&self) -> AppResult<Vec<Judgment>> {
        let mut all: Vec<Judgment> = self.lock()?.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(all)
    }

    fn remove_failed(&self) -> AppResult<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, j| j.verdict != Verdict::Failed);
        Ok(before - entries.len())
    }

    fn clear(&self) -> AppResult<usize> {
        let mut entries = self.lock()?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    fn count(&self) -> AppResult<usize> {
        Ok(self.lock()?.len())
    }

    fn rekey(&self, moves: &PathMoves) -> AppResult<usize> {
        let mut entries = self.lock()?;

        let touched: Vec<PairKey> = entries.keys().filter(|k| moves.touches(k)).cloned().collect();
        let moved: Vec<Judgment> = touched
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter_map(|judgment| moves.apply(&judgment))
            .collect();

        let rewritten = moved.len();
        for judgment in moved {
            entries.insert(judgment.key.clone(), judgment);
        }
        Ok(rewritten)
    }

    fn forget(&self, paths: &[PathBuf]) -> AppResult<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|key, _| {
            !paths
                .iter()
                .any(|p| key.first() == p.as_path() || key.second() == p.as_path())
        });
        Ok(before - entries.len())
    }
}

// ---------------------------------------------------------------------
// SQLite Implementation
// ---------------------------------------------------------------------

/// Cache persisted across runs
pub struct SqliteJudgmentRepository {
    pool: Arc<ConnectionPool>,
}

impl SqliteJudgmentRepository {
    /// Wraps the pool and makes sure the schema exists
    pub fn new(pool: Arc<ConnectionPool>) -> AppResult<Self> {
        let conn = get_connection(&pool)?;
        initialize_database(&conn)?;
        drop(conn);

        Ok(Self { pool })
    }

    fn row_to_judgment(row: &Row) -> rusqlite::Result<Judgment> {
        let first: String = row.get("first_path")?;
        let second: String = row.get("second_path")?;
        let verdict_str: String = row.get("verdict")?;
        let judged_at_str: String = row.get("judged_at")?;
        let attempts: i64 = row.get("attempts")?;

        let verdict = verdict_str
            .parse::<Verdict>()
            .map_err(|e| conversion_error(2, e))?;

        let judged_at = DateTime::parse_from_rfc3339(&judged_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(5, e.to_string()))?;

        Ok(Judgment {
            key: PairKey::new(Path::new(&first), Path::new(&second)),
            verdict,
            confidence: row.get("confidence")?,
            attempts: u32::try_from(attempts).map_err(|e| conversion_error(4, e.to_string()))?,
            judged_at,
        })
    }
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl JudgmentRepository for SqliteJudgmentRepository {
    fn get(&self, key: &PairKey) -> AppResult<Option<Judgment>> {
        let conn = get_connection(&self.pool)?;

        let judgment = conn
            .query_row(
                "SELECT first_path, second_path, verdict, confidence, attempts, judged_at
                 FROM judgments WHERE first_path = ?1 AND second_path = ?2",
                params![path_text(key.first()), path_text(key.second())],
                Self::row_to_judgment,
            )
            .optional()?;

        Ok(judgment)
    }

    fn save(&self, judgment: &Judgment) -> AppResult<()> {
        let conn = get_connection(&self.pool)?;

        conn.execute(
            "INSERT OR REPLACE INTO judgments
                (first_path, second_path, verdict, confidence, attempts, judged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                path_text(judgment.key.first()),
                path_text(judgment.key.second()),
                judgment.verdict.to_string(),
                judgment.confidence,
                judgment.attempts,
                judgment.judged_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn list_all(&self) -> AppResult<Vec<Judgment>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn.prepare(
            "SELECT first_path, second_path, verdict, confidence, attempts, judged_at
             FROM judgments",
        )?;

        let rows = stmt.query_map([], Self::row_to_judgment)?;

        let mut judgments = Vec::new();
        for judgment in rows {
            judgments.push(judgment?);
        }

        // SQLite text order differs from path order
        judgments.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(judgments)
    }

    fn remove_failed(&self) -> AppResult<usize> {
        let conn = get_connection(&self.pool)?;
        let removed = conn.execute(
            "DELETE FROM judgments WHERE verdict = ?1",
            params![Verdict::Failed.to_string()],
        )?;
        Ok(removed)
    }

    fn clear(&self) -> AppResult<usize> {
        let conn = get_connection(&self.pool)?;
        let removed = conn.execute("DELETE FROM judgments", [])?;
        Ok(removed)
    }

    fn count(&self) -> AppResult<usize> {
        let conn = get_connection(&self.pool)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM judgments", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn rekey(&self, moves: &PathMoves) -> AppResult<usize> {
        let mut conn = get_connection(&self.pool)?;
        let tx = conn.transaction()?;

        let mut touched: BTreeMap<PairKey, Judgment> = BTreeMap::new();
        {
            let mut stmt = tx.prepare(
                "SELECT first_path, second_path, verdict, confidence, attempts, judged_at
                 FROM judgments WHERE first_path = ?1 OR second_path = ?1",
            )?;
            for path in moves.touched_paths() {
                let rows = stmt.query_map(params![path_text(path)], Self::row_to_judgment)?;
                for judgment in rows {
                    let judgment = judgment?;
                    touched.insert(judgment.key.clone(), judgment);
                }
            }
        }

        for key in touched.keys() {
            tx.execute(
                "DELETE FROM judgments WHERE first_path = ?1 AND second_path = ?2",
                params![path_text(key.first()), path_text(key.second())],
            )?;
        }

        let mut rewritten = 0;
        for judgment in touched.values().filter_map(|j| moves.apply(j)) {
            tx.execute(
                "INSERT OR REPLACE INTO judgments
                    (first_path, second_path, verdict, confidence, attempts, judged_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    path_text(judgment.key.first()),
                    path_text(judgment.key.second()),
                    judgment.verdict.to_string(),
                    judgment.confidence,
                    judgment.attempts,
                    judgment.judged_at.to_rfc3339(),
                ],
            )?;
            rewritten += 1;
        }

        tx.commit()?;
        Ok(rewritten)
    }

    fn forget(&self, paths: &[PathBuf]) -> AppResult<usize> {
        let mut conn = get_connection(&self.pool)?;
        let tx = conn.transaction()?;

        let mut removed = 0;
        for path in paths {
            removed += tx.execute(
                "DELETE FROM judgments WHERE first_path = ?1 OR second_path = ?1",
                params![path_text(path)],
            )?;
        }

        tx.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    fn repositories() -> Vec<Box<dyn JudgmentRepository>> {
        let pool = Arc::new(create_memory_pool().unwrap());
        vec![
            Box::new(InMemoryJudgmentRepository::new()),
            Box::new(SqliteJudgmentRepository::new(pool).unwrap()),
        ]
    }

    #[test]
    fn test_symmetric_lookup() {
        let a = Path::new("/book/a.png");
        let b = Path::new("/book/b.png");

        for repo in repositories() {
            repo.save(&Judgment::oriented(b, a, Verdict::ABeforeB, Some(0.9), 1))
                .unwrap();

            let stored = repo.get(&PairKey::new(a, b)).unwrap().unwrap();
            assert_eq!(stored.verdict, Verdict::BBeforeA);
            assert_eq!(stored.confidence, Some(0.9));
            assert_eq!(repo.count().unwrap(), 1);
        }
    }

    #[test]
    fn test_save_replaces_existing_pair() {
        let a = Path::new("/book/a.png");
        let b = Path::new("/book/b.png");

        for repo in repositories() {
            repo.save(&Judgment::failed(a, b, 3)).unwrap();
            repo.save(&Judgment::oriented(a, b, Verdict::ABeforeB, None, 1))
                .unwrap();

            assert_eq!(repo.count().unwrap(), 1);
            let stored = repo.get(&PairKey::new(a, b)).unwrap().unwrap();
            assert_eq!(stored.verdict, Verdict::ABeforeB);
            assert_eq!(stored.attempts, 1);
        }
    }

    #[test]
    fn test_remove_failed_and_clear() {
        let a = Path::new("/a");
        let b = Path::new("/b");
        let c = Path::new("/c");

        for repo in repositories() {
            repo.save(&Judgment::failed(a, b, 3)).unwrap();
            repo.save(&Judgment::oriented(a, c, Verdict::Uncertain, None, 1))
                .unwrap();
            repo.save(&Judgment::oriented(b, c, Verdict::ABeforeB, None, 1))
                .unwrap();

            assert_eq!(repo.remove_failed().unwrap(), 1);
            assert!(repo.get(&PairKey::new(a, b)).unwrap().is_none());
            assert_eq!(repo.count().unwrap(), 2);

            assert_eq!(repo.clear().unwrap(), 2);
            assert_eq!(repo.count().unwrap(), 0);
        }
    }

    #[test]
    fn test_list_all_is_key_ordered() {
        for repo in repositories() {
            repo.save(&Judgment::oriented(
                Path::new("/b"),
                Path::new("/c"),
                Verdict::ABeforeB,
                None,
                1,
            ))
            .unwrap();
            repo.save(&Judgment::oriented(
                Path::new("/a"),
                Path::new("/b"),
                Verdict::ABeforeB,
                None,
                1,
            ))
            .unwrap();

            let keys: Vec<PairKey> = repo.list_all().unwrap().into_iter().map(|j| j.key).collect();
            assert_eq!(
                keys,
                vec![
                    PairKey::new(Path::new("/a"), Path::new("/b")),
                    PairKey::new(Path::new("/b"), Path::new("/c")),
                ]
            );
        }
    }

    #[test]
    fn test_sqlite_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("judgments.db");
        let a = Path::new("/a.png");
        let b = Path::new("/b.png");

        {
            let pool = Arc::new(crate::db::create_connection_pool(&db_path).unwrap());
            let repo = SqliteJudgmentRepository::new(pool).unwrap();
            repo.save(&Judgment::oriented(a, b, Verdict::ABeforeB, Some(0.5), 2))
                .unwrap();
        }

        let pool = Arc::new(crate::db::create_connection_pool(&db_path).unwrap());
        let repo = SqliteJudgmentRepository::new(pool).unwrap();
        let stored = repo.get(&PairKey::new(a, b)).unwrap().unwrap();
        assert_eq!(stored.verdict, Verdict::ABeforeB);
        assert_eq!(stored.attempts, 2);
    }

    #[test]
    fn test_rekey_follows_renamed_files() {
        let p1 = Path::new("/book/p1.png");
        let p2 = Path::new("/book/p2.png");
        let page1 = Path::new("/book/page_001.png");
        let page2 = Path::new("/book/page_002.png");
        let moves = PathMoves::new(vec![
            (p2.to_path_buf(), page1.to_path_buf()),
            (p1.to_path_buf(), page2.to_path_buf()),
        ]);

        for repo in repositories() {
            repo.save(&Judgment::oriented(p2, p1, Verdict::ABeforeB, Some(0.9), 1))
                .unwrap();
            // left over from an older layout of the folder
            repo.save(&Judgment::oriented(page1, page2, Verdict::BBeforeA, None, 1))
                .unwrap();

            assert_eq!(repo.rekey(&moves).unwrap(), 1);

            assert_eq!(repo.count().unwrap(), 1);
            assert!(repo.get(&PairKey::new(p1, p2)).unwrap().is_none());
            let moved = repo.get(&PairKey::new(page1, page2)).unwrap().unwrap();
            assert_eq!(moved.verdict, Verdict::ABeforeB);
            assert_eq!(moved.confidence, Some(0.9));
        }
    }

    #[test]
    fn test_forget_drops_pairs_touching_paths() {
        let a = Path::new("/a");
        let b = Path::new("/b");
        let c = Path::new("/c");

        for repo in repositories() {
            repo.save(&Judgment::oriented(a, b, Verdict::ABeforeB, None, 1))
                .unwrap();
            repo.save(&Judgment::oriented(b, c, Verdict::ABeforeB, None, 1))
                .unwrap();

            assert_eq!(repo.forget(&[a.to_path_buf()]).unwrap(), 1);
            assert_eq!(repo.count().unwrap(), 1);
            assert!(repo.get(&PairKey::new(b, c)).unwrap().is_some());
        }
    }
}

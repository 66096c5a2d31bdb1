// src/integrations/oracle/hint_oracle.rs
//
// Oracle that orders items by the number found in their file names.
// Deterministic and offline; used when no model runtime is configured.

use async_trait::async_trait;
use std::cmp::Ordering;

use super::{Oracle, OracleError, OracleJudgment, OracleVerdict};
use crate::domain::Item;

#[derive(Debug, Clone, Default)]
pub struct HintOracle;

impl HintOracle {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Oracle for HintOracle {
    async fn compare(&self, first: &Item, second: &Item) -> Result<OracleJudgment, OracleError> {
        let judgment = match (first.hint, second.hint) {
            (Some(a), Some(b)) => match a.cmp(&b) {
                Ordering::Less => OracleJudgment::new(OracleVerdict::FirstBefore, Some(1.0)),
                Ordering::Greater => OracleJudgment::new(OracleVerdict::SecondBefore, Some(1.0)),
                Ordering::Equal => OracleJudgment::uncertain(),
            },
            _ => OracleJudgment::uncertain(),
        };

        Ok(judgment)
    }
}

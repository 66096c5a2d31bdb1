// src/integrations/oracle/mod.rs
//
// Oracle Adapter
//
// The capability that answers "which of these two items comes first".
// Only the contract lives here; implementations may call a model, a
// remote service, or read numeric hints.
//
// CRITICAL RULES:
// - Answers are in the caller's orientation (first vs second argument)
// - Errors are transient by definition; the orchestrator retries them
// - Timeouts are enforced by the caller, not by implementations

pub mod hint_oracle;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Item, Verdict};

pub use hint_oracle::HintOracle;

/// Relative order reported by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleVerdict {
    FirstBefore,
    SecondBefore,
    Uncertain,
}

impl From<OracleVerdict> for Verdict {
    fn from(verdict: OracleVerdict) -> Self {
        match verdict {
            OracleVerdict::FirstBefore => Verdict::ABeforeB,
            OracleVerdict::SecondBefore => Verdict::BBeforeA,
            OracleVerdict::Uncertain => Verdict::Uncertain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleJudgment {
    pub verdict: OracleVerdict,

    /// Optional score in [0, 1]
    pub confidence: Option<f64>,
}

impl OracleJudgment {
    pub fn new(verdict: OracleVerdict, confidence: Option<f64>) -> Self {
        Self {
            verdict,
            confidence,
        }
    }

    pub fn uncertain() -> Self {
        Self::new(OracleVerdict::Uncertain, None)
    }
}

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("oracle timed out")]
    Timeout,

    #[error("transient oracle failure: {0}")]
    Transient(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn compare(&self, first: &Item, second: &Item) -> Result<OracleJudgment, OracleError>;
}

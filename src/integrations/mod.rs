// src/integrations/mod.rs
//
// External Integrations Module

pub mod oracle;

pub use oracle::{HintOracle, Oracle, OracleError, OracleJudgment, OracleVerdict};

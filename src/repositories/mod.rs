// src/repositories/mod.rs
//
// Repository layer
//
// CRITICAL RULES:
// - Repositories are DUMB data mappers
// - NO business logic
// - NO event emission
// - Explicit SQL only

pub mod judgment_repository;

pub use judgment_repository::{
    InMemoryJudgmentRepository, JudgmentRepository, SqliteJudgmentRepository,
};

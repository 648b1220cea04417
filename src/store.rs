use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::error::StoreError;
use crate::models::{EvaluationResult, Submission};

/// What the scoring pipeline needs from persistence.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Every stored submission, oldest first.
    async fn fetch_all(&self) -> Result<Vec<Submission>, StoreError>;

    /// Overwrites the evaluation for one submission and drops its rank.
    async fn update_result(&self, id: Uuid, result: &EvaluationResult) -> Result<(), StoreError>;

    async fn clear_ranks(&self) -> Result<(), StoreError>;

    async fn update_rank(&self, id: Uuid, rank: u32) -> Result<(), StoreError>;
}

/// Postgres-backed store. Built once from the pool opened in `main`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn fetch_all(&self) -> Result<Vec<Submission>, StoreError> {
        db::fetch_submissions(&self.pool).await
    }

    async fn update_result(&self, id: Uuid, result: &EvaluationResult) -> Result<(), StoreError> {
        db::upsert_evaluation(&self.pool, id, result).await
    }

    async fn clear_ranks(&self) -> Result<(), StoreError> {
        db::clear_ranks(&self.pool).await
    }

    async fn update_rank(&self, id: Uuid, rank: u32) -> Result<(), StoreError> {
        db::update_rank(&self.pool, id, rank).await
    }
}

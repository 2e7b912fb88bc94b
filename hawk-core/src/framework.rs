use sqlx::PgPool;

/// Executes the kanau query objects of [`crate::entities`] against the pool.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

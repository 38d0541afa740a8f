use crate::database::store::{IdentityTransaction, TransactionProvider};
use crate::error::app_error::AppError;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct PostgresRepository {
    pub pool: PgPool,
}

/// A Postgres transaction running at READ COMMITTED.
pub struct PostgresTransaction {
    pub(crate) tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl TransactionProvider for PostgresRepository {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED").execute(&mut *tx).await?;
        Ok(PostgresTransaction { tx })
    }
}

#[async_trait::async_trait]
impl IdentityTransaction for PostgresTransaction {
    async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}

impl PostgresRepository {
    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

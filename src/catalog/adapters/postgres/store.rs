//! `PostgreSQL` catalog store.

use super::transaction::{PgCatalogTransaction, map_diesel_error};
use crate::catalog::ports::{CatalogStore, CatalogStoreError, CatalogTransaction};
use async_trait::async_trait;
use diesel::Connection;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::Error as DieselError;

/// `PostgreSQL` connection pool type for the catalog store.
pub type CatalogPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed catalog store.
///
/// Each unit of work checks a connection out of the pool and runs inside one
/// database transaction on a blocking thread.
#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: CatalogPgPool,
}

impl PostgresCatalogStore {
    /// Creates a new store from a `PostgreSQL` pool.
    #[must_use]
    pub const fn new(pool: CatalogPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<CatalogStoreError> + Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, E> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool
                .get()
                .map_err(CatalogStoreError::transient)
                .map_err(E::from)?;
            operation(&mut connection)
        })
        .await
        .map_err(CatalogStoreError::persistence)
        .map_err(E::from)?
    }
}

/// Separates the caller's own error from database failures raised while
/// opening or committing the transaction.
enum TransactionFailure<E> {
    Work(E),
    Database(DieselError),
}

impl<E> From<DieselError> for TransactionFailure<E> {
    fn from(err: DieselError) -> Self {
        Self::Database(err)
    }
}

impl<E: From<CatalogStoreError>> TransactionFailure<E> {
    fn into_caller(self) -> E {
        match self {
            Self::Work(err) => err,
            Self::Database(err) => E::from(map_diesel_error(err)),
        }
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn write<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<CatalogStoreError> + Send + 'static,
        F: FnOnce(&mut dyn CatalogTransaction) -> Result<T, E> + Send + 'static,
    {
        self.run_blocking(move |connection| {
            connection
                .transaction::<T, TransactionFailure<E>, _>(|conn| {
                    work(&mut PgCatalogTransaction::new(conn)).map_err(TransactionFailure::Work)
                })
                .map_err(TransactionFailure::into_caller)
        })
        .await
    }

    async fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<CatalogStoreError> + Send + 'static,
        F: FnOnce(&mut dyn CatalogTransaction) -> Result<T, E> + Send + 'static,
    {
        self.run_blocking(move |connection| {
            connection
                .build_transaction()
                .read_only()
                .run::<T, TransactionFailure<E>, _>(|conn| {
                    work(&mut PgCatalogTransaction::new(conn)).map_err(TransactionFailure::Work)
                })
                .map_err(TransactionFailure::into_caller)
        })
        .await
    }
}

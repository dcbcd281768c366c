//! Embedded `PostgreSQL` cluster shared by the integration tests.

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use eyre::{Result, WrapErr, eyre};
use pg_embedded_setup_unpriv::{ExecutionPrivileges, bootstrap_for_tests};
use postgresql_embedded::{PostgreSQL, Settings, Status};
use rstest::fixture;
use std::env;
use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tokio::runtime::Runtime;
use uuid::Uuid;

/// Schema applied to every temporary database.
const CATALOG_SCHEMA_SQL: &str =
    include_str!("../../migrations/2026-10-16-000000_create_catalog_tables/up.sql");

static SHARED_CLUSTER: OnceLock<Result<ManagedCluster, String>> = OnceLock::new();
static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

/// Shared `PostgreSQL` cluster handle for integration tests.
pub type PostgresCluster = &'static ManagedCluster;

/// Embedded cluster kept alive for the lifetime of the test binary.
pub struct ManagedCluster {
    settings: Settings,
    _postgres: PostgreSQL,
    _runtime: Runtime,
}

impl ManagedCluster {
    fn start() -> Result<Self> {
        let mut bootstrap =
            bootstrap_for_tests().map_err(|err| eyre!("bootstrap embedded PostgreSQL: {err}"))?;
        if matches!(bootstrap.privileges, ExecutionPrivileges::Root) {
            return Err(eyre!(
                "embedded PostgreSQL tests must run as an unprivileged user"
            ));
        }
        sync_password_from_file(&mut bootstrap.settings)?;

        let env_guard = EnvVarGuard::set_many(&bootstrap.environment.to_env());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .wrap_err("build cluster runtime")?;
        let mut postgres = PostgreSQL::new(bootstrap.settings.clone());
        runtime
            .block_on(async {
                postgres.setup().await?;
                if !matches!(postgres.status(), Status::Started) {
                    postgres.start().await?;
                }
                Ok::<(), postgresql_embedded::Error>(())
            })
            .wrap_err("start embedded PostgreSQL")?;
        drop(env_guard);

        Ok(Self {
            settings: postgres.settings().clone(),
            _postgres: postgres,
            _runtime: runtime,
        })
    }

    /// Returns the connection URL of `database`.
    #[must_use]
    pub fn database_url(&self, database: &str) -> String {
        self.settings.url(database)
    }

    /// Creates a uniquely named database with the catalog schema applied.
    ///
    /// # Errors
    ///
    /// Returns an error when the database cannot be created or migrated.
    pub fn temporary_database(&'static self) -> Result<TemporaryDatabase> {
        let name = format!("catalog_test_{}", Uuid::new_v4().simple());
        self.execute_admin_sql(&format!("CREATE DATABASE {}", quote_identifier(&name)))?;
        let database = TemporaryDatabase {
            cluster: self,
            name,
        };
        let mut conn = PgConnection::establish(&database.url())
            .wrap_err("connect to temporary database")?;
        conn.batch_execute(CATALOG_SCHEMA_SQL)
            .wrap_err("apply catalog schema")?;
        Ok(database)
    }

    fn execute_admin_sql(&self, sql: &str) -> Result<()> {
        let mut conn = PgConnection::establish(&self.database_url("postgres"))
            .wrap_err("connect to admin database")?;
        conn.batch_execute(sql)
            .wrap_err_with(|| format!("execute admin statement: {sql}"))?;
        Ok(())
    }
}

/// Database dropped when the guard goes out of scope.
pub struct TemporaryDatabase {
    cluster: &'static ManagedCluster,
    name: String,
}

impl TemporaryDatabase {
    /// Returns the connection URL of the database.
    #[must_use]
    pub fn url(&self) -> String {
        self.cluster.database_url(&self.name)
    }
}

impl Drop for TemporaryDatabase {
    fn drop(&mut self) {
        let sql = format!(
            "DROP DATABASE IF EXISTS {} WITH (FORCE)",
            quote_identifier(&self.name)
        );
        if let Err(err) = self.cluster.execute_admin_sql(&sql) {
            tracing::warn!(database = %self.name, error = %err, "failed to drop test database");
        }
    }
}

/// Provides the shared cluster, starting it on first use.
///
/// The cluster starts on its own thread so its runtime never nests inside
/// the test's runtime.
#[fixture]
pub fn postgres_cluster() -> Result<PostgresCluster> {
    SHARED_CLUSTER
        .get_or_init(|| {
            std::thread::spawn(ManagedCluster::start)
                .join()
                .map_err(|_| "cluster start-up thread panicked".to_owned())
                .and_then(|started| started.map_err(|err| format!("{err:#}")))
        })
        .as_ref()
        .map_err(|err| eyre!("SKIP-TEST-CLUSTER: failed to start PostgreSQL: {err}"))
}

struct EnvVarGuard {
    previous: Vec<(OsString, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvVarGuard {
    fn set_many(changes: &[(String, Option<String>)]) -> Self {
        let lock = ENV_MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut previous = Vec::with_capacity(changes.len());
        for (key, value) in changes {
            previous.push((OsString::from(key), env::var_os(key)));
            unsafe {
                // SAFETY: the global mutex serializes environment mutations in tests.
                match value {
                    Some(new_value) => env::set_var(key, new_value),
                    None => env::remove_var(key),
                }
            }
        }
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..) {
            unsafe {
                // SAFETY: the global mutex serializes environment mutations in tests.
                match value {
                    Some(previous) => env::set_var(&key, &previous),
                    None => env::remove_var(&key),
                }
            }
        }
    }
}

fn sync_password_from_file(settings: &mut Settings) -> Result<()> {
    let password_path = settings.password_file.to_string_lossy().into_owned();
    let path = Utf8Path::new(&password_path);
    let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
        return Ok(());
    };
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .wrap_err("open password file directory")?;
    match dir.read_to_string(file_name) {
        Ok(contents) => {
            let password = contents.trim_end();
            if !password.is_empty() {
                password.clone_into(&mut settings.password);
            }
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).wrap_err("read password file"),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

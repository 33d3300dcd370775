use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Lifetime count of completed focus intervals; the only timer state that
/// outlives the process.
pub trait SessionCounterRepository: Send + Sync {
    fn load(&self) -> Result<Option<u32>, InfraError>;
    fn save(&self, sessions_completed: u32, updated_at: DateTime<Utc>) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteSessionCounterRepository {
    db_path: PathBuf,
}

impl SqliteSessionCounterRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl SessionCounterRepository for SqliteSessionCounterRepository {
    fn load(&self) -> Result<Option<u32>, InfraError> {
        let connection = self.connect()?;
        let count: Option<i64> = connection
            .query_row(
                "SELECT sessions_completed FROM session_counter WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        count
            .map(|value| {
                u32::try_from(value).map_err(|_| {
                    InfraError::InvalidConfig(format!(
                        "invalid session_counter.sessions_completed '{value}'"
                    ))
                })
            })
            .transpose()
    }

    fn save(&self, sessions_completed: u32, updated_at: DateTime<Utc>) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO session_counter (id, sessions_completed, updated_at)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
               sessions_completed = excluded.sessions_completed,
               updated_at = excluded.updated_at",
            params![i64::from(sessions_completed), updated_at.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionCounterRepository {
    count: Mutex<Option<u32>>,
}

impl InMemorySessionCounterRepository {
    pub fn with_count(sessions_completed: u32) -> Self {
        Self {
            count: Mutex::new(Some(sessions_completed)),
        }
    }
}

impl SessionCounterRepository for InMemorySessionCounterRepository {
    fn load(&self) -> Result<Option<u32>, InfraError> {
        let count = self
            .count
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("session counter lock poisoned: {error}")))?;
        Ok(*count)
    }

    fn save(&self, sessions_completed: u32, _updated_at: DateTime<Utc>) -> Result<(), InfraError> {
        let mut count = self
            .count
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("session counter lock poisoned: {error}")))?;
        *count = Some(sessions_completed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        dir: PathBuf,
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "studytrack-counter-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&dir).expect("create temp dir");
            let path = dir.join("focus.sqlite");
            initialize_database(&path).expect("initialize database");
            Self { dir, path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    #[test]
    fn empty_database_has_no_counter() {
        let database = TempDatabase::new();
        let repository = SqliteSessionCounterRepository::new(&database.path);
        assert_eq!(repository.load().expect("load"), None);
    }

    #[test]
    fn counter_survives_reopening() {
        let database = TempDatabase::new();
        SqliteSessionCounterRepository::new(&database.path)
            .save(3, Utc::now())
            .expect("save");
        SqliteSessionCounterRepository::new(&database.path)
            .save(4, Utc::now())
            .expect("overwrite");

        let reopened = SqliteSessionCounterRepository::new(&database.path);
        assert_eq!(reopened.load().expect("load"), Some(4));
    }

    #[test]
    fn initialize_is_idempotent() {
        let database = TempDatabase::new();
        initialize_database(&database.path).expect("second initialize");
    }

    #[test]
    fn in_memory_repository_round_trips() {
        let repository = InMemorySessionCounterRepository::default();
        assert_eq!(repository.load().expect("load"), None);
        repository.save(9, Utc::now()).expect("save");
        assert_eq!(repository.load().expect("load"), Some(9));
    }
}

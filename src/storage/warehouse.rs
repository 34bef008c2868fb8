//! SQLite warehouse
//!
//! Events land in an append-only `events` table; registrations live in
//! `registrations` keyed by a unique `client_id`. Connections come from an
//! r2d2 pool so concurrent requests each check out their own connection,
//! and WAL mode lets readers proceed while a write commits.

use std::path::Path;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::{
    timestamp, AnalyticsRow, EventSink, RegistrationStore, StorageError, StorageResult,
};
use crate::schema::Registration;

const SCHEMA_VERSION: i32 = 2;

pub struct Warehouse {
    pool: Pool<SqliteConnectionManager>,
}

impl Warehouse {
    /// Open (creating if needed) the database at `path` and migrate it
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                r#"
                PRAGMA busy_timeout=5000;
                PRAGMA synchronous=NORMAL;
                "#,
            )
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        let conn = pool.get()?;
        Self::init_schema(&conn)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        if current_version < 1 {
            Self::apply_schema_v1(conn)?;
        }
        if current_version < 2 {
            Self::migrate_v1_to_v2(conn)?;
        }

        tracing::debug!(version = SCHEMA_VERSION, "Warehouse schema ready");
        Ok(())
    }

    fn apply_schema_v1(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id TEXT NOT NULL,
                product_name TEXT NOT NULL,
                production_version TEXT NOT NULL,
                os TEXT NOT NULL,
                docker INTEGER NOT NULL DEFAULT 0,
                resource_counts TEXT,
                event TEXT NOT NULL,
                command TEXT,
                flags TEXT,
                endpoint TEXT,
                status_code INTEGER,
                error TEXT,
                local_host INTEGER,
                extra_data TEXT,
                event_created_at TEXT NOT NULL,
                event_loaded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(event_created_at);
            CREATE INDEX IF NOT EXISTS idx_events_product ON events(product_name, event);

            CREATE TABLE IF NOT EXISTS registrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                organization TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', '1');
            "#,
        )?;
        Ok(())
    }

    /// v1 -> v2: `developer` column on events. Idempotent.
    fn migrate_v1_to_v2(conn: &Connection) -> StorageResult<()> {
        let has_column: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('events') WHERE name='developer'",
            [],
            |row| row.get(0),
        )?;

        if !has_column {
            conn.execute(
                "ALTER TABLE events ADD COLUMN developer INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }

        conn.execute(
            "UPDATE metadata SET value = '2' WHERE key = 'schema_version'",
            [],
        )?;

        tracing::info!("Migrated warehouse from v1 to v2");
        Ok(())
    }

    /// Most recently loaded events first
    pub fn recent_events(&self, limit: usize) -> StorageResult<Vec<AnalyticsRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT client_id, product_name, production_version, os, docker, developer,
                    resource_counts, event, command, flags, endpoint, status_code, error,
                    local_host, extra_data, event_created_at, event_loaded_at
             FROM events ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(AnalyticsRow {
                    client_id: row.get(0)?,
                    product_name: row.get(1)?,
                    production_version: row.get(2)?,
                    os: row.get(3)?,
                    docker: row.get(4)?,
                    developer: row.get(5)?,
                    resource_counts: row.get(6)?,
                    event: row.get(7)?,
                    command: row.get(8)?,
                    flags: row.get(9)?,
                    endpoint: row.get(10)?,
                    status_code: row.get(11)?,
                    error: row.get(12)?,
                    local_host: row.get(13)?,
                    extra_data: row.get(14)?,
                    event_created_at: row.get(15)?,
                    event_loaded_at: row.get(16)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn find_registration(conn: &Connection, client_id: &str) -> StorageResult<Option<Registration>> {
        Ok(conn
            .query_row(
                "SELECT client_id, email, organization, created_at, updated_at
                 FROM registrations WHERE client_id = ?1",
                params![client_id],
                registration_from_row,
            )
            .optional()?)
    }
}

fn parse_stored_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn registration_from_row(row: &Row<'_>) -> rusqlite::Result<Registration> {
    Ok(Registration {
        client_id: row.get(0)?,
        email: row.get(1)?,
        organization: row.get(2)?,
        created_at: parse_stored_timestamp(row, 3)?,
        updated_at: parse_stored_timestamp(row, 4)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl EventSink for Warehouse {
    fn name(&self) -> &'static str {
        "warehouse"
    }

    fn write_event(&self, row: &AnalyticsRow) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO events (
                client_id, product_name, production_version, os, docker, developer,
                resource_counts, event, command, flags, endpoint, status_code, error,
                local_host, extra_data, event_created_at, event_loaded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                row.client_id,
                row.product_name,
                row.production_version,
                row.os,
                row.docker,
                row.developer,
                row.resource_counts,
                row.event,
                row.command,
                row.flags,
                row.endpoint,
                row.status_code,
                row.error,
                row.local_host,
                row.extra_data,
                row.event_created_at,
                row.event_loaded_at,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl RegistrationStore for Warehouse {
    fn create_registration(&self, registration: &Registration) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if Self::find_registration(&tx, &registration.client_id)?.is_some() {
            return Err(StorageError::Conflict(registration.client_id.clone()));
        }

        let inserted = tx.execute(
            "INSERT INTO registrations (client_id, email, organization, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                registration.client_id,
                registration.email,
                registration.organization,
                timestamp(registration.created_at),
                timestamp(registration.updated_at),
            ],
        );
        match inserted {
            Err(e) if is_unique_violation(&e) => {
                return Err(StorageError::Conflict(registration.client_id.clone()))
            }
            other => other?,
        };

        tx.commit()?;
        Ok(())
    }

    fn update_registration(
        &self,
        registration: &Registration,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<Registration> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE registrations SET email = ?1, organization = ?2, updated_at = ?3
             WHERE client_id = ?4",
            params![
                registration.email,
                registration.organization,
                timestamp(updated_at),
                registration.client_id,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(registration.client_id.clone()));
        }

        let stored = Self::find_registration(&tx, &registration.client_id)?
            .ok_or_else(|| StorageError::NotFound(registration.client_id.clone()))?;
        tx.commit()?;
        Ok(stored)
    }

    fn delete_registration(&self, client_id: &str) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM registrations WHERE client_id = ?1",
            params![client_id],
        )?;
        if deleted == 0 {
            return Err(StorageError::NotFound(client_id.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    fn list_registrations(&self, limit: usize, offset: usize) -> StorageResult<Vec<Registration>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT client_id, email, organization, created_at, updated_at
             FROM registrations ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let registrations = stmt
            .query_map(params![limit as i64, offset as i64], registration_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(registrations)
    }
}

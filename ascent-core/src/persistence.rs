//! SQLite save store.
//!
//! One row per player holding the JSON [`SaveData`] document:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS player_saves (
//!     player_id  TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! - WAL mode so readers do not block the autosave.
//! - JSON in a BLOB keeps the table stable when the document grows fields.
//! - Optional CRC-32 of the blob flags on-disk corruption.
//! - Online backups with rotation next to the database file.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, info_span, warn};

use crate::config::PersistenceConfig;
use crate::coordinator::ProgressionCoordinator;
use crate::error::Result;
use crate::metrics::{ProgressionCounters, spans};
use crate::save::SaveData;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS player_saves (
    player_id  TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

const IN_MEMORY: &str = ":memory:";

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32(data))
}

fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc = u32::MAX;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLY & mask);
        }
    }
    !crc
}

/// Handle to the save database.
///
/// ```no_run
/// # use ascent_core::config::{AscentConfig, PersistenceConfig};
/// # use ascent_core::coordinator::ProgressionCoordinator;
/// # use ascent_core::persistence::SaveStore;
/// let store = SaveStore::open("saves.db", &PersistenceConfig::default())?;
/// let mut coordinator = ProgressionCoordinator::new("player-1", &AscentConfig::default())?;
/// store.save_coordinator(&coordinator)?;
/// store.load_into(&mut coordinator)?;
/// # Ok::<(), ascent_core::error::AscentError>(())
/// ```
pub struct SaveStore {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SaveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SaveStore {
    /// Open (or create) the database at `path` and ensure the schema.
    ///
    /// # Errors
    /// Returns `AscentError::Database` on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Save store opened");
        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open a throwaway in-memory database.
    ///
    /// # Errors
    /// Returns `AscentError::Database` on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(IN_MEMORY),
        })
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// Upsert a save document under its player id.
    ///
    /// # Errors
    /// Returns `AscentError::Serialization` or `AscentError::Database`.
    pub fn save(&self, data: &SaveData) -> Result<()> {
        let start = Instant::now();
        let blob = data.to_json()?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&blob));

        self.conn.execute(
            "INSERT INTO player_saves (player_id, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(player_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![data.player_id, blob, Utc::now().to_rfc3339(), checksum],
        )?;

        debug!(
            player = %data.player_id,
            bytes = blob.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved progression"
        );
        Ok(())
    }

    /// Load a player's document, `None` if never saved.
    ///
    /// A checksum mismatch is logged; the document is still decoded.
    ///
    /// # Errors
    /// Returns `AscentError::InvalidSaveData` for undecodable documents or
    /// `AscentError::Database` on SQLite failures.
    pub fn load(&self, player_id: &str) -> Result<Option<SaveData>> {
        let row: Option<(Vec<u8>, Option<String>)> = self
            .conn
            .prepare_cached("SELECT data, checksum FROM player_saves WHERE player_id = ?1")?
            .query_row(params![player_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((blob, stored)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored {
                let actual = crc32_hex(&blob);
                if expected != actual {
                    warn!(
                        player = %player_id,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch; save may be corrupt"
                    );
                }
            }
        }

        let data = SaveData::from_json(&blob)?;
        debug!(player = %player_id, bytes = blob.len(), "Loaded progression");
        Ok(Some(data))
    }

    /// Generate and store a coordinator's save document.
    ///
    /// # Errors
    /// See [`SaveStore::save`].
    pub fn save_coordinator(&self, coordinator: &ProgressionCoordinator) -> Result<()> {
        let _span = info_span!(spans::PERSIST_SAVE, player = %coordinator.player_id()).entered();
        self.save(&coordinator.generate_save_data())?;
        ProgressionCounters::bump(&coordinator.counters().saves_completed);
        Ok(())
    }

    /// Restore a coordinator from its stored document.
    ///
    /// Returns `false` when nothing was stored for the player.
    ///
    /// # Errors
    /// See [`SaveStore::load`] and
    /// [`ProgressionCoordinator::restore_from_save_data`].
    pub fn load_into(&self, coordinator: &mut ProgressionCoordinator) -> Result<bool> {
        let _span = info_span!(spans::PERSIST_LOAD, player = %coordinator.player_id()).entered();
        match self.load(coordinator.player_id())? {
            Some(data) => {
                coordinator.restore_from_save_data(data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete a player's document. Returns whether a row existed.
    ///
    /// # Errors
    /// Returns `AscentError::Database` on SQLite failures.
    pub fn delete(&self, player_id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM player_saves WHERE player_id = ?1", params![player_id])?;
        Ok(n > 0)
    }

    /// Every player id with a stored document, sorted.
    ///
    /// # Errors
    /// Returns `AscentError::Database` on SQLite failures.
    pub fn list_players(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT player_id FROM player_saves ORDER BY player_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Number of stored documents.
    ///
    /// # Errors
    /// Returns `AscentError::Database` on SQLite failures.
    pub fn player_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM player_saves", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Backup & maintenance
    // ------------------------------------------------------------------

    /// Copy the database to `dest` with SQLite's online-backup API.
    ///
    /// # Errors
    /// Returns `AscentError::Database` on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest: P) -> Result<()> {
        let start = Instant::now();
        let mut target = Connection::open(dest.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut target)?;
        backup.run_to_completion(256, Duration::from_millis(50), None)?;
        info!(
            dest = %dest.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Save backup written"
        );
        Ok(())
    }

    /// Write `<db>.bak.1`, shifting older backups up and keeping at most
    /// `backup_count`. No-op for in-memory stores or `backup_count = 0`.
    ///
    /// # Errors
    /// Returns `AscentError::Database` or `AscentError::Io`.
    pub fn create_rotating_backup(&self) -> Result<()> {
        let keep = self.config.backup_count;
        if keep == 0 || self.db_path.as_os_str() == IN_MEMORY {
            return Ok(());
        }

        let oldest = self.backup_path(keep);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for n in (1..keep).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                std::fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        self.backup(self.backup_path(1))?;
        debug!(keep, "Rotating backup created");
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.db_path.as_os_str().to_owned();
        name.push(format!(".bak.{n}"));
        PathBuf::from(name)
    }

    /// `PRAGMA integrity_check`; `true` when the database is sound.
    ///
    /// # Errors
    /// Returns `AscentError::Database` if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let verdict: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(verdict == "ok")
    }

    /// Reclaim free pages.
    ///
    /// # Errors
    /// Returns `AscentError::Database` on SQLite failures.
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    /// Database path (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

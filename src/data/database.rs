//! SQLite storage for player match statistics
//!
//! One row per (player, match). The variable-width stat counters live in a
//! JSON array column aligned with a persisted stat schema; the schema is
//! fixed by the first insert and every later insert must match it.

use crate::{Age, PlayerMatchRecord, PlayerMatchSet, Position, Result, StatSchema, XgoalsError};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Latest known identity of a player, served by `GET /players`.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerInfo {
    pub name: String,
    pub team: String,
    pub pos: String,
    pub age: String,
}

/// Store handle. Clone-able: a single connection behind a mutex, shared
/// read-only by the serving shell after startup.
#[derive(Clone)]
pub struct PlayerStore {
    conn: Arc<Mutex<Connection>>,
}

impl PlayerStore {
    /// Open or create the store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = PlayerStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = PlayerStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS stat_schema (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                names TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS player_matches (
                player TEXT NOT NULL,
                match_id TEXT NOT NULL,
                team TEXT NOT NULL,
                pos TEXT NOT NULL,
                age_years INTEGER NOT NULL,
                age_days INTEGER NOT NULL,
                stats TEXT NOT NULL,
                PRIMARY KEY (player, match_id)
            );

            CREATE INDEX IF NOT EXISTS idx_player_matches_player
                ON player_matches(player);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means another thread panicked mid-query; the
        // connection itself is still usable for read paths.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ==================== Schema ====================

    /// The persisted stat schema, if any records have been stored yet
    pub fn stat_schema(&self) -> Result<Option<StatSchema>> {
        let conn = self.lock();
        let names: Option<String> = conn
            .query_row("SELECT names FROM stat_schema WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        match names {
            Some(json) => {
                let names: Vec<String> = serde_json::from_str(&json)
                    .map_err(|e| XgoalsError::Parse(e.to_string()))?;
                Ok(Some(StatSchema::new(names)?))
            }
            None => Ok(None),
        }
    }

    /// Fix the stat schema on first use, or verify it matches afterwards.
    fn ensure_schema(&self, schema: &StatSchema) -> Result<()> {
        match self.stat_schema()? {
            Some(existing) => {
                if existing != *schema {
                    return Err(XgoalsError::Parse(format!(
                        "stat schema mismatch: store has {} stats, insert has {}",
                        existing.len(),
                        schema.len()
                    )));
                }
            }
            None => {
                let json = serde_json::to_string(schema.names())
                    .map_err(|e| XgoalsError::Parse(e.to_string()))?;
                self.lock().execute(
                    "INSERT INTO stat_schema (id, names) VALUES (1, ?1)",
                    params![json],
                )?;
            }
        }
        Ok(())
    }

    // ==================== Record operations ====================

    /// Insert or replace player-match records. Returns the number stored.
    pub fn upsert_records(&self, set: &PlayerMatchSet) -> Result<usize> {
        for record in &set.records {
            if record.values.len() != set.schema.len() {
                return Err(XgoalsError::Parse(format!(
                    "record for {:?} in {:?} has {} stat values, schema has {}",
                    record.player,
                    record.match_id,
                    record.values.len(),
                    set.schema.len()
                )));
            }
        }
        self.ensure_schema(&set.schema)?;

        let mut count = 0;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for record in &set.records {
            let stats_json = serde_json::to_string(&record.values)
                .map_err(|e| XgoalsError::Parse(e.to_string()))?;
            tx.execute(
                r#"
                INSERT INTO player_matches
                    (player, match_id, team, pos, age_years, age_days, stats)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(player, match_id) DO UPDATE SET
                    team = excluded.team,
                    pos = excluded.pos,
                    age_years = excluded.age_years,
                    age_days = excluded.age_days,
                    stats = excluded.stats
                "#,
                params![
                    record.player,
                    record.match_id,
                    record.team,
                    record.pos.as_str(),
                    record.age.years,
                    record.age.days,
                    stats_json,
                ],
            )?;
            count += 1;
        }
        tx.commit()?;
        Ok(count)
    }

    /// Fetch every stored record
    pub fn get_all(&self) -> Result<PlayerMatchSet> {
        let schema = self.stat_schema()?.ok_or(XgoalsError::NoHistory)?;
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT player, match_id, team, pos, age_years, age_days, stats
             FROM player_matches
             ORDER BY player, age_years, age_days, match_id",
        )?;
        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);
        Ok(PlayerMatchSet::new(schema, records))
    }

    /// Fetch all records for the named players (parameterized IN query)
    pub fn get_for_players(&self, players: &[String]) -> Result<PlayerMatchSet> {
        let schema = self.stat_schema()?.ok_or(XgoalsError::NoHistory)?;
        if players.is_empty() {
            return Ok(PlayerMatchSet::new(schema, Vec::new()));
        }

        let placeholders = (1..=players.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT player, match_id, team, pos, age_years, age_days, stats
             FROM player_matches
             WHERE player IN ({})
             ORDER BY player, age_years, age_days, match_id",
            placeholders
        );

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(players.iter()), Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);
        Ok(PlayerMatchSet::new(schema, records))
    }

    /// Most recent record per player (ordered by age), for the roster list
    pub fn latest_players(&self) -> Result<Vec<PlayerInfo>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT player, team, pos, age_years, age_days
             FROM player_matches
             ORDER BY player, age_years DESC, age_days DESC",
        )?;
        let mut rows = stmt.query([])?;

        let mut players = Vec::new();
        let mut last: Option<String> = None;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            if last.as_deref() == Some(name.as_str()) {
                continue;
            }
            let team: String = row.get(1)?;
            let pos: String = row.get(2)?;
            let age = Age::new(row.get(3)?, row.get(4)?);
            last = Some(name.clone());
            players.push(PlayerInfo {
                name,
                team,
                pos,
                age: age.to_string(),
            });
        }
        Ok(players)
    }

    /// Number of stored player-match rows
    pub fn record_count(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM player_matches", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<PlayerMatchRecord> {
        let pos_str: String = row.get(3)?;
        let stats_json: String = row.get(6)?;
        let values: Vec<Option<f64>> = serde_json::from_str(&stats_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(PlayerMatchRecord {
            player: row.get(0)?,
            match_id: row.get(1)?,
            team: row.get(2)?,
            pos: Position::parse(&pos_str),
            age: Age::new(row.get(4)?, row.get(5)?),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> PlayerMatchSet {
        let schema = StatSchema::new(vec!["gls".into(), "sh".into()]).unwrap();
        let records = vec![
            PlayerMatchRecord {
                player: "Saka".into(),
                match_id: "m1".into(),
                team: "Arsenal".into(),
                pos: Position::Forward,
                age: Age::new(23, 100),
                values: vec![Some(1.0), Some(3.0)],
            },
            PlayerMatchRecord {
                player: "Saka".into(),
                match_id: "m2".into(),
                team: "Arsenal".into(),
                pos: Position::Forward,
                age: Age::new(23, 107),
                values: vec![Some(0.0), None],
            },
            PlayerMatchRecord {
                player: "Rice".into(),
                match_id: "m1".into(),
                team: "Arsenal".into(),
                pos: Position::Midfielder,
                age: Age::new(25, 10),
                values: vec![Some(0.0), Some(1.0)],
            },
        ];
        PlayerMatchSet::new(schema, records)
    }

    #[test]
    fn test_roundtrip() {
        let store = PlayerStore::in_memory().unwrap();
        let set = sample_set();
        assert_eq!(store.upsert_records(&set).unwrap(), 3);
        assert_eq!(store.record_count().unwrap(), 3);

        let loaded = store.get_all().unwrap();
        assert_eq!(loaded.schema, set.schema);
        assert_eq!(loaded.records.len(), 3);
        let saka_m2 = loaded
            .records
            .iter()
            .find(|r| r.player == "Saka" && r.match_id == "m2")
            .unwrap();
        assert_eq!(saka_m2.values, vec![Some(0.0), None]);
    }

    #[test]
    fn test_upsert_replaces() {
        let store = PlayerStore::in_memory().unwrap();
        let mut set = sample_set();
        store.upsert_records(&set).unwrap();

        set.records[0].values = vec![Some(2.0), Some(5.0)];
        store.upsert_records(&set).unwrap();
        assert_eq!(store.record_count().unwrap(), 3);

        let loaded = store.get_all().unwrap();
        let saka_m1 = loaded
            .records
            .iter()
            .find(|r| r.player == "Saka" && r.match_id == "m1")
            .unwrap();
        assert_eq!(saka_m1.values[0], Some(2.0));
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let store = PlayerStore::in_memory().unwrap();
        store.upsert_records(&sample_set()).unwrap();

        let other_schema = StatSchema::new(vec!["gls".into()]).unwrap();
        let set = PlayerMatchSet::new(other_schema, vec![]);
        assert!(store.upsert_records(&set).is_err());
    }

    #[test]
    fn test_wrong_width_record_rejected() {
        let store = PlayerStore::in_memory().unwrap();
        let mut set = sample_set();
        set.records[1].values = vec![Some(0.0)];

        let err = store.upsert_records(&set).unwrap_err();
        assert!(matches!(err, XgoalsError::Parse(_)));
        // Nothing from the bad batch is stored
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn test_get_for_players_filters() {
        let store = PlayerStore::in_memory().unwrap();
        store.upsert_records(&sample_set()).unwrap();

        let set = store.get_for_players(&["Saka".to_string()]).unwrap();
        assert_eq!(set.records.len(), 2);
        assert!(set.records.iter().all(|r| r.player == "Saka"));

        let empty = store.get_for_players(&["Haaland".to_string()]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_latest_players_picks_most_recent() {
        let store = PlayerStore::in_memory().unwrap();
        store.upsert_records(&sample_set()).unwrap();

        let players = store.latest_players().unwrap();
        assert_eq!(players.len(), 2);
        let saka = players.iter().find(|p| p.name == "Saka").unwrap();
        // m2 (age 23-107) is the most recent record
        assert_eq!(saka.age, "23-107");
        assert_eq!(saka.pos, "FW");
    }
}

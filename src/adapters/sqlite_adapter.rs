//! SQLite trade ledger adapter.

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use crate::domain::error::PairtraderError;
use crate::domain::ledger::{ExitFields, TradeEntry, TradeRecord};
use crate::domain::signal::Direction;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;

#[derive(Clone)]
pub struct SqliteLedger {
    pool: Pool<SqliteConnectionManager>,
}

fn query_err(e: rusqlite::Error) -> PairtraderError {
    PairtraderError::Database {
        reason: e.to_string(),
    }
}

fn parse_time(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

impl SqliteLedger {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PairtraderError> {
        let db_path =
            config
                .get_string("ledger", "path")
                .ok_or_else(|| PairtraderError::ConfigMissing {
                    section: "ledger".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("ledger", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| PairtraderError::Database {
                    reason: e.to_string(),
                })?;

        let ledger = Self { pool };
        ledger.initialize_schema()?;
        Ok(ledger)
    }

    /// Single-connection in-memory database; the schema is created.
    pub fn in_memory() -> Result<Self, PairtraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| PairtraderError::Database {
                reason: e.to_string(),
            })?;

        let ledger = Self { pool };
        ledger.initialize_schema()?;
        Ok(ledger)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, PairtraderError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| PairtraderError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), PairtraderError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS trades (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    instrument TEXT NOT NULL,
                    direction TEXT NOT NULL,
                    units INTEGER NOT NULL,
                    entry_price REAL NOT NULL,
                    stop_loss REAL NOT NULL,
                    entry_time TEXT NOT NULL,
                    exit_price REAL,
                    exit_time TEXT,
                    profit REAL,
                    profit_ratio REAL,
                    expectancy REAL
                );
                CREATE INDEX IF NOT EXISTS idx_trades_instrument ON trades(instrument);",
            )
            .map_err(query_err)
    }
}

impl LedgerPort for SqliteLedger {
    fn append_trade(&self, entry: &TradeEntry) -> Result<i64, PairtraderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO trades (instrument, direction, units, entry_price, stop_loss, entry_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.instrument,
                entry.direction.as_str(),
                entry.units,
                entry.entry_price,
                entry.stop_loss_price,
                entry.entry_time.to_rfc3339(),
            ],
        )
        .map_err(query_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn update_trade(&self, id: i64, exit: &ExitFields) -> Result<(), PairtraderError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE trades
                 SET exit_price = ?1, exit_time = ?2, profit = ?3, profit_ratio = ?4, expectancy = ?5
                 WHERE id = ?6 AND exit_price IS NULL",
                params![
                    exit.exit_price,
                    exit.exit_time.to_rfc3339(),
                    exit.profit,
                    exit.profit_ratio,
                    exit.expectancy,
                    id
                ],
            )
            .map_err(query_err)?;
        if changed == 1 {
            return Ok(());
        }

        let exists: Option<i64> = conn
            .query_row("SELECT id FROM trades WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .map_err(query_err)?;
        match exists {
            Some(_) => Err(PairtraderError::TradeAlreadyClosed { id }),
            None => Err(PairtraderError::UnknownTrade { id }),
        }
    }

    fn list_trades(&self) -> Result<Vec<TradeRecord>, PairtraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, instrument, direction, units, entry_price, stop_loss, entry_time,
                        exit_price, exit_time, profit, profit_ratio, expectancy
                 FROM trades
                 ORDER BY id ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                let direction_str: String = row.get(2)?;
                let direction = direction_str.parse::<Direction>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        2,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?;
                let exit_price: Option<f64> = row.get(7)?;
                let exit_time: Option<String> = row.get(8)?;
                let exit = match (exit_price, exit_time) {
                    (Some(exit_price), Some(exit_time)) => Some(ExitFields {
                        exit_price,
                        exit_time: parse_time(8, exit_time)?,
                        profit: row.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
                        profit_ratio: row.get::<_, Option<f64>>(10)?.unwrap_or(0.0),
                        expectancy: row.get::<_, Option<f64>>(11)?.unwrap_or(0.0),
                    }),
                    _ => None,
                };
                Ok(TradeRecord {
                    id: row.get(0)?,
                    entry: TradeEntry {
                        instrument: row.get(1)?,
                        direction,
                        units: row.get(3)?,
                        entry_price: row.get(4)?,
                        stop_loss_price: row.get(5)?,
                        entry_time: parse_time(6, row.get(6)?)?,
                    },
                    exit,
                })
            })
            .map_err(query_err)?;

        let mut trades = Vec::new();
        for row in rows {
            trades.push(row.map_err(query_err)?);
        }
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
    }

    fn sample_entry() -> TradeEntry {
        TradeEntry {
            instrument: "EUR_USD".into(),
            direction: Direction::Short,
            units: 60_000,
            entry_price: 1.1050,
            stop_loss_price: 1.1100,
            entry_time: Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap(),
        }
    }

    fn sample_exit() -> ExitFields {
        ExitFields {
            exit_price: 1.1000,
            exit_time: Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap(),
            profit: 0.0050,
            profit_ratio: 0.0050 / 1.1050,
            expectancy: 0.0050,
        }
    }

    #[test]
    fn from_config_missing_path() {
        let config = EmptyConfig;
        let result = SqliteLedger::from_config(&config);
        match result {
            Err(PairtraderError::ConfigMissing { section, key }) => {
                assert_eq!(section, "ledger");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn in_memory_initialization_is_idempotent() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.initialize_schema().unwrap();
        assert!(ledger.list_trades().unwrap().is_empty());
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let ledger = SqliteLedger::in_memory().unwrap();
        assert_eq!(ledger.append_trade(&sample_entry()).unwrap(), 1);
        assert_eq!(ledger.append_trade(&sample_entry()).unwrap(), 2);
    }

    #[test]
    fn round_trip_open_and_closed_trades() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let first = ledger.append_trade(&sample_entry()).unwrap();
        ledger.append_trade(&sample_entry()).unwrap();
        ledger.update_trade(first, &sample_exit()).unwrap();

        let trades = ledger.list_trades().unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].entry, sample_entry());
        assert_eq!(trades[0].exit, Some(sample_exit()));
        assert!(trades[1].exit.is_none());
    }

    #[test]
    fn second_update_is_rejected() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let id = ledger.append_trade(&sample_entry()).unwrap();
        ledger.update_trade(id, &sample_exit()).unwrap();

        let err = ledger.update_trade(id, &sample_exit()).unwrap_err();
        assert!(matches!(err, PairtraderError::TradeAlreadyClosed { id: 1 }));
    }

    #[test]
    fn update_unknown_trade() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let err = ledger.update_trade(99, &sample_exit()).unwrap_err();
        assert!(matches!(err, PairtraderError::UnknownTrade { id: 99 }));
    }

    #[test]
    fn file_backed_ledger_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("trades.db");
        let content = format!("[ledger]\npath = {}\n", path.display());
        let config = crate::adapters::file_config_adapter::FileConfigAdapter::from_string(&content)
            .unwrap();

        let ledger = SqliteLedger::from_config(&config).unwrap();
        ledger.append_trade(&sample_entry()).unwrap();
        drop(ledger);

        let reopened = SqliteLedger::from_config(&config).unwrap();
        assert_eq!(reopened.list_trades().unwrap().len(), 1);
    }
}

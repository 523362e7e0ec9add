use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// One of the largest contributors to a run's composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopRisk {
    pub indicator: String,
    pub contribution: f64,
    pub signal: String,
}

/// Outcome of the most recent update run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    pub risk_score: f64,
    pub risk_level: String,
    pub indicators_fetched: usize,
    pub indicators_failed: usize,
    pub latest_data_date: Option<NaiveDate>,
    pub top_risks: Vec<TopRisk>,
}

/// Keeps only the latest run summary; each save replaces the previous one.
pub struct SummaryStore {
    conn: Connection,
}

impl SummaryStore {
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory for {}", db_path))?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open summary database: {}", db_path))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS last_run (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                timestamp TIMESTAMP NOT NULL,
                risk_score REAL NOT NULL,
                risk_level TEXT NOT NULL,
                indicators_fetched INTEGER NOT NULL,
                indicators_failed INTEGER NOT NULL,
                latest_data_date TEXT,
                top_risks TEXT NOT NULL DEFAULT '[]'
            );
            "#,
        )?;

        Ok(Self { conn })
    }

    /// Overwrite the stored summary.
    pub fn save_latest(&self, summary: &RunSummary) -> Result<()> {
        let top_risks = serde_json::to_string(&summary.top_risks)?;

        self.conn.execute(
            "INSERT OR REPLACE INTO last_run
                (id, timestamp, risk_score, risk_level, indicators_fetched,
                 indicators_failed, latest_data_date, top_risks)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                summary.timestamp.to_rfc3339(),
                summary.risk_score,
                summary.risk_level,
                summary.indicators_fetched as i64,
                summary.indicators_failed as i64,
                summary.latest_data_date.map(|d| d.format("%Y-%m-%d").to_string()),
                top_risks,
            ],
        )?;

        Ok(())
    }

    pub fn load_latest(&self) -> Result<Option<RunSummary>> {
        let row = self
            .conn
            .query_row(
                "SELECT timestamp, risk_score, risk_level, indicators_fetched,
                        indicators_failed, latest_data_date, top_risks
                 FROM last_run WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((timestamp, risk_score, risk_level, fetched, failed, latest, top_risks)) = row
        else {
            return Ok(None);
        };

        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .with_context(|| format!("Invalid stored timestamp: {}", timestamp))?
            .with_timezone(&Utc);
        let latest_data_date = latest
            .map(|s| {
                NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .with_context(|| format!("Invalid stored date: {}", s))
            })
            .transpose()?;
        let top_risks: Vec<TopRisk> =
            serde_json::from_str(&top_risks).context("Invalid stored top risks")?;

        Ok(Some(RunSummary {
            timestamp,
            risk_score,
            risk_level,
            indicators_fetched: fetched.max(0) as usize,
            indicators_failed: failed.max(0) as usize,
            latest_data_date,
            top_risks,
        }))
    }
}

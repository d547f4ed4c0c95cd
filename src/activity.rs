//! Append-only JSONL log of what happened during a run.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct ActivityLog {
    pub path: PathBuf,
    run_id: String,
    file: File,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    run_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl ActivityLog {
    pub fn new(path: &Path, run_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            run_id: run_id.to_string(),
            file,
        })
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            run_id: &self.run_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn restore(&mut self, outcome: &str, login_ts: Option<i64>) -> Result<()> {
        self.log(
            "restore",
            serde_json::json!({ "outcome": outcome, "login_ts": login_ts }),
        )
    }

    pub fn login(&mut self, name: &str, login_ts: i64) -> Result<()> {
        self.log(
            "login",
            serde_json::json!({ "name": name, "login_ts": login_ts }),
        )
    }

    pub fn login_failed(&mut self, name: &str, error: &str) -> Result<()> {
        self.log(
            "login_failed",
            serde_json::json!({ "name": name, "error": error }),
        )
    }

    pub fn logout(&mut self, reason: &str) -> Result<()> {
        self.log("logout", serde_json::json!({ "reason": reason }))
    }

    pub fn search(&mut self, page: u32, total: u64, shown: usize) -> Result<()> {
        self.log(
            "search",
            serde_json::json!({ "page": page, "total": total, "shown": shown }),
        )
    }

    /// Log a match request and the dog it produced
    pub fn matched(&mut self, favorites: usize, dog_id: &str) -> Result<()> {
        self.log(
            "match",
            serde_json::json!({ "favorites": favorites, "dog_id": dog_id }),
        )
    }
}

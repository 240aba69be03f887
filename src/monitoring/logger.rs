use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const HEADER: &str = "computed_at,live_row_date,predicted_price";

/// Append-only CSV record of freshly computed forecasts.
pub struct PredictionLedger {
    log_path: PathBuf,
    write_lock: Mutex<()>,
}

impl PredictionLedger {
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let log_path = log_path.as_ref().to_path_buf();

        // Create CSV file with headers if it doesn't exist
        if !log_path.exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)
                .with_context(|| format!("Failed to create ledger: {}", log_path.display()))?;

            writeln!(file, "{}", HEADER)?;
        }

        Ok(Self {
            log_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Log one computed forecast
    pub fn record(&self, computed_at: DateTime<Utc>, live_row_date: NaiveDate, predicted_price: f64) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open ledger: {}", self.log_path.display()))?;

        writeln!(
            file,
            "{},{},{:.2}",
            computed_at.to_rfc3339(),
            live_row_date,
            predicted_price
        )?;

        Ok(())
    }
}

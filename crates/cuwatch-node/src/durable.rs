//! CSV durable log.
//!
//! One file per run, named `muon_data_YYYYMMDD_HHMM.csv` after the run's
//! start time. The file opens with the calibration header block, followed by
//! one line per event. Writes go through a `BufWriter`; `flush` empties the
//! buffer into the OS and `sync` forces it to disk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use cuwatch_core::{DurableLog, HitEvent, RunCalibration};

/// Durable log failure.
#[derive(Debug, Error)]
pub enum LogError {
    /// Filesystem error
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Log file or data directory
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Record could not be formatted
    #[error("Record formatting failed")]
    Format(#[from] std::fmt::Error),
}

/// Per-run CSV file.
#[derive(Debug)]
pub struct CsvLog {
    writer: BufWriter<File>,
    path: PathBuf,
    line: String,
}

impl CsvLog {
    /// Create the run's file in `dir` and write the header block.
    ///
    /// A second run started within the same minute gets a numbered suffix
    /// instead of overwriting the first.
    pub fn create(
        dir: &Path,
        calibration: &RunCalibration,
        started: DateTime<Utc>,
    ) -> Result<Self, LogError> {
        fs::create_dir_all(dir).map_err(|source| LogError::Io { path: dir.to_path_buf(), source })?;

        let stem = format!("muon_data_{}", started.format("%Y%m%d_%H%M"));
        let mut attempt = 0u32;
        let (file, path) = loop {
            let name = if attempt == 0 {
                format!("{stem}.csv")
            } else {
                format!("{stem}_{attempt}.csv")
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (file, path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(LogError::Io { path, source }),
            }
        };

        let mut header = String::new();
        calibration.write_csv_header(&mut header)?;

        let mut log = Self { writer: BufWriter::new(file), path, line: String::with_capacity(64) };
        log.write(header.as_bytes())?;
        Ok(log)
    }

    /// File this run writes to
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LogError> {
        self.writer.write_all(bytes).map_err(|source| LogError::Io { path: self.path.clone(), source })
    }
}

impl DurableLog for CsvLog {
    type Error = LogError;

    fn append(&mut self, event: &HitEvent) -> Result<(), Self::Error> {
        let mut line = std::mem::take(&mut self.line);
        line.clear();
        event.write_csv(&mut line)?;
        let written = self.write(line.as_bytes());
        self.line = line;
        written
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.writer.flush().map_err(|source| LogError::Io { path: self.path.clone(), source })
    }

    fn sync(&mut self) -> Result<(), Self::Error> {
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|source| LogError::Io { path: self.path.clone(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cuwatch_core::{IsoTimestamp, Role};

    fn calibration() -> RunCalibration {
        RunCalibration::from_baseline(
            800.0,
            5.0,
            1000.0,
            50.0,
            IsoTimestamp::try_from("2024-05-01T12:03:04.000000+00:00").unwrap(),
            Role::Follower,
        )
    }

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 3, 4).unwrap()
    }

    #[test]
    fn test_header_and_events_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = CsvLog::create(dir.path(), &calibration(), started()).unwrap();
        assert_eq!(log.path().file_name().unwrap(), "muon_data_20240501_1203.csv");

        let event = HitEvent {
            sequence: 1,
            sample_value: 3300,
            secondary_sample: 21_000,
            dt_ms: 1234,
            timestamp_ms: 5678,
            wall_clock: None,
            wait_count: 131,
            coincidence: false,
        };
        log.append(&event).unwrap();
        log.append(&HitEvent { sequence: 2, coincidence: true, ..event }).unwrap();
        log.flush().unwrap();
        log.sync().unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "baseline,stddev,threshold,reset_threshold,run_start_time,is_leader",
                "800.0, 5.0, 1800, 850, 2024-05-01T12:03:04.000000+00:00, 0",
                "Muon Count,ADC,temperature_ADC,dt,t,t_wait,coinc",
                "1, 3300, 21000, 1234, 5678, 131, 0",
                "2, 3300, 21000, 1234, 5678, 131, 1",
            ]
        );
    }

    #[test]
    fn test_same_minute_restart_gets_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = CsvLog::create(dir.path(), &calibration(), started()).unwrap();
        let second = CsvLog::create(dir.path(), &calibration(), started()).unwrap();
        assert_ne!(first.path(), second.path());
        assert_eq!(second.path().file_name().unwrap(), "muon_data_20240501_1203_1.csv");
    }

    #[test]
    fn test_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sd").join("runs");
        let log = CsvLog::create(&nested, &calibration(), started()).unwrap();
        assert!(log.path().starts_with(&nested));
    }
}

//! # Status Logging
//!
//! The default status observer: forwards progress notifications to `tracing`
//! and, when configured, appends them to a timestamped status file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::domain::traits::StatusObserver;
use crate::domain::types::StatusLevel;

pub struct LoggingObserver {
    file_path: Option<PathBuf>,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self { file_path: None }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusObserver for LoggingObserver {
    fn notify(&self, level: StatusLevel, message: &str) {
        match level {
            StatusLevel::Error => error!(target: "status", "{}", message),
            StatusLevel::Warn => warn!(target: "status", "{}", message),
            StatusLevel::Info => info!(target: "status", "{}", message),
        }

        if let Some(path) = &self.file_path
            && let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path)
        {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            let tag = match level {
                StatusLevel::Info => "INFO",
                StatusLevel::Warn => "WARN",
                StatusLevel::Error => "ERROR",
            };
            let _ = writeln!(file, "[{}] [{}] {}", timestamp, tag, message);
        }
    }
}

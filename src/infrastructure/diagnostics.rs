use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const LOG_FILE: &str = "commands.log";

pub trait DiagnosticsSink: Send + Sync {
    fn info(&self, scope: &str, message: &str);
    fn error(&self, scope: &str, message: &str);
}

/// Appends one JSON object per line to `<logs_dir>/commands.log`.
#[derive(Debug)]
pub struct JsonLineDiagnostics {
    logs_dir: PathBuf,
    guard: Mutex<()>,
}

impl JsonLineDiagnostics {
    pub fn new(logs_dir: impl AsRef<Path>) -> Self {
        Self {
            logs_dir: logs_dir.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir.join(LOG_FILE)
    }

    fn append(&self, level: &str, scope: &str, message: &str) {
        let Ok(_guard) = self.guard.lock() else {
            return;
        };
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": scope,
            "message": message,
        });

        let _ = fs::create_dir_all(&self.logs_dir);
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
        {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

impl DiagnosticsSink for JsonLineDiagnostics {
    fn info(&self, scope: &str, message: &str) {
        self.append("info", scope, message);
    }

    fn error(&self, scope: &str, message: &str) {
        self.append("error", scope, message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub level: &'static str,
    pub scope: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    entries: Mutex<Vec<DiagnosticEntry>>,
}

impl MemoryDiagnostics {
    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<DiagnosticEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.level == "error")
            .collect()
    }

    fn push(&self, level: &'static str, scope: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(DiagnosticEntry {
                level,
                scope: scope.to_string(),
                message: message.to_string(),
            });
        }
    }
}

impl DiagnosticsSink for MemoryDiagnostics {
    fn info(&self, scope: &str, message: &str) {
        self.push("info", scope, message);
    }

    fn error(&self, scope: &str, message: &str) {
        self.push("error", scope, message);
    }
}

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::diff::diff_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    Full,
    /// First response per path in full, then only changed fields.
    Diffed,
}

pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous: HashMap<String, Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            mode,
            file,
            previous: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, host: &str, method: &str, path: &str, body: Option<&Value>) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "host": host,
            "method": method,
            "path": path,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_command(&mut self, host: &str, action: &str, body: &Value) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "host": host,
            "action": action,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_failure(&mut self, host: &str, path: &str, reason: &str) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "fail",
            "host": host,
            "path": path,
            "reason": reason,
        });
        self.write_line(&entry);
    }

    pub fn log_response(&mut self, host: &str, path: &str, status: u16, body: &Value) {
        let entry = match self.mode {
            MessageLogMode::Full => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "resp",
                "host": host,
                "path": path,
                "status": status,
                "body": body,
            }),
            MessageLogMode::Diffed => {
                let key = format!("{host}{path}");
                let entry = match self.previous.get(&key) {
                    None => json!({
                        "ts": Utc::now().to_rfc3339(),
                        "dir": "resp",
                        "host": host,
                        "path": path,
                        "status": status,
                        "full": true,
                        "body": body,
                    }),
                    Some(prev) => {
                        let mut changes = Vec::new();
                        diff_json(prev, body, "", &mut changes);
                        let change_entries: Vec<Value> = changes
                            .iter()
                            .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                            .collect();
                        json!({
                            "ts": Utc::now().to_rfc3339(),
                            "dir": "resp",
                            "host": host,
                            "path": path,
                            "status": status,
                            "changes": change_entries,
                        })
                    }
                };
                self.previous.insert(key, body.clone());
                entry
            }
        };
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

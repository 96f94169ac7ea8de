//! System snapshot sources
//!
//! The periodic publisher only needs "a map of string fields on demand". The
//! shell-backed source gathers the usual host facts (load, memory, disks,
//! kernel, users, top processes, addresses, uptime) by running small probe
//! commands.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Snapshot payload: field name to value
pub type Snapshot = Map<String, Value>;

/// Failure to gather a snapshot; the periodic publisher skips that tick
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot source unavailable: {0}")]
    Unavailable(String),
}

/// Anything able to produce one snapshot on demand
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn collect(&self) -> Result<Snapshot, SnapshotError>;
}

/// Timeout applied to each probe command
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default probe set: (field, shell command)
pub const DEFAULT_PROBES: &[(&str, &str)] = &[
    ("cpu_mem", "COLUMNS=200 top -b -n1 | head -n 5"),
    ("disk", "df -h"),
    ("os_kernel", "uname -a"),
    (
        "lsb_release",
        "lsb_release -a 2>/dev/null || cat /etc/os-release 2>/dev/null || echo 'N/A'",
    ),
    ("users", "who"),
    ("processes_top", "ps -eo pid,comm,pcpu,pmem --sort=-pcpu | head -n 10"),
    ("network", "ip -o -4 addr show || ifconfig 2>/dev/null"),
    ("uptime", "uptime"),
    ("loadavg", "cat /proc/loadavg"),
];

/// Snapshot source running probe commands through `sh -c`
pub struct ShellSnapshotSource {
    node_id: String,
    probes: Vec<(String, String)>,
    timeout: Duration,
}

impl ShellSnapshotSource {
    /// Source with the default probe set
    pub fn new(node_id: impl Into<String>) -> Self {
        Self::with_probes(
            node_id,
            DEFAULT_PROBES
                .iter()
                .map(|(field, cmd)| (field.to_string(), cmd.to_string())),
        )
    }

    /// Source with a custom probe set
    pub fn with_probes<I>(node_id: impl Into<String>, probes: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            node_id: node_id.into(),
            probes: probes.into_iter().collect(),
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run_probe(&self, command: &str) -> Result<String, String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Err(_) => Err(format!("timed out after {:?}", self.timeout)),
            Ok(Err(e)) => Err(e.to_string()),
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                if output.status.success() {
                    Ok(text)
                } else {
                    Err(format!("{} ({})", text.trim_end(), output.status))
                }
            }
        }
    }
}

#[async_trait]
impl SnapshotSource for ShellSnapshotSource {
    async fn collect(&self) -> Result<Snapshot, SnapshotError> {
        let mut snapshot = Snapshot::new();
        let mut failures = 0usize;

        for (field, command) in &self.probes {
            let value = match self.run_probe(command).await {
                Ok(text) => text,
                Err(reason) => {
                    failures += 1;
                    debug!(field = %field, reason = %reason, "snapshot probe failed");
                    format!("ERR: {}", reason)
                }
            };
            snapshot.insert(field.clone(), Value::String(value));
        }

        if !self.probes.is_empty() && failures == self.probes.len() {
            return Err(SnapshotError::Unavailable(format!(
                "all {} probes failed",
                failures
            )));
        }

        snapshot.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        snapshot.insert("node_id".to_string(), Value::String(self.node_id.clone()));
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probes(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(f, c)| (f.to_string(), c.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_collects_probe_output_and_metadata() {
        let source = ShellSnapshotSource::with_probes("node-a", probes(&[("greeting", "echo hello")]));

        let snapshot = source.collect().await.unwrap();

        assert_eq!(snapshot["greeting"], Value::String("hello\n".to_string()));
        assert_eq!(snapshot["node_id"], Value::String("node-a".to_string()));
        assert!(snapshot["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_failing_probe_reported_inline() {
        let source = ShellSnapshotSource::with_probes(
            "node-a",
            probes(&[("ok", "echo fine"), ("broken", "exit 3")]),
        );

        let snapshot = source.collect().await.unwrap();

        assert!(snapshot["broken"].as_str().unwrap().starts_with("ERR: "));
        assert_eq!(snapshot["ok"], Value::String("fine\n".to_string()));
    }

    #[tokio::test]
    async fn test_all_probes_failing_is_an_error() {
        let source = ShellSnapshotSource::with_probes("node-a", probes(&[("a", "exit 1"), ("b", "exit 2")]));
        assert!(source.collect().await.is_err());
    }

    #[tokio::test]
    async fn test_slow_probe_times_out() {
        let source = ShellSnapshotSource::with_probes("node-a", probes(&[("slow", "sleep 5"), ("fast", "echo ok")]))
            .with_timeout(Duration::from_millis(100));

        let snapshot = source.collect().await.unwrap();
        assert!(snapshot["slow"].as_str().unwrap().contains("timed out"));
    }
}

//! Optional per-event arrival-time logger (spec.md §2 row L), disabled by
//! default to avoid an always-on write path, for offline latency studies
//! rather than an always-running data-plane feature.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One `(event_id, arrival_instant)` observation, appended as a CSV line.
#[derive(Debug, Clone)]
pub struct Arrival {
    pub event_id: String,
    pub arrived_at_unix_millis: u128,
}

impl Arrival {
    pub fn now(event_id: impl Into<String>) -> Self {
        let arrived_at_unix_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self {
            event_id: event_id.into(),
            arrived_at_unix_millis,
        }
    }
}

/// Appends arrival observations to a flat file, off the publish path's hot
/// loop: callers hand observations to an unbounded channel and a background
/// task does the actual file I/O.
#[derive(Clone)]
pub struct ArrivalTracker {
    sender: mpsc::UnboundedSender<Arrival>,
}

impl ArrivalTracker {
    /// Spawns the background writer and returns a handle plus its join
    /// handle. The log file is opened in append mode, created if absent.
    pub fn spawn(path: impl AsRef<Path>) -> io::Result<(Self, JoinHandle<()>)> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let (sender, mut receiver) = mpsc::unbounded_channel::<Arrival>();

        let handle = tokio::spawn(async move {
            while let Some(arrival) = receiver.recv().await {
                let line = format!(
                    "{},{}\n",
                    arrival.event_id, arrival.arrived_at_unix_millis
                );
                if let Err(err) = file.write_all(line.as_bytes()) {
                    tracing::warn!(error = %err, "failed to append arrival tracker record");
                }
            }
        });

        Ok((Self { sender }, handle))
    }

    /// Records an event's arrival. Cheap and non-blocking; silently dropped
    /// if the writer task has already shut down.
    pub fn record(&self, event_id: impl Into<String>) {
        let _ = self.sender.send(Arrival::now(event_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_are_appended_as_csv_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arrivals.csv");
        let (tracker, handle) = ArrivalTracker::spawn(&path).unwrap();

        tracker.record("event-1");
        tracker.record("event-2");
        drop(tracker);
        handle.await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("event-1,"));
        assert!(lines[1].starts_with("event-2,"));
    }

    #[tokio::test]
    async fn reopening_the_log_file_preserves_prior_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arrivals.csv");
        {
            let (tracker, handle) = ArrivalTracker::spawn(&path).unwrap();
            tracker.record("event-1");
            drop(tracker);
            handle.await.unwrap();
        }
        {
            let (tracker, handle) = ArrivalTracker::spawn(&path).unwrap();
            tracker.record("event-2");
            drop(tracker);
            handle.await.unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}

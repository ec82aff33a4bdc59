//! Status reporting for resources being loaded.
//!
//! Every file a project pulls in (project.json, treatments, abundances,
//! pairwise comparisons ...) is announced as [`LoadStatus::Pending`] and then
//! settled as OK, Failed or Missing. The UI layer shows these as a load log;
//! on the command line they simply go to the logger.
use std::sync::Mutex;
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Pending,
    Ok,
    Failed,
    /// resource does not exist (404); fine for optional fields
    Missing,
}

/// Receives `(label, url) -> (status, message?)` updates
pub trait StatusSink: Send + Sync {
    fn report(&self, label: &str, url: &str, status: LoadStatus, message: Option<&str>);
}

/// Forwards status updates to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn report(&self, label: &str, url: &str, status: LoadStatus, message: Option<&str>) {
        let message = message.unwrap_or("");
        match status {
            LoadStatus::Pending => debug!("{label}: loading {url}"),
            LoadStatus::Ok => info!("{label}: loaded {url} {message}"),
            LoadStatus::Missing => warn!("{label}: {url} not found {message}"),
            LoadStatus::Failed => warn!("{label}: failed to load {url}: {message}"),
        }
    }
}

/// One entry of a [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub label: String,
    pub url: String,
    pub status: LoadStatus,
    pub message: Option<String>,
}

/// Keeps every update in memory, in the order received.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<StatusEntry>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink::default()
    }

    pub fn entries(&self) -> Vec<StatusEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// the most recent status reported for `label`
    pub fn last_status(&self, label: &str) -> Option<LoadStatus> {
        self.entries()
            .iter()
            .rev()
            .find(|e| e.label == label)
            .map(|e| e.status)
    }
}

impl StatusSink for RecordingSink {
    fn report(&self, label: &str, url: &str, status: LoadStatus, message: Option<&str>) {
        let entry = StatusEntry {
            label: label.to_string(),
            url: url.to_string(),
            status,
            message: message.map(|m| m.to_string()),
        };
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::{LoadStatus, RecordingSink, StatusSink};

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.report("Treatments", "treatments.json", LoadStatus::Pending, None);
        sink.report("Treatments", "treatments.json", LoadStatus::Ok, Some("3 treatments"));
        sink.report("Aliases", "aliases.txt", LoadStatus::Missing, None);

        let entries = sink.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].message.as_deref(), Some("3 treatments"));
        assert_eq!(sink.last_status("Treatments"), Some(LoadStatus::Ok));
        assert_eq!(sink.last_status("Aliases"), Some(LoadStatus::Missing));
        assert_eq!(sink.last_status("Readme"), None);
    }
}

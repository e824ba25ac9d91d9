use crate::events::NewEvent;
use crate::events::store::EventStore;
use crate::source::{AlertSource, TimeWindow};
use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{error, info, warn};

const OPEN_STATE: &str = "open";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub fetched: usize,
    pub open: usize,
    /// Newly stored records; already-known ids are not counted.
    pub stored: usize,
    pub skipped_without_id: usize,
    pub aborted: bool,
}

/// Pulls alerts for `window`, keeps the open ones and stores each unseen id as
/// RECEIVED. Failures are logged and end ingestion for this cycle.
pub fn ingest(source: &dyn AlertSource, store: &EventStore, window: &TimeWindow) -> IngestReport {
    match try_ingest(source, store, window) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %format!("{e:#}"), "ingestion aborted for this cycle");
            IngestReport {
                aborted: true,
                ..IngestReport::default()
            }
        }
    }
}

fn try_ingest(
    source: &dyn AlertSource,
    store: &EventStore,
    window: &TimeWindow,
) -> Result<IngestReport> {
    let events = source.fetch_events(window).context("fetch alerts")?;
    let mut report = IngestReport {
        fetched: events.len(),
        ..IngestReport::default()
    };
    info!(fetched = report.fetched, "fetched alerts from source");

    let mut accepted = Vec::new();
    for event in events.into_iter().filter(is_open) {
        report.open += 1;
        match NewEvent::from_source(event) {
            Some(ev) => accepted.push(ev),
            None => {
                report.skipped_without_id += 1;
                warn!("open alert has no usable eventId; skipping");
            }
        }
    }

    report.stored = store.insert_many(&accepted).context("store open alerts")?;
    info!(
        open = report.open,
        stored = report.stored,
        already_known = accepted.len() - report.stored,
        "stored open alerts"
    );
    Ok(report)
}

fn is_open(event: &Value) -> bool {
    event.get("state").and_then(Value::as_str) == Some(OPEN_STATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventStatus;
    use anyhow::bail;
    use serde_json::json;
    use tempfile::tempdir;

    struct FixedSource(Vec<Value>);

    impl AlertSource for FixedSource {
        fn fetch_events(&self, _window: &TimeWindow) -> Result<Vec<Value>> {
            Ok(self.0.clone())
        }
    }

    struct DownSource;

    impl AlertSource for DownSource {
        fn fetch_events(&self, _window: &TimeWindow) -> Result<Vec<Value>> {
            bail!("connection refused")
        }
    }

    #[test]
    fn stores_only_open_alerts_with_ids() {
        let tmp = tempdir().unwrap();
        let store = EventStore::open(&tmp.path().join("events.db")).unwrap();
        let source = FixedSource(vec![
            json!({"eventId": "e1", "state": "open"}),
            json!({"eventId": "e2", "state": "closed"}),
            json!({"state": "open"}),
            json!({"eventId": "e3", "state": "OPEN"}),
        ]);

        let report = ingest(&source, &store, &TimeWindow::ending_now(60_000));
        assert_eq!(
            report,
            IngestReport {
                fetched: 4,
                open: 2,
                stored: 1,
                skipped_without_id: 1,
                aborted: false,
            }
        );
        assert_eq!(store.get("e1").unwrap().unwrap().status, EventStatus::Received);
        assert!(store.get("e2").unwrap().is_none());
    }

    #[test]
    fn fetch_failure_aborts_without_error() {
        let tmp = tempdir().unwrap();
        let store = EventStore::open(&tmp.path().join("events.db")).unwrap();

        let report = ingest(&DownSource, &store, &TimeWindow::ending_now(60_000));
        assert!(report.aborted);
        assert!(store.list_pending().unwrap().is_empty());
    }
}

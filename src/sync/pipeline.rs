use crate::auth::CredentialGuard;
use crate::events::store::EventStore;
use crate::events::{EventRecord, EventStatus};
use crate::mapping::{MappingSpec, resolve};
use crate::target::EventSink;
use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{error, info};

pub const DEFAULT_BATCH_SIZE: usize = 8500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub leader: String,
    pub event_ids: Vec<String>,
    pub status: EventStatus,
    pub created: Option<usize>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub batches: Vec<BatchReport>,
}

impl SyncReport {
    /// Per-event outcome, in submission order.
    pub fn outcomes(&self) -> impl Iterator<Item = (&str, EventStatus)> + '_ {
        self.batches
            .iter()
            .flat_map(|b| b.event_ids.iter().map(move |id| (id.as_str(), b.status)))
    }

    pub fn status_of(&self, event_id: &str) -> Option<EventStatus> {
        self.outcomes()
            .find(|(id, _)| *id == event_id)
            .map(|(_, status)| status)
    }

    pub fn count(&self, status: EventStatus) -> usize {
        self.outcomes().filter(|(_, s)| *s == status).count()
    }
}

/// Delivers every RECEIVED or FAILED record in batches of `batch_size`.
/// Only the current batch is loaded from the store.
///
/// Each batch is all-or-nothing: it becomes CREATED only when the sink reports
/// exactly one created resource per submitted event. Outcomes are committed
/// after each batch. Only store failures and a missing credential end the run
/// early; batches already committed stay committed.
pub fn synchronize(
    store: &EventStore,
    spec: &MappingSpec,
    sink: &dyn EventSink,
    guard: &CredentialGuard,
    batch_size: usize,
) -> Result<SyncReport> {
    let batch_size = batch_size.max(1);
    let mut report = SyncReport::default();
    let mut after = 0;

    loop {
        let batch = store
            .pending_after(after, Some(batch_size))
            .context("select pending events")?;
        let Some(last) = batch.last() else {
            break;
        };
        after = last.seq;
        if report.batches.is_empty() {
            info!(batch_size, "delivering pending events");
        }

        let token = guard
            .get_valid_token()
            .context("obtain bearer token for target API")?;
        let outcome = deliver_batch(spec, sink, &token, &batch);
        store
            .mark_status(&outcome.event_ids, outcome.status)
            .with_context(|| format!("record outcome of batch led by {}", outcome.leader))?;
        report.batches.push(outcome);
    }

    if report.batches.is_empty() {
        info!("no pending events to deliver");
        return Ok(report);
    }
    info!(
        created = report.count(EventStatus::Created),
        failed = report.count(EventStatus::Failed),
        batches = report.batches.len(),
        "delivery finished"
    );
    Ok(report)
}

fn deliver_batch(
    spec: &MappingSpec,
    sink: &dyn EventSink,
    token: &str,
    batch: &[EventRecord],
) -> BatchReport {
    let event_ids = batch.iter().map(|r| r.event_id.clone()).collect::<Vec<_>>();
    let leader = event_ids.first().cloned().unwrap_or_default();
    let payloads = batch
        .iter()
        .map(|r| resolve(&r.event_payload, spec))
        .collect::<Vec<Value>>();
    let sent = payloads.len();

    let (status, created, err) = match sink.submit(token, &payloads) {
        Ok(resp) if resp.created() == sent => {
            info!(leader = %leader, sent, "batch delivered");
            (EventStatus::Created, Some(resp.created()), None)
        }
        Ok(resp) => {
            let created = resp.created();
            error!(
                leader = %leader,
                sent,
                created,
                "created count mismatch; marking whole batch failed"
            );
            (
                EventStatus::Failed,
                Some(created),
                Some(format!("sent {sent}, created {created}")),
            )
        }
        Err(e) => {
            let msg = format!("{e:#}");
            error!(leader = %leader, sent, error = %msg, "batch submission failed");
            (EventStatus::Failed, None, Some(msg))
        }
    };

    BatchReport {
        leader,
        event_ids,
        status,
        created,
        error: err,
    }
}

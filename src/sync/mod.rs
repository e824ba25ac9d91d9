pub mod ingest;
pub mod pipeline;

use crate::auth::CredentialGuard;
use crate::auth::http::HttpTokenRefresher;
use crate::config::AppConfig;
use crate::events::store::EventStore;
use crate::source::http::HttpAlertSource;
use crate::source::{AlertSource, TimeWindow};
use crate::target::EventSink;
use crate::target::http::HttpEventSink;
use ingest::IngestReport;
use pipeline::SyncReport;
use tracing::{error, info, info_span};
use uuid::Uuid;

/// The external services one cycle talks to.
pub struct Clients {
    pub source: Box<dyn AlertSource>,
    pub sink: Box<dyn EventSink>,
    pub guard: CredentialGuard,
}

impl Clients {
    pub fn http(cfg: &AppConfig) -> Self {
        let refresher = HttpTokenRefresher::new(
            &cfg.target.refresh_url,
            &cfg.target.access_key,
            &cfg.target.access_secret_key,
            cfg.target.timeout,
        );
        Self {
            source: Box::new(HttpAlertSource::new(
                &cfg.source.url,
                &cfg.source.api_token,
                cfg.source.timeout,
            )),
            sink: Box::new(HttpEventSink::new(&cfg.target.url, cfg.target.timeout)),
            guard: CredentialGuard::new(&cfg.target.token_file, Box::new(refresher)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    Full,
    IngestOnly,
    SyncOnly,
}

impl CycleMode {
    fn ingests(self) -> bool {
        matches!(self, CycleMode::Full | CycleMode::IngestOnly)
    }

    fn synchronizes(self) -> bool {
        matches!(self, CycleMode::Full | CycleMode::SyncOnly)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle_id: String,
    pub ingest: Option<IngestReport>,
    pub sync: Option<SyncReport>,
    pub error: Option<String>,
}

/// One scheduled invocation: ingest, then deliver.
///
/// Never fails. Every error is logged and recorded in the report so the
/// caller can always exit normally.
pub fn run_cycle(cfg: &AppConfig, clients: &Clients, mode: CycleMode) -> CycleReport {
    let cycle_id = Uuid::new_v4().to_string();
    let _span = info_span!("cycle", cycle_id = %cycle_id).entered();
    info!(mode = ?mode, "cycle started");

    let mut report = CycleReport {
        cycle_id,
        ..CycleReport::default()
    };

    let store = match EventStore::open(&cfg.database.path) {
        Ok(store) => store,
        Err(e) => {
            let msg = format!("{e:#}");
            error!(error = %msg, "cannot open event store");
            report.error = Some(msg);
            return report;
        }
    };

    if mode.ingests() {
        let window = TimeWindow::ending_now(cfg.source.window_size_ms);
        report.ingest = Some(ingest::ingest(clients.source.as_ref(), &store, &window));
    }

    if mode.synchronizes() {
        match pipeline::synchronize(
            &store,
            &cfg.mapping,
            clients.sink.as_ref(),
            &clients.guard,
            cfg.target.batch_size,
        ) {
            Ok(sync) => report.sync = Some(sync),
            Err(e) => {
                let msg = format!("{e:#}");
                error!(error = %msg, "synchronization aborted");
                report.error = Some(msg);
            }
        }
    }

    info!("cycle complete");
    report
}

mod config;
use config::LiveMonitorConfig;
use std::io::Write;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use vigihome_core::live::{LiveContext, NoticeLevel, WsTransport};
use vigihome_core::summary::{health_status_watcher, monitoring_watcher};
use vigihome_core::{
    init_tracing, ActivityFeed, AlertFeed, AlertSink, Anomaly, ApiClient, BackendSource, Clock,
    LinkState, LiveMode, LiveView, Notice, Role, SystemClock, TimelineFeed, ViewState,
};

/// Prints notices to stderr and rings the bell for alarms
struct TerminalSink {
    bell: bool,
}

impl AlertSink for TerminalSink {
    fn alarm(&self, anomaly: &Anomaly) {
        let mut err = std::io::stderr();
        if self.bell {
            let _ = write!(err, "\x07");
        }
        let _ = writeln!(
            err,
            "!! HIGH PRIORITY  {}  {}",
            anomaly.at.format("%H:%M"),
            anomaly.activity_name
        );
    }

    fn notify(&self, notice: Notice) {
        let tag = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => " ok ",
            NoticeLevel::Error => "fail",
        };
        eprintln!("[{}] {}", tag, notice.message);
    }

    fn link_changed(&self, link: LinkState, mode: LiveMode) {
        info!(target: "live_monitor", link = ?link, mode = ?mode, "Indicator");
    }
}

/// Log one line per published state change until the view goes away
fn print_changes<T: Clone + Send + Sync + 'static>(
    label: &'static str,
    mut rx: watch::Receiver<ViewState<T>>,
    describe: fn(&T) -> String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            let head = state
                .items
                .first()
                .map(describe)
                .unwrap_or_else(|| "-".to_string());
            info!(
                target: "live_monitor",
                view = label,
                date = %state.date,
                mode = ?state.mode,
                count = state.items.len(),
                loading = state.loading,
                error = ?state.error,
                latest = %head,
                "View updated"
            );
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    init_tracing("info,vigihome_core=info,live_monitor=info");

    info!(target: "live_monitor", "Starting VigiHome live monitor");

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = LiveMonitorConfig::load();
    let api = ApiClient::new(&cfg.live);

    let session = match &cfg.credentials {
        Some(creds) => Some(api.login(&creds.email, &creds.password).await?),
        None => {
            warn!(
                target: "live_monitor",
                "No credentials (VIGIHOME_EMAIL / VIGIHOME_PASSWORD); continuing unauthenticated"
            );
            None
        }
    };
    let role = session.as_ref().map(|s| s.role).unwrap_or(Role::Caregiver);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ctx = LiveContext {
        transport: Arc::new(WsTransport::new(cfg.live.ws_url.clone())),
        sink: Arc::new(TerminalSink { bell: cfg.bell }),
        clock: Arc::clone(&clock),
        config: cfg.live.clone(),
    };
    let source = Arc::new(BackendSource::new(api.clone(), session.clone()));
    let today = clock.today();

    let mut printers = Vec::new();
    let mut activity_view = None;
    let mut alert_view = None;
    let mut timeline_view = None;

    if role == Role::Dependent {
        let view = LiveView::spawn(TimelineFeed::new(source.clone()), ctx.clone(), today);
        printers.push(print_changes("timeline", view.subscribe(), |a| {
            format!("{} {}", a.at.format("%H:%M"), a.category)
        }));
        timeline_view = Some(view);
    } else {
        let activities = LiveView::spawn(ActivityFeed::new(source.clone()), ctx.clone(), today);
        printers.push(print_changes("activities", activities.subscribe(), |a| {
            format!("{} {} ({:?})", a.at.format("%H:%M"), a.category, a.origin)
        }));
        activity_view = Some(activities);

        let alerts = LiveView::spawn(AlertFeed::new(source.clone()), ctx.clone(), today);
        printers.push(print_changes("alerts", alerts.subscribe(), |a| {
            format!("{} {} [{:?}]", a.at.format("%H:%M"), a.activity_name, a.priority)
        }));
        alert_view = Some(alerts);
    }

    // Summaries are dropped with main; dropping a watcher stops its poller
    let _monitoring = cfg.summaries.then(|| {
        monitoring_watcher(api.clone(), session.clone(), &cfg.live, Arc::clone(&clock))
    });
    let _health = match (&session, cfg.summaries) {
        (Some(s), true) if s.role == Role::Caregiver => Some(health_status_watcher(
            api.clone(),
            s.clone(),
            &cfg.live,
            Arc::clone(&clock),
        )),
        _ => None,
    };

    info!(target: "live_monitor", role = ?role, date = %today, "Live monitor running. Press Ctrl+C to exit.");
    signal::ctrl_c().await?;
    info!(target: "live_monitor", "Shutting down");

    if let Some(view) = activity_view {
        if let Err(e) = view.shutdown().await {
            error!(target: "live_monitor", error = %e, "Activity view shutdown failed");
        }
    }
    if let Some(view) = alert_view {
        if let Err(e) = view.shutdown().await {
            error!(target: "live_monitor", error = %e, "Alert view shutdown failed");
        }
    }
    if let Some(view) = timeline_view {
        if let Err(e) = view.shutdown().await {
            error!(target: "live_monitor", error = %e, "Timeline view shutdown failed");
        }
    }
    for printer in printers {
        printer.abort();
    }
    if let Some(session) = session {
        api.logout(session);
    }

    Ok(())
}

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

pub(crate) struct Metric {
    pub name: &'static str,
    description: &'static str,
}

pub(crate) const COUNTERS: [Metric; 3] = [
    REBALANCE_TOTAL,
    REBALANCE_FAILURES_TOTAL,
    NOTIFICATION_FAILURES_TOTAL,
];
pub(crate) const GAUGES: [Metric; 5] = [
    ASSIGNMENT_VERSION,
    ASSIGNMENT_COVERAGE,
    ASSIGNMENT_IMBALANCE,
    ACCOUNT_CHANNELS,
    ACCOUNTS_NOTIFIED,
];
pub(crate) const HISTOGRAMS: [Metric; 1] = [REBALANCE_DURATION_SECONDS];

// Rebalance cycle -------------------------

pub(crate) const REBALANCE_TOTAL: Metric = Metric {
    name: "warden_rebalance_total",
    description: "Total number of committed rebalances, by trigger (scheduled/operator)",
};

pub(crate) const REBALANCE_FAILURES_TOTAL: Metric = Metric {
    name: "warden_rebalance_failures_total",
    description: "Rebalances aborted before commit (membership unreadable, store unavailable)",
};

pub(crate) const REBALANCE_DURATION_SECONDS: Metric = Metric {
    name: "warden_rebalance_duration_seconds",
    description: "Duration of a full rebalance cycle in seconds",
};

// Assignment -------------------------------

pub(crate) const ASSIGNMENT_VERSION: Metric = Metric {
    name: "warden_assignment_version",
    description: "Version of the last committed assignment",
};

pub(crate) const ASSIGNMENT_COVERAGE: Metric = Metric {
    name: "warden_assignment_coverage",
    description: "Fraction of the channel universe assigned to an eligible account",
};

pub(crate) const ASSIGNMENT_IMBALANCE: Metric = Metric {
    name: "warden_assignment_imbalance",
    description: "Spread between the most and least loaded eligible accounts",
};

pub(crate) const ACCOUNT_CHANNELS: Metric = Metric {
    name: "warden_account_channels",
    description: "Number of channels assigned to an account",
};

// Notifications ---------------------------

pub(crate) const ACCOUNTS_NOTIFIED: Metric = Metric {
    name: "warden_accounts_notified",
    description: "Accounts notified after the last committed rebalance",
};

pub(crate) const NOTIFICATION_FAILURES_TOTAL: Metric = Metric {
    name: "warden_notification_failures_total",
    description: "Reload signals that could not be published (recovered by listener polling)",
};

/// Installs the Prometheus exporter when an address is configured and describes
/// every coordinator metric.
pub fn init_metrics(prom_addr: Option<std::net::SocketAddr>) -> Result<()> {
    info!("initializing metrics exporter");

    if let Some(addr) = prom_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus recorder")?;
        info!(%addr, "prometheus exporter listening");
    }

    register_coordinator_metrics();
    Ok(())
}

/// Describes the coordinator metrics against the installed recorder.
fn register_coordinator_metrics() {
    for name in COUNTERS {
        register_counter(name)
    }

    for name in GAUGES {
        register_gauge(name)
    }

    for name in HISTOGRAMS {
        register_histogram(name)
    }
}

/// Registers a counter with the given name.
fn register_counter(metric: Metric) {
    metrics::describe_counter!(metric.name, metric.description);
    let _counter = metrics::counter!(metric.name);
}

/// Registers a gauge with the given name.
fn register_gauge(metric: Metric) {
    metrics::describe_gauge!(metric.name, metric.description);
    let _gauge = metrics::gauge!(metric.name);
}

/// Registers a histogram with the given name.
fn register_histogram(metric: Metric) {
    metrics::describe_histogram!(metric.name, metric.description);
    let _histogram = metrics::histogram!(metric.name);
}

pub(crate) struct Metric {
    pub name: &'static str,
    description: &'static str,
}

pub(crate) const COUNTERS: [Metric; 4] = [
    LISTENER_EVENTS_FORWARDED_TOTAL,
    LISTENER_EVENTS_DROPPED_TOTAL,
    LISTENER_RELOADS_TOTAL,
    LISTENER_RELOAD_FAILURES_TOTAL,
];
pub(crate) const GAUGES: [Metric; 2] = [LISTENER_ALLOWED_CHANNELS, LISTENER_APPLIED_VERSION];

// Event gate
pub(crate) const LISTENER_EVENTS_FORWARDED_TOTAL: Metric = Metric {
    name: "warden_listener_events_forwarded_total",
    description: "Events for allowed channels forwarded downstream",
};

pub(crate) const LISTENER_EVENTS_DROPPED_TOTAL: Metric = Metric {
    name: "warden_listener_events_dropped_total",
    description: "Events dropped because their channel is not assigned to this account",
};

// Assignment reloads
pub(crate) const LISTENER_RELOADS_TOTAL: Metric = Metric {
    name: "warden_listener_reloads_total",
    description: "Assignment reads performed by the listener, by trigger",
};

pub(crate) const LISTENER_RELOAD_FAILURES_TOTAL: Metric = Metric {
    name: "warden_listener_reload_failures_total",
    description: "Assignment reads that failed and were retried with backoff",
};

pub(crate) const LISTENER_ALLOWED_CHANNELS: Metric = Metric {
    name: "warden_listener_allowed_channels",
    description: "Size of the allowed channel set currently applied",
};

pub(crate) const LISTENER_APPLIED_VERSION: Metric = Metric {
    name: "warden_listener_applied_version",
    description: "Assignment version currently applied by the listener",
};

/// Registers the listener metrics on the installed recorder.
///
/// Processes embedding a listener call this once after installing their exporter.
pub fn register_listener_metrics() {
    for metric in COUNTERS {
        register_counter(metric)
    }

    for metric in GAUGES {
        register_gauge(metric)
    }
}

fn register_counter(metric: Metric) {
    metrics::describe_counter!(metric.name, metric.description);
    let _counter = metrics::counter!(metric.name);
}

fn register_gauge(metric: Metric) {
    metrics::describe_gauge!(metric.name, metric.description);
    let _gauge = metrics::gauge!(metric.name);
}

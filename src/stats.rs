//! Process-wide connection counters and the stathost status page.
//!
//! Grounded on tinyproxy's `stats.c` (`update_stats`/`showstats`,
//! referenced from the stats page). Counters are shared read-mostly
//! atomic state across per-connection tasks via `Arc<...>`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::common::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Open,
    Close,
    Denied,
    Refused,
    BadConn,
}

#[derive(Debug, Default)]
pub struct Stats {
    open: AtomicU64,
    close: AtomicU64,
    denied: AtomicU64,
    refused: AtomicU64,
    bad_conn: AtomicU64,
    started_at: Option<u64>,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Stats {
            started_at: Some(now_secs()),
            ..Default::default()
        })
    }

    pub fn update(&self, kind: StatKind) {
        let counter = match kind {
            StatKind::Open => &self.open,
            StatKind::Close => &self.close,
            StatKind::Denied => &self.denied,
            StatKind::Refused => &self.refused,
            StatKind::BadConn => &self.bad_conn,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Renders the stathost HTML status page (tinyproxy `showstats`).
    pub fn render_page(&self, config: &Config) -> String {
        let uptime = now_secs().saturating_sub(self.started_at.unwrap_or_else(now_secs));
        format!(
            "<html><head><title>{pkg} Stats</title></head><body>\n\
             <h1>{pkg} {ver}</h1>\n\
             <table>\n\
             <tr><td>Uptime</td><td>{uptime}s</td></tr>\n\
             <tr><td>Opened connections</td><td>{open}</td></tr>\n\
             <tr><td>Closed connections</td><td>{close}</td></tr>\n\
             <tr><td>Denied connections</td><td>{denied}</td></tr>\n\
             <tr><td>Refused connections</td><td>{refused}</td></tr>\n\
             <tr><td>Bad connections</td><td>{bad_conn}</td></tr>\n\
             </table></body></html>\r\n",
            pkg = env!("CARGO_PKG_NAME"),
            ver = env!("CARGO_PKG_VERSION"),
            uptime = uptime,
            open = self.open.load(Ordering::Relaxed),
            close = self.close.load(Ordering::Relaxed),
            denied = self.denied.load(Ordering::Relaxed),
            refused = self.refused.load(Ordering::Relaxed),
            bad_conn = self.bad_conn.load(Ordering::Relaxed),
        )
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::Config;

    #[test]
    fn counters_accumulate_independently() {
        let stats = Stats::new();
        stats.update(StatKind::Open);
        stats.update(StatKind::Open);
        stats.update(StatKind::Denied);
        assert_eq!(stats.open.load(Ordering::Relaxed), 2);
        assert_eq!(stats.denied.load(Ordering::Relaxed), 1);
        assert_eq!(stats.close.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn render_page_contains_counter_values() {
        let stats = Stats::new();
        stats.update(StatKind::BadConn);
        let page = stats.render_page(&Config::default());
        assert!(page.contains("Bad connections"));
        assert!(page.contains("<td>1</td>"));
    }
}

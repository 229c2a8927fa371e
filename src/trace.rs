//! Per-handler timing.
//!
//! While the chain runs, each traced handler appends its record *before* it
//! runs and stores its elapsed time *after* it returns, so a record's duration
//! first covers every handler downstream of it as well. Once the chain has
//! fully unwound, [`TraceInfos::from_cumulative`] subtracts each successor's
//! duration from its predecessor, leaving exclusive self-time:
//!
//! ```text
//! recorded (cumulative)   a: 10ms   b: 7ms   c: 2ms
//! self-time               a:  3ms   b: 5ms   c: 2ms    (sum = a's cumulative)
//! ```

use std::fmt::Write as _;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use http::header::HeaderName;

/// `Server-Timing`, which `http` has no constant for.
pub const SERVER_TIMING: HeaderName = HeaderName::from_static("server-timing");

/// One handler's timing contribution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceInfo {
    pub name: Arc<str>,
    pub duration: Duration,
}

/// Trace records of one request, in execution order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceInfos(Vec<TraceInfo>);

impl TraceInfos {
    /// Converts cumulative durations to self-time. The last record keeps its
    /// value, it has nothing downstream.
    pub(crate) fn from_cumulative(mut records: Vec<TraceInfo>) -> Self {
        for i in 0..records.len().saturating_sub(1) {
            let downstream = records[i + 1].duration;
            records[i].duration = records[i].duration.saturating_sub(downstream);
        }
        Self(records)
    }

    /// Sum of every record's duration.
    pub fn total(&self) -> Duration {
        self.0.iter().map(|t| t.duration).sum()
    }

    pub fn into_inner(self) -> Vec<TraceInfo> { self.0 }

    /// Renders the records as a `Server-Timing` header value.
    ///
    /// ```rust
    /// # use std::time::Duration;
    /// # use catena::{TraceInfo, TraceInfos};
    /// let infos = TraceInfos::from(vec![
    ///     TraceInfo { name: "a".into(), duration: Duration::from_nanos(1_500_000) },
    ///     TraceInfo { name: "b".into(), duration: Duration::from_nanos(900) },
    /// ]);
    /// assert_eq!(infos.server_timing("t-"), r#"t-0;dur=1.50;desc="a",t-1;dur=0;desc="b""#);
    /// ```
    pub fn server_timing(&self, prefix: &str) -> String {
        let mut out = String::with_capacity(30 * self.0.len());
        for (i, info) in self.0.iter().enumerate() {
            if i != 0 {
                out.push(',');
            }
            let _ = write!(
                out,
                "{prefix}{i};dur={};desc=\"{}\"",
                format_ms(info.duration),
                info.name,
            );
        }
        out
    }
}

/// Milliseconds with at most two truncated decimals; anything under one
/// microsecond is `"0"` and the decimals are dropped below 10µs.
pub(crate) fn format_ms(d: Duration) -> String {
    let ns = d.as_nanos();
    if ns < 1_000 {
        return "0".to_owned();
    }
    let ms = ns / 1_000_000;
    let micros = (ns % 1_000_000) / 1_000;
    match micros {
        0..=9 => ms.to_string(),
        10..=99 => format!("{ms}.0{}", micros / 10),
        _ => format!("{ms}.{}", micros / 10),
    }
}

impl From<Vec<TraceInfo>> for TraceInfos {
    fn from(records: Vec<TraceInfo>) -> Self { Self(records) }
}

impl Deref for TraceInfos {
    type Target = [TraceInfo];

    fn deref(&self) -> &[TraceInfo] { &self.0 }
}

impl<'a> IntoIterator for &'a TraceInfos {
    type Item = &'a TraceInfo;
    type IntoIter = std::slice::Iter<'a, TraceInfo>;

    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

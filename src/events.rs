//! Sub-request observability events

use serde::Serialize;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Outcome of a cache lookup or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Miss,
    Hit,
    Stale,
    Put,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheStatus::Miss => "MISS",
            CacheStatus::Hit => "HIT",
            CacheStatus::Stale => "STALE",
            CacheStatus::Put => "PUT",
        })
    }
}

/// Caller-supplied context attached to events
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DebugInfo {
    /// Where the sub-request was issued from
    pub stack_line: Option<String>,
    /// GraphQL document, when the sub-request is a query
    pub graphql: Option<String>,
}

/// One sub-request as seen by the cache
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubrequestEvent {
    /// Hashed key
    pub key: String,
    /// Human-readable form of the key
    pub descriptor: String,
    /// `None` when the request bypassed the cache entirely
    pub status: Option<CacheStatus>,
    pub start_time: SystemTime,
    /// Whether background work is awaited by the host
    pub deferred: bool,
    pub debug_info: Option<DebugInfo>,
}

/// Receiver of sub-request events
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: SubrequestEvent);
}

impl<F> EventSink for F
where
    F: Fn(SubrequestEvent) + Send + Sync + 'static,
{
    fn emit(&self, event: SubrequestEvent) {
        self(event)
    }
}

/// Log the event and hand it to the sink; a panicking sink is contained.
pub(crate) fn emit(sink: Option<&Arc<dyn EventSink>>, event: SubrequestEvent) {
    debug!(
        "Sub-request {} status={} key={}",
        event.descriptor,
        event
            .status
            .map_or_else(|| "NONE".to_owned(), |s| s.to_string()),
        event.key
    );

    if let Some(sink) = sink
        && catch_unwind(AssertUnwindSafe(|| sink.emit(event))).is_err()
    {
        warn!("Event sink panicked; event dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn event(status: Option<CacheStatus>) -> SubrequestEvent {
        SubrequestEvent {
            key: "abc".to_owned(),
            descriptor: "products".to_owned(),
            status,
            start_time: SystemTime::UNIX_EPOCH,
            deferred: false,
            debug_info: None,
        }
    }

    #[test]
    fn test_status_renders_uppercase() {
        assert_eq!(CacheStatus::Stale.to_string(), "STALE");
        assert_eq!(
            serde_json::to_string(&CacheStatus::Put).expect("serialize"),
            "\"PUT\""
        );
    }

    #[test]
    fn test_closure_sink_receives_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: Arc<dyn EventSink> = Arc::new(move |e: SubrequestEvent| {
            seen_clone.lock().expect("lock").push(e.status);
        });

        emit(Some(&sink), event(Some(CacheStatus::Hit)));
        emit(Some(&sink), event(None));

        assert_eq!(
            *seen.lock().expect("lock"),
            vec![Some(CacheStatus::Hit), None]
        );
    }

    struct PanickingSink;

    impl EventSink for PanickingSink {
        fn emit(&self, _event: SubrequestEvent) {
            panic!("sink failure");
        }
    }

    #[test]
    fn test_panicking_sink_is_contained() {
        let sink: Arc<dyn EventSink> = Arc::new(PanickingSink);
        emit(Some(&sink), event(Some(CacheStatus::Miss)));
        emit(None, event(Some(CacheStatus::Miss)));
    }
}

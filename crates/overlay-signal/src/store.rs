//! Signaling and telemetry stores
//!
//! Each store serializes readers and writers behind its own mutex. Values
//! are opaque JSON and live for the lifetime of the process.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use overlay_core::DEFAULT_TELEMETRY_WINDOW_MS;

#[derive(Debug, Default)]
struct SignalingRecord {
    offer: Option<Value>,
    answer: Option<Value>,
}

/// The single offer/answer pair in flight
#[derive(Debug, Default)]
pub struct SignalingStore {
    record: Mutex<SignalingRecord>,
}

impl SignalingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current offer, if any
    pub fn offer(&self) -> Option<Value> {
        self.record.lock().offer.clone()
    }

    /// Current answer, if any
    pub fn answer(&self) -> Option<Value> {
        self.record.lock().answer.clone()
    }

    /// Replace the offer and discard the answer negotiated against the old one
    pub fn store_offer(&self, offer: Value) {
        let mut record = self.record.lock();
        record.offer = present(offer);
        record.answer = None;
        debug!("offer stored, answer cleared");
    }

    /// Replace the answer; the offer is left untouched
    pub fn store_answer(&self, answer: Value) {
        self.record.lock().answer = present(answer);
        debug!("answer stored");
    }
}

/// JSON `null` is stored as absence
fn present(value: Value) -> Option<Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}

/// A fresh telemetry sample
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetrySnapshot {
    pub data: Value,
    /// Unix seconds at which the sample was stored
    pub timestamp: f64,
}

#[derive(Debug)]
struct TelemetryRecord {
    data: Value,
    timestamp: f64,
    received: Instant,
}

/// Latest telemetry sample with a freshness window
#[derive(Debug)]
pub struct TelemetryStore {
    record: Mutex<Option<TelemetryRecord>>,
    window: Duration,
}

impl TelemetryStore {
    /// Create a store with the default 5 second window
    pub fn new() -> Self {
        Self::with_window(Duration::from_millis(DEFAULT_TELEMETRY_WINDOW_MS))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            record: Mutex::new(None),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Overwrite the stored sample, returning its Unix timestamp
    pub fn store(&self, data: Value) -> f64 {
        let timestamp = unix_now();
        *self.record.lock() = Some(TelemetryRecord {
            data,
            timestamp,
            received: Instant::now(),
        });
        debug!("telemetry stored at {:.3}", timestamp);
        timestamp
    }

    /// The stored sample if it is younger than the window
    pub fn latest(&self) -> Option<TelemetrySnapshot> {
        self.latest_at(Instant::now())
    }

    /// Same as [`latest`](Self::latest), evaluated at `now`
    pub fn latest_at(&self, now: Instant) -> Option<TelemetrySnapshot> {
        let record = self.record.lock();
        let record = record.as_ref()?;

        if now.saturating_duration_since(record.received) < self.window {
            Some(TelemetrySnapshot {
                data: record.data.clone(),
                timestamp: record.timestamp,
            })
        } else {
            None
        }
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_empty_stores() {
        let signaling = SignalingStore::new();
        assert!(signaling.offer().is_none());
        assert!(signaling.answer().is_none());

        let telemetry = TelemetryStore::new();
        assert_eq!(telemetry.window(), Duration::from_secs(5));
        assert!(telemetry.latest().is_none());
    }

    #[test]
    fn test_default_window_matches_config_default() {
        let configured = overlay_core::ApiConfig::default().telemetry_window();
        assert_eq!(TelemetryStore::new().window(), configured);
        assert_eq!(TelemetryStore::default().window(), configured);
    }

    #[test]
    fn test_offer_answer_transitions() {
        let store = SignalingStore::new();

        store.store_offer(json!("A"));
        store.store_answer(json!("B"));
        assert_eq!(store.offer(), Some(json!("A")));
        assert_eq!(store.answer(), Some(json!("B")));

        // Answering leaves the offer alone
        store.store_answer(json!("B2"));
        assert_eq!(store.offer(), Some(json!("A")));

        // A new offer invalidates the answer
        store.store_offer(json!("C"));
        assert_eq!(store.offer(), Some(json!("C")));
        assert!(store.answer().is_none());
    }

    #[test]
    fn test_repeated_reads_are_stable() {
        let store = SignalingStore::new();
        store.store_offer(json!({"sdp": "v=0"}));
        let first = store.offer();
        for _ in 0..10 {
            assert_eq!(store.offer(), first);
        }
    }

    #[test]
    fn test_null_clears_slot() {
        let store = SignalingStore::new();
        store.store_offer(json!("A"));
        store.store_offer(Value::Null);
        assert!(store.offer().is_none());
    }

    #[test]
    fn test_telemetry_freshness() {
        let store = TelemetryStore::new();
        let stamped = store.store(json!({"lat": 1, "lon": 2}));
        assert!(stamped > 0.0);

        let snapshot = store.latest().unwrap();
        assert_eq!(snapshot.data, json!({"lat": 1, "lon": 2}));
        assert_eq!(snapshot.timestamp, stamped);

        let later = Instant::now() + Duration::from_secs(5);
        assert!(store.latest_at(later).is_none());

        let just_before = Instant::now() + Duration::from_secs(4);
        assert!(store.latest_at(just_before).is_some());
    }

    #[test]
    fn test_telemetry_expires_in_real_time() {
        let store = TelemetryStore::with_window(Duration::from_millis(50));
        store.store(json!({"lat": 1}));
        assert!(store.latest().is_some());

        std::thread::sleep(Duration::from_millis(80));
        assert!(store.latest().is_none());

        // A new write makes data visible again
        store.store(json!({"lat": 2}));
        assert_eq!(store.latest().unwrap().data, json!({"lat": 2}));
    }

    #[test]
    fn test_concurrent_writers_last_writer_wins() {
        const WRITERS: usize = 8;
        const WRITES: usize = 200;

        let store = Arc::new(SignalingStore::new());
        let telemetry = Arc::new(TelemetryStore::new());

        let sample = |writer: usize, seq: usize| {
            json!({
                "writer": writer,
                "seq": seq,
                "payload": format!("{}-{}", writer, seq).repeat(64),
            })
        };

        std::thread::scope(|scope| {
            for writer in 0..WRITERS {
                let store = Arc::clone(&store);
                let telemetry = Arc::clone(&telemetry);
                scope.spawn(move || {
                    for seq in 0..WRITES {
                        store.store_offer(sample(writer, seq));
                        telemetry.store(sample(writer, seq));
                    }
                });
            }

            // Readers must never observe a torn value
            for _ in 0..4 {
                let store = Arc::clone(&store);
                let telemetry = Arc::clone(&telemetry);
                scope.spawn(move || {
                    for _ in 0..WRITES {
                        for value in [store.offer(), telemetry.latest().map(|s| s.data)]
                            .into_iter()
                            .flatten()
                        {
                            let writer = value["writer"].as_u64().unwrap() as usize;
                            let seq = value["seq"].as_u64().unwrap() as usize;
                            assert_eq!(value, sample(writer, seq));
                        }
                    }
                });
            }
        });

        let last = store.offer().unwrap();
        assert_eq!(last["seq"], json!(WRITES - 1));
        assert!(store.answer().is_none());
        assert_eq!(telemetry.latest().unwrap().data["seq"], json!(WRITES - 1));
    }
}

//! Time sources and envelope helpers.

use serde_json::{Map, Value as JsonValue};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use ulid::Ulid;

/// Monotonic time source, injectable so correlation windows can be tested
/// without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

/// Seconds since the unix epoch with a `Z` suffix, as stamped on output
/// envelopes.
pub fn epoch_stamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{}Z", secs)
}

/// JSON wrapper for CLI output. Object `fields` are merged next to `cmd` and
/// `status`; anything else lands under `data`.
pub fn command_envelope(cmd: &str, status: &str, fields: JsonValue) -> JsonValue {
    let mut envelope = Map::new();
    envelope.insert("envelope_version".into(), "1.0.0".into());
    envelope.insert("ts".into(), epoch_stamp().into());
    envelope.insert("event_id".into(), Ulid::new().to_string().into());
    envelope.insert("cmd".into(), cmd.into());
    envelope.insert("status".into(), status.into());
    match fields {
        JsonValue::Object(fields) => envelope.extend(fields),
        JsonValue::Null => {}
        other => {
            envelope.insert("data".into(), other);
        }
    }
    JsonValue::Object(envelope)
}

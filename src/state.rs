use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of attendance event the backend resolved a scan into.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Ingreso,
    Salida,
}

/// One day's worth of attendance: at most one check-in and one check-out.
/// Later writes overwrite earlier ones for the same kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    #[serde(default, with = "hhmm", skip_serializing_if = "Option::is_none")]
    pub ingreso: Option<NaiveTime>,
    #[serde(default, with = "hhmm", skip_serializing_if = "Option::is_none")]
    pub salida: Option<NaiveTime>,
}

/// Locally persisted per-role session state: last selected person, last
/// used camera, and the per-date attendance history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    #[serde(default)]
    pub history: BTreeMap<NaiveDate, DayRecord>,
}

impl SessionState {
    /// Record a resolved attendance event for `date`, overwriting any
    /// previous time of the same kind.
    pub fn record(&mut self, date: NaiveDate, kind: EventKind, time: NaiveTime) {
        let day = self.history.entry(date).or_default();
        match kind {
            EventKind::Ingreso => day.ingreso = Some(time),
            EventKind::Salida => day.salida = Some(time),
        }
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayRecord> {
        self.history.get(&date)
    }

    /// Empties the history mapping only; name and camera survive.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

/// Wall-clock time truncated to minute precision, matching the stored
/// `HH:MM` representation.
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

pub fn fmt_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Serde adapter for `Option<NaiveTime>` stored as `HH:MM`.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => serializer.serialize_str(&t.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value {
            Some(s) => NaiveTime::parse_from_str(&s, FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

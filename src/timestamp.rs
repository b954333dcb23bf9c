use serde::{Deserialize, Deserializer};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

const NAIVE_LAYOUTS: [&[FormatItem<'static>]; 3] = [
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]/[month]/[day] [hour]:[minute]:[second]"),
];

const RFC1123_NAIVE: &[FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second]"
);

const RFC1123_NUMERIC_ZONE: &[FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute]"
);

/// `updated_at` exactly as the API delivered it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawTimestamp {
    #[default]
    Null,
    EmptyString,
    Text(String),
    Int(i64),
    Float(f64),
    Other,
}

impl From<&Value> for RawTimestamp {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => RawTimestamp::Null,
            Value::String(text) if text.is_empty() => RawTimestamp::EmptyString,
            Value::String(text) => RawTimestamp::Text(text.clone()),
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    RawTimestamp::Int(int)
                } else if number.is_u64() {
                    // Past i64::MAX; no representable instant either way.
                    RawTimestamp::Other
                } else {
                    number
                        .as_f64()
                        .map(RawTimestamp::Float)
                        .unwrap_or(RawTimestamp::Other)
                }
            }
            Value::Bool(_) | Value::Array(_) | Value::Object(_) => RawTimestamp::Other,
        }
    }
}

impl<'de> Deserialize<'de> for RawTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(RawTimestamp::from(&value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedTimestamp {
    At(OffsetDateTime),
    Unknown,
}

impl NormalizedTimestamp {
    pub fn instant(self) -> Option<OffsetDateTime> {
        match self {
            NormalizedTimestamp::At(instant) => Some(instant),
            NormalizedTimestamp::Unknown => None,
        }
    }
}

pub fn normalize(raw: &RawTimestamp) -> NormalizedTimestamp {
    let instant = match raw {
        RawTimestamp::Null | RawTimestamp::EmptyString | RawTimestamp::Other => None,
        RawTimestamp::Text(text) => parse_text(text),
        RawTimestamp::Int(seconds) => from_epoch_seconds(*seconds),
        RawTimestamp::Float(seconds) => float_to_seconds(*seconds).and_then(from_epoch_seconds),
    };

    let normalized = match instant {
        Some(instant) => NormalizedTimestamp::At(instant),
        None => NormalizedTimestamp::Unknown,
    };
    tracing::debug!(raw = ?raw, normalized = ?normalized, "normalized remote timestamp");
    normalized
}

fn parse_text(text: &str) -> Option<OffsetDateTime> {
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(parsed);
    }
    for layout in NAIVE_LAYOUTS {
        if let Ok(parsed) = PrimitiveDateTime::parse(text, layout) {
            return Some(parsed.assume_utc());
        }
    }
    parse_rfc1123(text).or_else(|| OffsetDateTime::parse(text, RFC1123_NUMERIC_ZONE).ok())
}

// `Mon, 02 Jan 2006 15:04:05 MST`. Zone abbreviations carry no offset we can
// trust, so any alphabetic zone is read as UTC.
fn parse_rfc1123(text: &str) -> Option<OffsetDateTime> {
    let (body, zone) = text.rsplit_once(' ')?;
    if zone.is_empty() || !zone.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return None;
    }
    PrimitiveDateTime::parse(body, RFC1123_NAIVE)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn float_to_seconds(value: f64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let truncated = value.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return None;
    }
    Some(truncated as i64)
}

fn from_epoch_seconds(seconds: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(seconds).ok()
}

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::debug;

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Parses timestamps from the variety of formats found in sensor payloads
/// and formats them back as portable ISO 8601 strings.
pub struct TimestampProcessor;

impl TimestampProcessor {
    /// Attempt to parse a [`serde_json::Value`] into a UTC [`DateTime`].
    ///
    /// Handles:
    /// * `null`       → `None`
    /// * JSON string  → ISO 8601 / RFC 3339 (including `Z`-suffix) or common
    ///   date-time patterns.
    /// * JSON number  → Unix timestamp (integer or float seconds).
    ///
    /// Anything else (bools, arrays, objects) yields `None`.
    pub fn parse(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::Null => None,
            Value::String(s) => Self::parse_str(s.as_str()),
            // Numbers are Unix seconds, not nanoseconds since the epoch.
            Value::Number(n) => {
                if let Some(secs) = n.as_i64() {
                    DateTime::from_timestamp(secs, 0)
                } else if let Some(f) = n.as_f64() {
                    if !f.is_finite() {
                        return None;
                    }
                    let secs = f.floor() as i64;
                    let nanos = ((f - f.floor()) * 1_000_000_000.0).round() as u32;
                    DateTime::from_timestamp(secs, nanos.min(999_999_999))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Parse a timestamp string. Naive values are interpreted as UTC.
    pub fn parse_str(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        // Replace trailing 'Z' with '+00:00' for RFC 3339 compatibility.
        let normalised = if let Some(stripped) = s.strip_suffix('Z') {
            format!("{}+00:00", stripped)
        } else {
            s.to_string()
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }

        // Space-separated offset form, as written by most dataframe tools.
        if let Ok(dt) = DateTime::parse_from_str(&normalised, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Some(dt.with_timezone(&Utc));
        }

        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Some(dt.with_timezone(&Utc));
        }

        const FORMATS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
        ];

        for fmt in FORMATS {
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&naive));
        }

        debug!("TimestampProcessor: could not parse timestamp \"{}\"", s);
        None
    }

    /// Format as an explicit-offset ISO 8601 string, e.g.
    /// `2024-01-01T00:00:00+00:00`. Sub-second digits appear only when present.
    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)
    }

    /// UTC calendar date used as the daily grouping key.
    pub fn utc_date(dt: &DateTime<Utc>) -> NaiveDate {
        dt.date_naive()
    }
}

// ── NumericCoercer ────────────────────────────────────────────────────────────

/// Best-effort conversion of loosely typed values into finite `f64`s.
pub struct NumericCoercer;

impl NumericCoercer {
    /// JSON numbers and numeric strings become `Some`; everything else `None`.
    pub fn coerce(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
            Value::String(s) => Self::coerce_str(s),
            _ => None,
        }
    }

    /// Parse a text cell. Empty, non-numeric and non-finite text yields `None`.
    pub fn coerce_str(s: &str) -> Option<f64> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return None;
        }
        trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
    }
}

// ── FieldResolver ─────────────────────────────────────────────────────────────

/// Ordered alias lookup over a heterogeneous JSON object.
pub struct FieldResolver;

impl FieldResolver {
    /// Return the value of the first alias that is present and non-null.
    pub fn coalesce<'a>(payload: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
        aliases
            .iter()
            .filter_map(|alias| payload.get(*alias))
            .find(|v| !v.is_null())
    }

    /// Coalesce then coerce to a number.
    ///
    /// The first non-null alias wins even when it fails coercion; later
    /// aliases are not consulted.
    pub fn number(payload: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
        Self::coalesce(payload, aliases).and_then(NumericCoercer::coerce)
    }

    /// Coalesce then parse as a UTC timestamp.
    pub fn timestamp(payload: &Map<String, Value>, aliases: &[&str]) -> Option<DateTime<Utc>> {
        Self::coalesce(payload, aliases).and_then(TimestampProcessor::parse)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

//! Typed configuration lookup.
//!
//! The core does not read configuration files itself. Callers provide a
//! [`ConfigLookup`] that can find raw values by key; the typed accessors
//! never fail and fall back to the caller's default on any missing or
//! malformed value.

use std::time::Duration;
use tracing::debug;

/// Interval used when neither the configured nor the default value is a
/// valid number of seconds.
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(1);

/// Raw value as found in a configuration source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text value
    Text(String),
    /// Anything else (tables, arrays, booleans...)
    Other,
}

/// Source of configuration values addressed by dotted keys.
pub trait ConfigLookup {
    /// Returns the raw value for `key`, if present.
    fn raw(&self, key: &str) -> Option<RawValue>;

    /// Looks up an integer.
    fn int_key(&self, key: &str, default: i64) -> i64 {
        let value = match self.raw(key) {
            Some(RawValue::Int(v)) => Some(v),
            Some(RawValue::Text(s)) => s.trim().parse().ok(),
            _ => None,
        };
        resolve(key, value, default)
    }

    /// Looks up a floating point number.
    fn float_key(&self, key: &str, default: f64) -> f64 {
        let value = match self.raw(key) {
            Some(RawValue::Float(v)) => Some(v),
            Some(RawValue::Int(v)) => Some(v as f64),
            Some(RawValue::Text(s)) => s.trim().parse().ok(),
            _ => None,
        };
        resolve(key, value, default)
    }

    /// Looks up a single character.
    fn char_key(&self, key: &str, default: char) -> char {
        let value = match self.raw(key) {
            Some(RawValue::Text(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            }
            _ => None,
        };
        resolve(key, value, default)
    }

    /// Looks up a text value.
    fn text_key(&self, key: &str, default: &str) -> String {
        let value = match self.raw(key) {
            Some(RawValue::Text(s)) => Some(s),
            _ => None,
        };
        resolve(key, value, default.to_string())
    }

    /// Looks up a duration given in (fractional) seconds.
    ///
    /// Zero, negative or non-finite values fall back to `default_secs`, and
    /// an invalid default falls back to one second.
    fn seconds_key(&self, key: &str, default_secs: f64) -> Duration {
        let secs = self.float_key(key, default_secs);
        positive_secs(secs)
            .or_else(|| positive_secs(default_secs))
            .unwrap_or_else(|| {
                debug!("Config key {}: invalid interval, using {:?}", key, FALLBACK_INTERVAL);
                FALLBACK_INTERVAL
            })
    }
}

fn positive_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
}

fn resolve<T: std::fmt::Debug>(key: &str, value: Option<T>, default: T) -> T {
    match value {
        Some(v) => {
            debug!("Config key {} = {:?}", key, v);
            v
        }
        None => {
            debug!("Config key {} missing or invalid, using {:?}", key, default);
            default
        }
    }
}

/// Lookup with no values at all; every key falls back to its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Defaults;

impl ConfigLookup for Defaults {
    fn raw(&self, _key: &str) -> Option<RawValue> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapLookup(HashMap<&'static str, RawValue>);

    impl ConfigLookup for MapLookup {
        fn raw(&self, key: &str) -> Option<RawValue> {
            self.0.get(key).cloned()
        }
    }

    fn lookup() -> MapLookup {
        MapLookup(HashMap::from([
            ("int", RawValue::Int(42)),
            ("int_text", RawValue::Text(" 7 ".to_string())),
            ("float", RawValue::Float(2.5)),
            ("word", RawValue::Text("abc".to_string())),
            ("delim", RawValue::Text(";".to_string())),
            ("negative", RawValue::Float(-1.0)),
            ("zero", RawValue::Int(0)),
            ("table", RawValue::Other),
        ]))
    }

    #[test]
    fn test_int_key() {
        let cfg = lookup();
        assert_eq!(cfg.int_key("int", 0), 42);
        assert_eq!(cfg.int_key("int_text", 0), 7);
        assert_eq!(cfg.int_key("word", 5), 5);
        assert_eq!(cfg.int_key("float", 5), 5);
        assert_eq!(cfg.int_key("missing", -3), -3);
    }

    #[test]
    fn test_float_key() {
        let cfg = lookup();
        assert_eq!(cfg.float_key("float", 0.0), 2.5);
        assert_eq!(cfg.float_key("int", 0.0), 42.0);
        assert_eq!(cfg.float_key("table", 1.5), 1.5);
    }

    #[test]
    fn test_char_key() {
        let cfg = lookup();
        assert_eq!(cfg.char_key("delim", ','), ';');
        assert_eq!(cfg.char_key("word", ','), ',');
        assert_eq!(cfg.char_key("int", ','), ',');
    }

    #[test]
    fn test_text_key() {
        let cfg = lookup();
        assert_eq!(cfg.text_key("word", "x"), "abc");
        assert_eq!(cfg.text_key("int", "x"), "x");
    }

    #[test]
    fn test_seconds_key() {
        let cfg = lookup();
        assert_eq!(cfg.seconds_key("float", 1.0), Duration::from_millis(2500));
        assert_eq!(cfg.seconds_key("missing", 0.5), Duration::from_millis(500));
        assert_eq!(cfg.seconds_key("negative", 3.0), Duration::from_secs(3));
        assert_eq!(cfg.seconds_key("negative", -3.0), FALLBACK_INTERVAL);
        assert_eq!(cfg.seconds_key("zero", 0.25), Duration::from_millis(250));
        assert_eq!(cfg.seconds_key("zero", 0.0), FALLBACK_INTERVAL);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Defaults.int_key("anything", 9), 9);
        assert_eq!(Defaults.char_key("anything", ','), ',');
    }
}

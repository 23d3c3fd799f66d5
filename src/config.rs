//! # Thread-supplier configuration.
//!
//! [`SupplierSettings`] defines the worker-pool behavior: how many reusable
//! (poolable) workers exist, how far the detached budget may stretch, how
//! long a saturated request waits before the cap grows, and how growth decays
//! back toward the initial value.
//!
//! Settings can be built directly or resolved from a string-properties map
//! (the shape external configuration arrives in) via
//! [`SupplierSettings::from_properties`]. Property values support `${key}`
//! placeholder substitution through [`resolve_value`].
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use backtask::{SupplierSettings, ThreadCount, DetachedCount};
//!
//! let mut settings = SupplierSettings::default();
//! settings.max_poolable = ThreadCount::Fixed(4);
//! settings.max_detached = DetachedCount::Fixed(8);
//! settings.request_timeout = Duration::from_millis(200);
//! settings.increasing_step = 2;
//!
//! assert_eq!(settings.resolved_max_poolable(), 4);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use crate::error::RuntimeError;

/// String-properties map, the shape external configuration arrives in.
pub type Properties = HashMap<String, String>;

/// Configuration keys understood by [`SupplierSettings::from_properties`].
pub mod keys {
    /// Fixed upper bound on reusable workers. `"autodetect"` ⇒ 3×CPU.
    pub const MAX_POOLABLE_THREAD_COUNT: &str = "thread-supplier.max-poolable-thread-count";
    /// Additive budget beyond poolable. Negative ⇒ effectively unbounded;
    /// `"autodetect"` ⇒ 6×CPU.
    pub const MAX_DETACHED_THREAD_COUNT: &str = "thread-supplier.max-detached-thread-count";
    /// Max milliseconds to wait on a saturated supplier before growing the cap.
    pub const POOLABLE_THREAD_REQUEST_TIMEOUT: &str =
        "thread-supplier.poolable-thread-request-timeout";
    /// Default daemon attribute for supplied workers.
    pub const DEFAULT_DAEMON_FLAG_VALUE: &str = "thread-supplier.default-daemon-flag-value";
    /// Additive growth in workers per timeout event; ≤ 0 disables growth.
    pub const MAX_DETACHED_THREAD_COUNT_INCREASING_STEP: &str =
        "thread-supplier.max-detached-thread-count.increasing-step";
    /// Milliseconds of quiescence after which growth is decayed by ⌊step/2⌋.
    pub const MAX_DETACHED_THREAD_COUNT_DECREASING_THRESHOLD: &str =
        "thread-supplier.max-detached-thread-count.elapsed-time-threshold-from-last-increase-for-gradual-decreasing-to-initial-value";
}

/// Bound on the reusable worker pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadCount {
    /// Derive from the machine: 3 × available CPUs.
    Autodetect,
    /// Exact count; must be greater than zero.
    Fixed(usize),
}

/// Budget for detached workers, additive on top of the poolable bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetachedCount {
    /// Derive from the machine: 6 × available CPUs.
    Autodetect,
    /// Exact additive budget (zero is legal: no detached workers).
    Fixed(usize),
    /// No effective bound.
    Unbounded,
}

/// Worker-pool settings.
///
/// Defaults mirror a general-purpose background executor: pool sized from the
/// machine, six-second saturation timeout, growth in steps of eight with a
/// thirty-second decay threshold.
#[derive(Clone, Debug)]
pub struct SupplierSettings {
    /// Fixed upper bound on reusable workers.
    pub max_poolable: ThreadCount,
    /// Additive budget for detached workers.
    pub max_detached: DetachedCount,
    /// Max time a saturated request waits before the detached cap grows.
    pub request_timeout: Duration,
    /// Default daemon attribute recorded on supplied workers.
    pub daemon: bool,
    /// Additive cap growth per timeout event; `0` disables growth and
    /// degenerates the saturated wait into a notification-driven retry.
    pub increasing_step: usize,
    /// Quiescence since the last growth after which the cap decays by
    /// ⌊step/2⌋ toward its initial value.
    pub decay_threshold: Duration,
}

impl Default for SupplierSettings {
    /// Provides the default configuration:
    /// - `max_poolable = Autodetect` (3×CPU)
    /// - `max_detached = Autodetect` (6×CPU)
    /// - `request_timeout = 6s`
    /// - `daemon = true`
    /// - `increasing_step = 8`
    /// - `decay_threshold = 30s`
    fn default() -> Self {
        Self {
            max_poolable: ThreadCount::Autodetect,
            max_detached: DetachedCount::Autodetect,
            request_timeout: Duration::from_millis(6000),
            daemon: true,
            increasing_step: 8,
            decay_threshold: Duration::from_millis(30_000),
        }
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl SupplierSettings {
    /// Resolves the poolable bound to a concrete count.
    pub fn resolved_max_poolable(&self) -> usize {
        match self.max_poolable {
            ThreadCount::Autodetect => available_cpus() * 3,
            ThreadCount::Fixed(n) => n,
        }
    }

    /// Resolves the detached budget to a concrete additive count.
    pub fn resolved_max_detached(&self) -> usize {
        match self.max_detached {
            DetachedCount::Autodetect => available_cpus() * 6,
            DetachedCount::Fixed(n) => n,
            DetachedCount::Unbounded => usize::MAX - self.resolved_max_poolable(),
        }
    }

    /// Validates invariants that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.resolved_max_poolable() == 0 {
            return Err(RuntimeError::Configuration {
                key: keys::MAX_POOLABLE_THREAD_COUNT.to_owned(),
                reason: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }

    /// Builds settings from a string-properties map.
    ///
    /// Missing keys fall back to the defaults above; present keys are
    /// resolved with `${...}` placeholder substitution and parsed. An
    /// unparsable or out-of-range value is a hard
    /// [`RuntimeError::Configuration`].
    pub fn from_properties(props: &Properties) -> Result<Self, RuntimeError> {
        let defaults = SupplierSettings::default();

        let max_poolable = match resolve_value(keys::MAX_POOLABLE_THREAD_COUNT, props) {
            None => defaults.max_poolable,
            Some(raw) if raw == "autodetect" => ThreadCount::Autodetect,
            Some(raw) => {
                let n = parse_i64(keys::MAX_POOLABLE_THREAD_COUNT, &raw)?;
                if n <= 0 {
                    return Err(RuntimeError::Configuration {
                        key: keys::MAX_POOLABLE_THREAD_COUNT.to_owned(),
                        reason: format!("must be greater than zero, got {n}"),
                    });
                }
                ThreadCount::Fixed(n as usize)
            }
        };

        let max_detached = match resolve_value(keys::MAX_DETACHED_THREAD_COUNT, props) {
            None => defaults.max_detached,
            Some(raw) if raw == "autodetect" => DetachedCount::Autodetect,
            Some(raw) => {
                let n = parse_i64(keys::MAX_DETACHED_THREAD_COUNT, &raw)?;
                if n < 0 {
                    DetachedCount::Unbounded
                } else {
                    DetachedCount::Fixed(n as usize)
                }
            }
        };

        let request_timeout = match resolve_value(keys::POOLABLE_THREAD_REQUEST_TIMEOUT, props) {
            None => defaults.request_timeout,
            Some(raw) => {
                Duration::from_millis(parse_u64(keys::POOLABLE_THREAD_REQUEST_TIMEOUT, &raw)?)
            }
        };

        let daemon = match resolve_value(keys::DEFAULT_DAEMON_FLAG_VALUE, props) {
            None => defaults.daemon,
            Some(raw) => parse_bool(keys::DEFAULT_DAEMON_FLAG_VALUE, &raw)?,
        };

        let increasing_step =
            match resolve_value(keys::MAX_DETACHED_THREAD_COUNT_INCREASING_STEP, props) {
                None => defaults.increasing_step,
                Some(raw) => {
                    let n = parse_i64(keys::MAX_DETACHED_THREAD_COUNT_INCREASING_STEP, &raw)?;
                    n.max(0) as usize
                }
            };

        let decay_threshold =
            match resolve_value(keys::MAX_DETACHED_THREAD_COUNT_DECREASING_THRESHOLD, props) {
                None => defaults.decay_threshold,
                Some(raw) => Duration::from_millis(parse_u64(
                    keys::MAX_DETACHED_THREAD_COUNT_DECREASING_THRESHOLD,
                    &raw,
                )?),
            };

        let mut settings = Self {
            max_poolable,
            max_detached,
            request_timeout,
            daemon,
            increasing_step,
            decay_threshold,
        };
        // A disabled growth step turns the saturated wait into an untimed
        // notification-driven retry.
        if settings.increasing_step == 0 {
            settings.request_timeout = Duration::ZERO;
        }
        settings.validate()?;
        Ok(settings)
    }
}

/// Resolves `key` against `props`, substituting `${other.key}` placeholders
/// from the same map. Returns `None` when the key is absent.
///
/// Substitution is repeated until the value is placeholder-free; unresolvable
/// placeholders are left verbatim (and will fail the subsequent parse, which
/// is the diagnosable outcome). Depth is bounded to tolerate accidental
/// cycles.
pub fn resolve_value(key: &str, props: &Properties) -> Option<String> {
    let mut value = props.get(key)?.trim().to_owned();
    for _ in 0..8 {
        let Some(start) = value.find("${") else {
            break;
        };
        let Some(len) = value[start..].find('}') else {
            break;
        };
        let placeholder_key = value[start + 2..start + len].to_owned();
        let replacement = props
            .get(placeholder_key.as_str())
            .cloned()
            .unwrap_or_else(|| format!("${{{placeholder_key}}}"));
        if replacement == format!("${{{placeholder_key}}}") {
            break;
        }
        value.replace_range(start..start + len + 1, replacement.trim());
    }
    Some(value)
}

fn parse_i64(key: &str, raw: &str) -> Result<i64, RuntimeError> {
    raw.parse::<i64>().map_err(|e| RuntimeError::Configuration {
        key: key.to_owned(),
        reason: format!("expected integer, got '{raw}': {e}"),
    })
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, RuntimeError> {
    raw.parse::<u64>().map_err(|e| RuntimeError::Configuration {
        key: key.to_owned(),
        reason: format!("expected non-negative integer, got '{raw}': {e}"),
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, RuntimeError> {
    raw.parse::<bool>().map_err(|e| RuntimeError::Configuration {
        key: key.to_owned(),
        reason: format!("expected true/false, got '{raw}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = SupplierSettings::default();
        assert_eq!(s.request_timeout, Duration::from_millis(6000));
        assert_eq!(s.increasing_step, 8);
        assert_eq!(s.decay_threshold, Duration::from_millis(30_000));
        assert!(s.daemon);
        assert!(s.resolved_max_poolable() >= 3);
    }

    #[test]
    fn from_properties_parses_fixed_counts() {
        let s = SupplierSettings::from_properties(&props(&[
            (keys::MAX_POOLABLE_THREAD_COUNT, "4"),
            (keys::MAX_DETACHED_THREAD_COUNT, "0"),
            (keys::POOLABLE_THREAD_REQUEST_TIMEOUT, "250"),
            (keys::MAX_DETACHED_THREAD_COUNT_INCREASING_STEP, "2"),
        ]))
        .unwrap();
        assert_eq!(s.max_poolable, ThreadCount::Fixed(4));
        assert_eq!(s.max_detached, DetachedCount::Fixed(0));
        assert_eq!(s.request_timeout, Duration::from_millis(250));
        assert_eq!(s.increasing_step, 2);
    }

    #[test]
    fn negative_detached_is_unbounded() {
        let s = SupplierSettings::from_properties(&props(&[(
            keys::MAX_DETACHED_THREAD_COUNT,
            "-1",
        )]))
        .unwrap();
        assert_eq!(s.max_detached, DetachedCount::Unbounded);
        assert!(s.resolved_max_detached() > 1 << 40);
    }

    #[test]
    fn zero_poolable_is_rejected() {
        let err = SupplierSettings::from_properties(&props(&[(
            keys::MAX_POOLABLE_THREAD_COUNT,
            "0",
        )]))
        .unwrap_err();
        assert_eq!(err.as_label(), "runtime_configuration");
    }

    #[test]
    fn disabled_step_zeroes_the_timeout() {
        let s = SupplierSettings::from_properties(&props(&[(
            keys::MAX_DETACHED_THREAD_COUNT_INCREASING_STEP,
            "0",
        )]))
        .unwrap();
        assert_eq!(s.increasing_step, 0);
        assert_eq!(s.request_timeout, Duration::ZERO);
    }

    #[test]
    fn placeholders_resolve_transitively() {
        let p = props(&[
            ("base.timeout", "150"),
            (keys::POOLABLE_THREAD_REQUEST_TIMEOUT, "${base.timeout}"),
        ]);
        assert_eq!(
            resolve_value(keys::POOLABLE_THREAD_REQUEST_TIMEOUT, &p).as_deref(),
            Some("150")
        );
        let s = SupplierSettings::from_properties(&p).unwrap();
        assert_eq!(s.request_timeout, Duration::from_millis(150));
    }

    #[test]
    fn unresolvable_placeholder_fails_the_parse() {
        let p = props(&[(keys::POOLABLE_THREAD_REQUEST_TIMEOUT, "${missing}")]);
        assert!(SupplierSettings::from_properties(&p).is_err());
    }
}

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);
const BACKOFF_MULTIPLIER: u32 = 2;

/// Exponential backoff with equal jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (3 retries means at most 4 attempts)
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each following one
    #[serde(with = "millis", rename = "base_delay_ms")]
    pub base_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "millis", rename = "max_delay_ms")]
    pub max_delay: Duration,
    /// Randomize each delay between half and all of its nominal value
    pub jitter: bool,
    /// Per-attempt timeout; an attempt that runs over counts as transient
    #[serde(with = "opt_millis", rename = "attempt_timeout_ms")]
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: true,
            attempt_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Nominal delay before retry number `retry` (0-based), without jitter.
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let factor = BACKOFF_MULTIPLIER.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay to sleep before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry);
        if !self.jitter || nominal.is_zero() {
            return nominal;
        }
        let half = nominal / 2;
        let spread = nominal.saturating_sub(half).as_millis() as u64;
        half + Duration::from_millis(rand::rng().random_range(0..=spread))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_four_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts(), 4);
    }

    #[test]
    fn test_nominal_delay_doubles_and_caps() {
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(policy.nominal_delay(0), Duration::from_millis(100));
        assert_eq!(policy.nominal_delay(1), Duration::from_millis(200));
        assert_eq!(policy.nominal_delay(2), Duration::from_millis(400));
        assert_eq!(policy.nominal_delay(3), Duration::from_millis(500));
        assert_eq!(policy.nominal_delay(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(400));
        for _ in 0..100 {
            let delay = policy.delay(0);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_no_jitter_is_exact() {
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(100))
            .with_jitter(false);
        assert_eq!(policy.delay(1), Duration::from_millis(200));
    }

    #[test]
    fn test_deserialize_partial_policy() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_retries": 5, "base_delay_ms": 50}"#).unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, DEFAULT_MAX_DELAY);
    }
}

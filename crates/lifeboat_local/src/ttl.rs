// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// How long a value should live.
///
/// The public cache API measures TTLs in minutes, where any value `<= 0` means "never
/// expires". [`Ttl::minutes`] and [`Ttl::from_minutes_f64`] implement that convention, and a
/// [`Duration`] converts directly.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use lifeboat_local::Ttl;
///
/// assert_eq!(Ttl::minutes(0), Ttl::Never);
/// assert_eq!(Ttl::minutes(-1), Ttl::Never);
/// assert_eq!(Ttl::minutes(2), Ttl::After(Duration::from_secs(120)));
/// assert_eq!(Ttl::from(Duration::ZERO), Ttl::Never);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the default TTL configured on the store or cache.
    #[default]
    Default,
    /// Never expire.
    Never,
    /// Expire after the given, non-zero duration.
    After(Duration),
}

impl Ttl {
    /// Creates a TTL from whole minutes. Zero or negative means [`Ttl::Never`].
    #[must_use]
    pub fn minutes(minutes: i64) -> Self {
        match u64::try_from(minutes) {
            Ok(0) | Err(_) => Self::Never,
            Ok(minutes) => Self::After(Duration::from_secs(minutes.saturating_mul(60))),
        }
    }

    /// Creates a TTL from fractional minutes, such as `0.5` for thirty seconds.
    ///
    /// Zero, negative and NaN values mean [`Ttl::Never`]. Values too large to represent are
    /// also treated as never expiring.
    #[must_use]
    pub fn from_minutes_f64(minutes: f64) -> Self {
        if minutes.is_nan() || minutes <= 0.0 {
            return Self::Never;
        }

        Duration::try_from_secs_f64(minutes * 60.0).map_or(Self::Never, Self::from)
    }

    /// Resolves [`Ttl::Default`] against `default` and returns the effective lifetime.
    ///
    /// `None` means the value never expires.
    #[must_use]
    pub fn resolve(self, default: Option<Duration>) -> Option<Duration> {
        match self {
            Self::Default => default.filter(|ttl| !ttl.is_zero()),
            Self::Never => None,
            Self::After(ttl) => Some(ttl).filter(|ttl| !ttl.is_zero()),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        if ttl.is_zero() { Self::Never } else { Self::After(ttl) }
    }
}

impl From<Option<Duration>> for Ttl {
    fn from(ttl: Option<Duration>) -> Self {
        ttl.map_or(Self::Never, Self::from)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::negative(-1, Ttl::Never)]
    #[case::zero(0, Ttl::Never)]
    #[case::one(1, Ttl::After(Duration::from_secs(60)))]
    #[case::hour(60, Ttl::After(Duration::from_secs(3600)))]
    fn whole_minutes(#[case] minutes: i64, #[case] expected: Ttl) {
        assert_eq!(Ttl::minutes(minutes), expected);
    }

    #[rstest]
    #[case::nan(f64::NAN, Ttl::Never)]
    #[case::negative(-0.5, Ttl::Never)]
    #[case::zero(0.0, Ttl::Never)]
    #[case::half(0.5, Ttl::After(Duration::from_secs(30)))]
    #[case::infinite(f64::INFINITY, Ttl::Never)]
    fn fractional_minutes(#[case] minutes: f64, #[case] expected: Ttl) {
        assert_eq!(Ttl::from_minutes_f64(minutes), expected);
    }

    #[test]
    fn resolve_falls_back_to_default_only_for_default() {
        let default = Some(Duration::from_secs(5));

        assert_eq!(Ttl::Default.resolve(default), default);
        assert_eq!(Ttl::Default.resolve(None), None);
        assert_eq!(Ttl::Never.resolve(default), None);
        assert_eq!(Ttl::After(Duration::from_secs(1)).resolve(default), Some(Duration::from_secs(1)));
        assert_eq!(Ttl::After(Duration::ZERO).resolve(default), None);
    }
}

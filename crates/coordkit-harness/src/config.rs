//! Stress campaign configuration.
//!
//! Resolved from environment variables with loose parsing; anything
//! unparseable falls back to the profile default rather than failing:
//! - `COORDKIT_PROFILE`: `quick` (default) or `soak`. Picks default rounds and
//!   hold times.
//! - `COORDKIT_STRESS_SEED`: decimal or `0x` hex seed for workload RNGs.
//! - `COORDKIT_STRESS_ROUNDS`: rounds per scenario, overriding the profile.
//! - `COORDKIT_HOLD_MAX_MS`: upper bound on random hold/sleep times.
//!
//! CLI flags override whatever the environment resolved.

use serde::{Deserialize, Serialize};

pub const ENV_PROFILE: &str = "COORDKIT_PROFILE";
pub const ENV_SEED: &str = "COORDKIT_STRESS_SEED";
pub const ENV_ROUNDS: &str = "COORDKIT_STRESS_ROUNDS";
pub const ENV_HOLD_MAX_MS: &str = "COORDKIT_HOLD_MAX_MS";

pub const DEFAULT_SEED: u64 = 0xC0DE_0001;

/// Campaign intensity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressProfile {
    /// Few rounds, short holds. Suitable for CI.
    #[default]
    Quick,
    /// Many rounds with longer holds to widen race windows.
    Soak,
}

impl StressProfile {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "soak" | "long" | "full" | "nightly" => Self::Soak,
            _ => Self::Quick,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Soak => "soak",
        }
    }

    #[must_use]
    pub const fn default_rounds(self) -> u32 {
        match self {
            Self::Quick => 20,
            Self::Soak => 2_000,
        }
    }

    #[must_use]
    pub const fn default_hold_max_ms(self) -> u64 {
        match self {
            Self::Quick => 2,
            Self::Soak => 10,
        }
    }
}

/// Resolved harness settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub profile: StressProfile,
    pub seed: u64,
    pub rounds: u32,
    pub hold_max_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::for_profile(StressProfile::default())
    }
}

impl HarnessConfig {
    /// Profile defaults with the default seed.
    #[must_use]
    pub fn for_profile(profile: StressProfile) -> Self {
        Self {
            profile,
            seed: DEFAULT_SEED,
            rounds: profile.default_rounds(),
            hold_max_ms: profile.default_hold_max_ms(),
        }
    }

    /// Resolve from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary key lookup (tests pass a map here).
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = lookup(ENV_PROFILE)
            .map(|v| StressProfile::from_str_loose(&v))
            .unwrap_or_default();
        let mut config = Self::for_profile(profile);
        if let Some(seed) = lookup(ENV_SEED).as_deref().and_then(parse_u64_loose) {
            config.seed = seed;
        }
        if let Some(rounds) = lookup(ENV_ROUNDS)
            .as_deref()
            .and_then(parse_u64_loose)
            .and_then(|r| u32::try_from(r).ok())
            .filter(|r| *r > 0)
        {
            config.rounds = rounds;
        }
        if let Some(hold) = lookup(ENV_HOLD_MAX_MS).as_deref().and_then(parse_u64_loose) {
            config.hold_max_ms = hold;
        }
        config
    }
}

/// Parse a decimal or `0x`-prefixed hex integer; `_` separators allowed.
#[must_use]
pub fn parse_u64_loose(raw: &str) -> Option<u64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != '_').collect();
    match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => cleaned.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in<'a>(map: &'a HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| (*v).to_string())
    }

    #[test]
    fn empty_environment_gives_quick_defaults() {
        let config = HarnessConfig::from_lookup(|_| None);
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.profile, StressProfile::Quick);
        assert_eq!(config.seed, DEFAULT_SEED);
    }

    #[test]
    fn profile_parsing_is_loose() {
        assert_eq!(StressProfile::from_str_loose("SOAK"), StressProfile::Soak);
        assert_eq!(StressProfile::from_str_loose(" nightly "), StressProfile::Soak);
        assert_eq!(StressProfile::from_str_loose("bogus"), StressProfile::Quick);
    }

    #[test]
    fn overrides_apply_on_top_of_profile() {
        let env = HashMap::from([
            (ENV_PROFILE, "soak"),
            (ENV_SEED, "0xDEAD_BEEF"),
            (ENV_ROUNDS, "7"),
        ]);
        let config = HarnessConfig::from_lookup(lookup_in(&env));
        assert_eq!(config.profile, StressProfile::Soak);
        assert_eq!(config.seed, 0xDEAD_BEEF);
        assert_eq!(config.rounds, 7);
        assert_eq!(config.hold_max_ms, StressProfile::Soak.default_hold_max_ms());
    }

    #[test]
    fn garbage_values_fall_back() {
        let env = HashMap::from([
            (ENV_SEED, "twelve"),
            (ENV_ROUNDS, "0"),
            (ENV_HOLD_MAX_MS, "-3"),
        ]);
        let config = HarnessConfig::from_lookup(lookup_in(&env));
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn parse_u64_loose_accepts_hex_and_decimal() {
        assert_eq!(parse_u64_loose("42"), Some(42));
        assert_eq!(parse_u64_loose("0x2A"), Some(42));
        assert_eq!(parse_u64_loose("1_000"), Some(1000));
        assert_eq!(parse_u64_loose(""), None);
    }
}

//! Retrieval tunables.
//!
//! Configuration is an explicit value passed into each retrieval call. The
//! environment is only one way to build it: [`RetrievalConfig::from_env`]
//! reads `NOTEGRAPH_*` variables once and returns a validated struct.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{RetrievalError, RetrievalResult};

/// Query expansion settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionConfig {
    /// Queries with fewer terms than this also pull in broader concepts (default 3).
    pub short_query_threshold: usize,
    /// Weight given to broader concepts (default 0.5).
    pub broader_weight: f64,
    /// Minimum edge confidence for a broader concept to be included (default 0.0, no floor).
    pub broader_min_confidence: f64,
    /// Hard cap on expanded seed tags; lowest weights are dropped first (default 10).
    pub max_expanded_terms: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            short_query_threshold: 3,
            broader_weight: 0.5,
            broader_min_confidence: 0.0,
            max_expanded_terms: 10,
        }
    }
}

impl ExpansionConfig {
    pub fn validate(&self) -> RetrievalResult<()> {
        check_range("broader_weight", self.broader_weight, Bound::Open(0.0), Bound::Closed(1.0))?;
        check_range(
            "broader_min_confidence",
            self.broader_min_confidence,
            Bound::Closed(0.0),
            Bound::Closed(1.0),
        )?;
        if self.max_expanded_terms == 0 {
            return Err(RetrievalError::config("max_expanded_terms must be at least 1"));
        }
        Ok(())
    }
}

/// Spreading activation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationConfig {
    /// Activation decay per hop, open interval (0, 1) (default 0.7).
    pub decay_factor: f64,
    /// Minimum activation for a path to survive, open interval (0, 1) (default 0.1).
    pub threshold: f64,
    /// Maximum traversal depth (default 3).
    pub max_hops: usize,
    /// Multiplier applied when crossing a partitive edge (default 0.5).
    pub partitive_multiplier: f64,
    /// Coefficient of the post-traversal degree-centrality boost (default 0.3).
    pub centrality_boost: f64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.7,
            threshold: 0.1,
            max_hops: 3,
            partitive_multiplier: 0.5,
            centrality_boost: 0.3,
        }
    }
}

impl ActivationConfig {
    pub fn validate(&self) -> RetrievalResult<()> {
        check_range("decay_factor", self.decay_factor, Bound::Open(0.0), Bound::Open(1.0))?;
        check_range("threshold", self.threshold, Bound::Open(0.0), Bound::Open(1.0))?;
        check_range(
            "partitive_multiplier",
            self.partitive_multiplier,
            Bound::Closed(0.0),
            Bound::Closed(1.0),
        )?;
        check_range(
            "centrality_boost",
            self.centrality_boost,
            Bound::Closed(0.0),
            Bound::Unbounded,
        )?;
        Ok(())
    }
}

/// Dual-channel merge settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    /// Multiplier for notes found by both channels (default 1.5).
    pub intersection_boost: f64,
    /// Ratio of connected tags to all tags below which the graph channel is ignored (default 0.05).
    pub min_graph_density: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            intersection_boost: 1.5,
            min_graph_density: 0.05,
        }
    }
}

impl MergeConfig {
    pub fn validate(&self) -> RetrievalResult<()> {
        check_range(
            "intersection_boost",
            self.intersection_boost,
            Bound::Closed(1.0),
            Bound::Unbounded,
        )?;
        check_range(
            "min_graph_density",
            self.min_graph_density,
            Bound::Closed(0.0),
            Bound::Closed(1.0),
        )?;
        Ok(())
    }
}

/// Complete configuration for a retrieval call.
///
/// # Examples
///
/// ```
/// use notegraph::RetrievalConfig;
///
/// let config = RetrievalConfig::default();
/// assert_eq!(config.activation.decay_factor, 0.7);
/// assert!(config.validate().is_ok());
///
/// let mut bad = RetrievalConfig::default();
/// bad.activation.decay_factor = 1.0;
/// assert!(bad.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub expansion: ExpansionConfig,
    pub activation: ActivationConfig,
    pub merge: MergeConfig,
    /// Wall-clock backstop for a single call (default 2 s).
    pub timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            expansion: ExpansionConfig::default(),
            activation: ActivationConfig::default(),
            merge: MergeConfig::default(),
            timeout: Duration::from_millis(2000),
        }
    }
}

impl RetrievalConfig {
    /// Checks every tunable, returning the first violation.
    pub fn validate(&self) -> RetrievalResult<()> {
        self.expansion.validate()?;
        self.activation.validate()?;
        self.merge.validate()?;
        if self.timeout.is_zero() {
            return Err(RetrievalError::config("timeout must be greater than zero"));
        }
        Ok(())
    }

    pub fn with_expansion(mut self, expansion: ExpansionConfig) -> Self {
        self.expansion = expansion;
        self
    }

    pub fn with_activation(mut self, activation: ActivationConfig) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_merge(mut self, merge: MergeConfig) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds a configuration from environment variables.
    ///
    /// Unset variables keep their defaults; set but malformed or out-of-range
    /// values are configuration errors rather than silent fallbacks.
    ///
    /// # Environment Variables
    ///
    /// - `NOTEGRAPH_DECAY` (f64, default 0.7)
    /// - `NOTEGRAPH_THRESHOLD` (f64, default 0.1)
    /// - `NOTEGRAPH_MAX_HOPS` (integer >= 0, default 3)
    /// - `NOTEGRAPH_PARTITIVE_MULTIPLIER` (f64, default 0.5)
    /// - `NOTEGRAPH_CENTRALITY_BOOST` (f64, default 0.3)
    /// - `NOTEGRAPH_SHORT_QUERY_TERMS` (integer, default 3)
    /// - `NOTEGRAPH_BROADER_WEIGHT` (f64, default 0.5)
    /// - `NOTEGRAPH_BROADER_MIN_CONFIDENCE` (f64, default 0.0)
    /// - `NOTEGRAPH_MAX_EXPANDED_TERMS` (integer, default 10)
    /// - `NOTEGRAPH_INTERSECTION_BOOST` (f64, default 1.5)
    /// - `NOTEGRAPH_MIN_GRAPH_DENSITY` (f64, default 0.05)
    /// - `NOTEGRAPH_TIMEOUT_MS` (integer, default 2000)
    pub fn from_env() -> RetrievalResult<Self> {
        let defaults = Self::default();

        let config = Self {
            expansion: ExpansionConfig {
                short_query_threshold: env_count(
                    "NOTEGRAPH_SHORT_QUERY_TERMS",
                    defaults.expansion.short_query_threshold,
                )?,
                broader_weight: env_or("NOTEGRAPH_BROADER_WEIGHT", defaults.expansion.broader_weight)?,
                broader_min_confidence: env_or(
                    "NOTEGRAPH_BROADER_MIN_CONFIDENCE",
                    defaults.expansion.broader_min_confidence,
                )?,
                max_expanded_terms: env_count(
                    "NOTEGRAPH_MAX_EXPANDED_TERMS",
                    defaults.expansion.max_expanded_terms,
                )?,
            },
            activation: ActivationConfig {
                decay_factor: env_or("NOTEGRAPH_DECAY", defaults.activation.decay_factor)?,
                threshold: env_or("NOTEGRAPH_THRESHOLD", defaults.activation.threshold)?,
                max_hops: env_count("NOTEGRAPH_MAX_HOPS", defaults.activation.max_hops)?,
                partitive_multiplier: env_or(
                    "NOTEGRAPH_PARTITIVE_MULTIPLIER",
                    defaults.activation.partitive_multiplier,
                )?,
                centrality_boost: env_or(
                    "NOTEGRAPH_CENTRALITY_BOOST",
                    defaults.activation.centrality_boost,
                )?,
            },
            merge: MergeConfig {
                intersection_boost: env_or(
                    "NOTEGRAPH_INTERSECTION_BOOST",
                    defaults.merge.intersection_boost,
                )?,
                min_graph_density: env_or(
                    "NOTEGRAPH_MIN_GRAPH_DENSITY",
                    defaults.merge.min_graph_density,
                )?,
            },
            timeout: Duration::from_millis(env_or(
                "NOTEGRAPH_TIMEOUT_MS",
                defaults.timeout.as_millis() as u64,
            )?),
        };

        config.validate()?;
        Ok(config)
    }
}

enum Bound {
    Open(f64),
    Closed(f64),
    Unbounded,
}

fn check_range(name: &str, value: f64, lower: Bound, upper: Bound) -> RetrievalResult<()> {
    let above = match lower {
        Bound::Open(min) => value > min,
        Bound::Closed(min) => value >= min,
        Bound::Unbounded => true,
    };
    let below = match upper {
        Bound::Open(max) => value < max,
        Bound::Closed(max) => value <= max,
        Bound::Unbounded => true,
    };

    if value.is_finite() && above && below {
        Ok(())
    } else {
        Err(RetrievalError::config(format!(
            "{name} is out of range: {value}"
        )))
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> RetrievalResult<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RetrievalError::config(format!("{key} has malformed value '{raw}'"))),
        Err(_) => Ok(default),
    }
}

/// Like [`env_or`], but reports negative integers as out of range instead of malformed.
fn env_count(key: &str, default: usize) -> RetrievalResult<usize> {
    let value: i64 = env_or(key, default as i64)?;
    usize::try_from(value)
        .map_err(|_| RetrievalError::config(format!("{key} must not be negative, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_KEYS: &[&str] = &[
        "NOTEGRAPH_DECAY",
        "NOTEGRAPH_THRESHOLD",
        "NOTEGRAPH_MAX_HOPS",
        "NOTEGRAPH_PARTITIVE_MULTIPLIER",
        "NOTEGRAPH_CENTRALITY_BOOST",
        "NOTEGRAPH_SHORT_QUERY_TERMS",
        "NOTEGRAPH_BROADER_WEIGHT",
        "NOTEGRAPH_BROADER_MIN_CONFIDENCE",
        "NOTEGRAPH_MAX_EXPANDED_TERMS",
        "NOTEGRAPH_INTERSECTION_BOOST",
        "NOTEGRAPH_MIN_GRAPH_DENSITY",
        "NOTEGRAPH_TIMEOUT_MS",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = RetrievalConfig::default();

        assert_eq!(config.activation.decay_factor, 0.7);
        assert_eq!(config.activation.threshold, 0.1);
        assert_eq!(config.activation.max_hops, 3);
        assert_eq!(config.activation.partitive_multiplier, 0.5);
        assert_eq!(config.activation.centrality_boost, 0.3);
        assert_eq!(config.expansion.short_query_threshold, 3);
        assert_eq!(config.expansion.broader_weight, 0.5);
        assert_eq!(config.expansion.broader_min_confidence, 0.0);
        assert_eq!(config.expansion.max_expanded_terms, 10);
        assert_eq!(config.merge.intersection_boost, 1.5);
        assert_eq!(config.merge.min_graph_density, 0.05);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn decay_and_threshold_reject_closed_bounds() {
        for decay in [0.0, 1.0, -0.3, 1.2, f64::NAN] {
            let mut config = RetrievalConfig::default();
            config.activation.decay_factor = decay;
            assert!(
                matches!(config.validate(), Err(RetrievalError::Configuration(_))),
                "decay {decay} should be rejected"
            );
        }

        for threshold in [0.0, 1.0] {
            let mut config = RetrievalConfig::default();
            config.activation.threshold = threshold;
            assert!(config.validate().is_err(), "threshold {threshold} should be rejected");
        }
    }

    #[test]
    fn zero_hops_is_valid() {
        let mut config = RetrievalConfig::default();
        config.activation.max_hops = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn other_tunables_are_range_checked() {
        let mut config = RetrievalConfig::default();
        config.merge.intersection_boost = 0.5;
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.merge.min_graph_density = 1.5;
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.expansion.max_expanded_terms = 0;
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_setters_replace_sections() {
        let config = RetrievalConfig::default()
            .with_activation(ActivationConfig {
                max_hops: 1,
                ..ActivationConfig::default()
            })
            .with_timeout(Duration::from_millis(50));

        assert_eq!(config.activation.max_hops, 1);
        assert_eq!(config.activation.decay_factor, 0.7);
        assert_eq!(config.timeout, Duration::from_millis(50));
        assert_eq!(config.merge, MergeConfig::default());
    }

    #[test]
    #[serial]
    fn from_env_uses_defaults_when_unset() {
        clear_env();
        let config = RetrievalConfig::from_env().expect("defaults are valid");
        assert_eq!(config, RetrievalConfig::default());
    }

    #[test]
    #[serial]
    fn from_env_reads_custom_values() {
        clear_env();
        unsafe {
            std::env::set_var("NOTEGRAPH_DECAY", "0.5");
            std::env::set_var("NOTEGRAPH_MAX_HOPS", "5");
            std::env::set_var("NOTEGRAPH_MIN_GRAPH_DENSITY", "0.2");
            std::env::set_var("NOTEGRAPH_TIMEOUT_MS", "250");
        }

        let config = RetrievalConfig::from_env().expect("custom values are valid");
        clear_env();

        assert_eq!(config.activation.decay_factor, 0.5);
        assert_eq!(config.activation.max_hops, 5);
        assert_eq!(config.merge.min_graph_density, 0.2);
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    #[serial]
    fn from_env_rejects_negative_hops() {
        clear_env();
        unsafe { std::env::set_var("NOTEGRAPH_MAX_HOPS", "-1") };

        let result = RetrievalConfig::from_env();
        clear_env();

        let err = result.expect_err("negative hops must fail");
        assert!(err.to_string().contains("must not be negative"));
    }

    #[test]
    #[serial]
    fn from_env_rejects_malformed_and_out_of_range_values() {
        clear_env();
        unsafe { std::env::set_var("NOTEGRAPH_DECAY", "fast") };
        let malformed = RetrievalConfig::from_env();
        clear_env();
        assert!(matches!(malformed, Err(RetrievalError::Configuration(_))));

        unsafe { std::env::set_var("NOTEGRAPH_THRESHOLD", "1.5") };
        let out_of_range = RetrievalConfig::from_env();
        clear_env();
        assert!(matches!(out_of_range, Err(RetrievalError::Configuration(_))));
    }
}

use serde::{Deserialize, Serialize};
use shared::RiskTier;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use super::catalog::LabelCatalog;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("IO error reading policy: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error in policy: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid policy: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Below this confidence the tier is UNCERTAIN.
    pub uncertain_below: f64,
    /// Critical labels above this confidence become URGENT.
    pub urgent_above: f64,
    /// Below this confidence every case needs review.
    pub review_below: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBounds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpDays {
    pub urgent: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl FollowUpDays {
    /// UNCERTAIN is scheduled like MEDIUM.
    pub fn for_tier(&self, tier: RiskTier) -> u32 {
        match tier {
            RiskTier::Urgent => self.urgent,
            RiskTier::High => self.high,
            RiskTier::Medium | RiskTier::Uncertain => self.medium,
            RiskTier::Low => self.low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub thresholds: Thresholds,
    pub confidence_tiers: ConfidenceBounds,
    pub high_risk_regions: Vec<String>,
    pub follow_up_days: FollowUpDays,
}

impl PolicyConfig {
    pub fn is_high_risk_region(&self, region: &str) -> bool {
        self.high_risk_regions
            .iter()
            .any(|r| r.eq_ignore_ascii_case(region.trim()))
    }

    fn validate(&self) -> Result<(), PolicyError> {
        let t = &self.thresholds;
        let c = &self.confidence_tiers;
        for (name, value) in [
            ("uncertain_below", t.uncertain_below),
            ("urgent_above", t.urgent_above),
            ("review_below", t.review_below),
            ("confidence_tiers.low", c.low),
            ("confidence_tiers.medium", c.medium),
            ("confidence_tiers.high", c.high),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PolicyError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(c.low < c.medium && c.medium < c.high) {
            return Err(PolicyError::Invalid(
                "confidence tier bounds must be strictly increasing".to_string(),
            ));
        }
        let f = &self.follow_up_days;
        if [f.urgent, f.high, f.medium, f.low].contains(&0) {
            return Err(PolicyError::Invalid(
                "follow-up days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds {
                uncertain_below: 0.4,
                urgent_above: 0.3,
                review_below: 0.5,
            },
            confidence_tiers: ConfidenceBounds {
                low: 0.4,
                medium: 0.6,
                high: 0.8,
            },
            high_risk_regions: ["face", "neck", "hands", "feet", "genitals"]
                .iter()
                .map(|r| r.to_string())
                .collect(),
            follow_up_days: FollowUpDays {
                urgent: 1,
                high: 7,
                medium: 30,
                low: 90,
            },
        }
    }
}

/// Label catalog plus thresholds, as shipped in `config/triage_policy.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriagePolicy {
    pub version: u32,
    #[serde(flatten)]
    pub policy: PolicyConfig,
    pub labels: LabelCatalog,
}

impl Default for TriagePolicy {
    fn default() -> Self {
        Self {
            version: 1,
            policy: PolicyConfig::default(),
            labels: LabelCatalog::default(),
        }
    }
}

impl TriagePolicy {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, PolicyError> {
        let policy: TriagePolicy = serde_yaml::from_str(config_str)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        self.policy.validate()?;
        if self.labels.is_empty() {
            return Err(PolicyError::Invalid("label catalog is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for entry in self.labels.entries() {
            for name in [&entry.code, &entry.display_name] {
                if !seen.insert(name.to_ascii_lowercase()) {
                    return Err(PolicyError::Invalid(format!("duplicate label: {}", name)));
                }
            }
        }
        Ok(())
    }
}

/// Trimmed and lower-cased; blank regions are treated as absent.
pub fn normalize_region(region: Option<&str>) -> Option<String> {
    region
        .map(|r| r.trim().to_ascii_lowercase())
        .filter(|r| !r.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_policy_matches_builtin_default() {
        let path = format!(
            "{}/../config/triage_policy.yaml",
            env!("CARGO_MANIFEST_DIR")
        );
        let loaded = TriagePolicy::load(path).unwrap();
        assert_eq!(loaded, TriagePolicy::default());
    }

    #[test]
    fn default_policy_is_valid() {
        TriagePolicy::default().validate().unwrap();
    }

    #[test]
    fn rejects_unordered_confidence_bounds() {
        let mut policy = TriagePolicy::default();
        policy.policy.confidence_tiers.medium = 0.9;
        assert!(matches!(policy.validate(), Err(PolicyError::Invalid(_))));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut policy = TriagePolicy::default();
        policy.policy.thresholds.urgent_above = 1.5;
        assert!(matches!(policy.validate(), Err(PolicyError::Invalid(_))));
    }

    #[test]
    fn rejects_duplicate_labels() {
        let mut policy = TriagePolicy::default();
        let mut entries = policy.labels.entries().to_vec();
        entries.push(entries[0].clone());
        policy.labels = LabelCatalog::new(entries);
        assert!(matches!(policy.validate(), Err(PolicyError::Invalid(_))));
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(matches!(
            TriagePolicy::from_yaml_str("version: [not, a, number]"),
            Err(PolicyError::Yaml(_))
        ));
    }

    #[test]
    fn uncertain_is_scheduled_like_medium() {
        let days = PolicyConfig::default().follow_up_days;
        assert_eq!(days.for_tier(RiskTier::Uncertain), days.for_tier(RiskTier::Medium));
        assert_eq!(days.for_tier(RiskTier::Urgent), 1);
        assert_eq!(days.for_tier(RiskTier::Low), 90);
    }

    #[test]
    fn region_normalization() {
        assert_eq!(normalize_region(Some("  Face ")), Some("face".to_string()));
        assert_eq!(normalize_region(Some("   ")), None);
        assert_eq!(normalize_region(None), None);
        assert!(PolicyConfig::default().is_high_risk_region("HANDS"));
        assert!(!PolicyConfig::default().is_high_risk_region("back"));
    }
}

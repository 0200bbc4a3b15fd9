use shared::{ConfidenceTier, LabelProbability, RiskAssessment, RiskTier};
use std::sync::Arc;
use thiserror::Error;

use super::catalog::LabelCatalog;
use super::policy::{PolicyConfig, TriagePolicy};

const LOW_CONFIDENCE_NOTE: &str =
    "Low confidence prediction - professional review strongly recommended";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssessmentError {
    #[error("Unknown classifier label: {0}")]
    UnknownLabel(String),
    #[error("Confidence score outside [0, 1]: {0}")]
    InvalidScore(f64),
}

/// Turns a classifier label and confidence into a risk tier.
///
/// Pure and deterministic: the catalog and policy are fixed at construction and
/// shared read-only between workers.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    catalog: Arc<LabelCatalog>,
    policy: Arc<PolicyConfig>,
}

impl RiskEngine {
    pub fn new(catalog: LabelCatalog, policy: PolicyConfig) -> Self {
        Self {
            catalog: Arc::new(catalog),
            policy: Arc::new(policy),
        }
    }

    pub fn from_policy(policy: TriagePolicy) -> Self {
        Self::new(policy.labels, policy.policy)
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn assess(
        &self,
        label: &str,
        confidence: f64,
        body_region: Option<&str>,
    ) -> Result<RiskAssessment, AssessmentError> {
        let entry = self
            .catalog
            .lookup(label)
            .ok_or_else(|| AssessmentError::UnknownLabel(label.to_string()))?;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(AssessmentError::InvalidScore(confidence));
        }
        let thresholds = &self.policy.thresholds;

        let region_escalated = body_region
            .map(|region| self.policy.is_high_risk_region(region))
            .unwrap_or(false);
        let regional_risk = if region_escalated {
            escalate_for_region(entry.base_risk)
        } else {
            entry.base_risk
        };

        // The uncertainty gate is evaluated before the urgent override.
        let risk_tier = if confidence < thresholds.uncertain_below {
            RiskTier::Uncertain
        } else if entry.severity.is_critical() && confidence > thresholds.urgent_above {
            RiskTier::Urgent
        } else {
            regional_risk
        };

        let needs_review = entry.severity.is_high()
            || confidence < thresholds.review_below
            || risk_tier == RiskTier::Uncertain;

        let mut recommendations = entry.recommendations.clone();
        if confidence < self.policy.confidence_tiers.medium {
            recommendations.push(LOW_CONFIDENCE_NOTE.to_string());
        }
        if region_escalated {
            if let Some(region) = body_region {
                recommendations.push(format!(
                    "Lesion in high-risk area ({}) - regular monitoring required",
                    region.trim()
                ));
            }
        }

        Ok(RiskAssessment {
            predicted_label: entry.display_name.clone(),
            confidence_score: confidence,
            risk_tier,
            confidence_tier: self.confidence_tier(confidence),
            needs_review,
            needs_urgent: risk_tier == RiskTier::Urgent,
            follow_up_days: self.policy.follow_up_days.for_tier(risk_tier),
            recommendations,
            top_predictions: Vec::new(),
        })
    }

    /// Assesses the top prediction and keeps up to three leading pairs for reviewers.
    pub fn assess_prediction(
        &self,
        predictions: &[LabelProbability],
        body_region: Option<&str>,
    ) -> Result<RiskAssessment, AssessmentError> {
        let mut ranked: Vec<&LabelProbability> = predictions.iter().collect();
        // Stable sort keeps the first pair on ties.
        ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        let top = ranked
            .first()
            .ok_or_else(|| AssessmentError::UnknownLabel(String::new()))?;

        let mut assessment = self.assess(&top.label, top.probability, body_region)?;
        assessment.top_predictions = ranked.into_iter().take(3).cloned().collect();
        Ok(assessment)
    }

    pub fn confidence_tier(&self, confidence: f64) -> ConfidenceTier {
        let bounds = &self.policy.confidence_tiers;
        if confidence >= bounds.high {
            ConfidenceTier::High
        } else if confidence >= bounds.medium {
            ConfidenceTier::Medium
        } else if confidence >= bounds.low {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::VeryLow
        }
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::from_policy(TriagePolicy::default())
    }
}

fn escalate_for_region(tier: RiskTier) -> RiskTier {
    match tier {
        RiskTier::Low => RiskTier::Medium,
        RiskTier::Medium => RiskTier::High,
        other => other,
    }
}

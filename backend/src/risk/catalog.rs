use serde::{Deserialize, Serialize};
use shared::RiskTier;

/// Clinical severity category of a classifier label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Benign,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// Labels that always need professional review.
    pub fn is_high(&self) -> bool {
        *self >= Severity::High
    }

    /// The most severe category; eligible for the urgent override.
    pub fn is_critical(&self) -> bool {
        *self == Severity::Critical
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub code: String,
    pub display_name: String,
    pub base_risk: RiskTier,
    pub severity: Severity,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl LabelEntry {
    fn matches(&self, label: &str) -> bool {
        self.code.eq_ignore_ascii_case(label) || self.display_name.eq_ignore_ascii_case(label)
    }
}

/// Immutable table of classifier labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelCatalog {
    entries: Vec<LabelEntry>,
}

impl LabelCatalog {
    pub fn new(entries: Vec<LabelEntry>) -> Self {
        Self { entries }
    }

    /// Matches on code or display name, ignoring case and surrounding whitespace.
    pub fn lookup(&self, label: &str) -> Option<&LabelEntry> {
        let label = label.trim();
        self.entries.iter().find(|entry| entry.matches(label))
    }

    pub fn entries(&self) -> &[LabelEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn entry(
    code: &str,
    display_name: &str,
    base_risk: RiskTier,
    severity: Severity,
    recommendations: &[&str],
) -> LabelEntry {
    LabelEntry {
        code: code.to_string(),
        display_name: display_name.to_string(),
        base_risk,
        severity,
        recommendations: recommendations.iter().map(|r| r.to_string()).collect(),
    }
}

impl Default for LabelCatalog {
    fn default() -> Self {
        Self::new(vec![
            entry(
                "ACK",
                "ACK (Actinic keratoses)",
                RiskTier::Medium,
                Severity::Moderate,
                &[
                    "Monitor for changes in size, color, or texture",
                    "Use sun protection to prevent progression",
                    "Consider dermatologist consultation",
                ],
            ),
            entry(
                "BCC",
                "BCC (Basal cell carcinoma)",
                RiskTier::High,
                Severity::High,
                &[
                    "Schedule appointment with dermatologist soon",
                    "This requires professional medical evaluation",
                    "Follow-up within 1-2 weeks recommended",
                ],
            ),
            entry(
                "MEL",
                "MEL (Melanoma)",
                RiskTier::Urgent,
                Severity::Critical,
                &[
                    "URGENT: Seek immediate medical attention",
                    "Contact a dermatologist within 24 hours",
                    "Do not delay evaluation",
                ],
            ),
            entry(
                "NEV",
                "NEV (Nevus/Mole)",
                RiskTier::Low,
                Severity::Benign,
                &[
                    "Common benign mole, monitor regularly",
                    "Use the ABCDE rule for monitoring changes",
                ],
            ),
            entry(
                "SCC",
                "SCC (Squamous cell carcinoma)",
                RiskTier::High,
                Severity::High,
                &[
                    "Schedule dermatologist appointment promptly",
                    "Monitor for rapid growth or changes",
                ],
            ),
            entry(
                "SEK",
                "SEK (Seborrheic keratosis)",
                RiskTier::Low,
                Severity::Benign,
                &[
                    "Generally benign but monitor for changes",
                    "Follow-up if lesion changes significantly",
                ],
            ),
        ])
    }
}

use chrono::{DateTime, Utc};
use derive_more::IsVariant;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

/// Ordinal urgency classification that drives follow-up timing and routing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Urgent,
    Uncertain,
}

impl RiskTier {
    /// Position on the scale LOW < MEDIUM < HIGH < URGENT. `Uncertain` is off the scale.
    pub fn ordinal(&self) -> Option<u8> {
        match self {
            RiskTier::Low => Some(0),
            RiskTier::Medium => Some(1),
            RiskTier::High => Some(2),
            RiskTier::Urgent => Some(3),
            RiskTier::Uncertain => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ConfidenceTier {
    VeryLow,
    Low,
    Medium,
    High,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    IsVariant,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum CaseStatus {
    Pending,
    Reviewed,
    Escalated,
    Completed,
}

impl Default for CaseStatus {
    fn default() -> Self {
        CaseStatus::Pending
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelProbability {
    pub label: String,
    pub probability: f64,
}

/// Body sent to the image classifier.
#[derive(Serialize, Deserialize, Clone)]
pub struct InferenceRequest {
    pub image_data: String,
}

/// Classifier reply: (label, probability) pairs over the fixed label set.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InferenceResponse {
    pub predictions: Vec<LabelProbability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub predicted_label: String,
    pub confidence_score: f64,
    pub risk_tier: RiskTier,
    pub confidence_tier: ConfidenceTier,
    pub needs_review: bool,
    pub needs_urgent: bool,
    pub follow_up_days: u32,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub top_predictions: Vec<LabelProbability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub mime_type: String,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadreReview {
    pub case_id: Uuid,
    pub reviewer_id: String,
    pub notes: String,
    pub agrees_with_ai: bool,
    pub escalate: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorConsultation {
    pub case_id: Uuid,
    pub reviewer_id: String,
    pub diagnosis: String,
    pub treatment_plan: String,
    pub urgency_level: UrgencyLevel,
    pub requires_specialist: bool,
    pub follow_up_days: u32,
    pub created_at: DateTime<Utc>,
}

/// One uploaded lesion image with its assessment and review trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub patient_id: String,
    pub body_region: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: CaseStatus,
    pub cadre_reviewer_id: Option<String>,
    pub doctor_reviewer_id: Option<String>,
    pub risk_assessment: RiskAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadMetadata>,
    #[serde(default)]
    pub reviews: Vec<CadreReview>,
    #[serde(default)]
    pub consultations: Vec<DoctorConsultation>,
}

impl Case {
    pub fn new(
        patient_id: String,
        body_region: Option<String>,
        risk_assessment: RiskAssessment,
        upload: Option<UploadMetadata>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            body_region,
            uploaded_at: now,
            updated_at: now,
            status: CaseStatus::default(),
            cadre_reviewer_id: None,
            doctor_reviewer_id: None,
            risk_assessment,
            upload,
            reviews: Vec::new(),
            consultations: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_completed()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CadreReviewRequest {
    pub reviewer_id: String,
    #[serde(default)]
    pub notes: String,
    pub agrees_with_ai: bool,
    #[serde(default)]
    pub escalate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DoctorConsultationRequest {
    pub reviewer_id: String,
    pub diagnosis: String,
    pub treatment_plan: String,
    pub urgency_level: UrgencyLevel,
    #[serde(default)]
    pub requires_specialist: bool,
    #[serde(default)]
    pub follow_up_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssessmentRequest {
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub body_region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub cadre_pending: usize,
    pub doctor_pending: usize,
    pub urgent_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub uncertain_count: usize,
    pub low_count: usize,
    pub uploaded_today: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CaseStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn risk_tier_parses_case_insensitively() {
        assert_eq!(RiskTier::from_str("urgent").unwrap(), RiskTier::Urgent);
        assert_eq!(RiskTier::from_str("Uncertain").unwrap(), RiskTier::Uncertain);
        assert!(RiskTier::from_str("critical").is_err());
    }

    #[test]
    fn enum_wire_names_match_display() {
        for tier in ConfidenceTier::iter() {
            let json = serde_json::to_string(&tier).unwrap();
            assert_eq!(json, format!("\"{}\"", tier));
        }
        assert_eq!(ConfidenceTier::VeryLow.to_string(), "VERY_LOW");
    }

    #[test]
    fn ordinal_scale_excludes_uncertain() {
        assert!(RiskTier::Low.ordinal() < RiskTier::Medium.ordinal());
        assert!(RiskTier::High.ordinal() < RiskTier::Urgent.ordinal());
        assert_eq!(RiskTier::Uncertain.ordinal(), None);
    }

    #[test]
    fn new_case_starts_pending_and_unclaimed() {
        let assessment = RiskAssessment {
            predicted_label: "NEV (Nevus/Mole)".into(),
            confidence_score: 0.9,
            risk_tier: RiskTier::Low,
            confidence_tier: ConfidenceTier::High,
            needs_review: false,
            needs_urgent: false,
            follow_up_days: 90,
            recommendations: vec![],
            top_predictions: vec![],
        };
        let case = Case::new("patient-1".into(), None, assessment, None);
        assert!(case.status.is_pending());
        assert!(case.is_open());
        assert!(case.cadre_reviewer_id.is_none());
        assert!(case.doctor_reviewer_id.is_none());
        assert_eq!(case.uploaded_at, case.updated_at);
    }
}

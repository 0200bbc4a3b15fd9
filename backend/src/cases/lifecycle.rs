use chrono::Utc;
use log::{error, info, warn};
use shared::{
    CadreReview, CadreReviewRequest, Case, DoctorConsultation, DoctorConsultationRequest,
    LabelProbability, UploadMetadata,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::error::LifecycleError;
use super::upload::ImageUpload;
use crate::classifier::{Classifier, validate_predictions};
use crate::db::{CaseStore, StoreError};
use crate::notify::{EscalationEvent, EscalationKind, NotificationDispatcher};
use crate::risk::{RiskEngine, normalize_region};

pub const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// The only writer of case status and reviewer fields.
///
/// Every transition is a single conditional write in the store; this type never
/// holds locks of its own, so contention is confined to one case at a time.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn CaseStore>,
    engine: RiskEngine,
    classifier: Arc<dyn Classifier>,
    notifications: NotificationDispatcher,
    classifier_timeout: Duration,
    max_image_bytes: usize,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn CaseStore>,
        engine: RiskEngine,
        classifier: Arc<dyn Classifier>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            engine,
            classifier,
            notifications,
            classifier_timeout: DEFAULT_CLASSIFIER_TIMEOUT,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_classifier_timeout(mut self, timeout: Duration) -> Self {
        self.classifier_timeout = timeout;
        self
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    pub fn store(&self) -> Arc<dyn CaseStore> {
        self.store.clone()
    }

    /// Classifies the image and creates a PENDING case. Nothing is written unless
    /// classification and assessment both succeed.
    pub async fn create_case(
        &self,
        patient_id: &str,
        body_region: Option<&str>,
        upload: ImageUpload,
    ) -> Result<Case, LifecycleError> {
        validate_patient_id(patient_id)?;
        upload
            .validate(self.max_image_bytes)
            .map_err(|e| LifecycleError::validation(e.to_string()))?;

        let predictions =
            match tokio::time::timeout(self.classifier_timeout, self.classifier.classify(&upload.data))
                .await
            {
                Ok(result) => result.map_err(|e| {
                    error!("Classifier failed for patient {}: {}", patient_id, e);
                    LifecycleError::from(e)
                })?,
                Err(_) => {
                    warn!(
                        "Classifier exceeded {:?} for patient {}",
                        self.classifier_timeout, patient_id
                    );
                    return Err(LifecycleError::ClassifierTimeout);
                }
            };

        self.create_case_from_output(patient_id, body_region, &predictions, Some(upload.metadata()))
            .await
    }

    /// Creates a PENDING case from an already obtained classifier output.
    pub async fn create_case_from_output(
        &self,
        patient_id: &str,
        body_region: Option<&str>,
        predictions: &[LabelProbability],
        upload: Option<UploadMetadata>,
    ) -> Result<Case, LifecycleError> {
        validate_patient_id(patient_id)?;
        validate_predictions(predictions).map_err(LifecycleError::validation)?;

        let body_region = normalize_region(body_region);
        let assessment = self
            .engine
            .assess_prediction(predictions, body_region.as_deref())?;

        let case = Case::new(patient_id.trim().to_string(), body_region, assessment, upload);
        self.store.insert(&case).await?;
        info!(
            "Created case {} for patient {}: {} ({}), tier {}",
            case.id,
            case.patient_id,
            case.risk_assessment.predicted_label,
            case.risk_assessment.confidence_tier,
            case.risk_assessment.risk_tier
        );

        if case.risk_assessment.needs_urgent {
            self.notifications
                .dispatch(EscalationEvent::for_case(EscalationKind::UrgentCase, &case));
        }
        Ok(case)
    }

    pub async fn submit_cadre_review(
        &self,
        case_id: Uuid,
        request: CadreReviewRequest,
    ) -> Result<Case, LifecycleError> {
        let reviewer_id = required("reviewer_id", &request.reviewer_id, Some(case_id))?;
        let review = CadreReview {
            case_id,
            reviewer_id,
            notes: request.notes.trim().to_string(),
            agrees_with_ai: request.agrees_with_ai,
            escalate: request.escalate,
            created_at: Utc::now(),
        };

        let case = match self.store.record_cadre_review(review).await {
            Ok(case) => case,
            Err(StoreError::ConditionFailed(current)) => {
                warn!(
                    "Rejected cadre review on case {} in status {}",
                    current.id, current.status
                );
                return Err(if current.cadre_reviewer_id.is_some() {
                    LifecycleError::AlreadyClaimed {
                        case_id: current.id,
                        status: current.status,
                    }
                } else {
                    LifecycleError::InvalidState {
                        case_id: current.id,
                        status: current.status,
                        action: "submit a cadre review for",
                    }
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Cadre {} reviewed case {} -> {}",
            case.cadre_reviewer_id.as_deref().unwrap_or_default(),
            case.id,
            case.status
        );
        if case.status.is_escalated() {
            self.notifications
                .dispatch(EscalationEvent::for_case(EscalationKind::Escalated, &case));
        }
        Ok(case)
    }

    pub async fn submit_doctor_consultation(
        &self,
        case_id: Uuid,
        request: DoctorConsultationRequest,
    ) -> Result<Case, LifecycleError> {
        let reviewer_id = required("reviewer_id", &request.reviewer_id, Some(case_id))?;
        let diagnosis = required("diagnosis", &request.diagnosis, Some(case_id))?;
        let treatment_plan = required("treatment_plan", &request.treatment_plan, Some(case_id))?;

        // Advisory read for the default follow-up; the conditional write decides.
        let current = self.get_case(case_id).await?;
        let follow_up_days = request
            .follow_up_days
            .unwrap_or(current.risk_assessment.follow_up_days);

        let consultation = DoctorConsultation {
            case_id,
            reviewer_id,
            diagnosis,
            treatment_plan,
            urgency_level: request.urgency_level,
            requires_specialist: request.requires_specialist,
            follow_up_days,
            created_at: Utc::now(),
        };

        let case = match self.store.record_consultation(consultation).await {
            Ok(case) => case,
            Err(StoreError::ConditionFailed(current)) => {
                warn!(
                    "Rejected doctor consultation on case {} in status {}",
                    current.id, current.status
                );
                return Err(if current.doctor_reviewer_id.is_some() {
                    LifecycleError::AlreadyConsulted {
                        case_id: current.id,
                        status: current.status,
                    }
                } else {
                    LifecycleError::InvalidState {
                        case_id: current.id,
                        status: current.status,
                        action: "submit a doctor consultation for",
                    }
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Doctor {} completed case {}",
            case.doctor_reviewer_id.as_deref().unwrap_or_default(),
            case.id
        );
        Ok(case)
    }

    pub async fn get_case(&self, case_id: Uuid) -> Result<Case, LifecycleError> {
        self.store
            .get(case_id)
            .await?
            .ok_or(LifecycleError::CaseNotFound { case_id })
    }

    /// Newest upload first.
    pub async fn patient_history(&self, patient_id: &str) -> Result<Vec<Case>, LifecycleError> {
        validate_patient_id(patient_id)?;
        let mut cases = self.store.list_by_patient(patient_id.trim()).await?;
        cases.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(cases)
    }
}

fn validate_patient_id(patient_id: &str) -> Result<(), LifecycleError> {
    required("patient_id", patient_id, None).map(|_| ())
}

fn required(field: &str, value: &str, case_id: Option<Uuid>) -> Result<String, LifecycleError> {
    let value = value.trim();
    if value.is_empty() {
        let message = format!("{} must not be empty", field);
        return Err(match case_id {
            Some(case_id) => LifecycleError::invalid_for_case(case_id, message),
            None => LifecycleError::validation(message),
        });
    }
    Ok(value.to_string())
}

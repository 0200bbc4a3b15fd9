//! Case state machine.
//!
//! PENDING -> REVIEWED | ESCALATED via a cadre review, and any open status ->
//! COMPLETED via a doctor consultation. COMPLETED has no outgoing transitions.
//! Stores evaluate the guards and apply the transition inside one atomic write.

use shared::{CadreReview, Case, CaseStatus, DoctorConsultation};

pub fn can_record_cadre_review(case: &Case) -> bool {
    case.status.is_pending() && case.cadre_reviewer_id.is_none()
}

pub fn can_record_consultation(case: &Case) -> bool {
    case.is_open() && case.doctor_reviewer_id.is_none()
}

pub fn cadre_outcome(escalate: bool) -> CaseStatus {
    if escalate {
        CaseStatus::Escalated
    } else {
        CaseStatus::Reviewed
    }
}

/// Caller must have checked `can_record_cadre_review` under the same lock or condition.
pub fn apply_cadre_review(case: &mut Case, review: CadreReview) {
    case.status = cadre_outcome(review.escalate);
    case.cadre_reviewer_id = Some(review.reviewer_id.clone());
    case.updated_at = review.created_at;
    case.reviews.push(review);
}

/// Caller must have checked `can_record_consultation` under the same lock or condition.
pub fn apply_consultation(case: &mut Case, consultation: DoctorConsultation) {
    case.status = CaseStatus::Completed;
    case.doctor_reviewer_id = Some(consultation.reviewer_id.clone());
    case.updated_at = consultation.created_at;
    case.consultations.push(consultation);
}

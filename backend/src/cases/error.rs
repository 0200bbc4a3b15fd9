use shared::CaseStatus;
use uuid::Uuid;

use crate::classifier::ClassifierError;
use crate::db::StoreError;
use crate::risk::AssessmentError;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        case_id: Option<Uuid>,
    },
    #[error("Case not found: {case_id}")]
    CaseNotFound { case_id: Uuid },
    #[error("Cannot {action} case {case_id} in status {status}")]
    InvalidState {
        case_id: Uuid,
        status: CaseStatus,
        action: &'static str,
    },
    #[error("Case {case_id} was already claimed by a cadre reviewer (status {status})")]
    AlreadyClaimed { case_id: Uuid, status: CaseStatus },
    #[error("Case {case_id} already has a doctor consultation (status {status})")]
    AlreadyConsulted { case_id: Uuid, status: CaseStatus },
    #[error("Classifier timed out")]
    ClassifierTimeout,
    #[error("Classifier error: {0}")]
    Classifier(String),
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl LifecycleError {
    pub fn validation(message: impl Into<String>) -> Self {
        LifecycleError::Validation {
            message: message.into(),
            case_id: None,
        }
    }

    /// Validation failure on a request that targets an existing case.
    pub fn invalid_for_case(case_id: Uuid, message: impl Into<String>) -> Self {
        LifecycleError::Validation {
            message: message.into(),
            case_id: Some(case_id),
        }
    }

    pub fn case_id(&self) -> Option<Uuid> {
        match self {
            LifecycleError::Validation { case_id, .. } => *case_id,
            LifecycleError::CaseNotFound { case_id }
            | LifecycleError::InvalidState { case_id, .. }
            | LifecycleError::AlreadyClaimed { case_id, .. }
            | LifecycleError::AlreadyConsulted { case_id, .. } => Some(*case_id),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<CaseStatus> {
        match self {
            LifecycleError::InvalidState { status, .. }
            | LifecycleError::AlreadyClaimed { status, .. }
            | LifecycleError::AlreadyConsulted { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::Validation { .. } => "VALIDATION_ERROR",
            LifecycleError::CaseNotFound { .. } => "CASE_NOT_FOUND",
            LifecycleError::InvalidState { .. } => "INVALID_STATE",
            LifecycleError::AlreadyClaimed { .. } => "ALREADY_CLAIMED",
            LifecycleError::AlreadyConsulted { .. } => "ALREADY_CONSULTED",
            LifecycleError::ClassifierTimeout => "CLASSIFIER_TIMEOUT",
            LifecycleError::Classifier(_) => "CLASSIFIER_ERROR",
            LifecycleError::Assessment(AssessmentError::UnknownLabel(_)) => "UNKNOWN_LABEL",
            LifecycleError::Assessment(AssessmentError::InvalidScore(_)) => "INVALID_SCORE",
            LifecycleError::Store(_) => "STORE_ERROR",
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(case_id) => LifecycleError::CaseNotFound { case_id },
            other => LifecycleError::Store(other),
        }
    }
}

impl From<ClassifierError> for LifecycleError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::Timeout => LifecycleError::ClassifierTimeout,
            other => LifecycleError::Classifier(other.to_string()),
        }
    }
}

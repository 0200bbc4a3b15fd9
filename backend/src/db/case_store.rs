use async_trait::async_trait;
use shared::{CadreReview, Case, DoctorConsultation};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Case not found: {0}")]
    NotFound(Uuid),
    #[error("Case already exists: {0}")]
    AlreadyExists(Uuid),
    /// The conditional write was rejected; carries the case as it currently is.
    #[error("Condition failed for case {} in status {}", .0.id, .0.status)]
    ConditionFailed(Box<Case>),
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

/// Keyed case records with atomic conditional updates per case id.
///
/// `record_cadre_review` and `record_consultation` each evaluate the transition
/// guard and apply the transition as one indivisible write; on a failed guard
/// they return `ConditionFailed` with the current record and change nothing.
#[async_trait]
pub trait CaseStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn insert(&self, case: &Case) -> Result<(), StoreError>;

    async fn get(&self, case_id: Uuid) -> Result<Option<Case>, StoreError>;

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Case>, StoreError>;

    /// Every case whose status is not COMPLETED.
    async fn list_open(&self) -> Result<Vec<Case>, StoreError>;

    async fn record_cadre_review(&self, review: CadreReview) -> Result<Case, StoreError>;

    async fn record_consultation(
        &self,
        consultation: DoctorConsultation,
    ) -> Result<Case, StoreError>;
}

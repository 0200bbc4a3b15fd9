use async_trait::async_trait;
use log::debug;
use shared::{CadreReview, Case, DoctorConsultation};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::case_store::{CaseStore, StoreError};
use crate::cases::transitions;

/// Process-local store. Conditional writes hold the write lock for the whole
/// check-and-apply, which makes them linearizable per case.
#[derive(Debug, Default)]
pub struct InMemoryCaseStore {
    cases: RwLock<HashMap<Uuid, Case>>,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.cases.read().await.len()
    }
}

#[async_trait]
impl CaseStore for InMemoryCaseStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, case: &Case) -> Result<(), StoreError> {
        let mut cases = self.cases.write().await;
        if cases.contains_key(&case.id) {
            return Err(StoreError::AlreadyExists(case.id));
        }
        cases.insert(case.id, case.clone());
        debug!("Stored case {} in memory", case.id);
        Ok(())
    }

    async fn get(&self, case_id: Uuid) -> Result<Option<Case>, StoreError> {
        Ok(self.cases.read().await.get(&case_id).cloned())
    }

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Case>, StoreError> {
        let cases = self.cases.read().await;
        Ok(cases
            .values()
            .filter(|case| case.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn list_open(&self) -> Result<Vec<Case>, StoreError> {
        let cases = self.cases.read().await;
        Ok(cases.values().filter(|case| case.is_open()).cloned().collect())
    }

    async fn record_cadre_review(&self, review: CadreReview) -> Result<Case, StoreError> {
        let mut cases = self.cases.write().await;
        let case = cases
            .get_mut(&review.case_id)
            .ok_or(StoreError::NotFound(review.case_id))?;
        if !transitions::can_record_cadre_review(case) {
            return Err(StoreError::ConditionFailed(Box::new(case.clone())));
        }
        transitions::apply_cadre_review(case, review);
        Ok(case.clone())
    }

    async fn record_consultation(
        &self,
        consultation: DoctorConsultation,
    ) -> Result<Case, StoreError> {
        let mut cases = self.cases.write().await;
        let case = cases
            .get_mut(&consultation.case_id)
            .ok_or(StoreError::NotFound(consultation.case_id))?;
        if !transitions::can_record_consultation(case) {
            return Err(StoreError::ConditionFailed(Box::new(case.clone())));
        }
        transitions::apply_consultation(case, consultation);
        Ok(case.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskEngine;
    use chrono::Utc;
    use shared::CaseStatus;

    fn case_for(patient: &str) -> Case {
        let assessment = RiskEngine::default().assess("NEV", 0.9, None).unwrap();
        Case::new(patient.into(), None, assessment, None)
    }

    fn review(case_id: Uuid, reviewer: &str) -> CadreReview {
        CadreReview {
            case_id,
            reviewer_id: reviewer.into(),
            notes: String::new(),
            agrees_with_ai: true,
            escalate: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = InMemoryCaseStore::new();
        let case = case_for("p1");
        store.insert(&case).await.unwrap();
        assert!(matches!(
            store.insert(&case).await,
            Err(StoreError::AlreadyExists(id)) if id == case.id
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn second_cadre_review_fails_condition_and_keeps_first() {
        let store = InMemoryCaseStore::new();
        let case = case_for("p1");
        store.insert(&case).await.unwrap();

        let updated = store.record_cadre_review(review(case.id, "a")).await.unwrap();
        assert_eq!(updated.status, CaseStatus::Reviewed);

        match store.record_cadre_review(review(case.id, "b")).await {
            Err(StoreError::ConditionFailed(current)) => {
                assert_eq!(current.cadre_reviewer_id.as_deref(), Some("a"));
                assert_eq!(current.reviews.len(), 1);
            }
            other => panic!("expected condition failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_case_is_not_found() {
        let store = InMemoryCaseStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.record_cadre_review(review(id, "a")).await,
            Err(StoreError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn listings_filter_by_patient_and_open_status() {
        let store = InMemoryCaseStore::new();
        let a = case_for("p1");
        let b = case_for("p2");
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        let history = store.list_by_patient("p1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, a.id);
        assert_eq!(store.list_open().await.unwrap().len(), 2);
    }
}

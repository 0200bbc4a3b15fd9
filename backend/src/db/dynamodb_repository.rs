use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use shared::{CadreReview, Case, CaseStatus, DoctorConsultation, RiskAssessment, UploadMetadata};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::case_store::{CaseStore, StoreError};

type Item = HashMap<String, AttributeValue>;

#[derive(Clone)]
pub struct DynamoDbCaseRepository {
    client: Client,
    cases_table: String,
}

impl DynamoDbCaseRepository {
    pub fn new(client: Client, cases_table: String) -> Self {
        Self {
            client,
            cases_table,
        }
    }

    async fn scan_cases(
        &self,
        filter_expression: &str,
        names: &[(&str, &str)],
        values: Vec<(&str, AttributeValue)>,
    ) -> Result<Vec<Case>, StoreError> {
        let mut cases = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let mut request = self
                .client
                .scan()
                .table_name(&self.cases_table)
                .filter_expression(filter_expression)
                .set_exclusive_start_key(start_key.take());
            for (placeholder, name) in names {
                request = request.expression_attribute_names(*placeholder, *name);
            }
            for (placeholder, value) in &values {
                request = request.expression_attribute_values(*placeholder, value.clone());
            }

            let result = request.send().await.map_err(|e| {
                error!("DynamoDB scan on '{}' failed: {:?}", self.cases_table, e);
                StoreError::DynamoDb(e.to_string())
            })?;

            if let Some(items) = result.items {
                for item in items {
                    cases.push(self.parse_case_from_item(item)?);
                }
            }
            match result.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        debug!(
            "Scan '{}' on '{}' returned {} cases",
            filter_expression,
            self.cases_table,
            cases.len()
        );
        Ok(cases)
    }

    /// Re-reads a case after a rejected conditional write.
    async fn condition_failure(&self, case_id: Uuid) -> StoreError {
        match self.get(case_id).await {
            Ok(Some(current)) => StoreError::ConditionFailed(Box::new(current)),
            Ok(None) => StoreError::NotFound(case_id),
            Err(e) => e,
        }
    }

    fn case_to_item(&self, case: &Case) -> Result<Item, StoreError> {
        debug!("Converting case {} to DynamoDB attributes", case.id);
        let mut item = HashMap::new();
        item.insert("id".to_string(), AttributeValue::S(case.id.to_string()));
        item.insert(
            "patient_id".to_string(),
            AttributeValue::S(case.patient_id.clone()),
        );
        if let Some(body_region) = &case.body_region {
            item.insert(
                "body_region".to_string(),
                AttributeValue::S(body_region.clone()),
            );
        }
        item.insert(
            "uploaded_at".to_string(),
            AttributeValue::S(case.uploaded_at.to_rfc3339()),
        );
        item.insert(
            "updated_at".to_string(),
            AttributeValue::S(case.updated_at.to_rfc3339()),
        );
        item.insert("status".to_string(), AttributeValue::S(case.status.to_string()));
        if let Some(reviewer) = &case.cadre_reviewer_id {
            item.insert(
                "cadre_reviewer_id".to_string(),
                AttributeValue::S(reviewer.clone()),
            );
        }
        if let Some(reviewer) = &case.doctor_reviewer_id {
            item.insert(
                "doctor_reviewer_id".to_string(),
                AttributeValue::S(reviewer.clone()),
            );
        }
        // Denormalised for queue filters.
        item.insert(
            "risk_tier".to_string(),
            AttributeValue::S(case.risk_assessment.risk_tier.to_string()),
        );
        item.insert(
            "needs_review".to_string(),
            AttributeValue::Bool(case.risk_assessment.needs_review),
        );
        item.insert(
            "risk_assessment".to_string(),
            AttributeValue::S(serde_json::to_string(&case.risk_assessment)?),
        );
        if let Some(upload) = &case.upload {
            item.insert(
                "upload".to_string(),
                AttributeValue::S(serde_json::to_string(upload)?),
            );
        }
        item.insert(
            "reviews".to_string(),
            AttributeValue::L(json_list(&case.reviews)?),
        );
        item.insert(
            "consultations".to_string(),
            AttributeValue::L(json_list(&case.consultations)?),
        );
        Ok(item)
    }

    fn parse_case_from_item(&self, item: Item) -> Result<Case, StoreError> {
        let id = item
            .get("id")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| StoreError::InvalidData("Invalid case id".to_string()))?;

        let patient_id = item
            .get("patient_id")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| StoreError::InvalidData("Invalid patient_id".to_string()))?
            .clone();

        let body_region = item.get("body_region").and_then(|v| v.as_s().ok()).cloned();

        let uploaded_at = parse_timestamp(&item, "uploaded_at")?;
        let updated_at = item
            .get("updated_at")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(uploaded_at);

        let status = item
            .get("status")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| CaseStatus::from_str(s).ok())
            .ok_or_else(|| StoreError::InvalidData("Invalid status".to_string()))?;

        let cadre_reviewer_id = item
            .get("cadre_reviewer_id")
            .and_then(|v| v.as_s().ok())
            .cloned();
        let doctor_reviewer_id = item
            .get("doctor_reviewer_id")
            .and_then(|v| v.as_s().ok())
            .cloned();

        let risk_assessment: RiskAssessment = item
            .get("risk_assessment")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| StoreError::InvalidData("Missing risk_assessment".to_string()))
            .and_then(|s| serde_json::from_str(s).map_err(StoreError::from))?;

        let upload: Option<UploadMetadata> = match item.get("upload").and_then(|v| v.as_s().ok()) {
            Some(s) => Some(serde_json::from_str(s)?),
            None => None,
        };

        let reviews: Vec<CadreReview> = parse_json_list(&item, "reviews")?;
        let consultations: Vec<DoctorConsultation> = parse_json_list(&item, "consultations")?;

        debug!("DynamoDB attributes converted into case {}", id);
        Ok(Case {
            id,
            patient_id,
            body_region,
            uploaded_at,
            updated_at,
            status,
            cadre_reviewer_id,
            doctor_reviewer_id,
            risk_assessment,
            upload,
            reviews,
            consultations,
        })
    }
}

fn json_list<T: serde::Serialize>(values: &[T]) -> Result<Vec<AttributeValue>, StoreError> {
    values
        .iter()
        .map(|v| Ok(AttributeValue::S(serde_json::to_string(v)?)))
        .collect()
}

fn parse_json_list<T: serde::de::DeserializeOwned>(
    item: &Item,
    key: &str,
) -> Result<Vec<T>, StoreError> {
    let Some(list) = item.get(key).and_then(|v| v.as_l().ok()) else {
        return Ok(Vec::new());
    };
    list.iter()
        .map(|entry| {
            let raw = entry
                .as_s()
                .map_err(|_| StoreError::InvalidData(format!("Invalid entry in {}", key)))?;
            Ok(serde_json::from_str(raw)?)
        })
        .collect()
}

fn parse_timestamp(item: &Item, key: &str) -> Result<DateTime<Utc>, StoreError> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| StoreError::InvalidData(format!("Invalid {}", key)))
}

#[async_trait]
impl CaseStore for DynamoDbCaseRepository {
    fn backend_name(&self) -> &'static str {
        "dynamodb"
    }

    async fn insert(&self, case: &Case) -> Result<(), StoreError> {
        info!("Creating case {} in DynamoDB table '{}'", case.id, self.cases_table);
        let item = self.case_to_item(case)?;

        match self
            .client
            .put_item()
            .table_name(&self.cases_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                if e
                    .as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    return Err(StoreError::AlreadyExists(case.id));
                }
                error!("DynamoDB put_item failed for case {}: {:?}", case.id, e);
                Err(StoreError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn get(&self, case_id: Uuid) -> Result<Option<Case>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.cases_table)
            .key("id", AttributeValue::S(case_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| {
                error!("DynamoDB get_item failed for case {}: {:?}", case_id, e);
                StoreError::DynamoDb(e.to_string())
            })?;

        match result.item {
            Some(item) => Ok(Some(self.parse_case_from_item(item)?)),
            None => Ok(None),
        }
    }

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Case>, StoreError> {
        self.scan_cases(
            "patient_id = :patient_id",
            &[],
            vec![(":patient_id", AttributeValue::S(patient_id.to_string()))],
        )
        .await
    }

    async fn list_open(&self) -> Result<Vec<Case>, StoreError> {
        self.scan_cases(
            "#status <> :completed",
            &[("#status", "status")],
            vec![(
                ":completed",
                AttributeValue::S(CaseStatus::Completed.to_string()),
            )],
        )
        .await
    }

    async fn record_cadre_review(&self, review: CadreReview) -> Result<Case, StoreError> {
        let case_id = review.case_id;
        let next_status = crate::cases::transitions::cadre_outcome(review.escalate);
        let review_json = serde_json::to_string(&review)?;

        let result = self
            .client
            .update_item()
            .table_name(&self.cases_table)
            .key("id", AttributeValue::S(case_id.to_string()))
            .update_expression(
                "SET #status = :next, cadre_reviewer_id = :reviewer, updated_at = :updated_at, \
                 reviews = list_append(if_not_exists(reviews, :empty), :review)",
            )
            .condition_expression(
                "attribute_exists(id) AND #status = :pending AND attribute_not_exists(cadre_reviewer_id)",
            )
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":next", AttributeValue::S(next_status.to_string()))
            .expression_attribute_values(":pending", AttributeValue::S(CaseStatus::Pending.to_string()))
            .expression_attribute_values(":reviewer", AttributeValue::S(review.reviewer_id.clone()))
            .expression_attribute_values(
                ":updated_at",
                AttributeValue::S(review.created_at.to_rfc3339()),
            )
            .expression_attribute_values(":empty", AttributeValue::L(Vec::new()))
            .expression_attribute_values(":review", AttributeValue::L(vec![AttributeValue::S(review_json)]))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(output) => {
                let item = output.attributes.ok_or_else(|| {
                    StoreError::InvalidData("update_item returned no attributes".to_string())
                })?;
                self.parse_case_from_item(item)
            }
            Err(e) => {
                if e
                    .as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    warn!("Cadre review condition failed for case {}", case_id);
                    return Err(self.condition_failure(case_id).await);
                }
                error!("DynamoDB update_item failed for case {}: {:?}", case_id, e);
                Err(StoreError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn record_consultation(
        &self,
        consultation: DoctorConsultation,
    ) -> Result<Case, StoreError> {
        let case_id = consultation.case_id;
        let consultation_json = serde_json::to_string(&consultation)?;

        let result = self
            .client
            .update_item()
            .table_name(&self.cases_table)
            .key("id", AttributeValue::S(case_id.to_string()))
            .update_expression(
                "SET #status = :completed, doctor_reviewer_id = :reviewer, updated_at = :updated_at, \
                 consultations = list_append(if_not_exists(consultations, :empty), :consultation)",
            )
            .condition_expression(
                "attribute_exists(id) AND #status IN (:pending, :reviewed, :escalated) \
                 AND attribute_not_exists(doctor_reviewer_id)",
            )
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(
                ":completed",
                AttributeValue::S(CaseStatus::Completed.to_string()),
            )
            .expression_attribute_values(":pending", AttributeValue::S(CaseStatus::Pending.to_string()))
            .expression_attribute_values(
                ":reviewed",
                AttributeValue::S(CaseStatus::Reviewed.to_string()),
            )
            .expression_attribute_values(
                ":escalated",
                AttributeValue::S(CaseStatus::Escalated.to_string()),
            )
            .expression_attribute_values(
                ":reviewer",
                AttributeValue::S(consultation.reviewer_id.clone()),
            )
            .expression_attribute_values(
                ":updated_at",
                AttributeValue::S(consultation.created_at.to_rfc3339()),
            )
            .expression_attribute_values(":empty", AttributeValue::L(Vec::new()))
            .expression_attribute_values(
                ":consultation",
                AttributeValue::L(vec![AttributeValue::S(consultation_json)]),
            )
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(output) => {
                let item = output.attributes.ok_or_else(|| {
                    StoreError::InvalidData("update_item returned no attributes".to_string())
                })?;
                self.parse_case_from_item(item)
            }
            Err(e) => {
                if e
                    .as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    warn!("Consultation condition failed for case {}", case_id);
                    return Err(self.condition_failure(case_id).await);
                }
                error!("DynamoDB update_item failed for case {}: {:?}", case_id, e);
                Err(StoreError::DynamoDb(e.to_string()))
            }
        }
    }
}

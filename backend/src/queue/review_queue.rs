use chrono::{DateTime, Utc};
use shared::{Case, CaseStatus, QueueSummary, RiskTier};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use strum::IntoEnumIterator;

use crate::cases::LifecycleError;
use crate::db::CaseStore;

/// Optional set of risk tiers a queue listing is restricted to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueFilter {
    tiers: Option<HashSet<RiskTier>>,
}

impl QueueFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn tiers(tiers: impl IntoIterator<Item = RiskTier>) -> Self {
        Self {
            tiers: Some(tiers.into_iter().collect()),
        }
    }

    /// Parses the query-string form `HIGH,URGENT`. Blank input means no filter.
    pub fn parse(raw: Option<&str>) -> Result<Self, LifecycleError> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::all());
        };

        let mut tiers = HashSet::new();
        for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let tier = RiskTier::from_str(part).map_err(|_| {
                let valid: Vec<String> = RiskTier::iter().map(|t| t.to_string()).collect();
                LifecycleError::validation(format!(
                    "unknown risk tier '{}', expected one of {}",
                    part,
                    valid.join(", ")
                ))
            })?;
            tiers.insert(tier);
        }
        Ok(Self { tiers: Some(tiers) })
    }

    pub fn matches(&self, case: &Case) -> bool {
        self.tiers
            .as_ref()
            .is_none_or(|tiers| tiers.contains(&case.risk_assessment.risk_tier))
    }
}

/// Sort key for the review queues; lower is served first.
pub fn priority(tier: RiskTier) -> u8 {
    match tier {
        RiskTier::Urgent => 0,
        RiskTier::High => 1,
        RiskTier::Medium | RiskTier::Uncertain => 2,
        RiskTier::Low => 3,
    }
}

/// Highest risk first, oldest upload first within a tier.
pub fn sort_by_priority(cases: &mut [Case]) {
    cases.sort_by(|a, b| {
        priority(a.risk_assessment.risk_tier)
            .cmp(&priority(b.risk_assessment.risk_tier))
            .then_with(|| a.uploaded_at.cmp(&b.uploaded_at))
    });
}

fn in_cadre_queue(case: &Case) -> bool {
    case.status == CaseStatus::Pending
}

fn in_doctor_queue(case: &Case) -> bool {
    case.status == CaseStatus::Escalated
        || (case.risk_assessment.needs_review && case.status != CaseStatus::Completed)
}

/// Read-only views derived from the open cases in the store. Claims never go
/// through here.
#[derive(Clone)]
pub struct ReviewQueue {
    store: Arc<dyn CaseStore>,
}

impl ReviewQueue {
    pub fn new(store: Arc<dyn CaseStore>) -> Self {
        Self { store }
    }

    pub async fn cadre_queue(&self, filter: &QueueFilter) -> Result<Vec<Case>, LifecycleError> {
        self.collect(|case| in_cadre_queue(case) && filter.matches(case))
            .await
    }

    pub async fn doctor_queue(&self, filter: &QueueFilter) -> Result<Vec<Case>, LifecycleError> {
        self.collect(|case| in_doctor_queue(case) && filter.matches(case))
            .await
    }

    pub async fn summary(&self) -> Result<QueueSummary, LifecycleError> {
        let open = self.store.list_open().await?;
        Ok(summarize(&open, start_of_day(Utc::now())))
    }

    async fn collect<F>(&self, keep: F) -> Result<Vec<Case>, LifecycleError>
    where
        F: Fn(&Case) -> bool,
    {
        let mut cases: Vec<Case> = self
            .store
            .list_open()
            .await?
            .into_iter()
            .filter(|case| keep(case))
            .collect();
        sort_by_priority(&mut cases);
        Ok(cases)
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

/// `open` comes from `list_open`, so it holds no COMPLETED cases.
fn summarize(open: &[Case], since: DateTime<Utc>) -> QueueSummary {
    let mut summary = QueueSummary::default();
    for case in open {
        if case.uploaded_at >= since {
            summary.uploaded_today += 1;
        }
        if in_doctor_queue(case) {
            summary.doctor_pending += 1;
        }
        if !in_cadre_queue(case) {
            continue;
        }
        summary.cadre_pending += 1;
        match case.risk_assessment.risk_tier {
            RiskTier::Urgent => summary.urgent_count += 1,
            RiskTier::High => summary.high_count += 1,
            RiskTier::Medium => summary.medium_count += 1,
            RiskTier::Uncertain => summary.uncertain_count += 1,
            RiskTier::Low => summary.low_count += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryCaseStore;
    use crate::risk::RiskEngine;
    use chrono::Duration;

    fn case(label: &str, confidence: f64, age_minutes: i64) -> Case {
        let assessment = RiskEngine::default().assess(label, confidence, None).unwrap();
        let mut case = Case::new("patient-1".into(), None, assessment, None);
        case.uploaded_at = Utc::now() - Duration::minutes(age_minutes);
        case
    }

    #[test]
    fn parses_comma_separated_tiers() {
        let filter = QueueFilter::parse(Some("high, urgent")).unwrap();
        assert_eq!(filter, QueueFilter::tiers([RiskTier::High, RiskTier::Urgent]));
        assert_eq!(QueueFilter::parse(Some("  ")).unwrap(), QueueFilter::all());
        assert_eq!(QueueFilter::parse(None).unwrap(), QueueFilter::all());
    }

    #[test]
    fn unknown_tier_is_a_validation_error() {
        let err = QueueFilter::parse(Some("HIGH,SEVERE")).unwrap_err();
        match err {
            LifecycleError::Validation { message: msg, .. } => {
                assert!(msg.contains("SEVERE"));
                assert!(msg.contains("UNCERTAIN"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn orders_by_tier_then_oldest_first() {
        let low = case("NEV", 0.9, 50);
        let high_new = case("BCC", 0.9, 5);
        let urgent = case("MEL", 0.9, 1);
        let high_old = case("BCC", 0.9, 30);
        let medium = case("ACK", 0.9, 10);
        let uncertain = case("SEK", 0.2, 60);

        let mut cases = vec![
            low.clone(),
            high_new.clone(),
            urgent.clone(),
            high_old.clone(),
            medium.clone(),
            uncertain.clone(),
        ];
        sort_by_priority(&mut cases);

        let order: Vec<_> = cases.iter().map(|c| c.id).collect();
        assert_eq!(
            order,
            vec![urgent.id, high_old.id, high_new.id, uncertain.id, medium.id, low.id]
        );
    }

    #[test]
    fn uncertain_shares_medium_priority() {
        assert_eq!(priority(RiskTier::Uncertain), priority(RiskTier::Medium));
        assert!(priority(RiskTier::Urgent) < priority(RiskTier::High));
        assert!(priority(RiskTier::Medium) < priority(RiskTier::Low));
    }

    #[tokio::test]
    async fn queues_follow_status_and_review_flag() {
        let store = Arc::new(InMemoryCaseStore::new());
        let pending_low = case("NEV", 0.95, 3);
        let mut escalated = case("ACK", 0.95, 2);
        escalated.status = CaseStatus::Escalated;
        escalated.cadre_reviewer_id = Some("cadre-1".into());
        let mut reviewed_urgent = case("MEL", 0.9, 1);
        reviewed_urgent.status = CaseStatus::Reviewed;
        reviewed_urgent.cadre_reviewer_id = Some("cadre-2".into());
        let mut completed = case("MEL", 0.9, 4);
        completed.status = CaseStatus::Completed;

        for c in [&pending_low, &escalated, &reviewed_urgent, &completed] {
            store.insert(c).await.unwrap();
        }

        let queue = ReviewQueue::new(store);
        let cadre = queue.cadre_queue(&QueueFilter::all()).await.unwrap();
        assert_eq!(cadre.iter().map(|c| c.id).collect::<Vec<_>>(), vec![pending_low.id]);

        let doctor = queue.doctor_queue(&QueueFilter::all()).await.unwrap();
        assert_eq!(
            doctor.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![reviewed_urgent.id, escalated.id]
        );

        let urgent_only = queue
            .doctor_queue(&QueueFilter::tiers([RiskTier::Urgent]))
            .await
            .unwrap();
        assert_eq!(urgent_only.len(), 1);

        let summary = queue.summary().await.unwrap();
        assert_eq!(summary.cadre_pending, 1);
        assert_eq!(summary.doctor_pending, 2);
        assert_eq!(summary.low_count, 1);
        assert_eq!(summary.urgent_count, 0);
    }
}

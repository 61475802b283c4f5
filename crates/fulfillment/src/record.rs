use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cropshare_core::{DomainError, DomainResult, Entity, OrderId, ProjectId, RecordId, UnitId, UserId};

/// Fulfillment record lifecycle: strictly forward.
///
/// `Adopted -> Planting -> AwaitingHarvest -> Harvested -> Completed`.
/// Re-applying the current status is a no-op; backward or skipped
/// transitions are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Adopted,
    Planting,
    AwaitingHarvest,
    Harvested,
    Completed,
}

impl RecordStatus {
    pub fn next(self) -> Option<RecordStatus> {
        match self {
            RecordStatus::Adopted => Some(RecordStatus::Planting),
            RecordStatus::Planting => Some(RecordStatus::AwaitingHarvest),
            RecordStatus::AwaitingHarvest => Some(RecordStatus::Harvested),
            RecordStatus::Harvested => Some(RecordStatus::Completed),
            RecordStatus::Completed => None,
        }
    }

    pub fn prev(self) -> Option<RecordStatus> {
        match self {
            RecordStatus::Adopted => None,
            RecordStatus::Planting => Some(RecordStatus::Adopted),
            RecordStatus::AwaitingHarvest => Some(RecordStatus::Planting),
            RecordStatus::Harvested => Some(RecordStatus::AwaitingHarvest),
            RecordStatus::Completed => Some(RecordStatus::Harvested),
        }
    }

    pub fn can_advance_to(self, target: RecordStatus) -> bool {
        self.next() == Some(target)
    }
}

/// Harvest results stamped onto a record at `Harvested`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestOutcome {
    pub harvested_at: DateTime<Utc>,
    /// Yield in grams.
    pub actual_yield: u64,
    pub quality_grade: String,
}

/// The fulfillment entity binding one paid order to one allocated unit
/// through its growing lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub unit_id: UnitId,
    pub status: RecordStatus,
    pub adoption_date: DateTime<Utc>,
    pub planting_date: Option<DateTime<Utc>>,
    pub harvest_date: Option<DateTime<Utc>>,
    pub actual_yield: Option<u64>,
    pub quality_grade: Option<String>,
    pub deleted: bool,
}

impl Record {
    /// Create a fresh record at payment time, status `Adopted`.
    pub fn adopted(
        order_id: OrderId,
        user_id: UserId,
        project_id: ProjectId,
        unit_id: UnitId,
        adoption_date: DateTime<Utc>,
    ) -> Record {
        Record {
            id: RecordId::new(),
            order_id,
            user_id,
            project_id,
            unit_id,
            status: RecordStatus::Adopted,
            adoption_date,
            planting_date: None,
            harvest_date: None,
            actual_yield: None,
            quality_grade: None,
            deleted: false,
        }
    }

    /// Guard for a forward advance; a repeat of the current status is a
    /// no-op (`Ok(false)`), a legal step returns `Ok(true)`.
    pub fn check_advance(&self, target: RecordStatus) -> DomainResult<bool> {
        if self.status == target {
            return Ok(false);
        }
        if self.status.can_advance_to(target) {
            Ok(true)
        } else {
            Err(DomainError::invalid_transition(format!(
                "record cannot move {:?} -> {:?}",
                self.status, target
            )))
        }
    }

    /// Apply a forward step, stamping the dates the target requires.
    ///
    /// Callers must have validated the step with `check_advance`; this only
    /// mutates the row image.
    pub fn apply_advance(&mut self, target: RecordStatus, now: DateTime<Utc>) {
        match target {
            RecordStatus::Planting => self.planting_date = Some(now),
            RecordStatus::Harvested => {
                if self.harvest_date.is_none() {
                    self.harvest_date = Some(now);
                }
            }
            _ => {}
        }
        self.status = target;
    }

    /// Stamp harvest results (date, yield, grade) alongside the
    /// `Harvested` transition.
    pub fn apply_harvest(&mut self, outcome: &HarvestOutcome) {
        self.harvest_date = Some(outcome.harvested_at);
        self.actual_yield = Some(outcome.actual_yield);
        self.quality_grade = Some(outcome.quality_grade.clone());
        self.status = RecordStatus::Harvested;
    }
}

impl Entity for Record {
    type Id = RecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_record() -> Record {
        Record::adopted(
            OrderId::new(),
            UserId::new(),
            ProjectId::new(),
            UnitId::new(),
            Utc::now(),
        )
    }

    #[test]
    fn adopted_record_starts_clean() {
        let r = fresh_record();
        assert_eq!(r.status, RecordStatus::Adopted);
        assert!(r.planting_date.is_none());
        assert!(r.harvest_date.is_none());
        assert!(r.actual_yield.is_none());
    }

    #[test]
    fn forward_chain_is_the_only_legal_path() {
        use RecordStatus::*;

        assert!(Adopted.can_advance_to(Planting));
        assert!(Planting.can_advance_to(AwaitingHarvest));
        assert!(AwaitingHarvest.can_advance_to(Harvested));
        assert!(Harvested.can_advance_to(Completed));

        assert!(!Adopted.can_advance_to(AwaitingHarvest));
        assert!(!Planting.can_advance_to(Adopted));
        assert!(!Completed.can_advance_to(Adopted));
        assert_eq!(Completed.next(), None);
    }

    #[test]
    fn reapplying_the_current_status_is_a_noop() {
        let r = fresh_record();
        assert_eq!(r.check_advance(RecordStatus::Adopted).unwrap(), false);
        assert_eq!(r.check_advance(RecordStatus::Planting).unwrap(), true);
    }

    #[test]
    fn backward_and_skipped_transitions_fail() {
        let mut r = fresh_record();
        r.status = RecordStatus::AwaitingHarvest;

        assert!(matches!(
            r.check_advance(RecordStatus::Planting),
            Err(DomainError::InvalidStateTransition(_))
        ));
        assert!(matches!(
            r.check_advance(RecordStatus::Completed),
            Err(DomainError::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn planting_advance_stamps_planting_date() {
        let mut r = fresh_record();
        let now = Utc::now();
        r.apply_advance(RecordStatus::Planting, now);
        assert_eq!(r.status, RecordStatus::Planting);
        assert_eq!(r.planting_date, Some(now));
    }

    #[test]
    fn harvest_stamps_date_yield_and_grade() {
        let mut r = fresh_record();
        r.apply_advance(RecordStatus::Planting, Utc::now());
        r.apply_advance(RecordStatus::AwaitingHarvest, Utc::now());

        let outcome = HarvestOutcome {
            harvested_at: Utc::now(),
            actual_yield: 5_200,
            quality_grade: "A".to_string(),
        };
        r.apply_harvest(&outcome);

        assert_eq!(r.status, RecordStatus::Harvested);
        assert_eq!(r.harvest_date, Some(outcome.harvested_at));
        assert_eq!(r.actual_yield, Some(5_200));
        assert_eq!(r.quality_grade.as_deref(), Some("A"));
    }

    const ALL: [RecordStatus; 5] = [
        RecordStatus::Adopted,
        RecordStatus::Planting,
        RecordStatus::AwaitingHarvest,
        RecordStatus::Harvested,
        RecordStatus::Completed,
    ];

    proptest::proptest! {
        /// The chain is strictly forward and adjacent: a transition is
        /// legal iff the target is the immediate successor.
        #[test]
        fn transitions_are_adjacent_only(a in 0usize..5, b in 0usize..5) {
            let from = ALL[a];
            let to = ALL[b];
            proptest::prop_assert_eq!(from.can_advance_to(to), from.next() == Some(to));
            proptest::prop_assert_eq!(to.prev() == Some(from), from.next() == Some(to));
        }
    }
}

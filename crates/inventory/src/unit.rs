use serde::{Deserialize, Serialize};

use cropshare_core::{DomainError, DomainResult, Entity, ProjectId, UnitId};

/// Physical unit lifecycle: a fixed forward sequence.
///
/// `Available -> Adopted -> Planting -> AwaitingHarvest -> Harvested`.
/// The only backward edge is the release of an `Adopted` unit on
/// cancel/refund, handled separately from `advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Available,
    Adopted,
    Planting,
    AwaitingHarvest,
    Harvested,
}

impl UnitStatus {
    /// Next status along the growing sequence, if any.
    pub fn next(self) -> Option<UnitStatus> {
        match self {
            UnitStatus::Available => Some(UnitStatus::Adopted),
            UnitStatus::Adopted => Some(UnitStatus::Planting),
            UnitStatus::Planting => Some(UnitStatus::AwaitingHarvest),
            UnitStatus::AwaitingHarvest => Some(UnitStatus::Harvested),
            UnitStatus::Harvested => None,
        }
    }

    /// Previous status along the growing sequence, if any.
    pub fn prev(self) -> Option<UnitStatus> {
        match self {
            UnitStatus::Available => None,
            UnitStatus::Adopted => Some(UnitStatus::Available),
            UnitStatus::Planting => Some(UnitStatus::Adopted),
            UnitStatus::AwaitingHarvest => Some(UnitStatus::Planting),
            UnitStatus::Harvested => Some(UnitStatus::AwaitingHarvest),
        }
    }

    /// Whether `target` is the immediate successor of `self`.
    pub fn can_advance_to(self, target: UnitStatus) -> bool {
        self.next() == Some(target)
    }

    /// Whether a unit in this status may be released back to `Available`.
    ///
    /// Restricted to `Adopted`: once a unit has physically entered the
    /// growing cycle it can no longer be returned to the pool.
    pub fn releasable(self) -> bool {
        self == UnitStatus::Adopted
    }
}

/// Grid coordinate for the `n`-th unit of a project (1-based unit number):
/// row = ceil(n / 10), column = n mod 10.
pub fn grid_position(unit_number: u32) -> (u32, u32) {
    (unit_number.div_ceil(10), unit_number % 10)
}

/// One allocatable share of a project's plot; the physical inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub project_id: ProjectId,
    /// Unique within the project, 1-based; allocation follows this order.
    pub unit_number: u32,
    pub row: u32,
    pub column: u32,
    pub status: UnitStatus,
    pub deleted: bool,
}

impl Unit {
    /// Build the full batch of units for a newly created project.
    ///
    /// `count` rows, status `Available`, numbered 1..=count with derived
    /// grid coordinates.
    pub fn batch(project_id: ProjectId, count: u32) -> Vec<Unit> {
        (1..=count)
            .map(|n| {
                let (row, column) = grid_position(n);
                Unit {
                    id: UnitId::new(),
                    project_id,
                    unit_number: n,
                    row,
                    column,
                    status: UnitStatus::Available,
                    deleted: false,
                }
            })
            .collect()
    }

    /// Guard for a single advance step; the batch-atomic version lives in
    /// the storage layer.
    pub fn check_advance(&self, target: UnitStatus) -> DomainResult<()> {
        if self.status.can_advance_to(target) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(format!(
                "unit {} cannot move {:?} -> {:?}",
                self.unit_number, self.status, target
            )))
        }
    }
}

impl Entity for Unit {
    type Id = UnitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cropshare_core::{DomainError, DomainResult, Entity, ProjectId};

/// Project lifecycle status.
///
/// Only `Adopting` projects accept new reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Preparing,
    Adopting,
    Planting,
    Harvesting,
    Completed,
    Cancelled,
}

/// The inventory pool for one crop-growing cycle on one farm plot.
///
/// `available_units` is the soft-reservation counter: decremented at order
/// creation, incremented on cancel/refund. The storage layer is responsible
/// for mutating it with a single conditional update; this type only carries
/// the pure admission checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub total_units: u32,
    pub available_units: u32,
    /// Price per unit in the smallest currency unit (e.g. cents).
    pub unit_price: u64,
    pub status: ProjectStatus,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        id: ProjectId,
        name: impl Into<String>,
        total_units: u32,
        unit_price: u64,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("project name cannot be empty"));
        }
        if total_units == 0 {
            return Err(DomainError::validation("total_units must be positive"));
        }
        if unit_price == 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }
        Ok(Self {
            id,
            name,
            total_units,
            available_units: total_units,
            unit_price,
            status: ProjectStatus::Preparing,
            deleted: false,
            created_at,
        })
    }

    /// Pure admission check for a reservation of `count` units.
    ///
    /// The real decrement happens in the storage layer as a conditional
    /// update; this check exists so callers fail fast with the right error
    /// kind before touching the store.
    pub fn check_reserve(&self, count: u32) -> DomainResult<()> {
        if count == 0 {
            return Err(DomainError::validation("unit_count must be positive"));
        }
        if self.status != ProjectStatus::Adopting {
            return Err(DomainError::invalid_transition(format!(
                "project is not open for adoption (status: {:?})",
                self.status
            )));
        }
        if self.available_units < count {
            return Err(DomainError::insufficient(format!(
                "requested {count} units, {} available",
                self.available_units
            )));
        }
        Ok(())
    }

    /// Counter invariant: `0 <= available_units <= total_units`.
    pub fn counter_in_bounds(&self) -> bool {
        self.available_units <= self.total_units
    }
}

impl Entity for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adopting_project(total: u32, available: u32) -> Project {
        let mut p = Project::new(ProjectId::new(), "strawberry patch", total, 1500, Utc::now())
            .unwrap();
        p.status = ProjectStatus::Adopting;
        p.available_units = available;
        p
    }

    #[test]
    fn new_project_starts_preparing_with_full_availability() {
        let p = Project::new(ProjectId::new(), "apple orchard", 100, 2000, Utc::now()).unwrap();
        assert_eq!(p.status, ProjectStatus::Preparing);
        assert_eq!(p.available_units, 100);
        assert!(p.counter_in_bounds());
    }

    #[test]
    fn new_project_rejects_zero_units_and_price() {
        assert!(matches!(
            Project::new(ProjectId::new(), "x", 0, 100, Utc::now()),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            Project::new(ProjectId::new(), "x", 10, 0, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn reserve_requires_adopting_status() {
        let mut p = adopting_project(10, 10);
        p.status = ProjectStatus::Harvesting;
        assert!(matches!(
            p.check_reserve(1),
            Err(DomainError::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn reserve_rejects_more_than_available() {
        let p = adopting_project(10, 3);
        assert!(matches!(
            p.check_reserve(4),
            Err(DomainError::InsufficientInventory(_))
        ));
        assert!(p.check_reserve(3).is_ok());
    }

    #[test]
    fn reserve_rejects_zero_count() {
        let p = adopting_project(10, 10);
        assert!(matches!(p.check_reserve(0), Err(DomainError::Validation(_))));
    }
}

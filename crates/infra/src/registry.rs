//! Physical unit registry service.
//!
//! The pool counter says how many units are spoken for; this service says
//! which ones. Units are allocated in creation order at payment time and
//! only `Adopted` units ever come back.

use std::sync::Arc;

use tracing::info;

use cropshare_core::{DomainError, ProjectId, UnitId};
use cropshare_inventory::{Unit, UnitStatus};

use crate::store::{AdoptionStore, StoreResult};

#[derive(Debug, Clone)]
pub struct UnitRegistry<S: ?Sized> {
    store: Arc<S>,
}

impl<S: AdoptionStore + ?Sized> UnitRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the full unit batch for a new project: `count` rows numbered
    /// 1..=count with derived grid coordinates, all `Available`.
    pub fn batch_create(&self, project_id: ProjectId, count: u32) -> StoreResult<Vec<Unit>> {
        if count == 0 {
            return Err(DomainError::validation("count must be positive").into());
        }
        let units = Unit::batch(project_id, count);
        self.store.insert_units(&units)?;
        info!(%project_id, count, "unit batch created");
        Ok(units)
    }

    pub fn units_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Unit>> {
        self.store.units_for_project(project_id)
    }

    /// Allocate `count` specific units (Available -> Adopted) in creation
    /// order. Normally driven by `mark_paid`; exposed for admin tooling.
    pub fn allocate(&self, project_id: ProjectId, count: u32) -> StoreResult<Vec<UnitId>> {
        if count == 0 {
            return Err(DomainError::validation("count must be positive").into());
        }
        let ids = self.store.allocate_units(project_id, count)?;
        info!(%project_id, count, "units allocated");
        Ok(ids)
    }

    /// Release units back to `Available`. Only `Adopted` units qualify;
    /// anything further along the growing cycle fails the whole batch.
    pub fn release(&self, unit_ids: &[UnitId]) -> StoreResult<()> {
        if unit_ids.is_empty() {
            return Ok(());
        }
        self.store.release_units(unit_ids)?;
        info!(count = unit_ids.len(), "units released");
        Ok(())
    }

    /// Advance a unit batch one step along the growing cycle. The
    /// predecessor is derived from the target; non-adjacent jumps are
    /// rejected before touching the store.
    pub fn advance(&self, unit_ids: &[UnitId], target: UnitStatus) -> StoreResult<()> {
        let Some(from) = target.prev() else {
            return Err(DomainError::invalid_transition(
                "units cannot be advanced back to Available",
            )
            .into());
        };
        if unit_ids.is_empty() {
            return Ok(());
        }
        self.store.advance_units(unit_ids, from, target)?;
        info!(count = unit_ids.len(), ?target, "units advanced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryAdoptionStore, StoreError};
    use chrono::Utc;
    use cropshare_inventory::{Project, ProjectStatus};

    fn registry_with_project(total: u32) -> (UnitRegistry<InMemoryAdoptionStore>, ProjectId) {
        let store = Arc::new(InMemoryAdoptionStore::new());
        let project =
            Project::new(ProjectId::new(), "pumpkin rows", total, 800, Utc::now()).unwrap();
        store.insert_project(&project).unwrap();
        store
            .set_project_status(project.id, ProjectStatus::Preparing, ProjectStatus::Adopting)
            .unwrap();
        let registry = UnitRegistry::new(store);
        registry.batch_create(project.id, total).unwrap();
        (registry, project.id)
    }

    #[test]
    fn batch_create_numbers_and_grids_units() {
        let (registry, id) = registry_with_project(12);
        let units = registry.units_for_project(id).unwrap();
        assert_eq!(units.len(), 12);
        assert_eq!(units[0].unit_number, 1);
        assert_eq!((units[0].row, units[0].column), (1, 1));
        assert_eq!((units[9].row, units[9].column), (1, 0));
        assert_eq!((units[11].row, units[11].column), (2, 2));
    }

    #[test]
    fn allocate_takes_lowest_numbers_first() {
        let (registry, id) = registry_with_project(5);
        let ids = registry.allocate(id, 2).unwrap();
        let units = registry.units_for_project(id).unwrap();
        assert_eq!(ids, vec![units[0].id, units[1].id]);
        assert_eq!(units[0].status, UnitStatus::Adopted);
        assert_eq!(units[2].status, UnitStatus::Available);
    }

    #[test]
    fn advance_rejects_non_adjacent_target() {
        let (registry, id) = registry_with_project(3);
        let ids = registry.allocate(id, 3).unwrap();
        registry.advance(&ids, UnitStatus::Planting).unwrap();
        assert!(matches!(
            registry.advance(&ids, UnitStatus::Harvested),
            Err(StoreError::Domain(DomainError::InvalidStateTransition(_)))
        ));
        registry.advance(&ids, UnitStatus::AwaitingHarvest).unwrap();
        registry.advance(&ids, UnitStatus::Harvested).unwrap();
    }

    #[test]
    fn only_adopted_units_release() {
        let (registry, id) = registry_with_project(4);
        let ids = registry.allocate(id, 2).unwrap();
        registry.advance(&ids, UnitStatus::Planting).unwrap();
        assert!(matches!(
            registry.release(&ids),
            Err(StoreError::Domain(DomainError::InvalidStateTransition(_)))
        ));
    }

    #[test]
    fn empty_batch_is_a_noop() {
        let (registry, _) = registry_with_project(1);
        registry.release(&[]).unwrap();
        registry.advance(&[], UnitStatus::Planting).unwrap();
    }
}

//! The reservation counter service.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use cropshare_core::{DomainError, ProjectId};
use cropshare_inventory::{Project, ProjectStatus};

use crate::store::{AdoptionStore, StoreResult};

/// Counter-level inventory operations for a project's adoption pool.
///
/// The actual decrement/increment is a single conditional update inside the
/// store; this service only adds argument validation and logging on top.
#[derive(Debug, Clone)]
pub struct InventoryPool<S: ?Sized> {
    store: Arc<S>,
}

impl<S: AdoptionStore + ?Sized> InventoryPool<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Register a new project with its full unit pool available.
    pub fn create_project(
        &self,
        name: impl Into<String>,
        total_units: u32,
        unit_price: u64,
    ) -> StoreResult<Project> {
        let project = Project::new(ProjectId::new(), name, total_units, unit_price, Utc::now())?;
        self.store.insert_project(&project)?;
        info!(
            project_id = %project.id,
            total_units = project.total_units,
            "project created"
        );
        Ok(project)
    }

    pub fn project(&self, project_id: ProjectId) -> StoreResult<Option<Project>> {
        self.store.project(project_id)
    }

    /// Open a `Preparing` project for adoption.
    pub fn open_adoption(&self, project_id: ProjectId) -> StoreResult<Project> {
        let project = self.store.set_project_status(
            project_id,
            ProjectStatus::Preparing,
            ProjectStatus::Adopting,
        )?;
        info!(%project_id, "project opened for adoption");
        Ok(project)
    }

    /// Reserve `count` units from the pool counter.
    pub fn reserve(&self, project_id: ProjectId, count: u32) -> StoreResult<()> {
        if count == 0 {
            return Err(DomainError::validation("unit_count must be positive").into());
        }
        self.store.reserve_units(project_id, count)?;
        info!(%project_id, count, "units reserved");
        Ok(())
    }

    /// Return `count` units to the pool counter.
    pub fn release(&self, project_id: ProjectId, count: u32) -> StoreResult<()> {
        if count == 0 {
            return Err(DomainError::validation("unit_count must be positive").into());
        }
        self.store.release_pool(project_id, count)?;
        info!(%project_id, count, "units released to pool");
        Ok(())
    }
}

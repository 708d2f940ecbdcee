//! Service listings

use super::{db_error, require_role, MarketService};
use crate::{
    db::{EditOutcome, RemoveOutcome, ServiceQueries},
    domain::{
        NewService, Role, Service, ServiceFilters, ServiceRating, ServiceStatus, ServiceUpdate,
        User,
    },
    MarketError, MarketResult,
};
use chrono::Utc;
use tracing::info;

impl MarketService {
    /// Publish a listing owned by `caller`
    pub async fn create_service(&self, caller: &User, req: NewService) -> MarketResult<Service> {
        require_role(caller, Role::ServiceProvider)?;
        if let Some(reason) = caller.verification_block() {
            return Err(MarketError::Forbidden(reason));
        }
        req.validate().map_err(MarketError::Validation)?;

        let now = Utc::now();
        let service = Service {
            id: uuid::Uuid::new_v4().to_string(),
            provider_id: caller.id.clone(),
            provider_name: caller.profile.full_name.clone(),
            service_type: req.service_type,
            title: req.title.trim().to_string(),
            description: req.description,
            category: req.category,
            price_monthly: req.price_monthly,
            capacity: req.capacity,
            available_slots: req.capacity,
            location: req.location,
            transportation: req.transportation,
            residence: req.residence,
            rating: ServiceRating::default(),
            status: ServiceStatus::Active,
            auto_accept: req.auto_accept,
            created_at: now,
            updated_at: now,
        };

        ServiceQueries::new(&self.db)
            .insert(&service)
            .await
            .map_err(db_error("Failed to store service"))?;

        info!(
            "Service created: id={}, provider_id={}, type={}, capacity={}",
            service.id, service.provider_id, service.service_type, service.capacity
        );
        Ok(service)
    }

    /// Apply an owner's partial update to a listing
    pub async fn update_service(
        &self,
        caller: &User,
        id: &str,
        update: ServiceUpdate,
    ) -> MarketResult<Service> {
        let service = self.get_service(id).await?;
        if service.provider_id != caller.id {
            return Err(MarketError::Forbidden(
                "Not authorized to update this service".to_string(),
            ));
        }

        let outcome = ServiceQueries::new(&self.db)
            .edit(id, &update, Utc::now())
            .await
            .map_err(db_error("Failed to update service"))?;
        match outcome {
            EditOutcome::Applied(service) => {
                info!(
                    "Service updated: id={}, capacity={}, slots={}",
                    id, service.capacity, service.available_slots
                );
                Ok(service)
            }
            EditOutcome::Rejected(reason) => Err(MarketError::Validation(reason)),
            EditOutcome::Missing => Err(MarketError::NotFound(format!("Service {}", id))),
        }
    }

    /// Delete a listing with no open contracts
    ///
    /// A listing referenced by past contracts is deactivated instead so the
    /// contract history keeps its service.
    pub async fn delete_service(&self, caller: &User, id: &str) -> MarketResult<()> {
        let service = self.get_service(id).await?;
        if caller.role != Role::Admin && service.provider_id != caller.id {
            return Err(MarketError::Forbidden(
                "Not authorized to delete this service".to_string(),
            ));
        }

        let outcome = ServiceQueries::new(&self.db)
            .remove(id, Utc::now())
            .await
            .map_err(db_error("Failed to delete service"))?;
        match outcome {
            RemoveOutcome::Deleted => {
                info!("Service deleted: id={}, by={}", id, caller.id);
                Ok(())
            }
            RemoveOutcome::Archived(past) => {
                info!(
                    "Service deactivated: id={}, by={}, past_contracts={}",
                    id, caller.id, past
                );
                Ok(())
            }
            RemoveOutcome::OpenContracts(open) => Err(MarketError::Conflict(format!(
                "Service has {} open contract(s)",
                open
            ))),
            RemoveOutcome::Missing => Err(MarketError::NotFound(format!("Service {}", id))),
        }
    }

    /// Look up a listing by ID
    pub async fn get_service(&self, id: &str) -> MarketResult<Service> {
        ServiceQueries::new(&self.db)
            .get_by_id(id)
            .await
            .map_err(db_error("Failed to load service"))?
            .ok_or_else(|| MarketError::NotFound(format!("Service {}", id)))
    }

    /// Active listings matching `filters`
    pub async fn search_services(&self, filters: &ServiceFilters) -> MarketResult<Vec<Service>> {
        let services = ServiceQueries::new(&self.db)
            .list_active()
            .await
            .map_err(db_error("Failed to list services"))?;
        Ok(filters.apply(services))
    }

    /// Listings owned by `caller`, whatever their status
    pub async fn provider_services(&self, caller: &User) -> MarketResult<Vec<Service>> {
        require_role(caller, Role::ServiceProvider)?;
        ServiceQueries::new(&self.db)
            .list_by_provider(&caller.id)
            .await
            .map_err(db_error("Failed to list services"))
    }

    /// Every listing, for admins
    pub async fn all_services(&self, caller: &User) -> MarketResult<Vec<Service>> {
        require_role(caller, Role::Admin)?;
        ServiceQueries::new(&self.db)
            .list_all()
            .await
            .map_err(db_error("Failed to list services"))
    }

    /// Suspend or reinstate a listing
    pub async fn set_service_suspended(
        &self,
        caller: &User,
        id: &str,
        suspended: bool,
    ) -> MarketResult<Service> {
        require_role(caller, Role::Admin)?;
        let current = self.get_service(id).await?;

        let (expected, status) = if suspended {
            (ServiceStatus::Active, ServiceStatus::Suspended)
        } else {
            (ServiceStatus::Suspended, ServiceStatus::Active)
        };
        let changed = ServiceQueries::new(&self.db)
            .set_status(id, Some(expected), status, Utc::now())
            .await
            .map_err(db_error("Failed to update service status"))?;
        if !changed {
            return Err(MarketError::Conflict(format!(
                "Service is {}, expected {}",
                current.status.as_str(),
                expected.as_str()
            )));
        }

        info!("Service {} by admin {}: id={}", status.as_str(), caller.id, id);
        self.get_service(id).await
    }
}

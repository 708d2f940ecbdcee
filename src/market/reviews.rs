//! Reviews of completed bookings

use super::{db_error, require_role, MarketService};
use crate::{
    db::{ContractQueries, ReviewQueries},
    domain::{ContractStatus, NewReview, Review, Role, User},
    MarketError, MarketResult,
};
use chrono::Utc;
use tracing::info;

impl MarketService {
    /// Review a service the caller has completed a contract with
    pub async fn create_review(&self, caller: &User, req: NewReview) -> MarketResult<Review> {
        require_role(caller, Role::Client)?;
        req.validate().map_err(MarketError::Validation)?;

        let service = self.get_service(&req.service_id).await?;

        let contract = ContractQueries::new(&self.db)
            .list_for_client(&caller.id)
            .await
            .map_err(db_error("Failed to list contracts"))?
            .into_iter()
            .find(|c| c.service_id == service.id && c.status == ContractStatus::Completed)
            .ok_or_else(|| {
                MarketError::Validation(
                    "You can only review services you have completed a contract with".to_string(),
                )
            })?;

        let reviews = ReviewQueries::new(&self.db);
        if reviews
            .exists(&service.id, &caller.id)
            .await
            .map_err(db_error("Failed to check reviews"))?
        {
            return Err(MarketError::Conflict(
                "You have already reviewed this service".to_string(),
            ));
        }

        let review = Review {
            id: uuid::Uuid::new_v4().to_string(),
            service_id: service.id.clone(),
            client_id: caller.id.clone(),
            client_name: caller.profile.full_name.clone(),
            contract_id: contract.id,
            rating: req.rating,
            safety_rating: req.safety_rating,
            review_text: req.review_text.trim().to_string(),
            categories: req.categories,
            verified_booking: true,
            created_at: Utc::now(),
        };

        let rating = reviews
            .insert_and_rate(&review)
            .await
            .map_err(db_error("Failed to store review"))?;

        info!(
            "Review created: service_id={}, rating={}, average={} over {}",
            service.id, review.rating, rating.average, rating.count
        );
        Ok(review)
    }

    /// Reviews of a listing, newest first
    pub async fn service_reviews(&self, service_id: &str) -> MarketResult<Vec<Review>> {
        self.get_service(service_id).await?;
        ReviewQueries::new(&self.db)
            .list_for_service(service_id)
            .await
            .map_err(db_error("Failed to list reviews"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::{fixture, request};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn review(service_id: &str, rating: u8) -> NewReview {
        NewReview {
            service_id: service_id.to_string(),
            rating,
            safety_rating: 5,
            review_text: "Clean and quiet".to_string(),
            categories: None,
        }
    }

    #[tokio::test]
    async fn test_review_requires_completed_contract() {
        let f = fixture(2, false).await;
        let err = f
            .market
            .create_review(&f.client, review(&f.service.id, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));

        let contract = f.market.create_contract(&f.client, request(&f.service, 1)).await.unwrap();
        f.market.provider_accept(&f.provider, &contract.id).await.unwrap();
        f.market.client_confirm(&f.client, &contract.id).await.unwrap();
        f.market.complete(&f.client, &contract.id).await.unwrap();

        let created = f
            .market
            .create_review(&f.client, review(&f.service.id, 4))
            .await
            .unwrap();
        assert!(created.verified_booking);
        assert_eq!(created.contract_id, contract.id);

        let err = f
            .market
            .create_review(&f.client, review(&f.service.id, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));

        let service = f.market.get_service(&f.service.id).await.unwrap();
        assert_eq!(service.rating.count, 1);
        assert_eq!(service.rating.average, Decimal::from_str("4").unwrap());

        let listed = f.market.service_reviews(&f.service.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].client_name, "Amal");
    }
}

//! Client reviews of a service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional per-aspect scores, each 1..=5
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCategories {
    /// Punctuality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub punctuality: Option<u8>,
    /// Cleanliness
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanliness: Option<u8>,
    /// Communication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication: Option<u8>,
    /// Value for money
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_for_money: Option<u8>,
}

/// Review submitted by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReview {
    /// Reviewed listing
    pub service_id: String,
    /// Overall score, 1 to 5
    pub rating: u8,
    /// Safety score, 1 to 5
    pub safety_rating: u8,
    /// Free text, required
    pub review_text: String,
    /// Categories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<ReviewCategories>,
}

fn check_score(name: &str, score: u8) -> Result<(), String> {
    if (1..=5).contains(&score) {
        Ok(())
    } else {
        Err(format!("{} must be between 1 and 5", name))
    }
}

impl NewReview {
    /// Check scores are in range and text is present
    pub fn validate(&self) -> Result<(), String> {
        check_score("rating", self.rating)?;
        check_score("safety_rating", self.safety_rating)?;
        if let Some(categories) = &self.categories {
            for (name, score) in [
                ("punctuality", categories.punctuality),
                ("cleanliness", categories.cleanliness),
                ("communication", categories.communication),
                ("value_for_money", categories.value_for_money),
            ] {
                if let Some(score) = score {
                    check_score(name, score)?;
                }
            }
        }
        if self.review_text.trim().is_empty() {
            return Err("Review text is required".to_string());
        }
        Ok(())
    }
}

/// A stored review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Review ID
    pub id: String,
    /// Service id
    pub service_id: String,
    /// Author
    pub client_id: String,
    /// Author display name
    #[serde(default)]
    pub client_name: String,
    /// Completed contract the review rests on
    pub contract_id: String,
    /// Overall score
    pub rating: u8,
    /// Safety score
    pub safety_rating: u8,
    /// Review text
    pub review_text: String,
    /// Categories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<ReviewCategories>,
    /// Backed by a completed contract
    pub verified_booking: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

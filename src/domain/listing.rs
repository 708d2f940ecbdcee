//! Service listings offered by providers

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of service on offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Recurring rides
    Transportation,
    /// Accommodation
    Residence,
}

impl ServiceType {
    /// Wire and storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Transportation => "transportation",
            ServiceType::Residence => "residence",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transportation" => Ok(ServiceType::Transportation),
            "residence" => Ok(ServiceType::Residence),
            other => Err(format!("unknown service type: {}", other)),
        }
    }
}

/// Listing visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Visible and bookable
    Active,
    /// Hidden by its provider or archived
    Inactive,
    /// Set by an admin; only an admin lifts it
    Suspended,
}

impl ServiceStatus {
    /// Wire and storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Active => "active",
            ServiceStatus::Inactive => "inactive",
            ServiceStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ServiceStatus::Active),
            "inactive" => Ok(ServiceStatus::Inactive),
            "suspended" => Ok(ServiceStatus::Suspended),
            other => Err(format!("unknown service status: {}", other)),
        }
    }
}

/// Who a residence accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderRestriction {
    /// Male
    Male,
    /// Female
    Female,
    /// No restriction
    Any,
}

/// Kind of residence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidenceType {
    /// Whole apartment
    Apartment,
    /// Private room
    Room,
    /// Shared room
    Shared,
}

/// Map position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude
    pub lat: f64,
    /// Longitude
    pub lng: f64,
}

/// Where a service operates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLocation {
    /// Street address
    pub address: String,
    /// City
    pub city: String,
    /// University the service is near
    pub university_nearby: String,
    /// Coordinates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

/// Stop on a transportation route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    /// Stop name
    pub point: String,
    /// Pickup time at the stop
    pub time: String,
}

/// Transportation-specific details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportationDetails {
    /// Bus, van or car
    pub vehicle_type: String,
    /// Plate number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_number: Option<String>,
    /// Stops in order
    #[serde(default)]
    pub route: Vec<RoutePoint>,
    /// Pickup times
    #[serde(default)]
    pub pickup_times: Vec<String>,
    /// Amenities
    #[serde(default)]
    pub amenities: Vec<String>,
}

/// Residence-specific details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidenceDetails {
    /// Residence type
    pub residence_type: ResidenceType,
    /// Bedrooms
    pub bedrooms: u32,
    /// Bathrooms
    pub bathrooms: u32,
    /// Furnished
    pub furnished: bool,
    /// Amenities
    #[serde(default)]
    pub amenities: Vec<String>,
    /// Gender restriction
    pub gender_restriction: GenderRestriction,
    /// Minimum lease length
    pub lease_duration_months: u32,
}

/// Aggregate of client reviews
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceRating {
    /// Mean rating, two decimal places
    pub average: Decimal,
    /// Number of reviews
    pub count: u32,
}

impl ServiceRating {
    /// Fold one more rating into the running average
    pub fn with_rating(self, rating: u8) -> Self {
        let count = self.count + 1;
        let sum = self.average * Decimal::from(self.count) + Decimal::from(rating);
        Self {
            average: (sum / Decimal::from(count)).round_dp(2),
            count,
        }
    }
}

/// A published listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Listing ID
    pub id: String,
    /// Owning provider
    pub provider_id: String,
    /// Provider display name, filled on read
    #[serde(default)]
    pub provider_name: String,
    /// Service type
    pub service_type: ServiceType,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Category
    pub category: String,
    /// Price per month
    pub price_monthly: Decimal,
    /// Total slots
    pub capacity: u32,
    /// Slots not held by a live contract
    pub available_slots: u32,
    /// Location
    pub location: ServiceLocation,
    /// Present for transportation listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transportation: Option<TransportationDetails>,
    /// Present for residence listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residence: Option<ResidenceDetails>,
    /// Rating
    pub rating: ServiceRating,
    /// Status
    pub status: ServiceStatus,
    /// Requests are approved without the provider
    pub auto_accept: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// Whether a new contract may be opened against this listing
    pub fn accepts_contracts(&self) -> bool {
        self.status == ServiceStatus::Active && self.available_slots > 0
    }
}

/// Listing creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
    /// Service type
    pub service_type: ServiceType,
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Free-form category such as `bus` or `flat`
    pub category: String,
    /// Price per month, positive
    pub price_monthly: Decimal,
    /// Total slots, at least one
    pub capacity: u32,
    /// Location
    pub location: ServiceLocation,
    /// Required for transportation listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transportation: Option<TransportationDetails>,
    /// Required for residence listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residence: Option<ResidenceDetails>,
    /// Approve requests without the provider
    #[serde(default)]
    pub auto_accept: bool,
}

impl NewService {
    /// Check required fields for the service type
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Title is required".to_string());
        }
        if self.category.trim().is_empty() {
            return Err("Category is required".to_string());
        }
        if self.price_monthly <= Decimal::ZERO {
            return Err("Monthly price must be greater than zero".to_string());
        }
        if self.capacity == 0 {
            return Err("Capacity must be at least 1".to_string());
        }
        match self.service_type {
            ServiceType::Transportation if self.transportation.is_none() => {
                Err("Transportation details are required".to_string())
            }
            ServiceType::Residence if self.residence.is_none() => {
                Err("Residence details are required".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Partial update of a listing; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceUpdate {
    /// Title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Must stay positive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_monthly: Option<Decimal>,
    /// Cannot drop below the reserved slots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    /// Cannot exceed the unreserved capacity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_slots: Option<u32>,
    /// Location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ServiceLocation>,
    /// Transportation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transportation: Option<TransportationDetails>,
    /// Residence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residence: Option<ResidenceDetails>,
    /// Active or inactive; suspension is admin-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceStatus>,
    /// Auto accept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_accept: Option<bool>,
}

impl ServiceUpdate {
    /// Apply to `service`, rejecting values a provider may not set
    pub fn apply_to(self, service: &mut Service) -> Result<(), String> {
        if let Some(price) = self.price_monthly {
            if price <= Decimal::ZERO {
                return Err("Monthly price must be greater than zero".to_string());
            }
            service.price_monthly = price;
        }
        if let Some(status) = self.status {
            if status == ServiceStatus::Suspended || service.status == ServiceStatus::Suspended {
                return Err("Suspension is managed by administrators".to_string());
            }
            service.status = status;
        }
        if let Some(title) = self.title {
            if title.trim().is_empty() {
                return Err("Title is required".to_string());
            }
            service.title = title;
        }
        if let Some(description) = self.description {
            service.description = description;
        }
        if let Some(category) = self.category {
            service.category = category;
        }
        let reserved = service.capacity.saturating_sub(service.available_slots);
        if let Some(capacity) = self.capacity {
            if capacity < reserved {
                return Err(format!(
                    "Capacity cannot drop below the {} slot(s) held by active contracts",
                    reserved
                ));
            }
            service.capacity = capacity;
            service.available_slots = capacity - reserved;
        }
        if let Some(slots) = self.available_slots {
            if slots > service.capacity - reserved {
                return Err("Available slots cannot exceed the unreserved capacity".to_string());
            }
            service.available_slots = slots;
        }
        if let Some(location) = self.location {
            service.location = location;
        }
        if let Some(transportation) = self.transportation {
            service.transportation = Some(transportation);
        }
        if let Some(residence) = self.residence {
            service.residence = Some(residence);
        }
        if let Some(auto_accept) = self.auto_accept {
            service.auto_accept = auto_accept;
        }
        Ok(())
    }
}

/// Search filters for active listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceFilters {
    /// Service type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
    /// Lowest monthly price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<Decimal>,
    /// Highest monthly price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<Decimal>,
    /// City, matched case-insensitively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Nearby university, matched case-insensitively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    /// Lowest average rating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<Decimal>,
    /// Residence gender restriction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender_restriction: Option<GenderRestriction>,
    /// Results to skip
    #[serde(default)]
    pub skip: usize,
    /// Results to return
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

impl ServiceFilters {
    /// Whether `service` satisfies every filter that is set
    pub fn matches(&self, service: &Service) -> bool {
        if service.status != ServiceStatus::Active {
            return false;
        }
        if self.service_type.is_some_and(|t| t != service.service_type) {
            return false;
        }
        if self.min_price.is_some_and(|p| service.price_monthly < p) {
            return false;
        }
        if self.max_price.is_some_and(|p| service.price_monthly > p) {
            return false;
        }
        if let Some(city) = &self.city {
            if !contains_ignore_case(&service.location.city, city) {
                return false;
            }
        }
        if let Some(university) = &self.university {
            if !contains_ignore_case(&service.location.university_nearby, university) {
                return false;
            }
        }
        if self.min_rating.is_some_and(|r| service.rating.average < r) {
            return false;
        }
        if let Some(gender) = self.gender_restriction {
            match &service.residence {
                Some(residence) => {
                    if residence.gender_restriction != gender
                        && residence.gender_restriction != GenderRestriction::Any
                    {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    /// Filter then page through `services`
    pub fn apply(&self, services: Vec<Service>) -> Vec<Service> {
        services
            .into_iter()
            .filter(|s| self.matches(s))
            .skip(self.skip)
            .take(self.limit)
            .collect()
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

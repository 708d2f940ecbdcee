//! Generated agreement text
//!
//! The text is stored on the contract and shown as-is; nothing parses it.

use super::listing::{Service, ServiceType};
use super::schedule::PaymentScheduleItem;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt::Write;

const RULE: &str = "-----------------------------------------------------------";

/// Everything the agreement text mentions
pub struct TermsInput<'a> {
    /// Platform name in the heading
    pub platform: &'a str,
    /// Booked listing
    pub service: &'a Service,
    /// Provider name
    pub provider_name: &'a str,
    /// Provider safety score
    pub provider_safety_score: f64,
    /// Client name
    pub client_name: &'a str,
    /// University
    pub university: Option<&'a str>,
    /// Student number
    pub student_number: Option<&'a str>,
    /// Start date
    pub start_date: NaiveDate,
    /// End date
    pub end_date: NaiveDate,
    /// Length in months
    pub duration_months: u32,
    /// Monthly amount
    pub monthly_amount: Decimal,
    /// Total amount
    pub total_amount: Decimal,
    /// Currency
    pub currency: &'a str,
    /// Installments to list
    pub schedule: &'a [PaymentScheduleItem],
    /// Date printed on the agreement
    pub issued_on: NaiveDate,
}

fn long_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

fn or_na(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("N/A")
}

/// Render the agreement for a transportation or residence contract
pub fn generate(input: &TermsInput<'_>) -> String {
    let mut out = String::new();
    let service = input.service;
    let (title, owner_label, duration_label, amount_label) = match service.service_type {
        ServiceType::Transportation => (
            "TRANSPORTATION SERVICE AGREEMENT",
            "SERVICE PROVIDER",
            "CONTRACT DURATION",
            "Monthly Fee",
        ),
        ServiceType::Residence => (
            "RESIDENCE RENTAL AGREEMENT",
            "PROPERTY OWNER",
            "LEASE DURATION",
            "Monthly Rent",
        ),
    };

    // Writing into a String cannot fail.
    let _ = writeln!(out, "{}\n", title);
    let _ = writeln!(out, "Made on {} between:\n", long_date(input.issued_on));
    let _ = writeln!(out, "CLIENT: {}", input.client_name);
    let _ = writeln!(out, "University: {}", or_na(input.university));
    let _ = writeln!(out, "Student Number: {}\n", or_na(input.student_number));
    let _ = writeln!(out, "{}: {}", owner_label, input.provider_name);
    let _ = writeln!(out, "Safety Score: {}%\n", input.provider_safety_score);
    let _ = writeln!(out, "SERVICE: {}", service.title);
    let _ = writeln!(
        out,
        "Location: {}, {}\n",
        service.location.address, service.location.city
    );
    let _ = writeln!(out, "{}\n", RULE);

    let _ = writeln!(out, "1. {}", duration_label);
    let _ = writeln!(out, "   Start Date: {}", long_date(input.start_date));
    let _ = writeln!(out, "   End Date: {}", long_date(input.end_date));
    let _ = writeln!(out, "   Duration: {} months\n", input.duration_months);

    let _ = writeln!(out, "2. PAYMENT TERMS");
    let _ = writeln!(out, "   {}: {} {}", amount_label, input.monthly_amount, input.currency);
    let _ = writeln!(out, "   Total Amount: {} {}", input.total_amount, input.currency);
    let _ = writeln!(out, "   Installments are paid in order, earliest first\n");

    let _ = writeln!(out, "3. SERVICE DETAILS");
    match (&service.transportation, &service.residence) {
        (Some(t), _) if service.service_type == ServiceType::Transportation => {
            let _ = writeln!(out, "   Vehicle Type: {}", t.vehicle_type);
            let _ = writeln!(out, "   Vehicle Number: {}", or_na(t.vehicle_number.as_deref()));
            if !t.route.is_empty() {
                let _ = writeln!(out, "   Route:");
                for stop in &t.route {
                    let _ = writeln!(out, "     * {} at {}", stop.point, stop.time);
                }
            }
            let _ = writeln!(out, "   Amenities: {}\n", t.amenities.join(", "));
        }
        (_, Some(r)) => {
            let _ = writeln!(out, "   Type: {:?}", r.residence_type);
            let _ = writeln!(out, "   Bedrooms: {}", r.bedrooms);
            let _ = writeln!(out, "   Bathrooms: {}", r.bathrooms);
            let _ = writeln!(out, "   Furnished: {}", if r.furnished { "Yes" } else { "No" });
            let _ = writeln!(out, "   Gender Restriction: {:?}", r.gender_restriction);
            let _ = writeln!(out, "   Amenities: {}\n", r.amenities.join(", "));
        }
        _ => {
            let _ = writeln!(out, "   {}\n", service.description);
        }
    }

    let _ = writeln!(out, "4. PAYMENT SCHEDULE");
    for item in input.schedule {
        let _ = writeln!(
            out,
            "   - {}: {} {}",
            item.due_date.format("%b %d, %Y"),
            item.amount,
            input.currency
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "5. CANCELLATION");
    let _ = writeln!(out, "   Either party may cancel before the contract completes.");
    let _ = writeln!(out, "   Paid installments are settled through the platform.\n");

    let _ = writeln!(out, "6. DISPUTES");
    let _ = writeln!(out, "   Disputes are mediated by {} at no cost.\n", input.platform);

    let _ = writeln!(out, "{}\n", RULE);
    let _ = writeln!(
        out,
        "By signing, both parties accept the terms above.\nPlatform: {}",
        input.platform
    );

    out
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prices are soles.
pub fn format_price(amount: f64) -> String {
    format!("S/ {:.2}", amount)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Tour {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "priceAdult")]
    pub price_adult: f64,
    #[serde(rename = "priceChild")]
    pub price_child: f64,
    #[serde(rename = "minPrice")]
    pub min_price: f64,
    #[serde(rename = "directCost")]
    pub direct_cost: f64,
    #[serde(rename = "vehicleCost", default)]
    pub vehicle_cost: Option<f64>,
    pub duration: String,
    #[serde(rename = "maxCapacity")]
    pub max_capacity: u32,
    #[serde(rename = "createdById")]
    pub created_by_id: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Tour {
    /// Direct plus vehicle cost per departure.
    pub fn total_cost(&self) -> f64 {
        self.direct_cost + self.vehicle_cost.unwrap_or(0.0)
    }

    /// One line for terminal listings.
    pub fn summary_line(&self) -> String {
        let status = if self.active { "" } else { " (inactive)" };
        format!(
            "#{:<4} {:<32} {:>12} {:>10}  cap {}{}",
            self.id,
            self.title,
            format_price(self.price_adult),
            self.duration,
            self.max_capacity,
            status
        )
    }
}

/// Body for creating or updating a tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NewTour {
    pub title: String,
    pub description: String,
    #[serde(rename = "priceAdult")]
    pub price_adult: f64,
    #[serde(rename = "priceChild")]
    pub price_child: f64,
    #[serde(rename = "minPrice")]
    pub min_price: f64,
    #[serde(rename = "directCost")]
    pub direct_cost: f64,
    #[serde(rename = "vehicleCost", skip_serializing_if = "Option::is_none", default)]
    pub vehicle_cost: Option<f64>,
    pub duration: String,
    #[serde(rename = "maxCapacity")]
    pub max_capacity: u32,
}

impl NewTour {
    /// A tour with just the essentials; child and minimum price follow the
    /// adult price and costs start at zero.
    pub fn basic(title: impl Into<String>, duration: impl Into<String>, price_adult: f64, max_capacity: u32) -> Self {
        let title = title.into();
        Self {
            description: title.clone(),
            title,
            price_adult,
            price_child: price_adult,
            min_price: price_adult,
            direct_cost: 0.0,
            vehicle_cost: None,
            duration: duration.into(),
            max_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tour() {
        let json = r#"{"id": 7, "title": "Valle Sagrado", "description": "Full day", "priceAdult": 120, "priceChild": 90.5, "minPrice": 100, "directCost": 40, "vehicleCost": null, "duration": "8h", "maxCapacity": 20, "createdById": 1, "active": true, "createdAt": "2024-05-01T10:00:00.000Z", "updatedAt": "2024-05-02T10:00:00.000Z"}"#;
        let tour: Tour = serde_json::from_str(json).unwrap();
        assert_eq!(tour.id, 7);
        assert_eq!(tour.price_child, 90.5);
        assert_eq!(tour.vehicle_cost, None);
        assert_eq!(tour.total_cost(), 40.0);
        assert!(tour.summary_line().contains("S/ 120.00"));
    }

    #[test]
    fn test_new_tour_serializes_camel_case() {
        let body = serde_json::to_value(NewTour::basic("Machu Picchu", "2 days", 450.0, 12)).unwrap();
        assert_eq!(body["priceAdult"], 450.0);
        assert_eq!(body["maxCapacity"], 12);
        assert!(body.get("vehicleCost").is_none());
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(12.5), "S/ 12.50");
    }
}

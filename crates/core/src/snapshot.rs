//! Read-only projection of trip state consumed by the content builders.
//!
//! The snapshot is owned by the external trip-state store. Every scalar is
//! modeled as present-or-absent; collections default to empty.
//!
//! Decoding is lenient per top-level field: a field with the wrong shape is
//! treated as absent rather than failing the whole snapshot, because the
//! read path must always produce some content.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Country/region-level intelligence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Destination {
    pub country: Option<String>,
    pub region: Option<String>,
    pub flag_emoji: Option<String>,
    pub language: Option<String>,
    pub useful_phrases: BTreeMap<String, String>,
    pub currency_code: Option<String>,
    pub currency_symbol: Option<String>,
    pub exchange_rate_to_usd: Option<f64>,
    pub tipping_culture: Option<String>,
    pub payment_norms: Option<String>,
    pub climate_type: Option<String>,
    pub current_season_notes: Option<String>,
    pub transport_apps: Vec<String>,
    pub emergency_numbers: BTreeMap<String, String>,
    pub daily_budget_benchmarks: BTreeMap<String, f64>,
    pub researched_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripDates {
    /// ISO date (`YYYY-MM-DD`).
    pub start: Option<String>,
    pub end: Option<String>,
    pub total_days: Option<u32>,
}

impl TripDates {
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct City {
    pub name: Option<String>,
    pub days: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Travelers {
    pub count: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budget {
    pub style: Option<String>,
    pub total_estimate_usd: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchItem {
    pub name: Option<String>,
    pub advance_booking: bool,
    pub booking_lead_time: Option<String>,
}

/// Research findings for one city, grouped by category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CityResearch {
    pub last_updated: Option<String>,
    pub places: Vec<ResearchItem>,
    pub activities: Vec<ResearchItem>,
    pub food: Vec<ResearchItem>,
    pub logistics: Vec<ResearchItem>,
    pub tips: Vec<ResearchItem>,
    pub hidden_gems: Vec<ResearchItem>,
}

impl CityResearch {
    /// Total item count across all categories.
    pub fn total_items(&self) -> usize {
        self.places.len()
            + self.activities.len()
            + self.food.len()
            + self.logistics.len()
            + self.tips.len()
            + self.hidden_gems.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrioritizedItem {
    pub name: Option<String>,
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannedActivity {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DayPlan {
    pub day: Option<u32>,
    pub date: Option<String>,
    pub city: Option<String>,
    pub theme: Option<String>,
    pub key_activities: Vec<PlannedActivity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackEntry {
    pub day: Option<u32>,
    pub highlight: Option<String>,
    pub energy_level: Option<String>,
    pub discoveries: Vec<String>,
    pub adjustments_made: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostTotals {
    pub spent_usd: Option<f64>,
    pub daily_avg_usd: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spend {
    pub spent_usd: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostTracker {
    pub totals: Option<CostTotals>,
    pub budget_total_usd: Option<f64>,
    pub by_category: BTreeMap<String, Spend>,
    pub by_city: BTreeMap<String, Spend>,
    pub savings_tips: Vec<String>,
}

/// The read-only trip state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct StateSnapshot {
    pub trip_title: Option<String>,
    pub destination: Option<Destination>,
    pub dates: Option<TripDates>,
    pub cities: Vec<City>,
    pub travelers: Option<Travelers>,
    pub interests: Vec<String>,
    pub must_dos: Vec<String>,
    pub budget: Option<Budget>,
    pub research: BTreeMap<String, CityResearch>,
    pub priorities: BTreeMap<String, Vec<PrioritizedItem>>,
    pub high_level_plan: Vec<DayPlan>,
    pub feedback_log: Vec<FeedbackEntry>,
    pub cost_tracker: Option<CostTracker>,
    pub current_trip_day: Option<u32>,
    /// The local calendar date at the destination, supplied by the caller so
    /// that building stays a pure function of the snapshot.
    pub today: Option<NaiveDate>,
}

/// A decoded snapshot plus the names of fields that had to be discarded.
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    pub snapshot: StateSnapshot,
    pub degraded_fields: Vec<&'static str>,
}

impl StateSnapshot {
    /// Decode a JSON object, discarding malformed top-level fields.
    pub fn decode(value: &Value) -> Decoded {
        let empty = Map::new();
        let obj = match value {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Decoded {
                    snapshot: Self::default(),
                    degraded_fields: vec!["<root>"],
                };
            }
        };
        let mut degraded = Vec::new();
        let snapshot = Self {
            trip_title: field(obj, "trip_title", &mut degraded),
            destination: field(obj, "destination", &mut degraded),
            dates: field(obj, "dates", &mut degraded),
            cities: field(obj, "cities", &mut degraded),
            travelers: field(obj, "travelers", &mut degraded),
            interests: field(obj, "interests", &mut degraded),
            must_dos: field(obj, "must_dos", &mut degraded),
            budget: field(obj, "budget", &mut degraded),
            research: field(obj, "research", &mut degraded),
            priorities: field(obj, "priorities", &mut degraded),
            high_level_plan: field(obj, "high_level_plan", &mut degraded),
            feedback_log: field(obj, "feedback_log", &mut degraded),
            cost_tracker: field(obj, "cost_tracker", &mut degraded),
            current_trip_day: field(obj, "current_trip_day", &mut degraded),
            today: field(obj, "today", &mut degraded),
        };
        Decoded {
            snapshot,
            degraded_fields: degraded,
        }
    }

    pub fn destination(&self) -> Destination {
        self.destination.clone().unwrap_or_default()
    }

    /// `"<country> Trip"`, used when no explicit title is set.
    pub fn fallback_title(&self) -> String {
        match self.destination.as_ref().and_then(|d| d.country.as_deref()) {
            Some(country) if !country.trim().is_empty() => format!("{country} Trip"),
            _ => "Trip".to_string(),
        }
    }

    pub fn title(&self) -> String {
        match self.trip_title.as_deref() {
            Some(title) if !title.trim().is_empty() => title.to_string(),
            _ => self.fallback_title(),
        }
    }

    /// Current trip day: `today - start + 1` when both are known and the trip
    /// has started, otherwise `current_trip_day`.
    pub fn trip_day(&self) -> Option<u32> {
        let start = self.dates.as_ref().and_then(TripDates::start_date);
        if let (Some(today), Some(start)) = (self.today, start) {
            let delta = (today - start).num_days() + 1;
            return u32::try_from(delta).ok().filter(|d| *d >= 1);
        }
        self.current_trip_day
    }
}

impl From<Value> for StateSnapshot {
    fn from(value: Value) -> Self {
        let decoded = Self::decode(&value);
        if !decoded.degraded_fields.is_empty() {
            tracing::debug!(fields = ?decoded.degraded_fields, "Discarded malformed snapshot fields");
        }
        decoded.snapshot
    }
}

fn field<T: DeserializeOwned + Default>(
    obj: &Map<String, Value>,
    key: &'static str,
    degraded: &mut Vec<&'static str>,
) -> T {
    match obj.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|_| {
            degraded.push(key);
            T::default()
        }),
    }
}

//! Zone builders shared between agents.
//!
//! Each function returns a zone that may be empty; empty zones are left out
//! of the document.

use wayfarer_core::document::Zone;
use wayfarer_core::snapshot::{CityResearch, ResearchItem, StateSnapshot};

use super::context::format_usd;

const UNKNOWN: &str = "?";

/// Feedback entries shown to the scheduler.
pub const RECENT_FEEDBACK_ENTRIES: usize = 3;
const FOOD_HIGHLIGHTS_PER_CITY: usize = 5;
const TIER_PREVIEW: usize = 5;
const MAX_PHRASES: usize = 5;
const MAX_SAVINGS_TIPS: usize = 5;

const TIERS: [(&str, &str, &str); 4] = [
    ("must_do", "\u{1f534}", "Must Do"),
    ("nice_to_have", "\u{1f7e1}", "Nice to Have"),
    ("if_nearby", "\u{1f7e2}", "If Nearby"),
    ("skip", "\u{26aa}", "Skip"),
];

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or(UNKNOWN)
}

fn num_or_unknown(value: Option<u32>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |v| v.to_string())
}

fn item_names(items: &[ResearchItem], limit: usize) -> String {
    items
        .iter()
        .take(limit)
        .map(|i| or_unknown(i.name.as_deref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `street_food` → `Street Food`.
pub fn title_case(text: &str) -> String {
    text.replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn climate_line(climate: &str, season: Option<&str>) -> String {
    match season.filter(|s| !s.is_empty()) {
        Some(season) => format!("{climate} — {season}"),
        None => climate.to_string(),
    }
}

// ── Destination ───────────────────────────────────────────────────────────

/// Country-level facts, shown once the destination has been researched.
pub fn destination_intel(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Destination Intel");
    let dest = snapshot.destination();
    if dest.researched_at.is_none() {
        return zone;
    }

    let mut rows: Vec<(&str, String)> = Vec::new();
    if let Some(language) = &dest.language {
        rows.push(("Language", language.clone()));
    }
    if let Some(code) = &dest.currency_code {
        let symbol = dest.currency_symbol.as_deref();
        let mut currency = format!("{code} ({})", or_unknown(symbol));
        if let Some(rate) = dest.exchange_rate_to_usd.filter(|r| *r > 0.0) {
            currency.push_str(&format!(" · 1 USD ≈ {}{rate}", symbol.unwrap_or("")));
        }
        rows.push(("Currency", currency));
    }
    if let Some(tipping) = &dest.tipping_culture {
        rows.push(("Tipping", tipping.clone()));
    }
    if let Some(payment) = &dest.payment_norms {
        rows.push(("Payment", payment.clone()));
    }
    if let Some(climate) = &dest.climate_type {
        rows.push(("Climate", climate_line(climate, dest.current_season_notes.as_deref())));
    }
    if !dest.useful_phrases.is_empty() {
        let phrases = dest
            .useful_phrases
            .iter()
            .take(MAX_PHRASES)
            .map(|(meaning, phrase)| format!("\"{phrase}\" = {meaning}"))
            .collect::<Vec<_>>()
            .join(", ");
        rows.push(("Phrases", phrases));
    }

    if rows.is_empty() {
        return zone;
    }
    zone.push("| Field | Value |");
    zone.push("|-------|-------|");
    for (field, value) in rows {
        zone.push(format!("| {field} | {value} |"));
    }
    zone
}

/// Climate, apps, payment, phrases and emergency numbers.
pub fn practical_info(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Practical Info");
    let dest = snapshot.destination();
    if let Some(climate) = &dest.climate_type {
        zone.push(format!(
            "Climate: {}",
            climate_line(climate, dest.current_season_notes.as_deref())
        ));
    }
    if !dest.transport_apps.is_empty() {
        zone.push(format!("Transport apps: {}", dest.transport_apps.join(", ")));
    }
    if let Some(payment) = &dest.payment_norms {
        zone.push(format!("Payment: {payment}"));
    }
    if !dest.useful_phrases.is_empty() {
        let phrases = dest
            .useful_phrases
            .iter()
            .take(MAX_PHRASES)
            .map(|(k, v)| format!("\"{k}\" = \"{v}\""))
            .collect::<Vec<_>>()
            .join(", ");
        zone.push(format!("Key phrases: {phrases}"));
    }
    if !dest.emergency_numbers.is_empty() {
        let numbers = dest
            .emergency_numbers
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        zone.push(format!("Emergency: {numbers}"));
    }
    zone
}

// ── Research ──────────────────────────────────────────────────────────────

/// Per-city research status table, in route order.
pub fn research_progress(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Research Progress");
    if snapshot.cities.is_empty() {
        return zone;
    }
    zone.push("| City | Status | Items | Updated |");
    zone.push("|------|--------|-------|---------|");
    for city in &snapshot.cities {
        let name = or_unknown(city.name.as_deref());
        match snapshot.research.get(name) {
            Some(data) => {
                let updated = data
                    .last_updated
                    .as_deref()
                    .map(|u| u.split('T').next().unwrap_or(u))
                    .unwrap_or(UNKNOWN);
                zone.push(format!("| {name} | ✅ | {} items | {updated} |", data.total_items()));
            }
            None => zone.push(format!("| {name} | ⏳ | — | — |")),
        }
    }
    zone
}

fn findings_detail(data: &CityResearch) -> String {
    let mut detail = format!("Items: {}", data.total_items());
    if !data.places.is_empty() {
        detail.push_str(&format!(
            " · Places: {} ({})",
            data.places.len(),
            item_names(&data.places, 3)
        ));
    }
    if !data.food.is_empty() {
        detail.push_str(&format!(
            " · Food: {} ({})",
            data.food.len(),
            item_names(&data.food, 3)
        ));
    }
    if !data.activities.is_empty() {
        detail.push_str(&format!(" · Activities: {}", data.activities.len()));
    }
    if !data.hidden_gems.is_empty() {
        detail.push_str(&format!(" · Hidden gems: {}", data.hidden_gems.len()));
    }
    detail
}

/// Research summary per city: route cities first, then any extras.
pub fn research_findings(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Research Findings");
    let route: Vec<&str> = snapshot
        .cities
        .iter()
        .filter_map(|c| c.name.as_deref())
        .collect();

    for city in &snapshot.cities {
        let Some(name) = city.name.as_deref() else {
            continue;
        };
        let Some(data) = snapshot.research.get(name) else {
            continue;
        };
        zone.push("");
        zone.push(format!("### {name} ({} days)", num_or_unknown(city.days)));
        zone.push(findings_detail(data));
    }

    for (name, data) in &snapshot.research {
        if route.contains(&name.as_str()) {
            continue;
        }
        zone.push("");
        zone.push(format!("### {name}"));
        zone.push(format!("Items: {}", data.total_items()));
    }

    if zone.body.iter().all(|l| l.is_empty()) {
        zone.body.clear();
    }
    zone
}

/// Items that need booking ahead, across places, activities and food.
pub fn booking_deadlines(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Booking Deadlines");
    for (city, data) in &snapshot.research {
        for item in data.places.iter().chain(&data.activities).chain(&data.food) {
            if item.advance_booking {
                zone.push(format!(
                    "- {} ({city}): {}",
                    or_unknown(item.name.as_deref()),
                    item.booking_lead_time.as_deref().unwrap_or("book in advance")
                ));
            }
        }
    }
    zone
}

/// First few food finds per researched city.
pub fn food_highlights(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Food Highlights");
    for (city, data) in &snapshot.research {
        if !data.food.is_empty() {
            zone.push(format!("**{city}**: {}", item_names(&data.food, FOOD_HIGHLIGHTS_PER_CITY)));
        }
    }
    zone
}

// ── Planning ──────────────────────────────────────────────────────────────

/// Tiered priorities per city.
pub fn priorities(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Priorities");
    for (city, items) in &snapshot.priorities {
        zone.push("");
        zone.push(format!("### {city}"));
        zone.push("| Tier | Items |");
        zone.push("|------|-------|");
        for (key, icon, label) in TIERS {
            let names: Vec<&str> = items
                .iter()
                .filter(|i| i.tier.as_deref() == Some(key))
                .map(|i| or_unknown(i.name.as_deref()))
                .collect();
            if names.is_empty() {
                continue;
            }
            let mut shown = names.iter().take(TIER_PREVIEW).copied().collect::<Vec<_>>().join(", ");
            if names.len() > TIER_PREVIEW {
                shown.push_str(&format!(" +{} more", names.len() - TIER_PREVIEW));
            }
            zone.push(format!("| {icon} {label} ({}) | {shown} |", names.len()));
        }
    }
    zone
}

/// Day-by-day plan table.
pub fn itinerary(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Itinerary");
    if snapshot.high_level_plan.is_empty() {
        return zone;
    }
    zone.push("| Day | Date | City | Theme |");
    zone.push("|-----|------|------|-------|");
    for day in &snapshot.high_level_plan {
        zone.push(format!(
            "| {} | {} | {} | {} |",
            num_or_unknown(day.day),
            or_unknown(day.date.as_deref()),
            or_unknown(day.city.as_deref()),
            or_unknown(day.theme.as_deref()),
        ));
    }
    zone
}

/// The plan entry for the current trip day (day 1 when unknown).
pub fn today_plan(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Today's Plan");
    let current = snapshot.trip_day().unwrap_or(1);
    let Some(plan) = snapshot.high_level_plan.iter().find(|d| d.day == Some(current)) else {
        return zone;
    };
    zone.push(format!(
        "Day {current}: {} — \"{}\"",
        or_unknown(plan.city.as_deref()),
        or_unknown(plan.theme.as_deref())
    ));
    if !plan.key_activities.is_empty() {
        let activities = plan
            .key_activities
            .iter()
            .map(|a| or_unknown(a.name.as_deref()))
            .collect::<Vec<_>>()
            .join(", ");
        zone.push(format!("Activities: {activities}"));
    }
    zone
}

// ── Feedback ──────────────────────────────────────────────────────────────

/// The last few feedback entries, one line each.
pub fn recent_feedback(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Recent Feedback");
    let log = &snapshot.feedback_log;
    for entry in &log[log.len().saturating_sub(RECENT_FEEDBACK_ENTRIES)..] {
        zone.push(format!(
            "- Day {}: {} (energy: {})",
            num_or_unknown(entry.day),
            entry.highlight.as_deref().unwrap_or(""),
            or_unknown(entry.energy_level.as_deref())
        ));
    }
    zone
}

/// Full feedback log as a table.
pub fn feedback_history(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Feedback History");
    if snapshot.feedback_log.is_empty() {
        return zone;
    }
    zone.push("| Day | Highlight | Energy | Discoveries | Adjustments |");
    zone.push("|-----|-----------|--------|-------------|-------------|");
    for entry in &snapshot.feedback_log {
        let first_two = |items: &[String]| items.iter().take(2).cloned().collect::<Vec<_>>().join(", ");
        zone.push(format!(
            "| {} | {} | {} | {} | {} |",
            num_or_unknown(entry.day),
            entry.highlight.as_deref().unwrap_or(""),
            or_unknown(entry.energy_level.as_deref()),
            first_two(&entry.discoveries),
            first_two(&entry.adjustments_made),
        ));
    }
    zone
}

// ── Cost ──────────────────────────────────────────────────────────────────

/// Budget versus spend overview.
pub fn cost_knowledge(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Cost Knowledge");
    let Some(tracker) = &snapshot.cost_tracker else {
        return zone;
    };
    let Some(totals) = &tracker.totals else {
        return zone;
    };

    let budget_total = snapshot
        .budget
        .as_ref()
        .and_then(|b| b.total_estimate_usd)
        .or(tracker.budget_total_usd)
        .filter(|b| *b > 0.0);

    let mut rows: Vec<(&str, String)> = Vec::new();
    if let Some(total) = budget_total {
        rows.push(("Budget", format_usd(total)));
    }
    rows.push(("Spent", format_usd(totals.spent_usd.unwrap_or(0.0))));
    if let Some(avg) = totals.daily_avg_usd.filter(|a| *a > 0.0) {
        rows.push(("Daily Avg", format!("{}/day", format_usd(avg))));
    }
    rows.push(("Status", totals.status.clone().unwrap_or_else(|| "unknown".into())));

    zone.push("| Metric | Value |");
    zone.push("|--------|-------|");
    for (metric, value) in rows {
        zone.push(format!("| {metric} | {value} |"));
    }
    zone
}

pub fn spending_by_category(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Spending by Category");
    if let Some(tracker) = &snapshot.cost_tracker {
        for (category, spend) in &tracker.by_category {
            zone.push(format!(
                "- {}: {}",
                title_case(category),
                format_usd(spend.spent_usd.unwrap_or(0.0))
            ));
        }
    }
    zone
}

pub fn spending_by_city(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Spending by City");
    if let Some(tracker) = &snapshot.cost_tracker {
        for (city, spend) in &tracker.by_city {
            zone.push(format!("- {city}: {}", format_usd(spend.spent_usd.unwrap_or(0.0))));
        }
    }
    zone
}

pub fn pricing_benchmarks(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Pricing Benchmarks");
    for (level, amount) in &snapshot.destination().daily_budget_benchmarks {
        zone.push(format!("- {}: ~${amount}/day/person", title_case(level)));
    }
    zone
}

pub fn savings_tips(snapshot: &StateSnapshot) -> Zone {
    let mut zone = Zone::new("Savings Tips");
    if let Some(tracker) = &snapshot.cost_tracker {
        for tip in tracker.savings_tips.iter().take(MAX_SAVINGS_TIPS) {
            zone.push(format!("- {tip}"));
        }
    }
    zone
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> StateSnapshot {
        StateSnapshot::decode(&value).snapshot
    }

    #[test]
    fn title_case_words() {
        assert_eq!(title_case("street_food"), "Street Food");
        assert_eq!(title_case("mid-range"), "Mid-range");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn research_progress_marks_pending_cities() {
        let snapshot = decode(json!({
            "cities": [{"name": "Tokyo", "days": 4}, {"name": "Kyoto", "days": 3}],
            "research": {"Tokyo": {"last_updated": "2026-03-01T10:00:00Z", "places": [{"name": "Senso-ji"}]}},
        }));
        let zone = research_progress(&snapshot);
        assert_eq!(zone.body[2], "| Tokyo | ✅ | 1 items | 2026-03-01 |");
        assert_eq!(zone.body[3], "| Kyoto | ⏳ | — | — |");
    }

    #[test]
    fn research_findings_lists_route_then_extras() {
        let snapshot = decode(json!({
            "cities": [{"name": "Tokyo", "days": 4}],
            "research": {
                "Tokyo": {"places": [{"name": "Senso-ji"}, {"name": "Meiji"}], "food": [{"name": "Ramen"}]},
                "Nikko": {"tips": [{"name": "Go early"}]},
            },
        }));
        let zone = research_findings(&snapshot);
        assert_eq!(
            zone.body,
            [
                "",
                "### Tokyo (4 days)",
                "Items: 3 · Places: 2 (Senso-ji, Meiji) · Food: 1 (Ramen)",
                "",
                "### Nikko",
                "Items: 1",
            ]
        );
    }

    #[test]
    fn priorities_preview_overflow() {
        let items: Vec<_> = (0..7).map(|i| json!({"name": format!("p{i}"), "tier": "must_do"})).collect();
        let snapshot = decode(json!({"priorities": {"Tokyo": items}}));
        let zone = priorities(&snapshot);
        assert_eq!(zone.body.last().unwrap(), "| 🔴 Must Do (7) | p0, p1, p2, p3, p4 +2 more |");
    }

    #[test]
    fn booking_deadlines_default_lead_time() {
        let snapshot = decode(json!({
            "research": {"Kyoto": {"food": [{"name": "Kikunoi", "advance_booking": true}]}},
        }));
        assert_eq!(booking_deadlines(&snapshot).body, ["- Kikunoi (Kyoto): book in advance"]);
    }

    #[test]
    fn recent_feedback_keeps_last_three() {
        let log: Vec<_> = (1..=5).map(|d| json!({"day": d, "highlight": format!("h{d}"), "energy_level": "high"})).collect();
        let zone = recent_feedback(&decode(json!({"feedback_log": log})));
        assert_eq!(zone.body.len(), 3);
        assert_eq!(zone.body[0], "- Day 3: h3 (energy: high)");
    }

    #[test]
    fn today_plan_uses_calendar_day() {
        let snapshot = decode(json!({
            "dates": {"start": "2026-04-01"},
            "today": "2026-04-02",
            "high_level_plan": [
                {"day": 1, "city": "Tokyo", "theme": "Arrival"},
                {"day": 2, "city": "Tokyo", "theme": "Temples", "key_activities": [{"name": "Senso-ji"}]},
            ],
        }));
        assert_eq!(
            today_plan(&snapshot).body,
            ["Day 2: Tokyo — \"Temples\"", "Activities: Senso-ji"]
        );
    }

    #[test]
    fn cost_knowledge_prefers_trip_budget() {
        let snapshot = decode(json!({
            "budget": {"total_estimate_usd": 5000},
            "cost_tracker": {"budget_total_usd": 4000, "totals": {"spent_usd": 1234.4, "status": "on_track"}},
        }));
        let zone = cost_knowledge(&snapshot);
        assert!(zone.body.contains(&"| Budget | $5,000 |".to_string()));
        assert!(zone.body.contains(&"| Spent | $1,234 |".to_string()));
        assert!(!zone.body.iter().any(|l| l.contains("Daily Avg")));
    }

    #[test]
    fn destination_intel_requires_research() {
        let mut snapshot = decode(json!({"destination": {"country": "Japan", "language": "Japanese"}}));
        assert!(destination_intel(&snapshot).is_empty());
        if let Some(dest) = snapshot.destination.as_mut() {
            dest.researched_at = Some("2026-03-01".into());
        }
        assert!(destination_intel(&snapshot).body.contains(&"| Language | Japanese |".to_string()));
    }
}

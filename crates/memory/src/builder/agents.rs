//! Per-agent zone lists.

use wayfarer_core::document::Zone;
use wayfarer_core::snapshot::StateSnapshot;

use super::context::{FieldGroup, trip_context};
use super::sections;

pub fn research(s: &StateSnapshot) -> Vec<Zone> {
    vec![
        trip_context(s, FieldGroup::Minimal),
        sections::destination_intel(s),
        sections::research_progress(s),
        sections::research_findings(s),
    ]
}

pub fn planner(s: &StateSnapshot) -> Vec<Zone> {
    vec![
        trip_context(s, FieldGroup::Extended),
        sections::priorities(s),
        sections::food_highlights(s),
        sections::itinerary(s),
    ]
}

pub fn scheduler(s: &StateSnapshot) -> Vec<Zone> {
    vec![
        trip_context(s, FieldGroup::Minimal),
        sections::itinerary(s),
        sections::practical_info(s),
        sections::booking_deadlines(s),
        sections::recent_feedback(s),
    ]
}

pub fn prioritizer(s: &StateSnapshot) -> Vec<Zone> {
    vec![
        trip_context(s, FieldGroup::Extended),
        sections::research_progress(s),
        sections::research_findings(s),
    ]
}

pub fn feedback(s: &StateSnapshot) -> Vec<Zone> {
    vec![
        trip_context(s, FieldGroup::Minimal),
        sections::today_plan(s),
        sections::feedback_history(s),
    ]
}

pub fn cost(s: &StateSnapshot) -> Vec<Zone> {
    vec![
        trip_context(s, FieldGroup::Cost),
        sections::cost_knowledge(s),
        sections::spending_by_category(s),
        sections::spending_by_city(s),
        sections::pricing_benchmarks(s),
        sections::savings_tips(s),
    ]
}

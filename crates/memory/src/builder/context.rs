//! The `Trip Context` zone, assembled from named field groups.
//!
//! Every agent's document opens with this zone. Agents differ only in how
//! many fields they need, so the groups nest: `Minimal` ⊂ `Extended` ⊂ `Cost`.

use wayfarer_core::document::Zone;
use wayfarer_core::snapshot::StateSnapshot;

/// Which fields the `Trip Context` zone carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldGroup {
    /// Destination, dates, travelers, route, interests.
    Minimal,
    /// Minimal plus must-dos and budget.
    Extended,
    /// Extended plus currency.
    Cost,
}

pub const TRIP_CONTEXT: &str = "Trip Context";

const UNKNOWN: &str = "?";

/// Build the `Trip Context` zone for `group`.
pub fn trip_context(snapshot: &StateSnapshot, group: FieldGroup) -> Zone {
    let mut zone = Zone::new(TRIP_CONTEXT);

    if snapshot.destination.is_some() || snapshot.dates.is_some() || snapshot.travelers.is_some() {
        zone.push(overview_line(snapshot));
    }

    if !snapshot.cities.is_empty() {
        let route = snapshot
            .cities
            .iter()
            .map(|c| {
                let days = c.days.map_or_else(|| UNKNOWN.to_string(), |d| d.to_string());
                format!("{} ({days}d)", c.name.as_deref().unwrap_or(UNKNOWN))
            })
            .collect::<Vec<_>>()
            .join(" → ");
        zone.push(format!("Route: {route}"));
    }

    if !snapshot.interests.is_empty() {
        zone.push(format!("Interests: {}", snapshot.interests.join(", ")));
    }

    if group >= FieldGroup::Extended {
        if !snapshot.must_dos.is_empty() {
            zone.push(format!("Must-dos: {}", snapshot.must_dos.join(", ")));
        }
        if let Some(budget) = &snapshot.budget {
            let style = budget.style.as_deref().unwrap_or(UNKNOWN);
            match budget.total_estimate_usd {
                Some(total) => zone.push(format!("Budget: {style} · {} total", format_usd(total))),
                None => zone.push(format!("Budget: {style}")),
            }
        }
    }

    if group >= FieldGroup::Cost
        && let Some(dest) = &snapshot.destination
        && let Some(code) = dest.currency_code.as_deref()
    {
        let symbol = dest.currency_symbol.as_deref().unwrap_or(UNKNOWN);
        let rate = dest
            .exchange_rate_to_usd
            .map_or_else(|| UNKNOWN.to_string(), |r| r.to_string());
        zone.push(format!("Currency: {code} ({symbol}) · 1 USD = {rate}"));
    }

    zone
}

fn overview_line(snapshot: &StateSnapshot) -> String {
    let dest = snapshot.destination();
    let country = dest.country.as_deref().unwrap_or(UNKNOWN);
    let place = match dest.flag_emoji.as_deref().filter(|f| !f.is_empty()) {
        Some(flag) => format!("{flag} {country}"),
        None => country.to_string(),
    };

    let dates = snapshot.dates.clone().unwrap_or_default();
    let total_days = dates
        .total_days
        .map_or_else(|| UNKNOWN.to_string(), |d| d.to_string());

    let travelers = snapshot.travelers.clone().unwrap_or_default();
    let count = travelers
        .count
        .map_or_else(|| UNKNOWN.to_string(), |c| c.to_string());

    format!(
        "Destination: {place} | Dates: {} to {} ({total_days} days) | Travelers: {}, {count}",
        dates.start.as_deref().unwrap_or(UNKNOWN),
        dates.end.as_deref().unwrap_or(UNKNOWN),
        travelers.kind.as_deref().unwrap_or(UNKNOWN),
    )
}

/// Whole dollars with thousands separators: `$12,345`.
pub fn format_usd(amount: f64) -> String {
    if !amount.is_finite() {
        return format!("${amount}");
    }
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

//! Pure field rules applied while turning source entities into destination
//! payloads. No I/O here; the clients and the orchestrator both call in.

use std::collections::BTreeMap;

use crate::model::CardDates;

/// Destination label colors, indexed by the source tag's color number.
/// Index 17 repeats index 0.
pub const LABEL_PALETTE: [&str; 18] = [
    "light-mud",
    "piggy-red",
    "pink-tulip",
    "lavender-fields",
    "sugar-plum",
    "antique-blue",
    "morning-sky",
    "summer-sky",
    "french-coast",
    "turquoise-sea",
    "tank-green",
    "bright-moss",
    "fresh-salad",
    "desert-sand",
    "apricot-red",
    "dark-granite",
    "light-concrete",
    "light-mud",
];

/// Out-of-range indexes wrap around the palette.
pub fn label_color(index: u32) -> &'static str {
    LABEL_PALETTE[index as usize % LABEL_PALETTE.len()]
}

/// Destination ordering starts at 1.
pub fn clamp_sort_order(sort_order: f64) -> f64 {
    if sort_order.is_nan() || sort_order < 1.0 {
        1.0
    } else {
        sort_order
    }
}

/// A non-empty due date wins; start and end are then dropped.
pub fn resolve_dates(
    due: Option<String>,
    start: Option<String>,
    end: Option<String>,
) -> CardDates {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    match non_empty(due) {
        Some(due) => CardDates {
            due: Some(due),
            start: None,
            end: None,
        },
        None => CardDates {
            due: None,
            start: non_empty(start),
            end: non_empty(end),
        },
    }
}

/// Prefixes the description with a details block built from the card's
/// free-form properties. Empty results collapse to `None`.
pub fn compose_description(
    properties: &BTreeMap<String, String>,
    description: Option<&str>,
) -> Option<String> {
    let description = description.map(str::trim).filter(|d| !d.is_empty());
    let details: Vec<&str> = properties
        .values()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();

    if details.is_empty() {
        return description.map(str::to_owned);
    }

    let mut out = String::from("## Details\n\n");
    out.push_str(&details.join("\n\n"));
    out.push_str("\n\n## Description");
    if let Some(description) = description {
        out.push_str("\n\n");
        out.push_str(description);
    }
    Some(out)
}

/// A space's only board takes the space's name; with several boards each one
/// is prefixed with it.
pub fn board_name(space_name: &str, board_title: &str, boards_in_space: usize) -> String {
    if boards_in_space == 1 {
        space_name.to_owned()
    } else {
        format!("{space_name}: {board_title}")
    }
}

//! Plain-text rendering of store snapshots.

use std::fmt::Write as _;

use client_core::{gate::GatePhase, selection::SELECTION_CAPACITY, StoreSnapshot};
use shared::{
    domain::{Environment, Species},
    protocol::ValidationResult,
};

pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn format_environment(env: &Environment) -> String {
    format!(
        "depth {}m, {}°C, salinity {} ppt",
        env.depth, env.temperature, env.salinity
    )
}

pub fn format_species_line(species: &Species) -> String {
    format!(
        "{} (provides {}, needs {}, depth {}, temp {}, eats: {})",
        species.name,
        species.calories_provided,
        species.calories_needed,
        species.depth_range,
        species.temperature_range,
        if species.food_sources.trim().is_empty() {
            "-".to_string()
        } else {
            species.food_source_list().join(", ")
        }
    )
}

pub fn format_validation(validation: Option<&ValidationResult>, phase: GatePhase) -> String {
    match (validation, phase) {
        (_, GatePhase::Idle) => "select 8 species and a location to check".to_string(),
        (None, GatePhase::Pending) => "checking...".to_string(),
        (Some(result), _) => {
            let verdict = if result.valid {
                "VALID ecosystem"
            } else {
                "INVALID"
            };
            let mut line = verdict.to_string();
            if let Some(reason) = &result.reason {
                let _ = write!(line, ": {reason}");
            }
            if phase == GatePhase::Pending {
                line.push_str(" (re-checking...)");
            }
            line
        }
        (None, GatePhase::Resolved { .. }) => String::new(),
    }
}

pub fn format_catalog(snapshot: &StoreSnapshot) -> String {
    if snapshot.catalog.is_empty() {
        return "catalog unavailable: nothing to select".to_string();
    }
    let mut out = String::new();
    for species in &snapshot.catalog {
        let marker = if snapshot
            .selection
            .iter()
            .any(|chosen| chosen.name == species.name)
        {
            '*'
        } else {
            ' '
        };
        let _ = writeln!(out, "{marker} {}", format_species_line(species));
    }
    out.trim_end().to_string()
}

pub fn format_snapshot(snapshot: &StoreSnapshot) -> String {
    let mut out = String::new();
    let warning = if snapshot.running_low { " (!)" } else { "" };
    let _ = writeln!(
        out,
        "time left {}{warning}",
        format_clock(snapshot.seconds_remaining)
    );
    let _ = writeln!(
        out,
        "species {}/{SELECTION_CAPACITY}:",
        snapshot.selection.len()
    );
    for (idx, species) in snapshot.selection.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", idx + 1, species.name);
    }
    let location = snapshot
        .environment
        .as_ref()
        .map(format_environment)
        .unwrap_or_else(|| "none".to_string());
    let _ = writeln!(out, "location: {location}");
    let _ = write!(
        out,
        "status: {}",
        format_validation(snapshot.validation.as_ref(), snapshot.gate_phase)
    );
    out
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;

use std::sync::Arc;

use shared::domain::{Environment, Species, PRESET_ENVIRONMENTS};

pub(crate) fn species(name: &str) -> Species {
    Species {
        name: name.to_string(),
        calories_provided: 1000,
        calories_needed: 500,
        depth_range: "0-40".to_string(),
        temperature_range: "20-30".to_string(),
        food_sources: String::new(),
    }
}

pub(crate) fn shared_species(name: &str) -> Arc<Species> {
    Arc::new(species(name))
}

pub(crate) fn numbered_species(count: usize) -> Vec<Species> {
    (1..=count).map(|n| species(&format!("species-{n}"))).collect()
}

pub(crate) fn shallow_reef() -> Environment {
    PRESET_ENVIRONMENTS[0]
}

pub(crate) fn deep_reef() -> Environment {
    PRESET_ENVIRONMENTS[2]
}

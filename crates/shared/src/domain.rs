use serde::{de, Deserialize, Deserializer, Serialize};

/// A selectable species as served by the catalog endpoint.
///
/// Identity is `name`; the remaining attributes are carried through to the
/// consistency check untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    #[serde(deserialize_with = "whole_calories")]
    pub calories_provided: u32,
    #[serde(deserialize_with = "whole_calories")]
    pub calories_needed: u32,
    pub depth_range: String,
    pub temperature_range: String,
    /// Semicolon separated prey names.
    #[serde(default)]
    pub food_sources: String,
}

impl Species {
    pub fn food_source_list(&self) -> Vec<&str> {
        self.food_sources
            .split(';')
            .map(str::trim)
            .filter(|source| !source.is_empty())
            .collect()
    }
}

/// Accepts any non-negative JSON number and drops the fractional part, so a
/// catalog that serialises `1500` as `1500.0` still loads.
fn whole_calories<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() || raw < 0.0 || raw >= f64::from(u32::MAX) + 1.0 {
        return Err(de::Error::custom(format!(
            "calorie value {raw} is not a non-negative whole number"
        )));
    }
    Ok(raw.trunc() as u32)
}

/// A location the ecosystem is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Metres.
    pub depth: u32,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Parts per thousand.
    pub salinity: f64,
}

pub const PRESET_ENVIRONMENTS: [Environment; 3] = [
    Environment {
        depth: 5,
        temperature: 27.0,
        salinity: 33.0,
    },
    Environment {
        depth: 25,
        temperature: 26.0,
        salinity: 35.0,
    },
    Environment {
        depth: 35,
        temperature: 25.5,
        salinity: 34.0,
    },
];

impl Environment {
    /// Looks up a preset by its 1-based position in the location picker.
    pub fn preset(index: usize) -> Option<Self> {
        index
            .checked_sub(1)
            .and_then(|idx| PRESET_ENVIRONMENTS.get(idx))
            .copied()
    }
}

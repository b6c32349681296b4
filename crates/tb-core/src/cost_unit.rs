//! Cost-unit configuration: which source categories book time onto which bucket.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::EventSource;

/// Reserved cost unit receiving events without a recognized category.
pub const DEFAULT_COST_UNIT: &str = "default_cost_unit";

/// Reserved cost unit for general overhead.
pub const OVERHEAD_COST_UNIT: &str = "overhead";

/// Category assigned to Outlook events that carry none.
///
/// Must be listed under [`DEFAULT_COST_UNIT`].
pub const DEFAULT_CATEGORY: &str = "outlook_default";

/// Reserved identifiers, in report order.
pub const RESERVED_COST_UNITS: [&str; 2] = [DEFAULT_COST_UNIT, OVERHEAD_COST_UNIT];

/// Errors rejecting a cost-unit configuration at load time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("mandatory cost unit is missing: {id}")]
    MissingCostUnit { id: &'static str },

    #[error("cost unit \"default_cost_unit\" must list the outlook category \"{category}\"")]
    MissingDefaultCategory { category: &'static str },

    #[error("cost unit \"{id}\" has an empty label")]
    EmptyLabel { id: String },

    #[error("cost unit \"{id}\" lists an empty {event_source} category")]
    EmptyCategory {
        id: String,
        event_source: EventSource,
    },

    #[error(
        "{event_source} category \"{category}\" is mapped to both \"{first}\" and \"{second}\""
    )]
    ConflictingCategory {
        event_source: EventSource,
        category: String,
        first: String,
        second: String,
    },
}

/// A bucket that event time is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostUnit {
    /// Display label used in reports.
    pub label: String,
    /// Outlook categories resolving to this cost unit.
    pub outlook: Vec<String>,
    /// Kapow project names resolving to this cost unit.
    pub kapow: Vec<String>,
}

impl CostUnit {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            outlook: Vec::new(),
            kapow: Vec::new(),
        }
    }

    /// Categories recognized for one source.
    pub fn categories(&self, source: EventSource) -> &[String] {
        match source {
            EventSource::Kapow => &self.kapow,
            EventSource::Outlook => &self.outlook,
        }
    }
}

/// Outcome of mapping an event's categories onto cost units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Exactly one category is mapped.
    CostUnit(&'a str),
    /// No category is mapped; time goes to [`DEFAULT_COST_UNIT`].
    Unmapped,
    /// More than one category is mapped. Holds the mapped labels in event order.
    Ambiguous(Vec<&'a str>),
}

impl<'a> Resolution<'a> {
    /// The cost unit receiving the time, or `None` when ambiguous.
    pub fn cost_unit(&self) -> Option<&'a str> {
        match self {
            Self::CostUnit(id) => Some(*id),
            Self::Unmapped => Some(DEFAULT_COST_UNIT),
            Self::Ambiguous(_) => None,
        }
    }
}

/// A validated cost-unit configuration.
///
/// Invariants, checked once on construction:
/// - [`DEFAULT_COST_UNIT`] and [`OVERHEAD_COST_UNIT`] exist
/// - [`DEFAULT_CATEGORY`] is an Outlook category of [`DEFAULT_COST_UNIT`]
/// - per source, a category belongs to at most one cost unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, CostUnit>",
    into = "BTreeMap<String, CostUnit>"
)]
pub struct CostUnitConfig {
    units: BTreeMap<String, CostUnit>,
    lookup: HashMap<(EventSource, String), String>,
}

impl CostUnitConfig {
    pub fn new(units: BTreeMap<String, CostUnit>) -> Result<Self, ConfigError> {
        for id in RESERVED_COST_UNITS {
            if !units.contains_key(id) {
                return Err(ConfigError::MissingCostUnit { id });
            }
        }
        let has_default_category = units
            .get(DEFAULT_COST_UNIT)
            .is_some_and(|unit| unit.outlook.iter().any(|c| c == DEFAULT_CATEGORY));
        if !has_default_category {
            return Err(ConfigError::MissingDefaultCategory {
                category: DEFAULT_CATEGORY,
            });
        }

        let mut lookup: HashMap<(EventSource, String), String> = HashMap::new();
        for (id, unit) in &units {
            if unit.label.trim().is_empty() {
                return Err(ConfigError::EmptyLabel { id: id.clone() });
            }
            for source in EventSource::ALL {
                for category in unit.categories(source) {
                    if category.trim().is_empty() {
                        return Err(ConfigError::EmptyCategory {
                            id: id.clone(),
                            event_source: source,
                        });
                    }
                    let key = (source, category.clone());
                    match lookup.get(&key) {
                        Some(existing) if existing != id => {
                            return Err(ConfigError::ConflictingCategory {
                                event_source: source,
                                category: category.clone(),
                                first: existing.clone(),
                                second: id.clone(),
                            });
                        }
                        Some(_) => {}
                        None => {
                            lookup.insert(key, id.clone());
                        }
                    }
                }
            }
        }

        Ok(Self { units, lookup })
    }

    /// All cost units in identifier order.
    pub fn units(&self) -> impl Iterator<Item = (&str, &CostUnit)> {
        self.units.iter().map(|(id, unit)| (id.as_str(), unit))
    }

    /// Cost unit identifiers in identifier order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    /// Identifiers of the cost units that are not reserved.
    pub fn user_defined_ids(&self) -> impl Iterator<Item = &str> {
        self.ids().filter(|id| !RESERVED_COST_UNITS.contains(id))
    }

    pub fn get(&self, id: &str) -> Option<&CostUnit> {
        self.units.get(id)
    }

    /// Display label for a cost unit, falling back to the identifier.
    pub fn label<'a>(&'a self, id: &'a str) -> &'a str {
        self.units.get(id).map_or(id, |unit| unit.label.as_str())
    }

    /// Every category recognized for `source`, across all cost units.
    pub fn categories_for_source(&self, source: EventSource) -> Vec<&str> {
        self.units
            .values()
            .flat_map(|unit| unit.categories(source))
            .map(String::as_str)
            .collect()
    }

    /// The cost unit a single category resolves to.
    pub fn cost_unit_for(&self, source: EventSource, category: &str) -> Option<&str> {
        self.lookup
            .get(&(source, category.to_string()))
            .map(String::as_str)
    }

    /// Maps an event's categories onto a cost unit.
    ///
    /// Labels are counted with repetition: listing the same mapped label twice
    /// is reported as ambiguous.
    pub fn resolve<'a>(&'a self, source: EventSource, categories: &'a [String]) -> Resolution<'a> {
        let mut mapped: Vec<&'a str> = Vec::new();
        let mut unit = None;
        for category in categories {
            if let Some(id) = self.cost_unit_for(source, category) {
                mapped.push(category.as_str());
                unit = Some(id);
            }
        }
        match (mapped.len(), unit) {
            (1, Some(id)) => Resolution::CostUnit(id),
            (0, _) => Resolution::Unmapped,
            _ => Resolution::Ambiguous(mapped),
        }
    }
}

impl TryFrom<BTreeMap<String, CostUnit>> for CostUnitConfig {
    type Error = ConfigError;

    fn try_from(units: BTreeMap<String, CostUnit>) -> Result<Self, Self::Error> {
        Self::new(units)
    }
}

impl From<CostUnitConfig> for BTreeMap<String, CostUnit> {
    fn from(config: CostUnitConfig) -> Self {
        config.units
    }
}

impl Default for CostUnitConfig {
    /// The smallest valid configuration: the two reserved cost units.
    fn default() -> Self {
        let mut default_unit = CostUnit::new("Default");
        default_unit.outlook.push(DEFAULT_CATEGORY.to_string());
        let units = BTreeMap::from([
            (DEFAULT_COST_UNIT.to_string(), default_unit),
            (OVERHEAD_COST_UNIT.to_string(), CostUnit::new("Overhead")),
        ]);
        let lookup = HashMap::from([(
            (EventSource::Outlook, DEFAULT_CATEGORY.to_string()),
            DEFAULT_COST_UNIT.to_string(),
        )]);
        Self { units, lookup }
    }
}

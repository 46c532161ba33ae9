//! Quantity takeoff derived from a model's property payload.
//!
//! Every object in `data.collection` is assigned a category from its
//! display name (`"Basic Wall [1234]"` → `"Basic Wall"`). Properties named
//! `Area`, `Length` or `Volume` in any group are summed per category and
//! unit; objects are counted per category.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuantityItem {
    pub category: String,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CountItem {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuantityTakeoff {
    pub areas: Vec<QuantityItem>,
    pub lengths: Vec<QuantityItem>,
    pub volumes: Vec<QuantityItem>,
    pub counts: Vec<CountItem>,
}

#[derive(Clone, Copy)]
enum Measure {
    Area,
    Length,
    Volume,
}

impl Measure {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "area" => Some(Measure::Area),
            "length" => Some(Measure::Length),
            "volume" => Some(Measure::Volume),
            _ => None,
        }
    }

    fn default_unit(&self) -> &'static str {
        match self {
            Measure::Area => "m^2",
            Measure::Length => "m",
            Measure::Volume => "m^3",
        }
    }
}

type Totals = BTreeMap<(String, String), f64>;

/// Build the takeoff. A payload without a collection yields an empty takeoff.
pub fn derive_quantities(properties: &Value) -> QuantityTakeoff {
    let Some(collection) = properties
        .pointer("/data/collection")
        .and_then(Value::as_array)
    else {
        return QuantityTakeoff::default();
    };

    let mut areas = Totals::new();
    let mut lengths = Totals::new();
    let mut volumes = Totals::new();
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();

    for object in collection {
        let category = category_of(object);
        *counts.entry(category.clone()).or_default() += 1;

        let Some(groups) = object.get("properties").and_then(Value::as_object) else {
            continue;
        };
        for group in groups.values().filter_map(Value::as_object) {
            for (name, raw) in group {
                let Some(measure) = Measure::from_name(name) else {
                    continue;
                };
                let Some((quantity, unit)) = parse_measurement(raw, measure) else {
                    continue;
                };
                let totals = match measure {
                    Measure::Area => &mut areas,
                    Measure::Length => &mut lengths,
                    Measure::Volume => &mut volumes,
                };
                *totals.entry((category.clone(), unit)).or_default() += quantity;
            }
        }
    }

    QuantityTakeoff {
        areas: into_items(areas),
        lengths: into_items(lengths),
        volumes: into_items(volumes),
        counts: counts
            .into_iter()
            .map(|(category, count)| CountItem { category, count })
            .collect(),
    }
}

fn category_of(object: &Value) -> String {
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    let category = match name.rfind(" [") {
        Some(idx) if name.ends_with(']') => &name[..idx],
        _ => name,
    };
    if category.is_empty() {
        "Uncategorized".to_string()
    } else {
        category.to_string()
    }
}

/// Accepts numbers or strings such as `"12.5 m^2"`.
fn parse_measurement(raw: &Value, measure: Measure) -> Option<(f64, String)> {
    let (quantity, unit) = match raw {
        Value::Number(n) => (n.as_f64()?, None),
        Value::String(s) => {
            let mut parts = s.split_whitespace();
            let quantity = parts.next()?.replace(',', "").parse::<f64>().ok()?;
            (quantity, parts.next().map(str::to_string))
        }
        _ => return None,
    };
    if !quantity.is_finite() {
        return None;
    }
    Some((
        quantity,
        unit.unwrap_or_else(|| measure.default_unit().to_string()),
    ))
}

fn into_items(totals: Totals) -> Vec<QuantityItem> {
    totals
        .into_iter()
        .map(|((category, unit), quantity)| QuantityItem {
            category,
            quantity,
            unit,
        })
        .collect()
}

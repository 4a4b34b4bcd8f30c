use crate::models::{DailyMacros, Slot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-meal share of the daily totals. Targets are rounded to whole units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTarget {
    pub calories: i64,
    pub protein: i64,
    pub carbs: i64,
    pub fats: i64,
}

pub type SlotTargets = BTreeMap<Slot, SlotTarget>;

/// Fraction of the daily totals assigned to each slot.
///
/// Fractions are not required to sum to 1.0; callers overriding the default
/// split are responsible for that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    shares: BTreeMap<Slot, f64>,
}

impl Default for Distribution {
    fn default() -> Self {
        Self::new([
            (Slot::Breakfast, 0.25),
            (Slot::Lunch, 0.30),
            (Slot::Dinner, 0.35),
            (Slot::Snack, 0.10),
        ])
    }
}

impl Distribution {
    pub fn new(shares: impl IntoIterator<Item = (Slot, f64)>) -> Self {
        Self {
            shares: shares.into_iter().collect(),
        }
    }

    pub fn share(&self, slot: Slot) -> Option<f64> {
        self.shares.get(&slot).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, f64)> + '_ {
        self.shares.iter().map(|(slot, share)| (*slot, *share))
    }

    pub fn total(&self) -> f64 {
        self.shares.values().sum()
    }
}

fn portion(total: f64, share: f64) -> i64 {
    let value = total * share;
    if value.is_finite() {
        value.round() as i64
    } else {
        0
    }
}

/// Splits daily totals into per-slot targets. Each macro is rounded
/// independently, so slot sums may differ from the daily total by up to one
/// unit per slot beyond the first.
pub fn compute_slot_targets(daily: &DailyMacros, distribution: &Distribution) -> SlotTargets {
    distribution
        .iter()
        .map(|(slot, share)| {
            let target = SlotTarget {
                calories: portion(daily.calories, share),
                protein: portion(daily.protein, share),
                carbs: portion(daily.carbs, share),
                fats: portion(daily.fats, share),
            };
            (slot, target)
        })
        .collect()
}

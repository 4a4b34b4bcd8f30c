use chrono::{Duration, NaiveDate};
use serde_json::Value;
use std::collections::HashSet;

use crate::models::Slot;
use crate::store::{plan_path, DocumentStore};

/// Upper bound on the history window, in days.
pub const MAX_HISTORY_DAYS_BACK: u32 = 366;

/// Canonical key of a daily plan document: zero-padded `YYYY-MM-DD`.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Accepts `YYYY-M-D` with or without zero padding and returns the canonical key.
pub fn normalize_date_key(raw: &str) -> Option<String> {
    let mut parts = raw.trim().split('-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    let day = parts.next()?.parse::<u32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day).map(date_key)
}

fn meal_names(plan: &serde_json::Map<String, Value>) -> impl Iterator<Item = &str> {
    Slot::ALL
        .into_iter()
        .filter_map(move |slot| plan.get(slot.as_str()).and_then(Value::as_array))
        .flatten()
        .filter_map(|meal| meal.get("name").and_then(Value::as_str))
}

/// Names of meals planned between `today - days_back` and `today`, oldest day
/// first, de-duplicated in first-seen order and capped at `max_meals`.
///
/// Anonymous callers get an empty list. A day that cannot be read is skipped.
/// Windows longer than [`MAX_HISTORY_DAYS_BACK`] are clamped.
pub async fn recent_meal_names(
    store: &dyn DocumentStore,
    user_id: Option<&str>,
    days_back: u32,
    max_meals: usize,
    today: NaiveDate,
) -> Vec<String> {
    let Some(user_id) = user_id.filter(|uid| !uid.is_empty()) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    let days_back = days_back.min(MAX_HISTORY_DAYS_BACK);
    let start = today
        .checked_sub_signed(Duration::days(i64::from(days_back)))
        .unwrap_or(NaiveDate::MIN);

    for date in start.iter_days().take_while(|date| *date <= today) {
        if names.len() >= max_meals {
            break;
        }
        let key = date_key(date);
        let plan = match store.get(&plan_path(user_id, &key)).await {
            Ok(Some(plan)) => plan,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(user_id, date = %key, error = %err, "skipping unreadable plan");
                continue;
            }
        };
        for name in meal_names(&plan) {
            if names.len() >= max_meals {
                break;
            }
            if seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }
    }

    tracing::info!(user_id, count = names.len(), "retrieved recent meals");
    names
}

use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use serde_json::Value;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::models::Slot;
use crate::store::{DocPath, DocumentStore, DocumentWrite, WriteBatch, MAX_BATCH_WRITES};

pub const DEFAULT_COLLECTION: &str = "recipes";

const ID_COL: &str = "id";
const TITLE_COL: &str = "title";
const IMAGE_COL: &str = "image";
const MEAL_TYPE_COL: &str = "meal_type";
const CALORIES_COL: &str = "calories";
const PROTEINS_COL: &str = "proteins";
const FATS_COL: &str = "fats";
const CARBS_COL: &str = "carbs";
const TIME_COL: &str = "total_time_mins";
const INGREDIENTS_LIST_COL: &str = "ingredients_list";
const INGREDIENTS_COL: &str = "ingredients";
const INSTRUCTIONS_LIST_COL: &str = "instructions_list";
const INSTRUCTIONS_COL: &str = "instructions";

/// Recipe document as stored under `{collection}/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeRecord {
    pub title: String,
    pub image: String,
    pub total_time_mins: i64,
    pub calories: i64,
    pub proteins: i64,
    pub fats: i64,
    pub carbs: i64,
    pub meal_type: String,
    pub tags: Vec<String>,
    pub ingredients_list: Vec<String>,
    pub instructions_list: Vec<String>,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Rows with both an id and a title.
    pub valid_rows: usize,
    pub skipped_rows: usize,
    pub written: usize,
    pub batches: usize,
    pub dry_run: bool,
}

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid"));

/// One element of a Python-style list literal: a quoted string or a bare scalar.
static LITERAL_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)"|(-?\d+(?:\.\d+)?|True|False|None)"#)
        .expect("list literal pattern is valid")
});

/// First number in `text`, truncated toward zero; `0` when there is none.
pub fn extract_number(text: &str) -> i64 {
    NUMBER
        .find(text)
        .and_then(|found| found.as_str().parse::<f64>().ok())
        .map(|value| value.trunc() as i64)
        .unwrap_or(0)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn build_tags(meal_type: Slot, protein: i64, carbs: i64, total_time: i64) -> Vec<String> {
    let mut tags = Vec::new();
    if protein >= 25 {
        tags.push("High Protein".to_string());
    }
    if 0 < carbs && carbs <= 25 {
        tags.push("Low Carb".to_string());
    }
    if 0 < total_time && total_time <= 20 {
        tags.push("Quick".to_string());
    }
    let meal_tag = capitalize(meal_type.as_str());
    if !tags.contains(&meal_tag) {
        tags.push(meal_tag);
    }
    tags
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn is_separator(gap: &str) -> bool {
    gap.chars().all(|c| c == ',' || c.is_whitespace())
}

/// Items of a flat list literal such as `['1 cup oats', "chef's knife", 2]`.
/// `None` when the text is not such a list.
fn parse_list_literal(text: &str) -> Option<Vec<String>> {
    let inner = text.strip_prefix('[')?.strip_suffix(']')?;
    let mut items = Vec::new();
    let mut cursor = 0;
    for captures in LITERAL_ITEM.captures_iter(inner) {
        let whole = captures.get(0)?;
        if !is_separator(&inner[cursor..whole.start()]) {
            return None;
        }
        cursor = whole.end();
        let item = match (captures.get(1).or_else(|| captures.get(2)), captures.get(3)) {
            (Some(quoted), _) => unescape(quoted.as_str()),
            (None, Some(bare)) => bare.as_str().to_string(),
            (None, None) => return None,
        };
        items.push(item);
    }
    is_separator(&inner[cursor..]).then_some(items)
}

fn non_blank(items: impl IntoIterator<Item = String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// A JSON (or Python-style) list column, or the free-text column split into
/// lines when the list column is empty or not a list.
pub fn parse_list_column(raw: &str, fallback_text: &str) -> Vec<String> {
    let raw = raw.trim();
    if !raw.is_empty() {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
            return non_blank(items.into_iter().map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            }));
        }
        if let Some(items) = parse_list_literal(raw) {
            return non_blank(items);
        }
    }
    fallback_text
        .replace('\r', "\n")
        .split('\n')
        .map(|line| line.trim_matches(|c| c == ' ' || c == '-' || c == '\t'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

struct Columns {
    id: usize,
    title: usize,
    image: Option<usize>,
    meal_type: Option<usize>,
    calories: Option<usize>,
    proteins: Option<usize>,
    fats: Option<usize>,
    carbs: Option<usize>,
    total_time: Option<usize>,
    ingredients_list: Option<usize>,
    ingredients: Option<usize>,
    instructions_list: Option<usize>,
    instructions: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &str| find(name).ok_or_else(|| anyhow!("Column '{}' not found", name));
        Ok(Self {
            id: require(ID_COL)?,
            title: require(TITLE_COL)?,
            image: find(IMAGE_COL),
            meal_type: find(MEAL_TYPE_COL),
            calories: find(CALORIES_COL),
            proteins: find(PROTEINS_COL),
            fats: find(FATS_COL),
            carbs: find(CARBS_COL),
            total_time: find(TIME_COL),
            ingredients_list: find(INGREDIENTS_LIST_COL),
            ingredients: find(INGREDIENTS_COL),
            instructions_list: find(INSTRUCTIONS_LIST_COL),
            instructions: find(INSTRUCTIONS_COL),
        })
    }
}

fn cell(record: &StringRecord, index: Option<usize>) -> &str {
    index.and_then(|i| record.get(i)).unwrap_or("").trim()
}

fn record_from_row(columns: &Columns, record: &StringRecord) -> RecipeRecord {
    let meal_type = Slot::parse(cell(record, columns.meal_type)).unwrap_or(Slot::Dinner);
    let calories = extract_number(cell(record, columns.calories));
    let proteins = extract_number(cell(record, columns.proteins));
    let fats = extract_number(cell(record, columns.fats));
    let carbs = extract_number(cell(record, columns.carbs));
    let total_time_mins = extract_number(cell(record, columns.total_time));

    RecipeRecord {
        title: cell(record, Some(columns.title)).to_string(),
        image: cell(record, columns.image).to_string(),
        total_time_mins,
        calories,
        proteins,
        fats,
        carbs,
        meal_type: meal_type.as_str().to_string(),
        tags: build_tags(meal_type, proteins, carbs, total_time_mins),
        ingredients_list: parse_list_column(
            cell(record, columns.ingredients_list),
            cell(record, columns.ingredients),
        ),
        instructions_list: parse_list_column(
            cell(record, columns.instructions_list),
            cell(record, columns.instructions),
        ),
        source: "recipes.csv".to_string(),
    }
}

async fn commit(store: &dyn DocumentStore, batch: WriteBatch, report: &mut IngestReport) -> Result<()> {
    let size = batch.len();
    store
        .commit_batch(batch)
        .await
        .with_context(|| format!("Failed to commit batch of {} recipes", size))?;
    report.written += size;
    report.batches += 1;
    tracing::info!(written = report.written, "committed recipe batch");
    Ok(())
}

/// Upserts every valid row of a recipes CSV into `{collection}/{id}`, merging
/// with existing documents. `limit` of 0 means no limit. A dry run only counts.
pub async fn ingest_recipes_csv(
    csv_path: &Path,
    store: &dyn DocumentStore,
    collection: &str,
    limit: usize,
    dry_run: bool,
) -> Result<IngestReport> {
    if !csv_path.exists() {
        return Err(anyhow!("CSV not found: {:?}", csv_path));
    }
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open recipes CSV at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).flexible(true).from_reader(file);
    let columns = Columns::from_headers(rdr.headers()?)?;

    let mut report = IngestReport {
        dry_run,
        ..IngestReport::default()
    };
    let mut batch = WriteBatch::new();

    for (row_index, result) in rdr.records().enumerate() {
        if limit > 0 && report.valid_rows >= limit {
            break;
        }
        let record = result.with_context(|| format!("Failed to read record at row index {}", row_index))?;

        let id = cell(&record, Some(columns.id));
        let recipe = record_from_row(&columns, &record);
        if id.is_empty() || recipe.title.is_empty() {
            report.skipped_rows += 1;
            continue;
        }
        report.valid_rows += 1;
        if dry_run {
            continue;
        }

        let Value::Object(fields) = serde_json::to_value(&recipe)? else {
            return Err(anyhow!("Recipe row {} did not serialize to an object", row_index));
        };
        let path = DocPath::doc(collection, id);
        batch.merge(
            path,
            DocumentWrite {
                fields,
                server_timestamps: Vec::new(),
            },
        );
        if batch.len() >= MAX_BATCH_WRITES {
            commit(store, std::mem::take(&mut batch), &mut report).await?;
        }
    }

    if !batch.is_empty() {
        commit(store, batch, &mut report).await?;
    }

    if dry_run {
        tracing::info!(valid = report.valid_rows, skipped = report.skipped_rows, "dry run complete");
    } else {
        tracing::info!(written = report.written, collection, "ingestion complete");
    }
    Ok(report)
}

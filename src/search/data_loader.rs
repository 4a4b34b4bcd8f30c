use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;

use super::recipe_index::IndexedChunk;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A recipe rendered as plain text, ready to be chunked and embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDocument {
    pub id: String,
    pub title: String,
    pub text: String,
    pub image: Option<String>,
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn render(id: String, item: &Value) -> RecipeDocument {
    let title = text_of(item.get("title"));
    let ingredients = match item.get("ingredients") {
        Some(Value::Array(list)) => list
            .iter()
            .map(|entry| format!("- {}", text_of(Some(entry))))
            .collect::<Vec<_>>()
            .join("\n"),
        other => text_of(other),
    };
    let instructions = text_of(item.get("instructions"));
    let image = ["image", "image_url", "picture", "hash"]
        .iter()
        .find_map(|key| item.get(*key).filter(|v| !v.is_null()))
        .map(|v| text_of(Some(v)))
        .filter(|s| !s.is_empty());

    let text = format!(
        "Title: {}\n\nIngredients:\n{}\n\nInstructions:\n{}\n",
        title, ingredients, instructions
    );
    RecipeDocument { id, title, text, image }
}

/// Reads a recipes JSON file, either an array of recipes or an object keyed by
/// recipe id. `limit` of `None` loads everything.
pub fn load_recipe_documents(json_path: &Path, limit: Option<usize>) -> Result<Vec<RecipeDocument>> {
    if !json_path.exists() {
        bail!("Recipes JSON not found at {:?}", json_path);
    }
    let contents = std::fs::read_to_string(json_path)
        .with_context(|| format!("Failed to read recipes JSON at {:?}", json_path))?;
    let data: Value = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse recipes JSON at {:?}", json_path))?;

    let entries: Vec<(String, &Value)> = match &data {
        Value::Array(items) => items.iter().enumerate().map(|(i, item)| (i.to_string(), item)).collect(),
        Value::Object(items) => items.iter().map(|(key, item)| (key.clone(), item)).collect(),
        _ => bail!("Recipes JSON at {:?} must be an array or an object", json_path),
    };

    let limit = limit.unwrap_or(usize::MAX);
    let documents: Vec<RecipeDocument> = entries
        .into_iter()
        .filter(|(_, item)| item.is_object())
        .take(limit)
        .map(|(key, item)| {
            let id = match item.get("id") {
                Some(Value::Null) | None => key,
                Some(id) => text_of(Some(id)),
            };
            render(id, item)
        })
        .collect();

    tracing::info!(count = documents.len(), path = ?json_path, "loaded recipe documents");
    Ok(documents)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Greedily packs `splits` into chunks of at most `chunk_size` chars, carrying up
/// to `overlap` chars of trailing splits into the next chunk.
fn merge_splits(splits: &[String], separator: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    let joined = |current: &VecDeque<&str>| {
        current.iter().copied().collect::<Vec<_>>().join(separator).trim().to_string()
    };

    for split in splits {
        let len = char_len(split);
        let extra = if current.is_empty() { 0 } else { sep_len };
        if total + len + extra > chunk_size && !current.is_empty() {
            let chunk = joined(&current);
            if !chunk.is_empty() {
                chunks.push(chunk);
            }
            while total > overlap || (total > 0 && total + len + sep_len > chunk_size) {
                let Some(front) = current.pop_front() else { break };
                total -= char_len(front) + if current.is_empty() { 0 } else { sep_len };
            }
        }
        let extra = if current.is_empty() { 0 } else { sep_len };
        current.push_back(split);
        total += len + extra;
    }

    let chunk = joined(&current);
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

fn split_recursive(text: &str, separators: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let position = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");
    let finer = separators.get(position + 1..).unwrap_or(&[]);

    let splits: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator).filter(|s| !s.is_empty()).map(String::from).collect()
    };

    let mut chunks = Vec::new();
    let mut pending = Vec::new();
    for split in splits {
        if char_len(&split) <= chunk_size {
            pending.push(split);
            continue;
        }
        if !pending.is_empty() {
            chunks.extend(merge_splits(&pending, separator, chunk_size, overlap));
            pending.clear();
        }
        if finer.is_empty() {
            chunks.push(split);
        } else {
            chunks.extend(split_recursive(&split, finer, chunk_size, overlap));
        }
    }
    if !pending.is_empty() {
        chunks.extend(merge_splits(&pending, separator, chunk_size, overlap));
    }
    chunks
}

/// Splits each document on paragraph, line, then word boundaries into chunks of
/// at most `chunk_size` chars. Chunks keep their recipe title.
pub fn split_text(documents: &[RecipeDocument], chunk_size: usize, overlap: usize) -> Vec<IndexedChunk> {
    let chunks: Vec<IndexedChunk> = documents
        .iter()
        .flat_map(|doc| {
            split_recursive(&doc.text, &SEPARATORS, chunk_size.max(1), overlap)
                .into_iter()
                .enumerate()
                .map(move |(i, text)| IndexedChunk {
                    id: format!("{}#{}", doc.id, i),
                    title: Some(doc.title.clone()).filter(|t| !t.is_empty()),
                    text,
                })
        })
        .collect();
    tracing::info!(documents = documents.len(), chunks = chunks.len(), "split recipe documents");
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_json(value: Value) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        write!(file, "{}", value)?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn loads_keyed_object_and_array() -> Result<()> {
        let keyed = write_json(serde_json::json!({
            "r1": {"title": "Pancakes", "ingredients": ["flour", "milk"], "instructions": "Mix and fry.", "image": "abc.jpg"},
            "r2": {"title": "Soup", "ingredients": "water, salt", "instructions": null, "id": 42}
        }))?;
        let docs = load_recipe_documents(keyed.path(), None)?;
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "r1");
        assert_eq!(docs[0].image.as_deref(), Some("abc.jpg"));
        assert!(docs[0].text.starts_with("Title: Pancakes\n\nIngredients:\n- flour\n- milk"));
        assert!(docs[0].text.contains("Instructions:\nMix and fry."));
        assert_eq!(docs[1].id, "42");
        assert!(docs[1].text.contains("Ingredients:\nwater, salt"));

        let array = write_json(serde_json::json!([{"title": "A"}, "skip me", {"title": "B"}, {"title": "C"}]))?;
        let docs = load_recipe_documents(array.path(), Some(2))?;
        assert_eq!(docs.iter().map(|d| d.title.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_recipe_documents(Path::new("nope/recipes.json"), None).unwrap_err();
        assert!(err.to_string().contains("Recipes JSON not found"));
    }

    #[test]
    fn short_documents_stay_whole() {
        let doc = render("1".to_string(), &serde_json::json!({"title": "Toast", "ingredients": ["bread"]}));
        let chunks = split_text(&[doc.clone()], DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "1#0");
        assert_eq!(chunks[0].title.as_deref(), Some("Toast"));
        assert_eq!(chunks[0].text, doc.text.trim());
    }

    #[test]
    fn long_documents_split_with_overlap() {
        let steps: Vec<String> = (0..60).map(|i| format!("Step {} stir the pot gently", i)).collect();
        let doc = render(
            "stew".to_string(),
            &serde_json::json!({"title": "Stew", "ingredients": ["beans"], "instructions": steps.join("\n")}),
        );
        let chunks = split_text(&[doc], 300, 80);
        assert!(chunks.len() > 2);
        assert_eq!(chunks[0].text, "Title: Stew\n\nIngredients:\n- beans");
        for chunk in &chunks {
            assert!(char_len(&chunk.text) <= 300, "chunk too long: {}", char_len(&chunk.text));
            assert_eq!(chunk.title.as_deref(), Some("Stew"));
        }
        // The last line of one chunk reappears at the start of the next.
        let tail = chunks[1].text.lines().last().unwrap();
        assert!(chunks[2].text.lines().take(3).any(|line| line == tail));
    }

    #[test]
    fn oversized_words_fall_back_to_characters() {
        let chunks = split_recursive(&"x".repeat(25), &SEPARATORS, 10, 0);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }
}

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::handlers::{self, CallableRequest};
use crate::ingest::{ingest_recipes_csv, DEFAULT_COLLECTION};
use crate::planning::MealPlanner;
use crate::search::data_loader::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::search::{load_recipe_documents, split_text, EmbeddingEngine, RecipeIndex, RecipeRetriever};
use crate::store::FileDocumentStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "AI-assisted meal planning backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Daily calorie and macro targets for a profile
    Macros {
        /// JSON file with dateOfBirth, weightKg, heightCm, gender, activityLevel, goal, dietPreference
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Generate a meal plan (set "progressive": true and "dateId" in the input to persist it slot by slot)
    Plan {
        /// JSON file with dietPreference, preferences, macros, progressive, dateId
        #[arg(short, long)]
        input: PathBuf,
        /// Caller identity; required for progressive runs
        #[arg(short, long)]
        uid: Option<String>,
        /// Ground the plan on the local recipe index
        #[arg(long)]
        rag: bool,
    },
    /// Grocery list for a persisted weekly plan
    Grocery {
        #[arg(short, long)]
        uid: String,
        #[arg(short, long)]
        week: String,
    },
    /// Upsert recipes from a CSV file into the document store
    IngestRecipes {
        #[arg(long, default_value = "data/recipes.csv")]
        csv_path: PathBuf,
        #[arg(long, default_value = DEFAULT_COLLECTION)]
        collection: String,
        /// 0 means no limit
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long)]
        dry_run: bool,
    },
    /// Chunk and embed a recipes JSON file into the local recipe index
    BuildIndex {
        #[arg(long, default_value = "data/recipes.json")]
        recipes_json: PathBuf,
        /// Defaults to RECIPE_INDEX_PATH
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

async fn read_json(path: &Path) -> Result<Value> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read input file '{}'", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Input file '{}' is not valid JSON", path.display()))
}

fn planner(config: &AppConfig, grounded: bool) -> MealPlanner {
    let store = Arc::new(FileDocumentStore::new(&config.store_dir));
    let planner = MealPlanner::new(Arc::new(config.provider()), store, config.planner_settings());
    if !grounded {
        return planner;
    }

    let path = &config.recipe_index_path;
    let index = if path.exists() {
        EmbeddingEngine::new().and_then(|engine| RecipeIndex::load(path, Arc::new(engine)))
    } else {
        Err(anyhow!("Recipe index not found at {:?}. Run the build-index command first.", path))
    };
    match index {
        Ok(index) => planner.with_retriever(RecipeRetriever::new(Arc::new(index))),
        Err(err) => {
            let reason = format!("{:#}", err);
            tracing::warn!(error = %reason, "recipe index unavailable");
            planner.with_retrieval_error(reason)
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command {
        Command::Macros { input } => {
            let request = CallableRequest::new(None, read_json(&input).await?);
            print_json(&handlers::generate_macros(&planner(&config, false), &request).await)
        }
        Command::Plan { input, uid, rag } => {
            let request = CallableRequest::new(uid.as_deref(), read_json(&input).await?);
            let planner = planner(&config, rag);
            let response = if rag {
                handlers::generate_meal_plan_rag(&planner, &request).await
            } else {
                handlers::generate_meal_plan(&planner, &request).await
            };
            print_json(&response)
        }
        Command::Grocery { uid, week } => {
            let request = CallableRequest::new(Some(&uid), serde_json::json!({ "weekId": week }));
            print_json(&handlers::generate_grocery_list(&planner(&config, false), &request).await)
        }
        Command::IngestRecipes {
            csv_path,
            collection,
            limit,
            dry_run,
        } => {
            let store = FileDocumentStore::new(&config.store_dir);
            let report = ingest_recipes_csv(&csv_path, &store, &collection, limit, dry_run).await?;
            if dry_run {
                println!("DRY RUN complete. Valid recipe rows: {}", report.valid_rows);
            } else {
                println!(
                    "Ingestion complete. Upserted {} recipes into {} ({} skipped).",
                    report.written, collection, report.skipped_rows
                );
            }
            Ok(())
        }
        Command::BuildIndex {
            recipes_json,
            output,
            limit,
        } => {
            let output = output.unwrap_or_else(|| config.recipe_index_path.clone());
            let documents = load_recipe_documents(&recipes_json, limit)?;
            let chunks = split_text(&documents, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP);
            println!("Loaded {} recipes, split into {} chunks. Embedding...", documents.len(), chunks.len());

            let engine = Arc::new(EmbeddingEngine::new().context("Failed to load embedding model")?);
            let index = tokio::task::spawn_blocking(move || RecipeIndex::build(engine, chunks))
                .await
                .context("Embedding task panicked")??;
            index.save(&output)?;
            println!("Saved {} chunks to {}", index.len(), output.display());
            Ok(())
        }
    }
}

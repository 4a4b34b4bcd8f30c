use anyhow::{bail, Result};
use std::path::PathBuf;
use std::str::FromStr;

use crate::api_connection::endpoints::DEFAULT_MODEL;
use crate::api_connection::Provider;
use crate::planning::orchestrator::{DEFAULT_HISTORY_DAYS_BACK, DEFAULT_HISTORY_MAX_MEALS, DEFAULT_RETRIEVAL_K};
use crate::planning::PlannerSettings;

pub const DEFAULT_API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";
pub const DEFAULT_RECIPE_INDEX_PATH: &str = "data/recipe_index.json";
pub const DEFAULT_STORE_DIR: &str = "data/store";
pub const DEFAULT_APP_NAME: &str = "meal_planner";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            other => bail!("Unknown LLM_PROVIDER '{}': expected 'openai' or 'openrouter'", other),
        }
    }
}

/// Runtime configuration read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Name of the variable holding the API key; the key itself is read per call.
    pub api_key_env_var: String,
    pub provider: ProviderKind,
    pub base_url: Option<String>,
    pub model: String,
    pub recipe_index_path: PathBuf,
    pub store_dir: PathBuf,
    pub retrieval_k: usize,
    pub history_days_back: u32,
    pub history_max_meals: usize,
    pub site_url: String,
    pub app_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key_env_var: DEFAULT_API_KEY_ENV_VAR.to_string(),
            provider: ProviderKind::OpenAi,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            recipe_index_path: PathBuf::from(DEFAULT_RECIPE_INDEX_PATH),
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            retrieval_k: DEFAULT_RETRIEVAL_K,
            history_days_back: DEFAULT_HISTORY_DAYS_BACK,
            history_max_meals: DEFAULT_HISTORY_MAX_MEALS,
            site_url: String::new(),
            app_name: DEFAULT_APP_NAME.to_string(),
        }
    }
}

fn number_or<T: FromStr + Copy + std::fmt::Display>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, %default, "ignoring malformed number");
            default
        }),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let provider = match get("LLM_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => defaults.provider,
        };

        Ok(Self {
            api_key_env_var: get("API_KEY_ENV_VAR").unwrap_or(defaults.api_key_env_var),
            provider,
            base_url: get("LLM_BASE_URL"),
            model: get("MEAL_PLAN_MODEL").unwrap_or(defaults.model),
            recipe_index_path: get("RECIPE_INDEX_PATH").map(PathBuf::from).unwrap_or(defaults.recipe_index_path),
            store_dir: get("STORE_DIR").map(PathBuf::from).unwrap_or(defaults.store_dir),
            retrieval_k: number_or("RETRIEVAL_K", get("RETRIEVAL_K"), defaults.retrieval_k),
            history_days_back: number_or("HISTORY_DAYS_BACK", get("HISTORY_DAYS_BACK"), defaults.history_days_back),
            history_max_meals: number_or("HISTORY_MAX_MEALS", get("HISTORY_MAX_MEALS"), defaults.history_max_meals),
            site_url: get("SITE_URL").unwrap_or(defaults.site_url),
            app_name: get("APP_NAME").unwrap_or(defaults.app_name),
        })
    }

    pub fn provider(&self) -> Provider {
        match self.provider {
            ProviderKind::OpenAi => Provider::openai(&self.api_key_env_var, self.base_url.as_deref()),
            ProviderKind::OpenRouter => Provider::openrouter(&self.api_key_env_var, &self.site_url, &self.app_name),
        }
    }

    pub fn planner_settings(&self) -> PlannerSettings {
        PlannerSettings {
            model: self.model.clone(),
            retrieval_k: self.retrieval_k,
            history_days_back: self.history_days_back,
            history_max_meals: self.history_max_meals,
            ..PlannerSettings::default()
        }
    }
}

use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::completion::request_structured;
use super::error::PlanError;
use super::history::recent_meal_names;
use super::prompts::{self, PLAN_SYSTEM_PROMPT, RAG_SLOT_SYSTEM_PROMPT, SLOT_SYSTEM_PROMPT};
use super::targets::{compute_slot_targets, Distribution, SlotTarget};
use crate::api_connection::endpoints::DEFAULT_MODEL;
use crate::api_connection::CompletionClient;
use crate::models::{Meal, MealOptions, MealPlan, MealPlanRequest, Slot};
use crate::search::{build_retrieval_query, RecipeRetriever};
use crate::store::{plan_path, DocPath, DocumentStore, DocumentWrite, StoreError};

pub const DEFAULT_RETRIEVAL_K: usize = 6;
pub const DEFAULT_HISTORY_DAYS_BACK: u32 = 10;
pub const DEFAULT_HISTORY_MAX_MEALS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    pub model: String,
    pub distribution: Distribution,
    pub retrieval_k: usize,
    pub history_days_back: u32,
    pub history_max_meals: usize,
    /// Pins the calendar date used for prompts and history; `None` follows the local clock.
    pub today: Option<NaiveDate>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            distribution: Distribution::default(),
            retrieval_k: DEFAULT_RETRIEVAL_K,
            history_days_back: DEFAULT_HISTORY_DAYS_BACK,
            history_max_meals: DEFAULT_HISTORY_MAX_MEALS,
            today: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Progressive,
    ProgressiveRag,
}

/// Returned once every slot of a progressive run has been persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressiveOutcome {
    pub status: &'static str,
    pub mode: GenerationMode,
}

impl ProgressiveOutcome {
    fn started(mode: GenerationMode) -> Self {
        Self { status: "started", mode }
    }
}

fn meals_value(meals: &[Meal]) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(meals)?)
}

/// Drives meal plan generation against injected collaborators.
#[derive(Clone)]
pub struct MealPlanner {
    completion: Arc<dyn CompletionClient>,
    store: Arc<dyn DocumentStore>,
    retriever: Option<RecipeRetriever>,
    /// Why no retriever could be attached, reported by [`MealPlanner::check_retrieval`].
    retrieval_error: Option<String>,
    settings: PlannerSettings,
}

impl MealPlanner {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        store: Arc<dyn DocumentStore>,
        settings: PlannerSettings,
    ) -> Self {
        Self {
            completion,
            store,
            retriever: None,
            retrieval_error: None,
            settings,
        }
    }

    pub fn with_retriever(mut self, retriever: RecipeRetriever) -> Self {
        self.retriever = Some(retriever);
        self.retrieval_error = None;
        self
    }

    /// Records why the recipe index could not be opened.
    pub fn with_retrieval_error(mut self, reason: impl Into<String>) -> Self {
        self.retriever = None;
        self.retrieval_error = Some(reason.into());
        self
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    pub(crate) fn completion(&self) -> &dyn CompletionClient {
        self.completion.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn today(&self) -> NaiveDate {
        self.settings.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Recently planned meal names for `user_id`, empty for anonymous callers.
    pub async fn recent_meals(&self, user_id: Option<&str>) -> Vec<String> {
        recent_meal_names(
            self.store(),
            user_id,
            self.settings.history_days_back,
            self.settings.history_max_meals,
            self.today(),
        )
        .await
    }

    /// Fails with [`PlanError::RagUnavailable`] when grounded generation cannot run.
    pub async fn check_retrieval(&self) -> Result<(), PlanError> {
        let retriever = self.retriever.as_ref().ok_or_else(|| {
            PlanError::RagUnavailable(
                self.retrieval_error
                    .clone()
                    .unwrap_or_else(|| "no recipe index is configured".to_string()),
            )
        })?;
        retriever
            .check_available()
            .await
            .map_err(|err| PlanError::RagUnavailable(format!("{:#}", err)))
    }

    async fn grounded_prompt(&self, base: String, request: &MealPlanRequest, slot: Slot) -> String {
        let query = build_retrieval_query(request, slot);
        let context = match &self.retriever {
            Some(retriever) => retriever.retrieve(&query, self.settings.retrieval_k).await,
            None => {
                tracing::warn!(%slot, "no recipe retriever configured, generating ungrounded");
                String::new()
            }
        };
        tracing::debug!(%slot, query, context_chars = context.len(), "retrieved reference recipes");
        prompts::rag_slot_prompt(&base, slot, &context)
    }

    async fn generate_slot(
        &self,
        request: &MealPlanRequest,
        recent_meals: &[String],
        slot: Slot,
        target: Option<&SlotTarget>,
        grounded: bool,
    ) -> Result<MealOptions, PlanError> {
        let base = prompts::slot_prompt(request, recent_meals, slot, target, self.today());
        let (system_prompt, prompt) = if grounded {
            (RAG_SLOT_SYSTEM_PROMPT, self.grounded_prompt(base, request, slot).await)
        } else {
            (SLOT_SYSTEM_PROMPT, base)
        };
        request_structured::<MealOptions>(self.completion(), &self.settings.model, system_prompt, prompt).await
    }

    /// One completion call for the whole day.
    pub async fn generate_single_shot(
        &self,
        request: &MealPlanRequest,
        recent_meals: &[String],
    ) -> Result<MealPlan, PlanError> {
        let prompt = prompts::full_plan_prompt(request, recent_meals, self.today());
        let plan =
            request_structured::<MealPlan>(self.completion(), &self.settings.model, PLAN_SYSTEM_PROMPT, prompt)
                .await?;
        tracing::info!(recent = recent_meals.len(), "generated single-shot meal plan");
        Ok(plan)
    }

    /// Four grounded slot calls in order, each seeing the names chosen before it.
    pub async fn generate_plan_with_rag(
        &self,
        request: &MealPlanRequest,
        mut recent_meals: Vec<String>,
    ) -> Result<MealPlan, PlanError> {
        let targets = compute_slot_targets(&request.macros, &self.settings.distribution);
        let mut slots = BTreeMap::new();
        for slot in Slot::ALL {
            let options = self
                .generate_slot(request, &recent_meals, slot, targets.get(&slot), true)
                .await?;
            recent_meals.extend(options.names().map(str::to_string));
            slots.insert(slot, options);
        }
        Ok(MealPlan::from_slots(slots)?)
    }

    /// Generates and persists one slot at a time into `users/{uid}/plans/{date}`.
    ///
    /// The first failing slot marks the document `error` and ends the run;
    /// slots written before it are left untouched.
    pub async fn generate_progressive(
        &self,
        user_id: &str,
        date_key: &str,
        request: &MealPlanRequest,
        mut recent_meals: Vec<String>,
        grounded: bool,
    ) -> Result<ProgressiveOutcome, PlanError> {
        let path = plan_path(user_id, date_key);
        let mode = if grounded {
            GenerationMode::ProgressiveRag
        } else {
            GenerationMode::Progressive
        };

        let mut initial = DocumentWrite::new();
        for slot in Slot::ALL {
            initial = initial.field(slot.as_str(), json!([]));
        }
        let initial = initial
            .field("selected", json!({}))
            .field("status", "generating")
            .field("progress", json!({"stage": "initializing", "percent": 0}))
            .field("date", date_key)
            .server_timestamp("startedAt")
            .server_timestamp("updatedAt");
        self.store().set(&path, initial).await?;
        tracing::info!(user_id, date = date_key, ?mode, "progressive generation started");

        let targets = compute_slot_targets(&request.macros, &self.settings.distribution);

        for slot in Slot::ALL {
            let step = async {
                let options = self
                    .generate_slot(request, &recent_meals, slot, targets.get(&slot), grounded)
                    .await?;
                let write = DocumentWrite::new()
                    .field(slot.as_str(), meals_value(&options.items)?)
                    .field("progress", json!({"stage": slot.as_str(), "percent": slot.progress_percent()}))
                    .server_timestamp("updatedAt");
                self.store().update(&path, write).await?;
                Ok::<_, PlanError>(options)
            };

            let result = step.await;
            match result {
                Ok(options) => {
                    recent_meals.extend(options.names().map(str::to_string));
                    tracing::info!(user_id, date = date_key, %slot, percent = slot.progress_percent(), "slot ready");
                }
                Err(err) => {
                    let message = err.to_string();
                    tracing::error!(user_id, date = date_key, %slot, error = %message, "slot generation failed");
                    self.mark_failed(&path, slot, &message).await;
                    return Err(PlanError::SlotGeneration { slot, message });
                }
            }
        }

        let ready = DocumentWrite::new()
            .field("status", "ready")
            .field("progress", Value::Null)
            .server_timestamp("updatedAt");
        self.store().update(&path, ready).await?;
        tracing::info!(user_id, date = date_key, ?mode, "progressive generation finished");
        Ok(ProgressiveOutcome::started(mode))
    }

    async fn mark_failed(&self, path: &DocPath, slot: Slot, message: &str) {
        let write = DocumentWrite::new()
            .field("status", "error")
            .field("error", format!("Failed generating {}: {}", slot, message))
            .server_timestamp("updatedAt");
        if let Err(err) = self.store().update(path, write).await {
            tracing::warn!(path = %path, error = %err, "could not record failed generation");
        }
    }
}

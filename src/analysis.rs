//! # Meal Analysis Module
//!
//! This module provides nutritional analysis of meals submitted as photos,
//! free-form text descriptions, or transcribed voice messages, using an
//! OpenAI-compatible chat-completions API with structured JSON output.
//!
//! ## Features
//!
//! - Photo analysis through the vision-capable chat model
//! - Text and correction analysis with the same structured schema
//! - Voice transcription through the audio transcriptions endpoint
//! - Retry logic with exponential backoff and circuit breaker protection
//!
//! ## Dependencies
//!
//! - `reqwest`: HTTP client with JSON and multipart support
//! - `serde`/`serde_json`: Request and response (de)serialization
//! - `tracing`: Structured logging and spans

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, info, warn, Instrument};

pub use crate::analysis_errors::AnalysisError;
pub use crate::circuit_breaker::CircuitBreaker;
use crate::config::AnalysisConfig;
use crate::db;
use crate::observability;

/// Nutritional breakdown of a single ingredient as returned by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientAnalysis {
    pub name: String,
    pub weight: f64,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
}

/// Structured nutritional analysis of a whole meal
///
/// `is_food` is false when the submitted photo or description does not
/// depict food at all; the remaining fields are zeroed in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealAnalysis {
    pub is_food: bool,
    pub title: String,
    pub total_weight: f64,
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
    pub fiber: f64,
    pub ingredients: Vec<IngredientAnalysis>,
}

impl MealAnalysis {
    /// Rebuild an analysis from a stored meal so a correction request can
    /// include the current state
    pub fn from_stored(meal: &db::Meal, ingredients: &[db::Ingredient]) -> Self {
        Self {
            is_food: true,
            title: meal.name.clone(),
            total_weight: meal.total_weight,
            calories: meal.total_calories,
            proteins: meal.total_protein,
            fats: meal.total_fat,
            carbs: meal.total_carbs,
            fiber: meal.total_fiber,
            ingredients: ingredients
                .iter()
                .map(|ingredient| IngredientAnalysis {
                    name: ingredient.name.clone(),
                    weight: ingredient.weight,
                    calories: ingredient.calories,
                    protein: ingredient.protein,
                    fat: ingredient.fat,
                    carbs: ingredient.carbs,
                    fiber: ingredient.fiber,
                })
                .collect(),
        }
    }

    /// Convert the analysis into database insert values
    pub fn into_meal_record(
        self,
        photo_key: Option<String>,
    ) -> (db::NewMeal, Vec<db::NewIngredient>) {
        let meal = db::NewMeal {
            name: self.title,
            total_weight: self.total_weight,
            total_calories: self.calories,
            total_protein: self.proteins,
            total_fat: self.fats,
            total_carbs: self.carbs,
            total_fiber: self.fiber,
            photo_key,
        };
        let ingredients = self
            .ingredients
            .into_iter()
            .map(|ingredient| db::NewIngredient {
                name: ingredient.name,
                weight: ingredient.weight,
                calories: ingredient.calories,
                protein: ingredient.protein,
                fat: ingredient.fat,
                carbs: ingredient.carbs,
                fiber: ingredient.fiber,
            })
            .collect();
        (meal, ingredients)
    }
}

/// What the user submitted for analysis
#[derive(Debug, Clone)]
pub enum AnalysisInput {
    /// Public URL of an uploaded meal photo
    Photo { image_url: String },
    /// Free-form meal description (typed or transcribed from voice)
    Text { description: String },
    /// A previously stored analysis plus the user's correction to it
    Correction {
        previous: MealAnalysis,
        correction: String,
    },
}

impl AnalysisInput {
    /// Label used in spans, logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisInput::Photo { .. } => "photo",
            AnalysisInput::Text { .. } => "text",
            AnalysisInput::Correction { .. } => "correction",
        }
    }

    fn max_tokens(&self, config: &AnalysisConfig) -> u32 {
        match self {
            AnalysisInput::Photo { .. } => config.max_image_tokens,
            _ => config.max_description_tokens,
        }
    }
}

const SYSTEM_PROMPT: &str = "Ты профессиональный нутрициолог. Определи блюдо, его ингредиенты и пищевую ценность. \
    Все веса указывай в граммах, калорийность в килокалориях, белки, жиры, углеводы и клетчатку в граммах. \
    Если входные данные не относятся к еде, верни is_food = false, нулевые значения и пустой список ингредиентов.";

const PHOTO_PROMPT: &str =
    "Определи по фото название блюда, его ингредиенты, вес и пищевую ценность.";

const TEXT_PROMPT: &str =
    "Определи по описанию название блюда, его ингредиенты, вес и пищевую ценность.";

const CORRECTION_PROMPT: &str =
    "Обнови анализ блюда с учётом правки пользователя и пересчитай итоговые значения.";

/// JSON schema enforced on the model output via structured responses
static MEAL_ANALYSIS_SCHEMA: LazyLock<serde_json::Value> = LazyLock::new(|| {
    serde_json::json!({
        "name": "meal_analysis",
        "strict": true,
        "schema": {
            "type": "object",
            "properties": {
                "is_food": { "type": "boolean" },
                "title": { "type": "string" },
                "total_weight": { "type": "number" },
                "calories": { "type": "number" },
                "proteins": { "type": "number" },
                "fats": { "type": "number" },
                "carbs": { "type": "number" },
                "fiber": { "type": "number" },
                "ingredients": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "weight": { "type": "number" },
                            "calories": { "type": "number" },
                            "protein": { "type": "number" },
                            "fat": { "type": "number" },
                            "carbs": { "type": "number" },
                            "fiber": { "type": "number" }
                        },
                        "required": ["name", "weight", "calories", "protein", "fat", "carbs", "fiber"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["is_food", "title", "total_weight", "calories", "proteins", "fats", "carbs", "fiber", "ingredients"],
            "additionalProperties": false
        }
    })
});

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: &'static str,
        text: String,
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: &'static str,
        image_url: ImageData,
    },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

fn build_chat_request(config: &AnalysisConfig, input: &AnalysisInput) -> ChatRequest {
    let user_message = match input {
        AnalysisInput::Photo { image_url } => ChatMessage {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    content_type: "text",
                    text: PHOTO_PROMPT.to_string(),
                },
                ContentPart::ImageUrl {
                    content_type: "image_url",
                    image_url: ImageData {
                        url: image_url.clone(),
                    },
                },
            ]),
        },
        AnalysisInput::Text { description } => ChatMessage {
            role: "user",
            content: MessageContent::Text(format!("{TEXT_PROMPT}\n\n{description}")),
        },
        AnalysisInput::Correction {
            previous,
            correction,
        } => {
            let previous_json = serde_json::to_string(previous).unwrap_or_default();
            ChatMessage {
                role: "user",
                content: MessageContent::Text(format!(
                    "{CORRECTION_PROMPT}\n\nТекущий анализ:\n{previous_json}\n\nПравка пользователя:\n{correction}"
                )),
            }
        }
    };

    ChatRequest {
        model: config.model.clone(),
        messages: vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
            },
            user_message,
        ],
        max_tokens: input.max_tokens(config),
        response_format: ResponseFormat {
            format_type: "json_schema",
            json_schema: MEAL_ANALYSIS_SCHEMA.clone(),
        },
    }
}

/// Client for the meal analysis and voice transcription APIs
#[derive(Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    config: AnalysisConfig,
}

impl AnalysisClient {
    pub fn new(http: reqwest::Client, config: AnalysisConfig) -> Self {
        Self { http, config }
    }

    /// Analyze a meal submission with retry logic and circuit breaker protection
    ///
    /// ## Processing Algorithm
    ///
    /// ```text
    /// 1. Circuit Breaker Check
    ///    - Check if circuit breaker is open (service unavailable)
    ///    - Return early if open to prevent cascading failures
    ///
    /// 2. Retry Loop (up to max_retries + 1 attempts)
    ///    For each attempt:
    ///      a. Send the chat-completions request with timeout
    ///      b. On success: Record success, update metrics, return analysis
    ///      c. On failure: Calculate delay, wait, retry
    ///      d. After max attempts: Record failure, return error
    ///
    /// 3. Circuit Breaker Updates
    ///    - Record success/failure to track service health
    ///    - Update circuit breaker state based on thresholds
    /// ```
    ///
    /// Retries use exponential backoff with jitter: the delay doubles each
    /// attempt up to `max_retry_delay_ms`, with a random component added to
    /// prevent synchronized retries.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError` for the various failure conditions:
    /// - `Api` - Circuit breaker open, or the model API returned an error
    /// - `Request` - The HTTP request failed
    /// - `Parse` - The model response was not valid analysis JSON
    /// - `Timeout` - The operation exceeded the configured timeout
    pub async fn analyze_meal(
        &self,
        input: &AnalysisInput,
        circuit_breaker: &CircuitBreaker,
    ) -> Result<MealAnalysis, AnalysisError> {
        let span = observability::analysis_span(input.kind());
        self.analyze_meal_with_retries(input, circuit_breaker)
            .instrument(span)
            .await
    }

    async fn analyze_meal_with_retries(
        &self,
        input: &AnalysisInput,
        circuit_breaker: &CircuitBreaker,
    ) -> Result<MealAnalysis, AnalysisError> {
        let start_time = std::time::Instant::now();

        if circuit_breaker.is_open() {
            warn!(
                "Circuit breaker is open, rejecting {} analysis request",
                input.kind()
            );
            observability::update_circuit_breaker_state(true);
            return Err(AnalysisError::Api(
                "Analysis service is temporarily unavailable due to repeated failures. Please try again later.".to_string(),
            ));
        }
        observability::update_circuit_breaker_state(false);

        info!("Starting meal analysis for {} input", input.kind());

        let mut attempt = 0;
        let max_attempts = self.config.recovery.max_retries + 1; // +1 for initial attempt

        loop {
            attempt += 1;

            match self.request_analysis(input).await {
                Ok(analysis) => {
                    let total_duration = start_time.elapsed();

                    circuit_breaker.record_success();
                    observability::update_circuit_breaker_state(false);
                    observability::record_analysis_metrics(input.kind(), true, total_duration);

                    info!(
                        "Meal analysis completed on attempt {} in {}ms: '{}', {} kcal",
                        attempt,
                        total_duration.as_millis(),
                        analysis.title,
                        analysis.calories
                    );
                    return Ok(analysis);
                }
                Err(err) => {
                    if attempt >= max_attempts {
                        let total_duration = start_time.elapsed();

                        circuit_breaker.record_failure();
                        observability::update_circuit_breaker_state(circuit_breaker.is_open());
                        observability::record_analysis_metrics(input.kind(), false, total_duration);

                        warn!(
                            "Meal analysis failed after {} attempts in {}ms: {err}",
                            attempt,
                            total_duration.as_millis()
                        );
                        return Err(err);
                    }

                    let delay_ms = calculate_retry_delay(attempt, &self.config.recovery);
                    warn!(
                        "Meal analysis attempt {attempt} failed: {err}. Retrying in {delay_ms}ms"
                    );

                    tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    /// Perform a single analysis request with timeout protection
    async fn request_analysis(&self, input: &AnalysisInput) -> Result<MealAnalysis, AnalysisError> {
        let request_start = std::time::Instant::now();
        let timeout_duration =
            tokio::time::Duration::from_secs(self.config.recovery.operation_timeout_secs);

        let result = tokio::time::timeout(timeout_duration, self.send_chat_request(input)).await;

        let elapsed_ms = request_start.elapsed().as_millis();
        match result {
            Ok(Ok(analysis)) => {
                debug!("Model responded in {elapsed_ms}ms");
                Ok(analysis)
            }
            Ok(Err(e)) => {
                warn!("Meal analysis request failed after {elapsed_ms}ms: {e}");
                Err(e)
            }
            Err(_) => {
                warn!(
                    "Meal analysis timed out after {}ms (limit: {}s)",
                    elapsed_ms, self.config.recovery.operation_timeout_secs
                );
                Err(AnalysisError::Timeout(format!(
                    "Analysis operation timed out after {} seconds",
                    self.config.recovery.operation_timeout_secs
                )))
            }
        }
    }

    async fn send_chat_request(&self, input: &AnalysisInput) -> Result<MealAnalysis, AnalysisError> {
        let request = build_chat_request(&self.config, input);
        let url = format!("{}/chat/completions", self.config.api_base);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api(format!(
                "Model API returned {status}: {body}"
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(format!("Invalid model response envelope: {e}")))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AnalysisError::Parse("Model response contained no choices".to_string()))?;

        let analysis: MealAnalysis = serde_json::from_str(&content)
            .map_err(|e| AnalysisError::Parse(format!("Model returned malformed analysis JSON: {e}")))?;

        debug!(
            "Parsed meal analysis: title='{}', {} ingredients",
            analysis.title,
            analysis.ingredients.len()
        );
        Ok(analysis)
    }

    /// Transcribe a voice message through the audio transcriptions endpoint
    ///
    /// Takes the raw downloaded audio bytes (Telegram voice messages are OGG)
    /// and returns the trimmed transcript text, which may be empty when the
    /// recording contained no recognizable speech.
    pub async fn transcribe_voice(
        &self,
        audio: Vec<u8>,
        file_name: &str,
    ) -> Result<String, AnalysisError> {
        let start_time = std::time::Instant::now();
        let url = format!("{}/audio/transcriptions", self.config.api_base);

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/ogg")
            .map_err(|e| AnalysisError::Transcription(format!("Invalid audio part: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.config.transcription_model.clone())
            .part("file", part);

        let timeout_duration =
            tokio::time::Duration::from_secs(self.config.recovery.operation_timeout_secs);
        let result = tokio::time::timeout(timeout_duration, async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .multipart(form)
                .send()
                .await
                .map_err(|e| {
                    AnalysisError::Transcription(format!("Transcription request failed: {e}"))
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AnalysisError::Transcription(format!(
                    "Transcription API returned {status}: {body}"
                )));
            }

            response
                .json::<TranscriptionResponse>()
                .await
                .map_err(|e| {
                    AnalysisError::Transcription(format!("Invalid transcription response: {e}"))
                })
        })
        .await;

        match result {
            Ok(Ok(transcript)) => {
                let text = transcript.text.trim().to_string();
                info!(
                    "Transcribed {} characters of voice input in {}ms",
                    text.len(),
                    start_time.elapsed().as_millis()
                );
                Ok(text)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AnalysisError::Timeout(format!(
                "Transcription timed out after {} seconds",
                self.config.recovery.operation_timeout_secs
            ))),
        }
    }
}

/// Calculate retry delay with exponential backoff
///
/// Implements exponential backoff with jitter to prevent thundering herd
/// problems. The delay doubles with each retry attempt up to the configured
/// maximum, and a random component of up to a quarter of the delay is added
/// to distribute retry attempts over time.
///
/// ```text
/// delay = min(base_delay * (2^(attempt-1)), max_delay)
/// jitter = random(0, delay/4)
/// final_delay = delay + jitter
/// ```
pub fn calculate_retry_delay(attempt: u32, recovery: &crate::config::RecoveryConfig) -> u64 {
    // Calculate exponential backoff with minimal precision loss
    // For retry delays, precision loss is acceptable as delays are typically small
    #[allow(clippy::cast_precision_loss)]
    let base_delay = recovery.base_retry_delay_ms as f64;

    #[allow(clippy::cast_precision_loss)]
    let exponential_delay = base_delay * (2.0_f64).powf((attempt - 1) as f64);

    #[allow(clippy::cast_precision_loss)]
    let delay = exponential_delay.min(recovery.max_retry_delay_ms as f64) as u64;

    // Add some jitter to prevent thundering herd
    let jitter = rand::random::<u64>() % (delay / 4).max(1);
    delay + jitter
}

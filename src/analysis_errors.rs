//! # Analysis Error Types Module
//!
//! This module defines custom error types used throughout the meal analysis pipeline.
//! It provides structured error handling for model API calls and response parsing.

/// Custom error types for meal analysis operations
#[derive(Debug, Clone)]
pub enum AnalysisError {
    /// Input validation errors
    Validation(String),
    /// Request construction or transport errors
    Request(String),
    /// Non-success responses from the model API
    Api(String),
    /// Response payload parsing errors
    Parse(String),
    /// Voice transcription errors
    Transcription(String),
    /// Timeout errors
    Timeout(String),
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::Validation(msg) => write!(f, "[ANALYSIS_VALIDATION] Input validation failed: {}", msg),
            AnalysisError::Request(msg) => write!(f, "[ANALYSIS_REQUEST] Model API request failed: {}", msg),
            AnalysisError::Api(msg) => write!(f, "[ANALYSIS_API] Model API returned an error: {}", msg),
            AnalysisError::Parse(msg) => write!(f, "[ANALYSIS_PARSE] Failed to parse analysis response: {}", msg),
            AnalysisError::Transcription(msg) => write!(f, "[TRANSCRIBE] Voice transcription failed: {}", msg),
            AnalysisError::Timeout(msg) => write!(f, "[ANALYSIS_TIMEOUT] Meal analysis timed out: {}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        AnalysisError::Api(err.to_string())
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AnalysisError::Timeout(err.to_string())
        } else {
            AnalysisError::Request(err.to_string())
        }
    }
}

//! # NutriLog Telegram Bot
//!
//! A Telegram bot that turns meal photos, voice notes and text descriptions
//! into nutritional breakdowns, keeps per-day statistics, and sells
//! subscriptions once the free trial runs out.

pub mod analysis;
pub mod analysis_errors;
pub mod bot;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod errors;
pub mod jobs;
pub mod observability;
pub mod observability_config;
pub mod payments;
pub mod reports;
pub mod storage;
pub mod subscription;
pub mod texts;
pub mod users;
pub mod webhook;

//! ADEA: an AI-powered assistant for data engineers.
//!
//! Serves a chat endpoint backed by an LLM, a pipeline log store, and an
//! isolation-forest anomaly detector over those logs.

pub mod anomaly;
pub mod api;
pub mod cache;
pub mod chat;
pub mod compliance;
pub mod config;
pub mod db;
pub mod metrics;
pub mod models;
pub mod render;
pub mod slack;

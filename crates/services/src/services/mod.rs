pub mod auth;
pub mod config;
pub mod copywriting;
pub mod credits;
pub mod editor;
pub mod gemini_api;
pub mod generation;
pub mod payments;

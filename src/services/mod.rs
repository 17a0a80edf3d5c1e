// src/services/mod.rs
pub mod agent;
pub mod error;
pub mod llm;
pub mod tools;
pub mod yahoo;

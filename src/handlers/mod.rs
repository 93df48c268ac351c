// src/handlers/mod.rs

pub mod auth;
pub mod fiches;
pub mod questions;
pub mod quiz;
pub mod results;

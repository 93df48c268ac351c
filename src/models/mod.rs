// src/models/mod.rs

pub mod attempt;
pub mod fiche;
pub mod question;
pub mod user;

// src/handlers/mod.rs

pub mod answers;
pub mod attempts;
pub mod auth;
pub mod groups;
pub mod questions;
pub mod students;
pub mod subjects;
pub mod teachers;
pub mod topics;
pub mod users;

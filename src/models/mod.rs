// src/models/mod.rs

pub mod attempt;
pub mod group;
pub mod question;
pub mod subject;
pub mod topic;
pub mod user;

//! Command handlers

pub mod config;
pub mod indexes;
pub mod resource;

//! HTTP handlers for model-file table edits and migration commands.

pub mod migrate;
pub mod tables;

//! Declarative model file: parse, edit, emit, persist.

pub mod editor;
pub mod file;
pub mod parser;
pub mod render;
pub mod types;

pub use file::ModelStore;
pub use parser::parse_model;
pub use render::render_model;
pub use types::*;

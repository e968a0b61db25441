pub mod ai;
pub mod ai_types;
pub mod encoding;
pub mod glossary;
pub mod install;
pub mod merge;
pub mod package;
pub mod pipeline;
pub mod qa;
pub mod terms;
pub mod text;
pub mod translation_memory;

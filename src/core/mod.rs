// src/core/mod.rs

pub mod config_loader;
pub mod history;
pub mod line_editor;
pub mod paths;
pub mod session;
pub mod word_splitter;

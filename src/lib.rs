pub mod args;
pub mod audio;
pub mod checker;
pub mod class_index;
pub mod code_doc;
pub mod codegen;
pub mod config;
pub mod error;
pub mod llm;
pub mod media;
pub mod pipeline;
pub mod process;
pub mod prompt;
pub mod render;
pub mod script;
pub mod script_gen;
pub mod stitch;
pub mod tts;
pub mod utils;

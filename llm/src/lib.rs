mod client_utils;
mod errors;
mod language_model;
pub mod llm_test;
mod openai;
mod types;

pub use errors::*;
pub use language_model::*;
pub use openai::*;
pub use types::*;

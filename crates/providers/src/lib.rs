//! Text-generation backends for CaseClaw.
//!
//! All providers implement the `caseclaw_core::Provider` trait.
//! `build_from_config` picks the one named in the configuration.

pub mod factory;
pub mod openai_compat;

pub use factory::build_from_config;
pub use openai_compat::OpenAiCompatProvider;

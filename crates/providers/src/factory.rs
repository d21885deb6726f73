//! Provider construction from configuration.

use std::sync::Arc;

use caseclaw_config::AppConfig;
use caseclaw_core::error::ProviderError;
use caseclaw_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the configured backend.
///
/// Hosted providers need an API key; Ollama runs without one.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.provider.as_str();
    let base_url = match (&config.base_url, default_base_url(name)) {
        (Some(url), _) => url.clone(),
        (None, Some(url)) => url.to_string(),
        (None, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{name}' has no default URL; set base_url"
            )));
        }
    };

    let api_key = match (config.api_key.clone(), name) {
        (Some(key), _) => key,
        (None, "ollama" | "custom") => "ollama".to_string(),
        (None, _) => {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{name}' requires an API key (set CASECLAW_API_KEY)"
            )));
        }
    };

    tracing::debug!(provider = name, base_url = %base_url, "Building provider");
    Ok(Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "openai" => Some("https://api.openai.com/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        _ => None,
    }
}

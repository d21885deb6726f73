//! `caseclaw config` — Configuration management commands.

use caseclaw_config::AppConfig;

pub fn init() -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run `caseclaw config init`.");
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Pick a provider and model (Ollama works without an API key)");
    println!("  2. Point store.database_path at your ingested LEAPP database");
    println!("  3. Run: caseclaw reports");
    Ok(())
}

pub fn show() -> anyhow::Result<()> {
    let mut config = AppConfig::load()?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}

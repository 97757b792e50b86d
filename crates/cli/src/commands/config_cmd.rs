//! `noteloom config`: Configuration management commands.

use noteloom_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ok  Config parsed successfully");

            let mut warnings = Vec::new();

            if !config.has_api_key() {
                warnings.push("No API key set (set NOTELOOM_API_KEY or OPENAI_API_KEY)".to_string());
            }

            let root = config.vault_root();
            if !root.is_dir() {
                warnings.push(format!("Vault root {} is not a directory", root.display()));
            }

            if !config.prompts.user_system_prompt.trim().is_empty() {
                warnings.push(
                    "A legacy user_system_prompt is set; run `noteloom prompts migrate`".to_string(),
                );
            }

            let mut names: Vec<&str> = config.projects.iter().map(|p| p.name.as_str()).collect();
            names.sort_unstable();
            if names.windows(2).any(|w| w[0] == w[1]) {
                warnings.push("Two projects share a name".to_string());
            }

            if warnings.is_empty() {
                println!("   ok  All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   !   {w}");
                }
            }

            println!();
            println!("   Model:     {}", config.default_model);
            println!("   API URL:   {}", config.api_url);
            println!("   Vault:     {}", root.display());
            println!("   Prompts:   {}/", config.prompts.folder);
            println!(
                "   Default:   {}",
                config.prompts.default_prompt_title.as_deref().unwrap_or("(none)")
            );
            println!("   Projects:  {}", config.projects.len());
        }
        Err(e) => {
            println!("   error  {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("***".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    AppConfig::default().save_to(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = noteloom_config::AppConfig::config_path();
        assert!(path.to_str().unwrap().ends_with("config.toml"));
    }
}

//! `iris config`: configuration management commands.

use iris_config::AppConfig;

const REDACTED: &str = "[REDACTED]";

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating {} ...", AppConfig::config_path().display());

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed and validated");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Providers:  {}", config.llm.providers.len());
    println!("   Models:     {}", config.configured_models().join(", "));
    println!("   Gateway:    {}:{}", config.gateway.host, config.gateway.port);
    println!("   Memory:     {}", config.memory.backend);
    println!("   Verdicts:   {}", config.assessment.verdicts.join(", "));

    Ok(())
}

/// Problems that do not stop Iris from starting but will break some runs.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let models = config.configured_models();

    if config.api_keys.is_empty() {
        warnings.push("No api_keys set; the pipeline routes accept any caller".to_string());
    }
    if !config.llm.providers.contains_key(&config.llm.default_provider) {
        warnings.push(format!(
            "Default provider '{}' is not configured",
            config.llm.default_provider
        ));
    }

    let required = [
        ("pipeline.refinement_model", &config.pipeline.refinement_model),
        ("memory.extraction_model", &config.memory.extraction_model),
    ];
    for (key, model) in required {
        if !models.contains(model) {
            warnings.push(format!("{key} '{model}' is not served by any provider"));
        }
    }
    for model in &config.memory.embedding_models {
        if !models.contains(model) {
            warnings.push(format!("Embedding model '{model}' is not served by any provider"));
        }
    }
    warnings
}

/// The configuration with inbound and provider keys replaced.
fn redacted(mut config: AppConfig) -> AppConfig {
    config.api_keys = config.api_keys.iter().map(|_| REDACTED.to_string()).collect();
    for provider in config.llm.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.to_string());
        }
    }
    config
}

pub fn show(defaults: bool) -> Result<(), Box<dyn std::error::Error>> {
    if defaults {
        println!("{}", AppConfig::default_toml());
        return Ok(());
    }
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_path().display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_redacted() {
        let mut config = AppConfig::default();
        config.api_keys = vec!["artemis-secret".into()];
        if let Some(openai) = config.llm.providers.get_mut("openai") {
            openai.api_key = Some("sk-secret".into());
        }

        let shown = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!shown.contains("artemis-secret"));
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains(REDACTED));
    }

    #[test]
    fn unserved_models_are_reported() {
        let mut config = AppConfig::default();
        config.api_keys = vec!["key".into()];
        assert!(warnings(&config).is_empty());

        config.pipeline.refinement_model = "gpt-3.5".into();
        let warnings = warnings(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("pipeline.refinement_model 'gpt-3.5'"));
    }
}

//! `iris serve`: start the HTTP API server.

use iris_config::AppConfig;
use iris_gateway::ServeOptions;

pub async fn run(port_override: Option<u16>, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Iris");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "   API keys:   {}",
        if config.api_keys.is_empty() { "not required" } else { "required" }
    );
    println!("   Memory:     {}", config.memory.backend);
    if dry_run {
        println!("   Dry run:    status updates are not sent");
    }

    iris_gateway::start(config, ServeOptions { dry_run }).await?;

    Ok(())
}

//! `iris variants`: list the variants the configured models can serve.

use iris_agent::{AgentVariant, VariantInfo, available_variants};
use iris_config::AppConfig;
use iris_pipelines::{ExerciseChatVariant, PromptUserVariant};
use iris_status::PipelineFeature;

pub fn run(feature_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let feature = PipelineFeature::from_name(feature_name).ok_or_else(|| {
        format!("Unknown feature '{feature_name}' (expected PROGRAMMING_EXERCISE_CHAT or PROMPT_USER)")
    })?;
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let router = iris_providers::build_from_config(&config)?;

    let variants = usable_variants(feature, &router.available_models());
    println!("Variants for {feature_name}");
    if variants.is_empty() {
        println!("   none: no provider serves the required models");
    }
    for v in variants {
        println!("   {:<10} {:<28} {}", v.id, v.name, v.description);
    }
    Ok(())
}

fn usable_variants(feature: PipelineFeature, models: &[String]) -> Vec<VariantInfo> {
    match feature {
        PipelineFeature::ExerciseChat => available_variants(&ExerciseChatVariant::all(), models)
            .iter()
            .map(AgentVariant::info)
            .collect(),
        PipelineFeature::PromptUser => available_variants(&PromptUserVariant::all(), models)
            .iter()
            .map(AgentVariant::info)
            .collect(),
    }
}

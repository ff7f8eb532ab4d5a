use std::path::Path;

use log::{info, warn};
use rs_textgen_core::io::{get_filename, list_files};
use rs_textgen_core::{
    GenerationContext, LanguageModel, ModelKind, TrainingOptions, generate, generate_batch, load_or_train,
};
use serde::Deserialize;

/// Optional JSON configuration passed as the first argument.
#[derive(Deserialize, Default)]
#[serde(default)]
struct Config {
    training: TrainingOptions,
    generation: GenerationContext,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Read the configuration if any, defaults otherwise
    let config: Config = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };

    // The temperature must be finite and >= 0.0 (0.0 = always the most likely token)
    let mut invalid = config.generation.clone();
    match invalid.set_temperature(-1.0) {
        Ok(_) => println!("Should not happen"),
        Err(e) => println!("Temperature -1.0 is invalid: {e}"),
    }

    let data = Path::new("./data");
    let corpora = list_files(data, "txt")?;
    if corpora.is_empty() {
        warn!("No .txt corpus found in {}", data.display());
        return Ok(());
    }

    for corpus in &corpora {
        let name = get_filename(corpus)?;
        for model_type in [ModelKind::Markov, ModelKind::Hmm, ModelKind::Vlmm] {
            let options = TrainingOptions { model_type, ..config.training.clone() };

            // Trains on the first run, then loads the cached .bin next to the corpus
            let model = match load_or_train(data.join(corpus), &options) {
                Ok(model) => model,
                Err(e) => {
                    warn!("Cannot build a {model_type} model from {name}: {e}");
                    continue;
                }
            };
            info!("{name} / {model_type}: {}", serde_json::to_string(&model.stats())?);

            // One sample with the configured context
            let result = generate(&model, &config.generation)?;
            println!("[{name} / {model_type}] {}", result.text);

            // A small deterministic batch
            let seeded = GenerationContext { seed: Some(42), max_tokens: 20, min_tokens: 5, ..config.generation.clone() };
            for (i, result) in generate_batch(&model, &seeded, 3).into_iter().enumerate() {
                match result {
                    Ok(result) => println!("  #{}: {} ({:?})", i + 1, result.text, result.finish_reason),
                    Err(e) => println!("  #{}: failed: {e}", i + 1),
                }
            }
        }
    }

    Ok(())
}

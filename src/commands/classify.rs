//! Classify a single image file from the command line

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use wastesort::classifier::{ModelService, PredictionResult};
use wastesort::Config;

/// Run the classifier once over `image` and print the prediction
pub fn execute(config: Config, image: &Path, model: Option<PathBuf>, json: bool) -> Result<()> {
    let model_path = model.unwrap_or(config.model_path);
    let service = ModelService::onnx(
        model_path.clone(),
        config.labels,
        config.image_size,
        config.input_layout,
    );

    let bytes =
        std::fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;

    let prediction = service.classify(&bytes).with_context(|| {
        format!(
            "Failed to classify {} with {}",
            image.display(),
            model_path.display()
        )
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
    } else {
        print_prediction(image, &prediction);
    }

    Ok(())
}

fn print_prediction(image: &Path, prediction: &PredictionResult) {
    println!("🗑️  {}", image.display());
    println!(
        "   Class: {} ({:.1}%)",
        prediction.label,
        prediction.confidence * 100.0
    );
    for (label, score) in &prediction.probabilities {
        println!("   {:<12} {:.4}", label, score);
    }
}

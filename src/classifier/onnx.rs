//! ONNX Runtime classifier for the exported waste model

use super::{ClassifyError, Classifier};
use anyhow::{bail, Context, Result};
use ndarray::Array4;
use ort::{inputs, session::Session, value::Value};
use std::path::Path;

/// ONNX-based image classifier
///
/// Feeds the first graph input and reads the first graph output.
pub struct OnnxClassifier {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    /// Load the artifact wholesale into an ONNX Runtime session
    pub fn open(model_path: &Path) -> Result<Self> {
        if !model_path.exists() {
            bail!(
                "Model file not found at {}\n\n\
                Export the Keras model to ONNX first, e.g.:\n  \
                python -m tf2onnx.convert --keras model_sampahh17.h5 --output {}",
                model_path.display(),
                model_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {}", model_path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .context("Model declares no inputs")?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .context("Model declares no outputs")?;

        tracing::debug!(
            model = %model_path.display(),
            input = %input_name,
            output = %output_name,
            "ONNX session ready"
        );

        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&mut self, batch: Array4<f32>) -> Result<Vec<f32>, ClassifyError> {
        let input = Value::from_array(batch)
            .map_err(|e| ClassifyError::Inference(format!("Failed to build input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => input])
            .map_err(|e| ClassifyError::Inference(format!("ONNX inference failed: {}", e)))?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                ClassifyError::Inference(format!("Failed to extract output tensor: {}", e))
            })?;

        Ok(first_item(shape.as_ref(), data)?.to_vec())
    }
}

/// Scores of the first batch item.
///
/// `[batch, classes]` outputs are sliced to one row; a rank-1 `[classes]`
/// output has no batch axis and is returned whole.
fn first_item<'a>(dims: &[i64], data: &'a [f32]) -> Result<&'a [f32], ClassifyError> {
    if data.is_empty() {
        return Err(ClassifyError::Inference(
            "model produced an empty output".to_string(),
        ));
    }

    let batch_size = if dims.len() > 1 {
        dims[0].max(1) as usize
    } else {
        1
    };
    if data.len() % batch_size != 0 {
        return Err(ClassifyError::Inference(format!(
            "output of {} values does not split into {} batch items",
            data.len(),
            batch_size
        )));
    }

    Ok(&data[..data.len() / batch_size])
}

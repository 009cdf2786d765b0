use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use ndarray::Array2;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{Classifier, ClassifierLoader};
use crate::types::Verdict;

/// Exercise classifier exported to ONNX. Takes a `[1, n]` feature row and
/// reports the predicted label as its first output.
pub struct OrtClassifier {
    session: Session,
    path: PathBuf,
}

impl OrtClassifier {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load classifier session from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            path: model_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Classifier for OrtClassifier {
    fn predict(&mut self, features: &[f32]) -> Result<Verdict> {
        let input = Array2::from_shape_vec((1, features.len()), features.to_vec())?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .with_context(|| format!("failed to run classifier {}", self.path.display()))?;

        if outputs.len() == 0 {
            return Err(anyhow!("classifier returned no outputs"));
        }

        // sklearn exports emit an int64 label; other converters emit scores.
        if let Ok(labels) = outputs[0].try_extract_array::<i64>() {
            return labels
                .iter()
                .next()
                .copied()
                .map(Verdict)
                .ok_or_else(|| anyhow!("classifier returned an empty label tensor"));
        }

        let scores = outputs[0].try_extract_array::<f32>()?;
        let scores: Vec<f32> = scores.iter().copied().collect();
        verdict_from_scores(&scores)
    }
}

/// A single score is a binary probability; several are per-class scores.
fn verdict_from_scores(scores: &[f32]) -> Result<Verdict> {
    match scores {
        [] => Err(anyhow!("classifier returned an empty score tensor")),
        [score] => Ok(Verdict(if *score >= 0.5 { 1 } else { 0 })),
        _ => scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(label, _)| Verdict(label as i64))
            .ok_or_else(|| anyhow!("classifier returned no scores")),
    }
}

/// Loads [`OrtClassifier`]s from disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrtClassifierLoader;

impl ClassifierLoader for OrtClassifierLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Classifier>> {
        let classifier = OrtClassifier::new(path)?;
        log::debug!("classifier session ready from {}", path.display());
        Ok(Box::new(classifier))
    }
}

//! Model persistence and inference
//!
//! A trained model is two files in the model directory: `goal_net.mpk`
//! (burn weights) and `manifest.json`. The manifest carries the feature
//! contract (the exact ordered feature columns the net was trained on)
//! plus the standardization statistics; a feature frame that does not
//! match the contract is rejected outright, never coerced.

pub mod goal_net;

use std::path::Path;
use std::sync::Mutex;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};

use crate::features::FeatureFrame;
use crate::{Result, XgoalsError};
use goal_net::{GoalNet, GoalNetConfig};

const MANIFEST_FILE: &str = "manifest.json";
const WEIGHTS_FILE: &str = "goal_net";

/// Everything needed to reconstruct the net and validate its inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub feature_columns: Vec<String>,
    pub target_columns: Vec<String>,
    pub hidden_dims: Vec<usize>,
    pub dropout: f64,
    pub feature_mean: Vec<f64>,
    pub feature_std: Vec<f64>,
    pub target_mean: Vec<f64>,
    pub target_std: Vec<f64>,
}

impl ModelManifest {
    pub fn save(&self, model_dir: &str) -> Result<()> {
        std::fs::create_dir_all(model_dir)?;
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| XgoalsError::Model(format!("failed to serialize manifest: {}", e)))?;
        std::fs::write(Path::new(model_dir).join(MANIFEST_FILE), content)?;
        Ok(())
    }

    pub fn load(model_dir: &str) -> Result<Self> {
        let path = Path::new(model_dir).join(MANIFEST_FILE);
        if !path.exists() {
            return Err(XgoalsError::NoModel);
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| XgoalsError::Model(format!("failed to parse manifest: {}", e)))
    }

    pub fn weights_path(model_dir: &str) -> String {
        Path::new(model_dir)
            .join(WEIGHTS_FILE)
            .to_string_lossy()
            .into_owned()
    }

    pub fn net_config(&self) -> GoalNetConfig {
        GoalNetConfig {
            input_dim: self.feature_columns.len(),
            output_dim: self.target_columns.len(),
            hidden_dims: self.hidden_dims.clone(),
            dropout: self.dropout,
        }
    }

    /// Index of a target column. A target the model was not trained on is
    /// a contract violation, not a zero.
    pub fn target_index(&self, target: &str) -> Result<usize> {
        self.target_columns
            .iter()
            .position(|c| c == target)
            .ok_or_else(|| {
                XgoalsError::Model(format!("model was not trained on target {:?}", target))
            })
    }

    /// Reject any feature frame whose columns differ from the contract.
    pub fn validate_features(&self, features: &FeatureFrame) -> Result<()> {
        if features.columns == self.feature_columns {
            return Ok(());
        }
        if features.columns.len() != self.feature_columns.len() {
            return Err(XgoalsError::FeatureContract(format!(
                "expected {} feature columns, got {}",
                self.feature_columns.len(),
                features.columns.len()
            )));
        }
        let mismatch = self
            .feature_columns
            .iter()
            .zip(&features.columns)
            .position(|(expected, got)| expected != got)
            .unwrap_or(0);
        Err(XgoalsError::FeatureContract(format!(
            "feature column {} is {:?}, expected {:?}",
            mismatch, features.columns[mismatch], self.feature_columns[mismatch]
        )))
    }
}

/// Loaded model plus its manifest, ready to score feature frames
pub struct GoalPredictor<B: Backend> {
    // Mutex only for thread-safety: burn modules contain lazily
    // initialized params (`OnceCell`) and are Send but not Sync.
    model: Mutex<GoalNet<B>>,
    manifest: ModelManifest,
    device: B::Device,
}

impl<B: Backend> GoalPredictor<B>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    pub fn new(model: GoalNet<B>, manifest: ModelManifest, device: B::Device) -> Self {
        GoalPredictor {
            model: Mutex::new(model),
            manifest,
            device,
        }
    }

    /// Load manifest and weights from the model directory
    pub fn load(model_dir: &str, device: B::Device) -> Result<Self> {
        let manifest = ModelManifest::load(model_dir)?;
        let model = GoalNet::load(
            &device,
            &ModelManifest::weights_path(model_dir),
            &manifest.net_config(),
        )?;
        Ok(Self::new(model, manifest, device))
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    /// Score a feature frame. One output row per input row, one value per
    /// target column, denormalized back to goal units.
    pub fn predict(&self, features: &FeatureFrame) -> Result<Vec<Vec<f64>>> {
        self.manifest.validate_features(features)?;
        if features.rows.is_empty() {
            return Ok(Vec::new());
        }

        let n = features.rows.len();
        let d = self.manifest.feature_columns.len();
        let mut data = Vec::with_capacity(n * d);
        for row in &features.rows {
            for (j, &v) in row.iter().enumerate() {
                let std = self.manifest.feature_std[j];
                let std = if std > 0.0 { std } else { 1.0 };
                data.push(((v - self.manifest.feature_mean[j]) / std) as f32);
            }
        }

        let input = Tensor::<B, 2>::from_data(TensorData::new(data, [n, d]), &self.device);
        let model = self.model.lock().unwrap_or_else(|e| e.into_inner());
        let output = model.forward(input);
        let flat = output
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| XgoalsError::Model(format!("{:?}", e)))?;

        let t = self.manifest.target_columns.len();
        Ok(flat
            .chunks(t)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, &v)| {
                        v as f64 * self.manifest.target_std[j] + self.manifest.target_mean[j]
                    })
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ModelManifest {
        ModelManifest {
            feature_columns: vec!["TeamA_FW_rolling_avg_gls".into(), "Diff_FW_rolling_avg_gls".into()],
            target_columns: vec!["TeamA_Goals_Scored".into(), "TeamB_Goals_Scored".into()],
            hidden_dims: vec![16],
            dropout: 0.0,
            feature_mean: vec![0.0, 0.0],
            feature_std: vec![1.0, 1.0],
            target_mean: vec![1.5, 1.2],
            target_std: vec![1.0, 1.0],
        }
    }

    fn frame(columns: Vec<String>) -> FeatureFrame {
        FeatureFrame {
            columns,
            match_ids: vec!["FUTURE_MATCH".into()],
            rows: vec![vec![1.0, 0.5]],
        }
    }

    #[test]
    fn test_contract_accepts_exact_match() {
        let m = manifest();
        assert!(m.validate_features(&frame(m.feature_columns.clone())).is_ok());
    }

    #[test]
    fn test_contract_rejects_reordered_columns() {
        let m = manifest();
        let mut columns = m.feature_columns.clone();
        columns.swap(0, 1);
        let err = m.validate_features(&frame(columns)).unwrap_err();
        assert!(matches!(err, XgoalsError::FeatureContract(_)));
    }

    #[test]
    fn test_contract_rejects_width_mismatch() {
        let m = manifest();
        let mut columns = m.feature_columns.clone();
        columns.push("TeamB_FW_rolling_avg_gls".into());
        let err = m.validate_features(&frame(columns)).unwrap_err();
        assert!(matches!(err, XgoalsError::FeatureContract(_)));
    }

    #[test]
    fn test_target_index_known_and_unknown() {
        let m = manifest();
        assert_eq!(m.target_index("TeamA_Goals_Scored").unwrap(), 0);
        assert_eq!(m.target_index("TeamB_Goals_Scored").unwrap(), 1);
        let err = m.target_index("Total_Match_Goals").unwrap_err();
        assert!(matches!(err, XgoalsError::Model(_)));
    }

    #[test]
    fn test_manifest_roundtrip() {
        let dir = std::env::temp_dir().join("xgoals_manifest_test");
        let dir = dir.to_string_lossy();
        let m = manifest();
        m.save(&dir).unwrap();
        let loaded = ModelManifest::load(&dir).unwrap();
        assert_eq!(loaded.feature_columns, m.feature_columns);
        assert_eq!(loaded.target_columns, m.target_columns);
        std::fs::remove_dir_all(&*dir).ok();
    }

    #[test]
    fn test_missing_manifest_is_no_model() {
        let result = ModelManifest::load("/nonexistent/xgoals_model_dir");
        assert!(matches!(result, Err(XgoalsError::NoModel)));
    }

    #[test]
    fn test_predictor_end_to_end() {
        use burn::backend::NdArray;
        let device = Default::default();
        let m = manifest();
        let model = GoalNet::<NdArray<f32>>::new(&device, &m.net_config());
        let predictor = GoalPredictor::new(model, m.clone(), device);

        let out = predictor.predict(&frame(m.feature_columns.clone())).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 2);
        assert!(out[0].iter().all(|v| v.is_finite()));
    }
}

//! Training loop for the goal regression net
//!
//! Full-batch Adam on MSE over standardized features and targets. The
//! dataset is a few hundred matches at most, so there is no mini-batching
//! and the whole design/validation split lives in memory.

use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::features::pipeline::TrainingData;
use crate::model::goal_net::{GoalNet, GoalNetConfig};
use crate::model::ModelManifest;
use crate::training::metrics::{Metrics, TrainingHistory};
use crate::{Result, TrainingConfig, XgoalsError};

/// Column-wise z-score statistics fitted on the training split only
#[derive(Debug, Clone)]
pub struct Standardization {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Standardization {
    /// Fit over rows of width `dim`. A constant column gets std 1 so it
    /// standardizes to 0 instead of exploding.
    pub fn fit(rows: &[&Vec<f64>], dim: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut sum = vec![0.0; dim];
        let mut sum_sq = vec![0.0; dim];
        for row in rows {
            for j in 0..dim {
                sum[j] += row[j];
                sum_sq[j] += row[j] * row[j];
            }
        }
        let mean: Vec<f64> = sum.iter().map(|s| s / n).collect();
        let std = sum_sq
            .iter()
            .zip(&mean)
            .map(|(sq, m)| {
                let var = (sq / n - m * m).max(0.0);
                let std = var.sqrt();
                if std > 1e-12 {
                    std
                } else {
                    1.0
                }
            })
            .collect();
        Standardization { mean, std }
    }

    pub fn apply(&self, row: &[f64]) -> Vec<f32> {
        row.iter()
            .enumerate()
            .map(|(j, v)| ((v - self.mean[j]) / self.std[j]) as f32)
            .collect()
    }
}

fn to_tensor<B: AutodiffBackend>(
    rows: &[&Vec<f64>],
    norm: &Standardization,
    dim: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let mut data = Vec::with_capacity(rows.len() * dim);
    for row in rows {
        data.extend(norm.apply(row));
    }
    Tensor::from_data(TensorData::new(data, [rows.len(), dim]), device)
}

fn per_target_mse<B: AutodiffBackend>(sq_err: Tensor<B, 2>) -> Result<Vec<f64>> {
    sq_err
        .mean_dim(0)
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| XgoalsError::Model(format!("{:?}", e)))
}

/// Train a goal net on an assembled training set.
///
/// Returns the best model by validation loss, the manifest that pins its
/// feature contract and normalization, and the per-epoch history.
pub fn train<B: AutodiffBackend>(
    device: &B::Device,
    config: &TrainingConfig,
    data: &TrainingData,
) -> Result<(GoalNet<B>, ModelManifest, TrainingHistory)>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    let n = data.features.rows.len();
    if n < 4 {
        return Err(XgoalsError::Model(format!(
            "not enough matches to train on ({} available)",
            n
        )));
    }
    if data.targets.columns.is_empty() {
        return Err(XgoalsError::Model(
            "training requires at least one target column".to_string(),
        ));
    }

    B::seed(config.seed);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let val_len = ((n as f64 * config.validation_split).round() as usize).clamp(1, n - 1);
    let (val_idx, train_idx) = indices.split_at(val_len);

    let feature_dim = data.features.columns.len();
    let target_dim = data.targets.columns.len();

    let train_x: Vec<&Vec<f64>> = train_idx.iter().map(|&i| &data.features.rows[i]).collect();
    let train_y: Vec<&Vec<f64>> = train_idx.iter().map(|&i| &data.targets.rows[i]).collect();
    let val_x: Vec<&Vec<f64>> = val_idx.iter().map(|&i| &data.features.rows[i]).collect();
    let val_y: Vec<&Vec<f64>> = val_idx.iter().map(|&i| &data.targets.rows[i]).collect();

    let feature_norm = Standardization::fit(&train_x, feature_dim);
    let target_norm = Standardization::fit(&train_y, target_dim);

    let x_train = to_tensor::<B>(&train_x, &feature_norm, feature_dim, device);
    let y_train = to_tensor::<B>(&train_y, &target_norm, target_dim, device);
    let x_val = to_tensor::<B>(&val_x, &feature_norm, feature_dim, device);
    let y_val = to_tensor::<B>(&val_y, &target_norm, target_dim, device);

    let net_config = GoalNetConfig {
        input_dim: feature_dim,
        output_dim: target_dim,
        hidden_dims: config.hidden_dims.clone(),
        dropout: config.dropout,
    };
    let mut model = GoalNet::<B>::new(device, &net_config);
    let mut optimizer = AdamConfig::new().init();

    let mut history = TrainingHistory::new();
    let mut best_model = model.clone();

    log::info!(
        "training on {} matches ({} validation) x {} features",
        train_idx.len(),
        val_len,
        feature_dim
    );

    for epoch in 0..config.epochs {
        let preds = model.forward(x_train.clone());
        let sq_err = (preds - y_train.clone()).powf_scalar(2.0);
        let loss = sq_err.clone().mean();
        let loss_val: f64 = loss.clone().into_scalar().elem();

        let mut train_metrics = Metrics::new(target_norm.std.clone());
        train_metrics.update(loss_val, &per_target_mse(sq_err)?, train_idx.len());

        let grads = loss.backward();
        let grads_params = GradientsParams::from_grads(grads, &model);
        model = optimizer.step(config.learning_rate, model, grads_params);

        let val_sq_err = (model.forward(x_val.clone()) - y_val.clone()).powf_scalar(2.0);
        let val_loss: f64 = val_sq_err.clone().mean().into_scalar().elem();
        let mut val_metrics = Metrics::new(target_norm.std.clone());
        val_metrics.update(val_loss, &per_target_mse(val_sq_err)?, val_len);

        history.record_epoch(epoch, &train_metrics, &val_metrics);
        if history.best_epoch == epoch {
            best_model = model.clone();
        }

        if epoch % 10 == 0 || epoch == config.epochs - 1 {
            log::info!(
                "Epoch {}/{}: Train: {} | Val: {}",
                epoch + 1,
                config.epochs,
                train_metrics,
                val_metrics
            );
        }

        if history.should_early_stop(config.early_stopping_patience) {
            log::info!(
                "Early stopping at epoch {} (best was epoch {})",
                epoch + 1,
                history.best_epoch + 1
            );
            break;
        }
    }

    let manifest = ModelManifest {
        feature_columns: data.features.columns.clone(),
        target_columns: data.targets.columns.clone(),
        hidden_dims: config.hidden_dims.clone(),
        dropout: config.dropout,
        feature_mean: feature_norm.mean,
        feature_std: feature_norm.std,
        target_mean: target_norm.mean,
        target_std: target_norm.std,
    };

    Ok((best_model, manifest, history))
}

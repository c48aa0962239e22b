//! Training metrics and evaluation

use std::fmt;

/// Metrics accumulated over an epoch. Squared errors are tracked per
/// target in standardized space and scaled back to goal units on read.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Summed batch losses
    pub loss_sum: f64,
    /// Number of batches accumulated
    pub batch_count: usize,
    /// Per-target squared error sums (standardized space)
    sq_err_sums: Vec<f64>,
    /// Rows accumulated
    rows: usize,
    /// Per-target std used to report RMSE in goal units
    target_std: Vec<f64>,
}

impl Metrics {
    pub fn new(target_std: Vec<f64>) -> Self {
        Metrics {
            loss_sum: 0.0,
            batch_count: 0,
            sq_err_sums: vec![0.0; target_std.len()],
            rows: 0,
            target_std,
        }
    }

    /// Update with one batch: its loss and per-target mean squared errors
    pub fn update(&mut self, loss: f64, mean_sq_errs: &[f64], batch_size: usize) {
        self.loss_sum += loss;
        self.batch_count += 1;
        self.rows += batch_size;
        for (sum, mse) in self.sq_err_sums.iter_mut().zip(mean_sq_errs) {
            *sum += mse * batch_size as f64;
        }
    }

    pub fn avg_loss(&self) -> f64 {
        if self.batch_count == 0 {
            0.0
        } else {
            self.loss_sum / self.batch_count as f64
        }
    }

    /// RMSE for one target, in goal units
    pub fn rmse(&self, target: usize) -> f64 {
        if self.rows == 0 {
            return 0.0;
        }
        (self.sq_err_sums[target] / self.rows as f64).sqrt() * self.target_std[target]
    }

    /// Mean RMSE across targets, in goal units
    pub fn mean_rmse(&self) -> f64 {
        if self.target_std.is_empty() {
            return 0.0;
        }
        (0..self.target_std.len()).map(|t| self.rmse(t)).sum::<f64>()
            / self.target_std.len() as f64
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loss={:.4}, rmse={:.3} goals",
            self.avg_loss(),
            self.mean_rmse()
        )
    }
}

/// Coefficient of determination across all targets
pub fn r_squared(predictions: &[Vec<f64>], targets: &[Vec<f64>]) -> f64 {
    let n: usize = targets.iter().map(|row| row.len()).sum();
    if n == 0 {
        return 0.0;
    }

    let mean = targets.iter().flatten().sum::<f64>() / n as f64;
    let ss_tot: f64 = targets
        .iter()
        .flatten()
        .map(|t| (t - mean).powi(2))
        .sum();
    let ss_res: f64 = predictions
        .iter()
        .flatten()
        .zip(targets.iter().flatten())
        .map(|(p, t)| (p - t).powi(2))
        .sum();

    if ss_tot == 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

/// Per-epoch training history with best-epoch tracking
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    pub train_rmses: Vec<f64>,
    pub val_rmses: Vec<f64>,
    pub best_val_loss: f64,
    pub best_epoch: usize,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self {
            best_val_loss: f64::INFINITY,
            ..Default::default()
        }
    }

    /// Record metrics for an epoch
    pub fn record_epoch(&mut self, epoch: usize, train: &Metrics, val: &Metrics) {
        self.train_losses.push(train.avg_loss());
        self.val_losses.push(val.avg_loss());
        self.train_rmses.push(train.mean_rmse());
        self.val_rmses.push(val.mean_rmse());

        if val.avg_loss() < self.best_val_loss {
            self.best_val_loss = val.avg_loss();
            self.best_epoch = epoch;
        }
    }

    /// Check if we should early stop
    pub fn should_early_stop(&self, patience: usize) -> bool {
        if self.val_losses.len() < patience {
            return false;
        }
        let current_epoch = self.val_losses.len() - 1;
        current_epoch - self.best_epoch >= patience
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rmse_in_goal_units() {
        let mut metrics = Metrics::new(vec![2.0, 1.0]);
        // one full batch of 4 rows with per-target MSE 0.25 and 1.0
        metrics.update(0.625, &[0.25, 1.0], 4);
        assert_relative_eq!(metrics.rmse(0), 1.0); // sqrt(0.25) * 2.0
        assert_relative_eq!(metrics.rmse(1), 1.0);
        assert_relative_eq!(metrics.avg_loss(), 0.625);
    }

    #[test]
    fn test_r_squared_perfect_fit() {
        let targets = vec![vec![1.0, 2.0], vec![3.0, 0.0]];
        assert_relative_eq!(r_squared(&targets, &targets), 1.0);
    }

    #[test]
    fn test_r_squared_mean_baseline_is_zero() {
        let targets = vec![vec![1.0], vec![3.0]];
        let mean_preds = vec![vec![2.0], vec![2.0]];
        assert_relative_eq!(r_squared(&mean_preds, &targets), 0.0);
    }

    #[test]
    fn test_early_stopping() {
        let mut history = TrainingHistory::new();
        let std = vec![1.0];
        for epoch in 0..5 {
            let mut train = Metrics::new(std.clone());
            let mut val = Metrics::new(std.clone());
            train.update(0.5, &[0.5], 10);
            // val loss improves at epoch 0 then plateaus
            let val_loss = if epoch == 0 { 1.0 } else { 1.5 };
            val.update(val_loss, &[val_loss], 10);
            history.record_epoch(epoch, &train, &val);
        }
        assert_eq!(history.best_epoch, 0);
        assert!(history.should_early_stop(3));
        assert!(!history.should_early_stop(10));
    }
}

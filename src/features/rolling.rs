//! Rolling feature transformer
//!
//! Enriches each player-match row with, per statistic, the trailing mean
//! over that player's prior matches. The value attached to match k is
//! computed from the window of at most `window_size` matches strictly
//! before k: the current match's own raw value never contributes to its
//! own rolling feature.

use crate::{Age, PlayerMatchRecord, Position, StatSchema};
use std::collections::BTreeMap;

/// A player-match row with its shifted rolling averages. Raw values are
/// zero-filled at this point; rolling gaps (no prior history) are 0.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingRecord {
    pub player: String,
    pub match_id: String,
    pub team: String,
    pub pos: Position,
    pub age: Age,
    pub raw: Vec<f64>,
    pub rolling: Vec<f64>,
}

/// Compute shifted rolling averages for every numeric statistic.
///
/// Records are partitioned by player and ordered by (age, match_id)
/// ascending within each partition. Missing raw values do not contribute
/// to the mean; a window with no usable values yields 0.
pub fn add_rolling_features(
    schema: &StatSchema,
    records: &[PlayerMatchRecord],
    window_size: usize,
) -> Vec<RollingRecord> {
    let window_size = window_size.max(1);

    // BTreeMap keeps player iteration deterministic
    let mut by_player: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        by_player.entry(&record.player).or_default().push(i);
    }

    let mut out = Vec::with_capacity(records.len());
    for indices in by_player.values_mut() {
        indices.sort_by(|&a, &b| {
            let ra = &records[a];
            let rb = &records[b];
            (ra.age, &ra.match_id).cmp(&(rb.age, &rb.match_id))
        });

        for (k, &idx) in indices.iter().enumerate() {
            let record = &records[idx];
            let window_start = k.saturating_sub(window_size);

            let rolling = (0..schema.len())
                .map(|stat| {
                    let mut sum = 0.0;
                    let mut count = 0usize;
                    for &prior in &indices[window_start..k] {
                        if let Some(v) = records[prior].values[stat] {
                            sum += v;
                            count += 1;
                        }
                    }
                    if count == 0 {
                        0.0
                    } else {
                        sum / count as f64
                    }
                })
                .collect();

            out.push(RollingRecord {
                player: record.player.clone(),
                match_id: record.match_id.clone(),
                team: record.team.clone(),
                pos: record.pos,
                age: record.age,
                raw: record.values.iter().map(|v| v.unwrap_or(0.0)).collect(),
                rolling,
            });
        }
    }
    out
}

//! Feature assembler
//!
//! Produces the final ordered feature matrix the model consumes. This is
//! where leakage-prone columns are excluded, where Team A minus Team B
//! difference features are derived, and, as the single place in the whole
//! pipeline, where missing cells become 0.

use crate::features::pivot::MatchFeatureRow;
use crate::{Position, Result, StatSchema, XgoalsError};

pub const TARGET_TEAM_A_GOALS: &str = "TeamA_Goals_Scored";
pub const TARGET_TEAM_B_GOALS: &str = "TeamB_Goals_Scored";
pub const TARGET_TOTAL_GOALS: &str = "Total_Match_Goals";
pub const TARGET_RESULT: &str = "Result";

/// The shirt-number column is mislabeled as a statistic upstream; its
/// forward-position rolling average is a known junk feature and is dropped
/// from the contract.
const MISLABELED_STAT: &str = "player_number";

/// Ordered numeric feature matrix. Column set and order are a function of
/// (stat schema, position list) only, so training and inference always
/// agree. `match_id` rides alongside and is never a feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    pub columns: Vec<String>,
    pub match_ids: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// Target matrix for training (empty column list at inference)
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// The one documented numeric coercion: trims, strips group separators,
/// and treats anything unparseable (sentinels, placeholders, empties) as
/// missing rather than failing.
pub fn coerce_numeric(s: &str) -> Option<f64> {
    let cleaned = s.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Eligible (position slot, stat index) pairs in contract order
fn feature_pairs(schema: &StatSchema, positions: &[Position]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(positions.len() * schema.len());
    for (pi, pos) in positions.iter().enumerate() {
        for (si, stat) in schema.names().iter().enumerate() {
            if *pos == Position::Forward && stat == MISLABELED_STAT {
                continue;
            }
            pairs.push((pi, si));
        }
    }
    pairs
}

/// The exact feature column names for a given schema and position list:
/// the feature contract, shared by training and inference.
pub fn feature_columns(schema: &StatSchema, positions: &[Position]) -> Vec<String> {
    let pairs = feature_pairs(schema, positions);
    let mut columns = Vec::with_capacity(pairs.len() * 3);
    for side in ["TeamA", "TeamB"] {
        for &(pi, si) in &pairs {
            columns.push(format!(
                "{}_{}_rolling_avg_{}",
                side,
                positions[pi].as_str(),
                schema.names()[si]
            ));
        }
    }
    for &(pi, si) in &pairs {
        columns.push(format!(
            "Diff_{}_rolling_avg_{}",
            positions[pi].as_str(),
            schema.names()[si]
        ));
    }
    columns
}

/// Assemble pivoted rows into (features, targets).
///
/// Differences are derived while cells are still optional, so a missing
/// operand propagates to a missing diff; the final fill then turns every
/// remaining gap into 0. A requested target that a row cannot supply
/// (unplayed match) is a hard error; targets are never fabricated.
pub fn assemble_features(
    schema: &StatSchema,
    positions: &[Position],
    match_rows: &[MatchFeatureRow],
    target_cols: &[String],
) -> Result<(FeatureFrame, TargetFrame)> {
    if positions.is_empty() {
        return Err(XgoalsError::EmptyPositions);
    }
    for name in target_cols {
        if !matches!(
            name.as_str(),
            TARGET_TEAM_A_GOALS | TARGET_TEAM_B_GOALS | TARGET_TOTAL_GOALS | TARGET_RESULT
        ) {
            return Err(XgoalsError::Config(format!(
                "unknown target column {:?}",
                name
            )));
        }
    }

    let pairs = feature_pairs(schema, positions);
    let columns = feature_columns(schema, positions);

    let mut rows = Vec::with_capacity(match_rows.len());
    let mut match_ids = Vec::with_capacity(match_rows.len());
    let mut target_rows = Vec::with_capacity(match_rows.len());

    for row in match_rows {
        if row.team_a.position_means.len() != positions.len()
            || row.team_b.position_means.len() != positions.len()
        {
            return Err(XgoalsError::FeatureContract(format!(
                "match {} was aggregated with a different position list",
                row.match_id
            )));
        }

        let cell = |record: &crate::features::aggregate::TeamMatchRecord,
                    pi: usize,
                    si: usize|
         -> Option<f64> { record.position_means[pi].as_ref().map(|means| means[si]) };

        let mut cells: Vec<Option<f64>> = Vec::with_capacity(columns.len());
        for &(pi, si) in &pairs {
            cells.push(cell(&row.team_a, pi, si));
        }
        for &(pi, si) in &pairs {
            cells.push(cell(&row.team_b, pi, si));
        }
        for (i, _) in pairs.iter().enumerate() {
            let a = cells[i];
            let b = cells[pairs.len() + i];
            cells.push(match (a, b) {
                (Some(a), Some(b)) => Some(a - b),
                _ => None,
            });
        }

        rows.push(cells.into_iter().map(|c| c.unwrap_or(0.0)).collect());
        match_ids.push(row.match_id.clone());

        let mut targets = Vec::with_capacity(target_cols.len());
        for name in target_cols {
            let value = match name.as_str() {
                TARGET_TEAM_A_GOALS => row.goals().map(|(a, _)| a),
                TARGET_TEAM_B_GOALS => row.goals().map(|(_, b)| b),
                TARGET_TOTAL_GOALS => row.total_goals(),
                TARGET_RESULT => row.result(),
                _ => unreachable!("target names validated above"),
            };
            targets.push(value.ok_or_else(|| {
                XgoalsError::Parse(format!(
                    "target {:?} unavailable for match {}",
                    name, row.match_id
                ))
            })?);
        }
        target_rows.push(targets);
    }

    Ok((
        FeatureFrame {
            columns,
            match_ids,
            rows,
        },
        TargetFrame {
            columns: target_cols.to_vec(),
            rows: target_rows,
        },
    ))
}

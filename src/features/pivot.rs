//! Match-level pivoter
//!
//! Folds the two team records of a match into a single Team A vs Team B
//! row. Role assignment is by ascending team-name sort, so the same two
//! teams always land on the same sides, at training time and at inference
//! time alike.

use crate::features::aggregate::TeamMatchRecord;
use std::collections::BTreeMap;

/// Result (classification) encoding: 0 = Team A win, 1 = draw,
/// 2 = Team B win. Ties sit between the two win classes; the exact
/// mapping is load-bearing and must not change.
pub const RESULT_TEAM_A_WIN: f64 = 0.0;
pub const RESULT_DRAW: f64 = 1.0;
pub const RESULT_TEAM_B_WIN: f64 = 2.0;

/// One match, pivoted: the Team A and Team B aggregates side by side.
#[derive(Debug, Clone)]
pub struct MatchFeatureRow {
    pub match_id: String,
    pub team_a: TeamMatchRecord,
    pub team_b: TeamMatchRecord,
}

impl MatchFeatureRow {
    /// Both goal totals, when the match has actually been played
    pub fn goals(&self) -> Option<(f64, f64)> {
        match (self.team_a.goals_scored, self.team_b.goals_scored) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    pub fn total_goals(&self) -> Option<f64> {
        self.goals().map(|(a, b)| a + b)
    }

    /// 0 / 1 / 2 result label (Team A win / draw / Team B win)
    pub fn result(&self) -> Option<f64> {
        self.goals().map(|(a, b)| {
            if a > b {
                RESULT_TEAM_A_WIN
            } else if a == b {
                RESULT_DRAW
            } else {
                RESULT_TEAM_B_WIN
            }
        })
    }
}

/// Pivot output plus a data-quality counter for matches that could not be
/// pivoted (fewer than two team rows).
#[derive(Debug, Clone)]
pub struct PivotOutcome {
    pub rows: Vec<MatchFeatureRow>,
    pub skipped_matches: usize,
}

/// Group team records by match and pivot each complete pair. Matches with
/// a single team row are excluded silently but counted; matches with more
/// than two rows use the first two in team-name order.
pub fn pivot_to_match_level(records: Vec<TeamMatchRecord>) -> PivotOutcome {
    let mut by_match: BTreeMap<String, Vec<TeamMatchRecord>> = BTreeMap::new();
    for record in records {
        by_match.entry(record.match_id.clone()).or_default().push(record);
    }

    let mut rows = Vec::with_capacity(by_match.len());
    let mut skipped_matches = 0;
    for (match_id, mut group) in by_match {
        if group.len() < 2 {
            log::debug!("match {} has {} team row(s), skipping", match_id, group.len());
            skipped_matches += 1;
            continue;
        }
        group.sort_by(|a, b| a.team.cmp(&b.team));
        let mut iter = group.into_iter();
        let team_a = iter.next().expect("group has at least two records");
        let team_b = iter.next().expect("group has at least two records");
        rows.push(MatchFeatureRow {
            match_id,
            team_a,
            team_b,
        });
    }

    PivotOutcome {
        rows,
        skipped_matches,
    }
}

//! Pipeline orchestration
//!
//! Runs the full stage chain (rolling -> aggregate -> pivot -> assemble)
//! in two modes: over the whole store to build a training set, and over
//! history plus one synthetic fixture to build a single inference row.
//! Both modes share the same stage functions, so a feature column means
//! the same thing at training time and at prediction time.

use crate::features::aggregate::{aggregate_by_position, merge_goal_totals, team_goal_totals};
use crate::features::assemble::{assemble_features, FeatureFrame, TargetFrame};
use crate::features::pivot::pivot_to_match_level;
use crate::features::rolling::add_rolling_features;
use crate::{Age, PlayerMatchRecord, PlayerMatchSet, Position, Result, XgoalsError};

/// Reserved match id for the synthetic unplayed fixture. No scraped match
/// may use it.
pub const FUTURE_MATCH_ID: &str = "FUTURE_MATCH";

/// Placeholder team names for the fixture row. Chosen to sort A before B
/// so the pivoter's alphabetical role assignment matches the request.
pub const FIXTURE_TEAM_A: &str = "TeamA";
pub const FIXTURE_TEAM_B: &str = "TeamB";

/// Output of a training-set build
#[derive(Debug, Clone)]
pub struct TrainingData {
    pub features: FeatureFrame,
    pub targets: TargetFrame,
    /// Matches dropped for having fewer than two team rows
    pub skipped_matches: usize,
}

/// Run the full pipeline over every stored record and extract the
/// requested target columns.
pub fn build_training_data(
    set: &PlayerMatchSet,
    window_size: usize,
    positions: &[Position],
    goals_stat: &str,
    target_cols: &[String],
) -> Result<TrainingData> {
    let rolling = add_rolling_features(&set.schema, &set.records, window_size);
    let mut aggregates = aggregate_by_position(&set.schema, &rolling, positions)?;
    let totals = team_goal_totals(&set.schema, &set.records, goals_stat)?;
    merge_goal_totals(&mut aggregates, &totals);

    let outcome = pivot_to_match_level(aggregates);
    if outcome.skipped_matches > 0 {
        log::warn!(
            "{} match(es) had only one team row and were dropped",
            outcome.skipped_matches
        );
    }

    let (features, targets) =
        assemble_features(&set.schema, positions, &outcome.rows, target_cols)?;
    log::info!(
        "built training set: {} matches x {} features",
        features.rows.len(),
        features.columns.len()
    );

    Ok(TrainingData {
        features,
        targets,
        skipped_matches: outcome.skipped_matches,
    })
}

/// Build the single feature row for an unplayed fixture between two
/// rosters.
///
/// One synthetic record per requested player is appended to the raw
/// history: reserved match id, placeholder team name, the player's most
/// recent position (default FW for a player the store has never seen),
/// a far-future age so it sorts last, and all raw values missing. Rolling
/// averages are then recomputed from raw history, so the fixture row's
/// features are each player's trailing form entering the fixture.
pub fn build_fixture_row(
    set: &PlayerMatchSet,
    team_a_roster: &[String],
    team_b_roster: &[String],
    window_size: usize,
    positions: &[Position],
) -> Result<FeatureFrame> {
    if team_a_roster.is_empty() || team_b_roster.is_empty() {
        return Err(XgoalsError::Config(
            "both rosters must name at least one player".to_string(),
        ));
    }
    if set.is_empty() {
        return Err(XgoalsError::NoHistory);
    }

    let mut records = set.records.clone();
    for player in team_a_roster {
        records.push(synthetic_record(set, player, FIXTURE_TEAM_A));
    }
    // A player named on both sides plays for Team A
    for player in team_b_roster {
        if !team_a_roster.contains(player) {
            records.push(synthetic_record(set, player, FIXTURE_TEAM_B));
        }
    }

    let rolling = add_rolling_features(&set.schema, &records, window_size);
    let fixture_rolling: Vec<_> = rolling
        .into_iter()
        .filter(|r| r.match_id == FUTURE_MATCH_ID)
        .collect();

    let aggregates = aggregate_by_position(&set.schema, &fixture_rolling, positions)?;
    let outcome = pivot_to_match_level(aggregates);
    let (features, _) = assemble_features(&set.schema, positions, &outcome.rows, &[])?;

    match features.rows.len() {
        1 => Ok(features),
        0 => Err(XgoalsError::NoHistory),
        n => Err(XgoalsError::FeatureContract(format!(
            "fixture build produced {} rows instead of one",
            n
        ))),
    }
}

/// Synthetic player-match row for the fixture. Position comes from the
/// player's most recent stored record.
fn synthetic_record(set: &PlayerMatchSet, player: &str, team: &str) -> PlayerMatchRecord {
    let pos = set
        .records
        .iter()
        .filter(|r| r.player == player)
        .max_by(|a, b| (a.age, &a.match_id).cmp(&(b.age, &b.match_id)))
        .map(|r| r.pos)
        .unwrap_or_default();

    PlayerMatchRecord {
        player: player.to_string(),
        match_id: FUTURE_MATCH_ID.to_string(),
        team: team.to_string(),
        pos,
        age: Age::future(),
        values: vec![None; set.schema.len()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::assemble::{TARGET_TEAM_A_GOALS, TARGET_TEAM_B_GOALS};
    use crate::StatSchema;
    use approx::assert_relative_eq;

    fn schema() -> StatSchema {
        StatSchema::new(vec!["gls".into(), "sh".into()]).unwrap()
    }

    fn positions() -> Vec<Position> {
        vec![Position::Forward, Position::Midfielder]
    }

    fn record(
        player: &str,
        match_id: &str,
        team: &str,
        pos: Position,
        days: u16,
        gls: f64,
        sh: f64,
    ) -> PlayerMatchRecord {
        PlayerMatchRecord {
            player: player.into(),
            match_id: match_id.into(),
            team: team.into(),
            pos,
            age: Age::new(25, days),
            values: vec![Some(gls), Some(sh)],
        }
    }

    /// Two Arsenal vs Brighton matches with two players per team
    fn sample_set() -> PlayerMatchSet {
        PlayerMatchSet::new(
            schema(),
            vec![
                record("Saka", "m1", "Arsenal", Position::Forward, 10, 2.0, 4.0),
                record("Rice", "m1", "Arsenal", Position::Midfielder, 10, 0.0, 2.0),
                record("Mitoma", "m1", "Brighton", Position::Forward, 10, 1.0, 3.0),
                record("Gross", "m1", "Brighton", Position::Midfielder, 10, 0.0, 1.0),
                record("Saka", "m2", "Arsenal", Position::Forward, 17, 1.0, 2.0),
                record("Rice", "m2", "Arsenal", Position::Midfielder, 17, 1.0, 1.0),
                record("Mitoma", "m2", "Brighton", Position::Forward, 17, 0.0, 2.0),
                record("Gross", "m2", "Brighton", Position::Midfielder, 17, 0.0, 0.0),
            ],
        )
    }

    fn targets() -> Vec<String> {
        vec![
            TARGET_TEAM_A_GOALS.to_string(),
            TARGET_TEAM_B_GOALS.to_string(),
        ]
    }

    #[test]
    fn test_training_build_end_to_end() {
        let set = sample_set();
        let data = build_training_data(&set, 6, &positions(), "gls", &targets()).unwrap();

        assert_eq!(data.features.match_ids, vec!["m1", "m2"]);
        assert_eq!(data.skipped_matches, 0);
        // 2 positions x 2 stats, two sides plus diffs
        assert_eq!(data.features.columns.len(), 12);

        // m1 is every player's first match, so all rolling features are 0
        assert!(data.features.rows[0].iter().all(|&v| v == 0.0));
        // m2 rolling values are the m1 raws: Arsenal FW gls = Saka's 2.0
        let col = data
            .features
            .columns
            .iter()
            .position(|c| c == "TeamA_FW_rolling_avg_gls")
            .unwrap();
        assert_relative_eq!(data.features.rows[1][col], 2.0);

        // goal totals per team, roles alphabetical (Arsenal = Team A)
        assert_eq!(data.targets.rows[0], vec![2.0, 1.0]);
        assert_eq!(data.targets.rows[1], vec![2.0, 0.0]);
    }

    #[test]
    fn test_fixture_row_matches_training_contract() {
        let set = sample_set();
        let training = build_training_data(&set, 6, &positions(), "gls", &targets()).unwrap();
        let fixture = build_fixture_row(
            &set,
            &["Saka".to_string(), "Rice".to_string()],
            &["Mitoma".to_string(), "Gross".to_string()],
            6,
            &positions(),
        )
        .unwrap();

        assert_eq!(fixture.columns, training.features.columns);
        assert_eq!(fixture.match_ids, vec![FUTURE_MATCH_ID]);
        assert_eq!(fixture.rows.len(), 1);

        // Saka's trailing form entering the fixture: mean(2.0, 1.0)
        let col = fixture
            .columns
            .iter()
            .position(|c| c == "TeamA_FW_rolling_avg_gls")
            .unwrap();
        assert_relative_eq!(fixture.rows[0][col], 1.5);
        let col_b = fixture
            .columns
            .iter()
            .position(|c| c == "TeamB_FW_rolling_avg_gls")
            .unwrap();
        assert_relative_eq!(fixture.rows[0][col_b], 0.5);
    }

    #[test]
    fn test_fixture_averages_within_position_and_zeroes_absent_ones() {
        let positions = vec![Position::Forward, Position::Midfielder, Position::Defender];
        // Arsenal field two forwards and a midfielder, Brighton a forward
        // and two defenders. Two prior matches of history each.
        let set = PlayerMatchSet::new(
            schema(),
            vec![
                record("Saka", "m1", "Arsenal", Position::Forward, 10, 2.0, 4.0),
                record("Havertz", "m1", "Arsenal", Position::Forward, 10, 1.0, 2.0),
                record("Rice", "m1", "Arsenal", Position::Midfielder, 10, 0.0, 2.0),
                record("Mitoma", "m1", "Brighton", Position::Forward, 10, 1.0, 3.0),
                record("Dunk", "m1", "Brighton", Position::Defender, 10, 0.0, 1.0),
                record("Webster", "m1", "Brighton", Position::Defender, 10, 0.0, 0.0),
                record("Saka", "m2", "Arsenal", Position::Forward, 17, 1.0, 2.0),
                record("Havertz", "m2", "Arsenal", Position::Forward, 17, 0.0, 1.0),
                record("Rice", "m2", "Arsenal", Position::Midfielder, 17, 1.0, 1.0),
                record("Mitoma", "m2", "Brighton", Position::Forward, 17, 0.0, 2.0),
                record("Dunk", "m2", "Brighton", Position::Defender, 17, 0.0, 0.0),
                record("Webster", "m2", "Brighton", Position::Defender, 17, 1.0, 1.0),
            ],
        );

        let fixture = build_fixture_row(
            &set,
            &["Saka".to_string(), "Havertz".to_string(), "Rice".to_string()],
            &["Mitoma".to_string(), "Dunk".to_string(), "Webster".to_string()],
            6,
            &positions,
        )
        .unwrap();
        assert_eq!(fixture.rows.len(), 1);

        let value = |name: &str| {
            let col = fixture.columns.iter().position(|c| c == name).unwrap();
            fixture.rows[0][col]
        };

        // FW slot is the mean of both forwards' trailing averages:
        // Saka mean(2, 1) = 1.5, Havertz mean(1, 0) = 0.5
        assert_relative_eq!(value("TeamA_FW_rolling_avg_gls"), 1.0);
        assert_relative_eq!(value("TeamA_FW_rolling_avg_sh"), 2.25);
        // Dunk mean(0, 0) = 0, Webster mean(0, 1) = 0.5
        assert_relative_eq!(value("TeamB_DF_rolling_avg_gls"), 0.25);

        // Positions neither roster fills come out as exactly 0
        assert_relative_eq!(value("TeamA_DF_rolling_avg_gls"), 0.0);
        assert_relative_eq!(value("TeamA_DF_rolling_avg_sh"), 0.0);
        assert_relative_eq!(value("TeamB_MF_rolling_avg_gls"), 0.0);
        assert_relative_eq!(value("TeamB_MF_rolling_avg_sh"), 0.0);

        // A diff with a missing operand stays missing, so it fills to 0
        // rather than 0.0 - 0.25
        assert_relative_eq!(value("Diff_DF_rolling_avg_gls"), 0.0);
        assert_relative_eq!(value("Diff_MF_rolling_avg_gls"), 0.0);
    }

    #[test]
    fn test_fixture_roles_follow_request_sides() {
        let set = sample_set();
        let ab = build_fixture_row(
            &set,
            &["Saka".to_string()],
            &["Mitoma".to_string()],
            6,
            &positions(),
        )
        .unwrap();
        let ba = build_fixture_row(
            &set,
            &["Mitoma".to_string()],
            &["Saka".to_string()],
            6,
            &positions(),
        )
        .unwrap();

        let col_a = ab
            .columns
            .iter()
            .position(|c| c == "TeamA_FW_rolling_avg_gls")
            .unwrap();
        let col_b = ab
            .columns
            .iter()
            .position(|c| c == "TeamB_FW_rolling_avg_gls")
            .unwrap();
        // Swapping the request sides swaps the feature sides
        assert_relative_eq!(ab.rows[0][col_a], ba.rows[0][col_b]);
        assert_relative_eq!(ab.rows[0][col_b], ba.rows[0][col_a]);
    }

    #[test]
    fn test_player_on_both_rosters_counts_for_team_a_only() {
        let set = sample_set();
        let fixture = build_fixture_row(
            &set,
            &["Saka".to_string()],
            &["Saka".to_string(), "Mitoma".to_string()],
            6,
            &positions(),
        )
        .unwrap();

        let value = |name: &str| {
            let col = fixture.columns.iter().position(|c| c == name).unwrap();
            fixture.rows[0][col]
        };
        // Saka's trailing mean(2, 1) lands on Team A; Team B's forward
        // slot is Mitoma alone, mean(1, 0)
        assert_relative_eq!(value("TeamA_FW_rolling_avg_gls"), 1.5);
        assert_relative_eq!(value("TeamB_FW_rolling_avg_gls"), 0.5);
    }

    #[test]
    fn test_unknown_player_defaults_to_forward() {
        let set = sample_set();
        let fixture = build_fixture_row(
            &set,
            &["Nwaneri".to_string()],
            &["Mitoma".to_string()],
            6,
            &positions(),
        )
        .unwrap();
        // The debutant contributes a forward slot with zero history
        let col = fixture
            .columns
            .iter()
            .position(|c| c == "TeamA_FW_rolling_avg_gls")
            .unwrap();
        assert_relative_eq!(fixture.rows[0][col], 0.0);
    }

    #[test]
    fn test_empty_history_is_no_history_error() {
        let set = PlayerMatchSet::new(schema(), vec![]);
        let result = build_fixture_row(
            &set,
            &["Saka".to_string()],
            &["Mitoma".to_string()],
            6,
            &positions(),
        );
        assert!(matches!(result, Err(XgoalsError::NoHistory)));
    }

    #[test]
    fn test_empty_roster_rejected() {
        let set = sample_set();
        let result = build_fixture_row(&set, &[], &["Mitoma".to_string()], 6, &positions());
        assert!(matches!(result, Err(XgoalsError::Config(_))));
    }

    #[test]
    fn test_fixture_rows_never_gain_labels() {
        let set = sample_set();
        let mut records = set.records.clone();
        records.push(synthetic_record(&set, "Saka", FIXTURE_TEAM_A));
        let totals = team_goal_totals(&set.schema, &records, "gls").unwrap();
        assert!(!totals.contains_key(&(FUTURE_MATCH_ID.to_string(), FIXTURE_TEAM_A.to_string())));
    }
}

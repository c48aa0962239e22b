//! Match aggregator
//!
//! Collapses rolling player rows into one record per (match, team): the
//! mean of each rolling statistic per eligible position group, plus the
//! team's raw goal total. A team fielding nobody in some position keeps an
//! explicitly missing slot for it; gaps are resolved once, in the
//! assembler, never here.

use crate::features::rolling::RollingRecord;
use crate::{PlayerMatchRecord, Position, Result, StatSchema, XgoalsError};
use std::collections::{BTreeMap, HashMap};

/// Per-(match, team) aggregate of rolling features by position group.
/// `position_means` is parallel to the eligible position list handed to
/// [`aggregate_by_position`]; `None` marks a position with no players.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamMatchRecord {
    pub match_id: String,
    pub team: String,
    pub position_means: Vec<Option<Vec<f64>>>,
    pub goals_scored: Option<f64>,
}

/// Group rolling rows by (match, team, position) and average each rolling
/// statistic within the group. Rows whose position is not eligible are
/// discarded; a (match, team) pair appears in the output as soon as any
/// eligible position produced an aggregate.
pub fn aggregate_by_position(
    schema: &StatSchema,
    records: &[RollingRecord],
    positions: &[Position],
) -> Result<Vec<TeamMatchRecord>> {
    if positions.is_empty() {
        return Err(XgoalsError::EmptyPositions);
    }

    struct Accum {
        sums: Vec<f64>,
        count: usize,
    }

    // (match_id, team) -> per-position accumulator; BTreeMap for
    // deterministic output order
    let mut groups: BTreeMap<(String, String), Vec<Option<Accum>>> = BTreeMap::new();

    for record in records {
        let Some(slot) = positions.iter().position(|p| *p == record.pos) else {
            continue;
        };
        let key = (record.match_id.clone(), record.team.clone());
        let accums = groups
            .entry(key)
            .or_insert_with(|| (0..positions.len()).map(|_| None).collect());
        let accum = accums[slot].get_or_insert_with(|| Accum {
            sums: vec![0.0; schema.len()],
            count: 0,
        });
        for (sum, v) in accum.sums.iter_mut().zip(&record.rolling) {
            *sum += v;
        }
        accum.count += 1;
    }

    Ok(groups
        .into_iter()
        .map(|((match_id, team), accums)| TeamMatchRecord {
            match_id,
            team,
            position_means: accums
                .into_iter()
                .map(|a| {
                    a.map(|a| a.sums.iter().map(|s| s / a.count as f64).collect())
                })
                .collect(),
            goals_scored: None,
        })
        .collect())
}

/// Per-(match, team) sum of the raw goals counter, computed from the raw
/// input rows. A group whose goal cells are all missing yields no entry:
/// an unplayed fixture must stay label-free rather than read as 0-0.
pub fn team_goal_totals(
    schema: &StatSchema,
    records: &[PlayerMatchRecord],
    goals_stat: &str,
) -> Result<HashMap<(String, String), f64>> {
    let goals_idx = schema.index_of(goals_stat).ok_or_else(|| {
        XgoalsError::Config(format!(
            "goals statistic {:?} is not in the stat schema",
            goals_stat
        ))
    })?;

    let mut totals: HashMap<(String, String), Option<f64>> = HashMap::new();
    for record in records {
        let entry = totals
            .entry((record.match_id.clone(), record.team.clone()))
            .or_insert(None);
        if let Some(goals) = record.values[goals_idx] {
            *entry = Some(entry.unwrap_or(0.0) + goals);
        }
    }

    Ok(totals
        .into_iter()
        .filter_map(|(key, total)| total.map(|t| (key, t)))
        .collect())
}

/// Attach goal totals onto the aggregates (left join: absent total stays
/// `None`).
pub fn merge_goal_totals(
    records: &mut [TeamMatchRecord],
    totals: &HashMap<(String, String), f64>,
) {
    for record in records {
        record.goals_scored = totals
            .get(&(record.match_id.clone(), record.team.clone()))
            .copied();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Age;
    use approx::assert_relative_eq;

    fn schema() -> StatSchema {
        StatSchema::new(vec!["gls".into(), "sh".into()]).unwrap()
    }

    fn rolling(
        player: &str,
        match_id: &str,
        team: &str,
        pos: Position,
        values: [f64; 2],
    ) -> RollingRecord {
        RollingRecord {
            player: player.into(),
            match_id: match_id.into(),
            team: team.into(),
            pos,
            age: Age::new(25, 0),
            raw: vec![0.0, 0.0],
            rolling: values.to_vec(),
        }
    }

    const POSITIONS: [Position; 3] = [
        Position::Forward,
        Position::Midfielder,
        Position::Defender,
    ];

    #[test]
    fn test_empty_positions_is_config_error() {
        let result = aggregate_by_position(&schema(), &[], &[]);
        assert!(matches!(result, Err(XgoalsError::EmptyPositions)));
    }

    #[test]
    fn test_position_group_means() {
        let records = vec![
            rolling("a", "m1", "Arsenal", Position::Forward, [2.0, 4.0]),
            rolling("b", "m1", "Arsenal", Position::Forward, [4.0, 8.0]),
            rolling("c", "m1", "Arsenal", Position::Midfielder, [1.0, 1.0]),
        ];
        let out = aggregate_by_position(&schema(), &records, &POSITIONS).unwrap();
        assert_eq!(out.len(), 1);
        let arsenal = &out[0];
        let fw = arsenal.position_means[0].as_ref().unwrap();
        assert_relative_eq!(fw[0], 3.0);
        assert_relative_eq!(fw[1], 6.0);
        let mf = arsenal.position_means[1].as_ref().unwrap();
        assert_relative_eq!(mf[0], 1.0);
        // No defenders fielded: slot stays missing, not zero
        assert!(arsenal.position_means[2].is_none());
    }

    #[test]
    fn test_ineligible_positions_discarded() {
        let records = vec![
            rolling("gk", "m1", "Arsenal", Position::Other, [9.0, 9.0]),
            rolling("fw", "m1", "Arsenal", Position::Forward, [1.0, 1.0]),
        ];
        let out = aggregate_by_position(&schema(), &records, &POSITIONS).unwrap();
        let fw = out[0].position_means[0].as_ref().unwrap();
        assert_relative_eq!(fw[0], 1.0);
    }

    #[test]
    fn test_team_with_only_ineligible_players_is_absent() {
        let records = vec![
            rolling("gk", "m1", "Brighton", Position::Other, [9.0, 9.0]),
            rolling("fw", "m1", "Arsenal", Position::Forward, [1.0, 1.0]),
        ];
        let out = aggregate_by_position(&schema(), &records, &POSITIONS).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].team, "Arsenal");
    }

    fn raw(player: &str, match_id: &str, team: &str, gls: Option<f64>) -> PlayerMatchRecord {
        PlayerMatchRecord {
            player: player.into(),
            match_id: match_id.into(),
            team: team.into(),
            pos: Position::Forward,
            age: Age::new(25, 0),
            values: vec![gls, Some(0.0)],
        }
    }

    #[test]
    fn test_goal_totals_sum_per_team() {
        let records = vec![
            raw("a", "m1", "Arsenal", Some(2.0)),
            raw("b", "m1", "Arsenal", Some(1.0)),
            raw("c", "m1", "Brighton", Some(0.0)),
        ];
        let totals = team_goal_totals(&schema(), &records, "gls").unwrap();
        assert_relative_eq!(totals[&("m1".to_string(), "Arsenal".to_string())], 3.0);
        assert_relative_eq!(totals[&("m1".to_string(), "Brighton".to_string())], 0.0);
    }

    #[test]
    fn test_goal_totals_absent_when_all_missing() {
        let records = vec![
            raw("a", "FUTURE_MATCH", "TeamA", None),
            raw("b", "FUTURE_MATCH", "TeamA", None),
        ];
        let totals = team_goal_totals(&schema(), &records, "gls").unwrap();
        assert!(totals.is_empty());
    }

    #[test]
    fn test_unknown_goals_stat_is_config_error() {
        assert!(team_goal_totals(&schema(), &[], "goals").is_err());
    }

    #[test]
    fn test_merge_goal_totals_left_join() {
        let mut records = vec![
            TeamMatchRecord {
                match_id: "m1".into(),
                team: "Arsenal".into(),
                position_means: vec![None],
                goals_scored: None,
            },
            TeamMatchRecord {
                match_id: "FUTURE_MATCH".into(),
                team: "TeamA".into(),
                position_means: vec![None],
                goals_scored: None,
            },
        ];
        let mut totals = HashMap::new();
        totals.insert(("m1".to_string(), "Arsenal".to_string()), 3.0);
        merge_goal_totals(&mut records, &totals);
        assert_eq!(records[0].goals_scored, Some(3.0));
        assert_eq!(records[1].goals_scored, None);
    }
}

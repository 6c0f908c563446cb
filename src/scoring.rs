//! Leaderboard points for a placed run.
//!
//! Pure and total: the same inputs always produce the same points, and every
//! combination of inputs produces a value.

use crate::model::{LeaderboardType, RunType};

const BASE_POINTS: f64 = 10.0;

fn rank_bonus(rank: u32) -> f64 {
    match rank {
        1 => 50.0,
        2 => 30.0,
        3 => 20.0,
        _ => 0.0,
    }
}

/// Points awarded for a run at `rank` (1-based).
///
/// Obsolete runs keep the base points and the multipliers but never earn the
/// podium bonus. Rounding happens once, after every multiplier, with halves
/// rounded away from zero.
pub fn score(
    rank: u32,
    run_type: RunType,
    leaderboard_type: LeaderboardType,
    obsolete: bool,
) -> i64 {
    let mut points = BASE_POINTS;
    if !obsolete {
        points += rank_bonus(rank);
    }
    if matches!(
        leaderboard_type,
        LeaderboardType::IndividualLevel | LeaderboardType::CommunityGolds
    ) {
        points *= 0.5;
    }
    if run_type == RunType::CoOp {
        points *= 0.5;
    }
    points.round() as i64
}

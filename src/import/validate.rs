//! Field rules a candidate must pass before it may be stored.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{LocalRun, RunType};

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,2}:[0-9]{2}:[0-9]{2}$").expect("valid time regex"));
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid date regex"));

fn blank(s: Option<&str>) -> bool {
    s.map_or(true, |v| v.trim().is_empty())
}

/// Every rule the candidate breaks, in a fixed order. Empty means valid.
///
/// Run type and leaderboard type are closed enums on `LocalRun`, so their
/// membership rules hold by construction.
pub fn validate_run(run: &LocalRun) -> Vec<String> {
    let mut problems = Vec::new();

    if run.player_name.trim().is_empty() {
        problems.push("player name is empty".to_string());
    }
    if run.run_type == RunType::CoOp && blank(run.player2_name.as_deref()) {
        problems.push("co-op run is missing the second player".to_string());
    }
    if !TIME_RE.is_match(run.time.trim()) {
        problems.push(if run.time.trim().is_empty() {
            "time is missing".to_string()
        } else {
            format!("time '{}' is not H:MM:SS or HH:MM:SS", run.time)
        });
    }
    if !DATE_RE.is_match(run.date.trim()) {
        problems.push(if run.date.trim().is_empty() {
            "date is missing".to_string()
        } else {
            format!("date '{}' is not YYYY-MM-DD", run.date)
        });
    }
    if run.category_id.trim().is_empty() {
        problems.push(match run.src_category_name.as_deref() {
            Some(name) if !name.trim().is_empty() => {
                format!("category '{name}' has no local match")
            }
            _ => "category is missing".to_string(),
        });
    }
    if run.platform_id.trim().is_empty() && blank(run.src_platform_name.as_deref()) {
        problems.push("platform is missing".to_string());
    }
    if run.leaderboard_type.requires_level()
        && blank(run.level_id.as_deref())
        && blank(run.src_level_name.as_deref())
    {
        problems.push(format!(
            "{} run has no level",
            run.leaderboard_type.as_str()
        ));
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LeaderboardType, UNKNOWN_PLAYER};

    fn valid() -> LocalRun {
        LocalRun {
            player_name: "amy".into(),
            category_id: "cat-any".into(),
            platform_id: "plat-pc".into(),
            time: "1:02:03".into(),
            date: "2024-03-01".into(),
            imported_from_src: true,
            ..Default::default()
        }
    }

    #[test]
    fn accepts_complete_record() {
        assert!(validate_run(&valid()).is_empty());
        let mut two_digit = valid();
        two_digit.time = "12:00:59".into();
        assert!(validate_run(&two_digit).is_empty());
    }

    #[test]
    fn reports_every_violation() {
        let mut r = valid();
        r.time.clear();
        r.date.clear();
        let problems = validate_run(&r);
        assert_eq!(problems, vec!["time is missing", "date is missing"]);
    }

    #[test]
    fn rejects_malformed_time_and_date() {
        let mut r = valid();
        r.time = "123:00:00".into();
        r.date = "01/03/2024".into();
        assert_eq!(validate_run(&r).len(), 2);
        r.time = "1:2:03".into();
        r.date = "2024-03-01".into();
        assert_eq!(validate_run(&r).len(), 1);
    }

    #[test]
    fn non_ascii_digits_are_rejected() {
        let mut r = valid();
        r.time = "١:٢٣:٤٥".into();
        r.date = "٢٠٢٤-٠٣-٠١".into();
        assert_eq!(validate_run(&r).len(), 2);
    }

    #[test]
    fn unmapped_category_names_the_foreign_label() {
        let mut r = valid();
        r.category_id.clear();
        r.src_category_name = Some("Glitchless".into());
        assert_eq!(
            validate_run(&r),
            vec!["category 'Glitchless' has no local match"]
        );
    }

    #[test]
    fn platform_fallback_name_is_enough() {
        let mut r = valid();
        r.platform_id.clear();
        assert_eq!(validate_run(&r), vec!["platform is missing"]);
        r.src_platform_name = Some("GameCube".into());
        assert!(validate_run(&r).is_empty());
    }

    #[test]
    fn level_boards_need_a_level() {
        let mut r = valid();
        r.leaderboard_type = LeaderboardType::CommunityGolds;
        assert_eq!(validate_run(&r), vec!["community-golds run has no level"]);
        r.src_level_name = Some("Droid Factory".into());
        assert!(validate_run(&r).is_empty());
    }

    #[test]
    fn coop_needs_second_player_but_accepts_placeholder() {
        let mut r = valid();
        r.run_type = RunType::CoOp;
        assert_eq!(
            validate_run(&r),
            vec!["co-op run is missing the second player"]
        );
        r.player2_name = Some(UNKNOWN_PLAYER.into());
        assert!(validate_run(&r).is_empty());
    }

    #[test]
    fn blank_player_is_rejected() {
        let mut r = valid();
        r.player_name = "   ".into();
        assert_eq!(validate_run(&r), vec!["player name is empty"]);
    }
}

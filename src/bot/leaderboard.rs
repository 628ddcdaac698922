use chrono::DateTime;
use poise::serenity_prelude::{CreateEmbed, UserId};

use crate::core::create_embed;
use crate::sql::Challenge;

/// One line of the final leaderboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankedEntry {
    pub user: UserId,
    pub rank: usize,
    pub score: i64,
    pub solved_at: i64,
}

/// Rank the solves of a challenge: earlier solves place higher, ties on
/// solve time are broken by score, highest first.
pub fn compute_leaderboard(challenge: &Challenge) -> Vec<RankedEntry> {
    let mut solves = challenge.leaderboard.clone();
    solves.sort_by(|a, b| a.solved_at.cmp(&b.solved_at).then(b.score.cmp(&a.score)));
    solves
        .into_iter()
        .enumerate()
        .map(|(i, s)| RankedEntry {
            user: s.user,
            rank: i + 1,
            score: s.score,
            solved_at: s.solved_at,
        })
        .collect()
}

/// Arithmetic mean of all ratings, or `None` if nobody rated the
/// challenge. Callers must render the two cases differently.
pub fn compute_average_rating(challenge: &Challenge) -> Option<f64> {
    if challenge.ratings.is_empty() {
        return None;
    }
    Some(challenge.ratings.iter().sum::<i64>() as f64 / challenge.ratings.len() as f64)
}

/// Render the final leaderboard as an embed.
pub fn leaderboard_embed(day: i64, entries: &[RankedEntry]) -> CreateEmbed {
    let mut lines = String::new();
    for entry in entries {
        let solved = DateTime::from_timestamp(entry.solved_at, 0)
            .map(|t| t.format(" (solved at %H:%M UTC)").to_string())
            .unwrap_or_default();
        lines.push_str(&format!(
            "{} <@{}>: {} points{}\n",
            medal(entry.rank),
            entry.user,
            entry.score,
            solved
        ));
    }
    create_embed()
        .title(format!("Day: {} Leaderboard", day))
        .description(lines)
}

fn medal(rank: usize) -> String {
    match rank {
        1 => "🥇".into(),
        2 => "🥈".into(),
        3 => "🥉".into(),
        r => format!("{}.", r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Solve;

    fn challenge(leaderboard: Vec<Solve>, ratings: Vec<i64>) -> Challenge {
        Challenge {
            day: 1,
            description: "d".into(),
            answer: "a".into(),
            attachment_url: None,
            hints: "h".into(),
            writeup: None,
            created_by: UserId::new(42),
            leaderboard,
            ratings,
        }
    }

    fn solve(user: u64, score: i64, solved_at: i64) -> Solve {
        Solve { user: UserId::new(user), score, solved_at }
    }

    #[test]
    fn earlier_solves_rank_first() {
        let ranked = compute_leaderboard(&challenge(
            vec![solve(2, 200, 50), solve(1, 100, 10)],
            vec![],
        ));
        assert_eq!(ranked[0].user, UserId::new(1));
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].user, UserId::new(2));
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn ties_on_time_are_broken_by_score() {
        let ranked = compute_leaderboard(&challenge(
            vec![solve(1, 100, 10), solve(2, 200, 10)],
            vec![],
        ));
        assert_eq!(ranked[0].user, UserId::new(2));
        assert_eq!(ranked[1].user, UserId::new(1));
    }

    #[test]
    fn no_solves_means_empty_leaderboard() {
        assert!(compute_leaderboard(&challenge(vec![], vec![])).is_empty());
    }

    #[test]
    fn average_rating_rounds_to_two_decimals() {
        let avg = compute_average_rating(&challenge(vec![], vec![3, 4, 5])).unwrap();
        assert_eq!(format!("{:.2}", avg), "4.00");
    }

    #[test]
    fn no_ratings_is_none_not_zero() {
        assert_eq!(compute_average_rating(&challenge(vec![], vec![])), None);
    }

    #[test]
    fn embed_uses_medals_for_the_top_three() {
        let ranked = compute_leaderboard(&challenge(
            vec![solve(1, 100, 10), solve(2, 90, 20), solve(3, 80, 30), solve(4, 70, 40)],
            vec![],
        ));
        let json = serde_json::to_string(&leaderboard_embed(7, &ranked)).unwrap();
        assert!(json.contains("Day: 7 Leaderboard"));
        assert!(json.contains("🥇 <@1>"));
        assert!(json.contains("🥉 <@3>"));
        assert!(json.contains("4. <@4>"));
    }
}

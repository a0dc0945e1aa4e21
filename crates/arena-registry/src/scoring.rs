//! Score arithmetic applied when a fight is won.

use arena_protocol::UserId;
use serde::{Deserialize, Serialize};

/// Scoring parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringConfig {
    /// Minimum number of points a winner gains.
    pub winner_minimum_points_bonus: i64,

    /// Percentage of the loser's score that the loser forfeits.
    pub winner_gets_percent: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            winner_minimum_points_bonus: 100,
            winner_gets_percent: 50,
        }
    }
}

impl ScoringConfig {
    /// `max(old + game_delta, old + bonus)`.
    pub fn winner_score(&self, old: i64, game_delta: i64) -> i64 {
        old.saturating_add(game_delta)
            .max(old.saturating_add(self.winner_minimum_points_bonus))
    }

    /// `max(0, old - round(old * percent / 100))`, rounding halves up.
    pub fn loser_score(&self, old: i64) -> i64 {
        let forfeit = (old.saturating_mul(self.winner_gets_percent) + 50).div_euclid(100);
        (old - forfeit).max(0)
    }
}

/// One user's score before and after a fight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreChange {
    pub user: UserId,
    pub before: i64,
    pub after: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winner_gets_at_least_the_bonus() {
        let scoring = ScoringConfig::default();
        assert_eq!(scoring.winner_score(0, 0), 100);
        assert_eq!(scoring.winner_score(40, 30), 140);
        assert_eq!(scoring.winner_score(40, 250), 290);
    }

    #[test]
    fn test_loser_forfeits_rounded_percentage() {
        let scoring = ScoringConfig::default();
        assert_eq!(scoring.loser_score(0), 0);
        assert_eq!(scoring.loser_score(100), 50);
        // 50% of 75 is 37.5, which rounds to 38.
        assert_eq!(scoring.loser_score(75), 37);
        assert_eq!(scoring.loser_score(1), 0);
    }

    #[test]
    fn test_loser_never_goes_negative() {
        let scoring = ScoringConfig {
            winner_gets_percent: 150,
            ..Default::default()
        };
        assert_eq!(scoring.loser_score(10), 0);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ScoringConfig =
            serde_json::from_str(r#"{"winnerGetsPercent": 25}"#).unwrap();
        assert_eq!(config.winner_gets_percent, 25);
        assert_eq!(config.winner_minimum_points_bonus, 100);
    }
}

//! Round-robin owner selection for team event types.

use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// How a caller settles a tie between equally-booked members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// First member in host order.
    #[serde(rename = "first")]
    FirstSeen,
    /// Uniform choice among the tied members.
    Random,
}

impl FromStr for TieBreak {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "first" | "first_seen" => Ok(TieBreak::FirstSeen),
            "random" => Ok(TieBreak::Random),
            other => Err(AppError::InvalidInput(format!("Unknown tie-break: {}", other))),
        }
    }
}

/// Members whose accepted-booking count equals the minimum, in input order.
///
/// Fails with `InvalidInput` for an empty candidate list. Pure and deterministic.
pub fn lucky_users<T: Clone>(candidates: &[(T, i64)]) -> AppResult<Vec<T>> {
    let min = candidates
        .iter()
        .map(|(_, count)| *count)
        .min()
        .ok_or_else(|| AppError::InvalidInput("No eligible users for assignment".to_string()))?;

    Ok(candidates
        .iter()
        .filter(|(_, count)| *count == min)
        .map(|(user, _)| user.clone())
        .collect())
}

/// Apply the configured tie-break to a non-empty `lucky_users` result.
pub fn pick_lucky_user<T: Clone>(candidates: &[(T, i64)], tie_break: TieBreak) -> AppResult<T> {
    let lucky = lucky_users(candidates)?;
    let chosen = match tie_break {
        TieBreak::FirstSeen => lucky.first(),
        TieBreak::Random => lucky.choose(&mut rand::thread_rng()),
    };
    chosen
        .cloned()
        .ok_or_else(|| AppError::InvalidInput("No eligible users for assignment".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_every_member_with_the_minimum() {
        let input = vec![("A", 2), ("B", 0), ("C", 0)];
        assert_eq!(lucky_users(&input).unwrap(), vec!["B", "C"]);
    }

    #[test]
    fn single_member_is_always_lucky() {
        assert_eq!(lucky_users(&[("A", 1)]).unwrap(), vec!["A"]);
    }

    #[test]
    fn empty_input_is_invalid() {
        let input: Vec<(&str, i64)> = Vec::new();
        assert!(matches!(
            lucky_users(&input),
            Err(AppError::InvalidInput(_))
        ));
        assert!(pick_lucky_user(&input, TieBreak::Random).is_err());
    }

    #[test]
    fn repeated_calls_agree() {
        let input = vec![("A", 3), ("B", 1), ("C", 1), ("D", 5)];
        let first = lucky_users(&input).unwrap();
        for _ in 0..10 {
            assert_eq!(lucky_users(&input).unwrap(), first);
        }
    }

    #[test]
    fn tie_break_modes() {
        let input = vec![("A", 2), ("B", 0), ("C", 0)];
        assert_eq!(pick_lucky_user(&input, TieBreak::FirstSeen).unwrap(), "B");
        for _ in 0..20 {
            let picked = pick_lucky_user(&input, TieBreak::Random).unwrap();
            assert!(picked == "B" || picked == "C");
        }
    }

    #[test]
    fn parses_tie_break() {
        assert_eq!("first".parse::<TieBreak>().unwrap(), TieBreak::FirstSeen);
        assert_eq!(" Random ".parse::<TieBreak>().unwrap(), TieBreak::Random);
        assert!(matches!("fair".parse::<TieBreak>(), Err(AppError::InvalidInput(_))));
    }
}

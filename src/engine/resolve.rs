//! Fact validation: tie model picks back to real matches and real odds.

use crate::types::{round2, MatchWithOdds, Odds};

/// Model odds within this distance of a real quote count as that quote
pub const ODDS_TOLERANCE: f64 = 0.1;

/// Band the single-pick odds are asked for, and kept in when unresolved
pub const SINGLE_ODDS_MIN: f64 = 1.30;
pub const SINGLE_ODDS_MAX: f64 = 1.60;
pub const SINGLE_ODDS_DEFAULT: f64 = 1.45;

/// Maps the model's free-text match description onto a cached match
pub trait MatchResolver: Send + Sync {
    fn resolve<'a>(&self, text: &str, matches: &'a [MatchWithOdds]) -> Option<&'a MatchWithOdds>;
}

/// First match whose home or away team name appears in the text, ignoring case.
///
/// Ambiguous when one team name contains another ("Real" vs "Real Madrid");
/// the earlier match in the list wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringResolver;

impl MatchResolver for SubstringResolver {
    fn resolve<'a>(&self, text: &str, matches: &'a [MatchWithOdds]) -> Option<&'a MatchWithOdds> {
        let text = text.to_lowercase();
        matches.iter().find(|m| {
            [&m.home_team, &m.away_team].iter().any(|team| {
                let team = team.trim().to_lowercase();
                !team.is_empty() && text.contains(&team)
            })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn quote(&self, odds: &Odds) -> f64 {
        match self {
            Outcome::Home => odds.home,
            Outcome::Draw => odds.draw,
            Outcome::Away => odds.away,
        }
    }
}

const HOME_KEYWORDS: &[&str] = &["победа хозяев", "хозяева", "п1", "home win"];
const AWAY_KEYWORDS: &[&str] = &["победа гостей", "гости", "п2", "away win"];
const DRAW_KEYWORDS: &[&str] = &["ничья", "ничью", "draw"];
/// Matched as a whole token only; Latin and Cyrillic
const DRAW_MARKERS: &[&str] = &["x", "х"];

/// Which of the three direct markets a prediction names, if any
pub fn classify_outcome(prediction: &str) -> Option<Outcome> {
    let text = prediction.to_lowercase();
    let has = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    if has(HOME_KEYWORDS) {
        return Some(Outcome::Home);
    }
    if has(AWAY_KEYWORDS) {
        return Some(Outcome::Away);
    }
    let standalone_marker = text
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| DRAW_MARKERS.contains(&token));
    if has(DRAW_KEYWORDS) || standalone_marker {
        return Some(Outcome::Draw);
    }
    None
}

/// Replacement used when a non-direct-market pick quotes no real odd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketFallback {
    /// Lowest real odd, the most likely outcome
    Min,
    /// Mean of the three real odds
    Mean,
}

/// Replace the model's odds with a real quote for the resolved match.
///
/// Direct markets take the matching quote. Other markets keep the nearest real
/// quote when the model's number is within tolerance, otherwise the fallback.
pub fn repair_odds(claimed: f64, prediction: &str, odds: &Odds, fallback: MarketFallback) -> f64 {
    if let Some(outcome) = classify_outcome(prediction) {
        return outcome.quote(odds);
    }

    let nearest = odds
        .as_array()
        .into_iter()
        .map(|q| (q, (q - claimed).abs()))
        .filter(|(_, distance)| *distance < ODDS_TOLERANCE)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(q, _)| q);

    match (nearest, fallback) {
        (Some(quote), _) => quote,
        (None, MarketFallback::Min) => odds.min(),
        (None, MarketFallback::Mean) => round2(odds.mean()),
    }
}

/// Odds for a single pick that could not be tied to a cached match
pub fn unresolved_single_odds(claimed: f64) -> f64 {
    if (SINGLE_ODDS_MIN..=SINGLE_ODDS_MAX).contains(&claimed) {
        claimed
    } else {
        SINGLE_ODDS_DEFAULT
    }
}

fn clamp_or(value: i64, min: i64, max: i64, fallback: u8) -> u8 {
    if (min..=max).contains(&value) {
        value as u8
    } else {
        fallback
    }
}

/// Single picks are pitched as low risk: 70-85, else 75
pub fn clamp_single_confidence(value: i64) -> u8 {
    clamp_or(value, 70, 85, 75)
}

pub fn clamp_express_confidence(value: i64) -> u8 {
    clamp_or(value, 0, 100, 60)
}

pub fn clamp_risk(value: i64) -> u8 {
    clamp_or(value, 0, 100, 50)
}

/// Model-reported analysis odds, or odds implied by the risk when the model
/// signalled "not found" (0 or >= 99) or left the 1.0-10.0 range
pub fn analysis_odds(claimed: f64, risk_percent: u8) -> f64 {
    let not_found = claimed == 0.0 || claimed >= 99.0;
    if !not_found && (1.0..=10.0).contains(&claimed) {
        return claimed;
    }

    let probability = (100.0 - f64::from(risk_percent)) / 100.0;
    if probability > 0.0 && probability <= 1.0 {
        round2(1.0 / probability).clamp(1.10, 10.0)
    } else {
        2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn m(home: &str, away: &str, odds: Odds) -> MatchWithOdds {
        MatchWithOdds {
            home_team: home.to_string(),
            away_team: away.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            time: None,
            league: None,
            odds,
        }
    }

    const ODDS: Odds = Odds { home: 1.5, draw: 3.2, away: 2.1 };

    #[test]
    fn keywords_pick_direct_market() {
        assert_eq!(classify_outcome("Победа хозяев"), Some(Outcome::Home));
        assert_eq!(classify_outcome("П2 с форой"), Some(Outcome::Away));
        assert_eq!(classify_outcome("Ничья"), Some(Outcome::Draw));
        assert_eq!(classify_outcome("X"), Some(Outcome::Draw));
        assert_eq!(classify_outcome("Тотал больше 2.5"), None);
        assert_eq!(classify_outcome("Обе забьют"), None);
        assert_eq!(classify_outcome("Home win"), Some(Outcome::Home));
        assert_eq!(classify_outcome("Home team total over 1.5"), None);
        assert_eq!(classify_outcome("Away team to score"), None);
    }

    #[test]
    fn team_total_is_not_repaired_to_match_winner_quote() {
        assert_eq!(
            repair_odds(1.35, "Home team total over 1.5", &ODDS, MarketFallback::Mean),
            2.27
        );
        assert_eq!(
            repair_odds(2.2, "Home team total over 1.5", &ODDS, MarketFallback::Min),
            2.1
        );
    }

    #[test]
    fn home_win_overwrites_model_odds() {
        assert_eq!(repair_odds(1.35, "Победа хозяев", &ODDS, MarketFallback::Min), 1.5);
        assert_eq!(repair_odds(9.0, "победа гостей", &ODDS, MarketFallback::Mean), 2.1);
    }

    #[test]
    fn other_markets_snap_or_fall_back() {
        assert_eq!(repair_odds(2.15, "Тотал больше 2.5", &ODDS, MarketFallback::Min), 2.1);
        assert_eq!(repair_odds(1.40, "Тотал больше 2.5", &ODDS, MarketFallback::Min), 1.5);
        assert_eq!(repair_odds(1.30, "Тотал меньше 3.5", &ODDS, MarketFallback::Min), 1.5);
        assert_eq!(repair_odds(1.30, "Тотал меньше 3.5", &ODDS, MarketFallback::Mean), 2.27);
    }

    #[test]
    fn resolves_by_team_name_ignoring_case() {
        let matches = vec![m("Arsenal", "Chelsea", ODDS), m("Spartak", "Zenit", ODDS)];
        let found = SubstringResolver.resolve("ZENIT away", &matches).unwrap();
        assert_eq!(found.home_team, "Spartak");
        assert!(SubstringResolver.resolve("Ливерпуль - Эвертон", &matches).is_none());
    }

    #[test]
    fn clamps_use_fixed_fallbacks() {
        assert_eq!(clamp_risk(150), 50);
        assert_eq!(clamp_risk(35), 35);
        assert_eq!(clamp_single_confidence(95), 75);
        assert_eq!(clamp_single_confidence(80), 80);
        assert_eq!(clamp_express_confidence(-1), 60);
        assert_eq!(unresolved_single_odds(2.4), 1.45);
        assert_eq!(unresolved_single_odds(1.33), 1.33);
    }

    #[test]
    fn analysis_odds_fall_back_to_risk() {
        assert_eq!(analysis_odds(2.8, 40), 2.8);
        assert_eq!(analysis_odds(0.0, 50), 2.0);
        assert_eq!(analysis_odds(99.99, 40), 1.67);
        assert_eq!(analysis_odds(15.0, 5), 1.10);
        assert_eq!(analysis_odds(0.0, 100), 2.0);
        assert_eq!(analysis_odds(0.0, 95), 10.0);
    }
}

//! Match and prediction data model shared by every stage of the pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Three-way (1X2) decimal odds quoted by the sportsbook
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Odds {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Odds {
    /// All three outcomes quoted and strictly positive
    pub fn is_complete(&self) -> bool {
        [self.home, self.draw, self.away]
            .iter()
            .all(|o| o.is_finite() && *o > 0.0)
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.home, self.draw, self.away]
    }

    pub fn min(&self) -> f64 {
        self.home.min(self.draw).min(self.away)
    }

    pub fn mean(&self) -> f64 {
        (self.home + self.draw + self.away) / 3.0
    }
}

/// A scraped fixture with its real quoted odds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchWithOdds {
    pub home_team: String,
    pub away_team: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league: Option<String>,
    pub odds: Odds,
}

/// Natural identity of a match: (home, away, date)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchKey {
    pub home_team: String,
    pub away_team: String,
    pub date: NaiveDate,
}

impl MatchWithOdds {
    pub fn key(&self) -> MatchKey {
        MatchKey {
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            date: self.date,
        }
    }

    /// Display label used in prompts, picks and the recent-selection buffers
    pub fn label(&self) -> String {
        format!("{} - {}", self.home_team, self.away_team)
    }
}

/// Prediction shape requested from the engine and stored in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredictionCategory {
    #[serde(rename = "single")]
    Single,
    #[serde(rename = "express")]
    Express3,
    #[serde(rename = "express5")]
    Express5,
}

impl PredictionCategory {
    pub const ALL: [PredictionCategory; 3] = [
        PredictionCategory::Single,
        PredictionCategory::Express3,
        PredictionCategory::Express5,
    ];

    /// Minimum number of cached matches needed to build this shape
    pub fn required_matches(&self) -> usize {
        match self {
            PredictionCategory::Single => 1,
            PredictionCategory::Express3 => 3,
            PredictionCategory::Express5 => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionCategory::Single => "single",
            PredictionCategory::Express3 => "express",
            PredictionCategory::Express5 => "express5",
        }
    }
}

impl fmt::Display for PredictionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(PredictionCategory::Single),
            "express" | "express3" => Ok(PredictionCategory::Express3),
            "express5" => Ok(PredictionCategory::Express5),
            other => Err(format!("unknown prediction category: {}", other)),
        }
    }
}

/// Number of legs in an accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressSize {
    Three,
    Five,
}

impl ExpressSize {
    pub fn legs(&self) -> usize {
        match self {
            ExpressSize::Three => 3,
            ExpressSize::Five => 5,
        }
    }

    pub fn category(&self) -> PredictionCategory {
        match self {
            ExpressSize::Three => PredictionCategory::Express3,
            ExpressSize::Five => PredictionCategory::Express5,
        }
    }

    /// Value of the `type` field the model must echo back
    pub fn type_tag(&self) -> &'static str {
        self.category().as_str()
    }
}

/// Accepted single-match pick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglePick {
    #[serde(rename = "match")]
    pub match_name: String,
    pub prediction: String,
    pub odds: f64,
    pub confidence: u8,
}

/// One leg of an accumulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressBet {
    #[serde(rename = "match")]
    pub match_name: String,
    pub prediction: String,
    pub odds: f64,
}

/// Accepted accumulator; `total_odds` is always the rounded product of the legs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressPick {
    pub bets: Vec<ExpressBet>,
    pub total_odds: f64,
    pub confidence: u8,
}

/// Pooled prediction, serialized with its `type` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Prediction {
    #[serde(rename = "single")]
    Single(SinglePick),
    #[serde(rename = "express")]
    Express3(ExpressPick),
    #[serde(rename = "express5")]
    Express5(ExpressPick),
}

impl Prediction {
    pub fn category(&self) -> PredictionCategory {
        match self {
            Prediction::Single(_) => PredictionCategory::Single,
            Prediction::Express3(_) => PredictionCategory::Express3,
            Prediction::Express5(_) => PredictionCategory::Express5,
        }
    }
}

/// Free-form analysis of a single match description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAnalysis {
    #[serde(rename = "match")]
    pub match_name: String,
    pub prediction: String,
    pub risk_percent: u8,
    pub odds: f64,
}

/// Consumer request for an on-demand analysis
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisRequest {
    #[serde(rename = "match")]
    pub match_name: String,
    #[serde(default)]
    pub league: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Round to two decimals, the precision odds are quoted with
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_serializes_with_type_tag() {
        let p = Prediction::Express5(ExpressPick {
            bets: vec![],
            total_odds: 1.0,
            confidence: 60,
        });
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["type"], "express5");
        assert_eq!(v["total_odds"], 1.0);

        let back: Prediction = serde_json::from_value(v).unwrap();
        assert_eq!(back.category(), PredictionCategory::Express5);
    }

    #[test]
    fn incomplete_odds_detected() {
        let odds = Odds { home: 1.5, draw: 0.0, away: 2.1 };
        assert!(!odds.is_complete());
        assert!(Odds { home: 1.5, draw: 3.2, away: 2.1 }.is_complete());
    }

    #[test]
    fn category_parses_aliases() {
        assert_eq!("express3".parse::<PredictionCategory>().unwrap(), PredictionCategory::Express3);
        assert!("parlay".parse::<PredictionCategory>().is_err());
    }
}

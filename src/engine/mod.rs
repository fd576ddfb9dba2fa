//! Prediction generation.
//!
//! Every pick goes through the same steps: precondition check, prompt with the
//! real odds, schema-constrained model call, strict parse, then repair against
//! the cached matches. The model's odds and totals are never taken verbatim.

pub mod prompt;
pub mod recent;
pub mod resolve;

use crate::error::{PipelineError, Result};
use crate::llm::{schema, Generator};
use crate::pacing::Pacer;
use crate::search::{gather_context, query_plan, WebSearch};
use crate::types::{
    round2, AnalysisRequest, ExpressBet, ExpressPick, ExpressSize, MatchAnalysis, MatchWithOdds,
    Prediction, PredictionCategory, SinglePick,
};
use recent::RecentSelections;
use resolve::{
    analysis_odds, clamp_express_confidence, clamp_risk, clamp_single_confidence, repair_odds,
    unresolved_single_odds, MarketFallback, MatchResolver, SubstringResolver,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Match selection wants variety
pub const SELECTION_TEMPERATURE: f32 = 1.0;
/// Single-match analysis wants stable answers
pub const ANALYSIS_TEMPERATURE: f32 = 0.2;

const RAW_OUTPUT_LIMIT: usize = 2000;
const MIN_TEXT_CHARS: usize = 3;

// Raw model output. Unknown fields are a schema violation.

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSingle {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "match")]
    match_name: String,
    prediction: String,
    odds: f64,
    confidence: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBet {
    #[serde(rename = "match")]
    match_name: String,
    prediction: String,
    odds: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExpress {
    #[serde(rename = "type")]
    kind: String,
    bets: Vec<RawBet>,
    total_odds: f64,
    confidence: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAnalysis {
    #[serde(rename = "match")]
    match_name: String,
    prediction: String,
    #[serde(rename = "riskPercent")]
    risk_percent: i64,
    odds: f64,
}

fn parse_output<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(|_| PipelineError::ModelOutputNotJson {
        raw: raw.chars().take(RAW_OUTPUT_LIMIT).collect(),
    })?;
    serde_json::from_value(value).map_err(|e| PipelineError::ModelOutputSchema(e.to_string()))
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().chars().count() < MIN_TEXT_CHARS {
        return Err(PipelineError::ModelOutputSchema(format!(
            "{} must be at least {} characters",
            field, MIN_TEXT_CHARS
        )));
    }
    Ok(())
}

fn require_positive(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PipelineError::ModelOutputSchema(format!(
            "{} must be a positive number, got {}",
            field, value
        )));
    }
    Ok(())
}

fn require_tag(expected: &str, actual: &str) -> Result<()> {
    if expected != actual {
        return Err(PipelineError::ModelOutputSchema(format!(
            "type must be {:?}, got {:?}",
            expected, actual
        )));
    }
    Ok(())
}

fn ensure_enough(category: PredictionCategory, matches: &[MatchWithOdds]) -> Result<()> {
    let required = category.required_matches();
    if matches.len() < required {
        return Err(PipelineError::InsufficientData {
            category,
            required,
            available: matches.len(),
        });
    }
    Ok(())
}

/// What the model is shown: the candidate matches and the recent picks it is
/// told to avoid
struct Offer {
    matches: Vec<MatchWithOdds>,
    excluded: Vec<String>,
}

/// Recent picks are held back unless that leaves too few matches for the
/// requested shape. Then every match is offered and nothing is excluded, so the
/// prompt never forbids the only matches it lists.
fn offer(matches: &[MatchWithOdds], excluded: Vec<String>, required: usize) -> Offer {
    let fresh: Vec<MatchWithOdds> = matches
        .iter()
        .filter(|m| !excluded.contains(&m.label()))
        .cloned()
        .collect();
    if fresh.len() >= required {
        return Offer {
            matches: fresh,
            excluded,
        };
    }
    if !excluded.is_empty() {
        debug!(
            "Only {} fresh matches for {} required, offering all without exclusions",
            fresh.len(),
            required
        );
    }
    Offer {
        matches: matches.to_vec(),
        excluded: Vec::new(),
    }
}

pub struct PredictionEngine {
    generator: Arc<dyn Generator>,
    search: Arc<dyn WebSearch>,
    resolver: Arc<dyn MatchResolver>,
    search_pacer: Pacer,
    recent_single: Mutex<RecentSelections<String>>,
    recent_express3: Mutex<RecentSelections<Vec<String>>>,
    recent_express5: Mutex<RecentSelections<Vec<String>>>,
}

impl PredictionEngine {
    pub fn new(generator: Arc<dyn Generator>, search: Arc<dyn WebSearch>, search_pause: Duration) -> Self {
        Self {
            generator,
            search,
            resolver: Arc::new(SubstringResolver),
            search_pacer: Pacer::new(search_pause),
            recent_single: Mutex::new(RecentSelections::default()),
            recent_express3: Mutex::new(RecentSelections::default()),
            recent_express5: Mutex::new(RecentSelections::default()),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn MatchResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    fn express_buffer(&self, size: ExpressSize) -> &Mutex<RecentSelections<Vec<String>>> {
        match size {
            ExpressSize::Three => &self.recent_express3,
            ExpressSize::Five => &self.recent_express5,
        }
    }

    /// Label remembered for diversity: the cached match's own label when the
    /// pick resolves, the model's text otherwise
    fn selection_label(&self, text: &str, matches: &[MatchWithOdds]) -> String {
        self.resolver
            .resolve(text, matches)
            .map(|m| m.label())
            .unwrap_or_else(|| text.trim().to_string())
    }

    /// One prediction of the requested category
    pub async fn generate(
        &self,
        category: PredictionCategory,
        matches: &[MatchWithOdds],
    ) -> Result<Prediction> {
        match category {
            PredictionCategory::Single => self.generate_single(matches).await.map(Prediction::Single),
            PredictionCategory::Express3 => self
                .generate_express(matches, ExpressSize::Three)
                .await
                .map(Prediction::Express3),
            PredictionCategory::Express5 => self
                .generate_express(matches, ExpressSize::Five)
                .await
                .map(Prediction::Express5),
        }
    }

    pub async fn generate_single(&self, matches: &[MatchWithOdds]) -> Result<SinglePick> {
        ensure_enough(PredictionCategory::Single, matches)?;

        let recent = self.recent_single.lock().await.snapshot();
        let offered = offer(matches, recent, 1);
        info!(
            "Generating single from {} matches ({} excluded)",
            offered.matches.len(),
            offered.excluded.len()
        );

        let raw = self
            .generator
            .generate(
                &prompt::single(&offered.matches, &offered.excluded),
                &schema::single(),
                SELECTION_TEMPERATURE,
            )
            .await?;
        let parsed: RawSingle = parse_output(&raw)?;
        require_tag("single", &parsed.kind)?;
        require_text("match", &parsed.match_name)?;
        require_text("prediction", &parsed.prediction)?;
        require_positive("odds", parsed.odds)?;

        let odds = match self.resolver.resolve(&parsed.match_name, matches) {
            Some(real) => repair_odds(parsed.odds, &parsed.prediction, &real.odds, MarketFallback::Min),
            None => {
                warn!("Single pick {:?} matches no cached match", parsed.match_name);
                unresolved_single_odds(parsed.odds)
            }
        };
        if odds != parsed.odds {
            debug!("Single odds repaired: {} -> {}", parsed.odds, odds);
        }

        let pick = SinglePick {
            match_name: parsed.match_name.trim().to_string(),
            prediction: parsed.prediction.trim().to_string(),
            odds,
            confidence: clamp_single_confidence(parsed.confidence),
        };

        self.recent_single
            .lock()
            .await
            .push(self.selection_label(&pick.match_name, matches));
        Ok(pick)
    }

    pub async fn generate_express(
        &self,
        matches: &[MatchWithOdds],
        size: ExpressSize,
    ) -> Result<ExpressPick> {
        ensure_enough(size.category(), matches)?;

        let mut recent: Vec<String> = Vec::new();
        for combo in self.express_buffer(size).lock().await.snapshot() {
            for label in combo {
                if !recent.contains(&label) {
                    recent.push(label);
                }
            }
        }
        let offered = offer(matches, recent, size.legs());
        info!(
            "Generating {} from {} matches ({} excluded)",
            size.type_tag(),
            offered.matches.len(),
            offered.excluded.len()
        );

        let raw = self
            .generator
            .generate(
                &prompt::express(&offered.matches, &offered.excluded, size),
                &schema::express(size),
                SELECTION_TEMPERATURE,
            )
            .await?;
        let parsed: RawExpress = parse_output(&raw)?;
        require_tag(size.type_tag(), &parsed.kind)?;
        if parsed.bets.len() != size.legs() {
            return Err(PipelineError::ModelOutputSchema(format!(
                "bets must have exactly {} items, got {}",
                size.legs(),
                parsed.bets.len()
            )));
        }
        require_positive("total_odds", parsed.total_odds)?;

        let mut bets = Vec::with_capacity(parsed.bets.len());
        for bet in parsed.bets {
            require_text("bets.match", &bet.match_name)?;
            require_text("bets.prediction", &bet.prediction)?;
            require_positive("bets.odds", bet.odds)?;

            let odds = match self.resolver.resolve(&bet.match_name, matches) {
                Some(real) => repair_odds(bet.odds, &bet.prediction, &real.odds, MarketFallback::Mean),
                None => {
                    warn!("Express leg {:?} matches no cached match, keeping model odds", bet.match_name);
                    bet.odds
                }
            };
            bets.push(ExpressBet {
                match_name: bet.match_name.trim().to_string(),
                prediction: bet.prediction.trim().to_string(),
                odds,
            });
        }

        let total_odds = round2(bets.iter().map(|b| b.odds).product());
        if (total_odds - parsed.total_odds).abs() >= 0.01 {
            debug!("Express total recomputed: {} -> {}", parsed.total_odds, total_odds);
        }

        let labels = bets
            .iter()
            .map(|b| self.selection_label(&b.match_name, matches))
            .collect();
        self.express_buffer(size).lock().await.push(labels);

        Ok(ExpressPick {
            bets,
            total_odds,
            confidence: clamp_express_confidence(parsed.confidence),
        })
    }

    /// Free-form analysis of one match, enriched with web search context
    pub async fn analyze_match(&self, request: &AnalysisRequest) -> Result<MatchAnalysis> {
        let requested = request.match_name.trim();
        if requested.is_empty() {
            return Err(PipelineError::InvalidRequest("match must not be empty".to_string()));
        }
        info!("Analyzing match {:?}", requested);

        let queries = query_plan(requested, request.league.as_deref());
        let snippets = gather_context(self.search.as_ref(), &self.search_pacer, &queries).await;
        let prompt = prompt::with_search_context(&prompt::analysis(request), &snippets);

        let raw = self
            .generator
            .generate(&prompt, &schema::analysis(), ANALYSIS_TEMPERATURE)
            .await?;
        let parsed: RawAnalysis = parse_output(&raw)?;
        require_text("prediction", &parsed.prediction)?;
        if !parsed.odds.is_finite() {
            return Err(PipelineError::ModelOutputSchema("odds must be a number".to_string()));
        }

        let match_name = match parsed.match_name.trim() {
            "" => requested.to_string(),
            name => name.to_string(),
        };
        let risk_percent = clamp_risk(parsed.risk_percent);
        let odds = analysis_odds(parsed.odds, risk_percent);
        if odds != parsed.odds {
            warn!(
                "No usable bookmaker odds for {:?} ({}), using {} from risk {}%",
                match_name, parsed.odds, odds, risk_percent
            );
        }

        Ok(MatchAnalysis {
            match_name,
            prediction: parsed.prediction.trim().to_string(),
            risk_percent,
            odds,
        })
    }

    /// Labels currently excluded from single picks, oldest first
    pub async fn recent_singles(&self) -> Vec<String> {
        self.recent_single.lock().await.snapshot()
    }
}

//! Extraction of fixtures and 1X2 odds from a rendered sportsbook page.
//!
//! The page is a list of match cards. Each card carries two team names, a
//! kick-off time and an odds row; the date lives in a section header above a
//! group of cards. Every lookup goes through a list of selectors tried in order
//! so small markup changes degrade to fewer matches instead of a failure.

use crate::types::{MatchWithOdds, Odds};
use chrono::{Datelike, NaiveDate};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// CSS selectors for one sportsbook layout
#[derive(Debug, Clone)]
pub struct SelectorSet {
    /// Match cards, first selector with any hit wins
    pub items: &'static [&'static str],
    /// Team name nodes inside a card (home first)
    pub teams: &'static [&'static str],
    pub time: &'static [&'static str],
    /// Section header carrying the date, searched in ancestors then document
    pub date_header: &'static [&'static str],
    /// Rows that may contain the three outcome cells
    pub odds_row: &'static str,
    pub odd_cell: &'static str,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            items: &[
                ".multi-column-content",
                "ul.multi-column-content",
                "[class*=\"multi-column-content\"]",
            ],
            teams: &[
                ".multi-column-teams .multi-column-single-team p",
                ".multi-column-single-team",
            ],
            time: &[".multi-column-time-icon time", "time"],
            date_header: &[".c-title-bc"],
            odds_row: "li",
            odd_cell: ".market-odd-bc",
        }
    }
}

struct Compiled {
    items: Vec<Selector>,
    teams: Vec<Selector>,
    time: Vec<Selector>,
    date_header: Vec<Selector>,
    odds_row: Option<Selector>,
    odd_cell: Option<Selector>,
}

impl Compiled {
    fn new(set: &SelectorSet) -> Self {
        let compile = |list: &[&str]| -> Vec<Selector> {
            list.iter().filter_map(|s| Selector::parse(s).ok()).collect()
        };
        Self {
            items: compile(set.items),
            teams: compile(set.teams),
            time: compile(set.time),
            date_header: compile(set.date_header),
            odds_row: Selector::parse(set.odds_row).ok(),
            odd_cell: Selector::parse(set.odd_cell).ok(),
        }
    }
}

/// Number of match cards on the page under the first matching selector
pub fn count_match_elements(html: &str, selectors: &SelectorSet) -> usize {
    let document = Html::parse_document(html);
    let compiled = Compiled::new(selectors);
    match_items(&document, &compiled).len()
}

/// Parse every complete match card. Cards without two team names or without
/// all three positive odds are dropped.
pub fn parse_matches(
    html: &str,
    league: &str,
    today: NaiveDate,
    selectors: &SelectorSet,
) -> Vec<MatchWithOdds> {
    let document = Html::parse_document(html);
    let compiled = Compiled::new(selectors);
    let page_date = compiled
        .date_header
        .iter()
        .find_map(|sel| document.select(sel).next())
        .map(element_text);

    let mut matches = Vec::new();
    for (index, item) in match_items(&document, &compiled).into_iter().enumerate() {
        let Some((home_team, away_team)) = extract_teams(item, &compiled) else {
            debug!("Card {}: missing team names", index);
            continue;
        };

        let Some(odds) = extract_odds(item, &compiled) else {
            debug!("Card {} ({} - {}): incomplete odds", index, home_team, away_team);
            continue;
        };

        let time = compiled
            .time
            .iter()
            .find_map(|sel| item.select(sel).next())
            .map(element_text)
            .filter(|t| !t.is_empty());

        let date = nearest_date_header(item, &compiled)
            .or_else(|| page_date.clone())
            .and_then(|token| resolve_date_token(&token, today))
            .unwrap_or(today);

        matches.push(MatchWithOdds {
            home_team,
            away_team,
            date,
            time,
            league: Some(league.to_string()),
            odds,
        });
    }

    matches
}

fn match_items<'a>(document: &'a Html, compiled: &Compiled) -> Vec<ElementRef<'a>> {
    compiled
        .items
        .iter()
        .map(|sel| document.select(sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default()
}

fn extract_teams(item: ElementRef<'_>, compiled: &Compiled) -> Option<(String, String)> {
    for sel in &compiled.teams {
        let names: Vec<String> = item
            .select(sel)
            .map(element_text)
            .filter(|n| !n.is_empty())
            .collect();
        if names.len() >= 2 {
            return Some((names[0].clone(), names[1].clone()));
        }
    }
    None
}

fn extract_odds(item: ElementRef<'_>, compiled: &Compiled) -> Option<Odds> {
    let cell = compiled.odd_cell.as_ref()?;

    // Prefer a single row holding all three outcomes
    if let Some(row_sel) = &compiled.odds_row {
        for row in item.select(row_sel) {
            let cells: Vec<ElementRef<'_>> = row.select(cell).collect();
            if cells.len() >= 3 {
                if let Some(odds) = odds_from_cells(&cells) {
                    return Some(odds);
                }
            }
        }
    }

    let cells: Vec<ElementRef<'_>> = item.select(cell).collect();
    if cells.len() >= 3 {
        return odds_from_cells(&cells);
    }
    None
}

fn odds_from_cells(cells: &[ElementRef<'_>]) -> Option<Odds> {
    let odds = Odds {
        home: parse_odd(&element_text(cells[0]))?,
        draw: parse_odd(&element_text(cells[1]))?,
        away: parse_odd(&element_text(cells[2]))?,
    };
    odds.is_complete().then_some(odds)
}

fn nearest_date_header(item: ElementRef<'_>, compiled: &Compiled) -> Option<String> {
    item.ancestors().filter_map(ElementRef::wrap).find_map(|ancestor| {
        compiled
            .date_header
            .iter()
            .find_map(|sel| ancestor.select(sel).next())
            .map(element_text)
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decimal odd as shown on the page; comma decimals accepted
pub fn parse_odd(text: &str) -> Option<f64> {
    let value: f64 = text.trim().replace(',', ".").parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Resolve a `DD.MM.YYYY` or `DD.MM` token (surrounding text ignored) to a date.
///
/// Without a year the match is assumed to be upcoming: a day/month before today
/// belongs to next year. A two-digit year is read as 20YY; any other year width
/// is rejected.
pub fn resolve_date_token(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let digits: String = token
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let parts: Vec<&str> = digits.split('.').filter(|p| !p.is_empty()).collect();
    let number = |p: &str| p.parse::<u32>().ok();

    match parts.as_slice() {
        [day, month, year] => {
            let year: i32 = match year.len() {
                2 => 2000 + year.parse::<i32>().ok()?,
                4 => year.parse().ok()?,
                _ => return None,
            };
            NaiveDate::from_ymd_opt(year, number(day)?, number(month)?)
        }
        [day, month] => {
            let (day, month) = (number(day)?, number(month)?);
            let mut year = today.year();
            if month < today.month() || (month == today.month() && day < today.day()) {
                year += 1;
            }
            NaiveDate::from_ymd_opt(year, month, day)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
  <div class="competition-bc">
    <div class="c-title-bc">Вс, 25.10.2026</div>
    <ul class="multi-column-content">
      <li>
        <div class="multi-column-time-icon"><time>19:00</time></div>
        <div class="multi-column-teams">
          <div class="multi-column-single-team"><p>Арсенал</p></div>
          <div class="multi-column-single-team"><p>Челси</p></div>
        </div>
      </li>
      <li>
        <span class="market-odd-bc">1.85</span>
        <span class="market-odd-bc">3,60</span>
        <span class="market-odd-bc">4.20</span>
      </li>
    </ul>
    <ul class="multi-column-content">
      <li>
        <div class="multi-column-teams">
          <div class="multi-column-single-team"><p>Ливерпуль</p></div>
          <div class="multi-column-single-team"><p>Эвертон</p></div>
        </div>
      </li>
      <li>
        <span class="market-odd-bc">1.40</span>
        <span class="market-odd-bc">-</span>
        <span class="market-odd-bc">7.50</span>
      </li>
    </ul>
  </div>
  <div class="competition-bc">
    <div class="c-title-bc">02.11</div>
    <ul class="multi-column-content">
      <li>
        <div class="multi-column-time-icon"><time>21:30</time></div>
        <div class="multi-column-teams">
          <div class="multi-column-single-team"><p>Бёрнли</p></div>
          <div class="multi-column-single-team"><p></p></div>
        </div>
      </li>
      <li>
        <span class="market-odd-bc">2.10</span>
        <span class="market-odd-bc">3.30</span>
        <span class="market-odd-bc">3.40</span>
      </li>
    </ul>
    <ul class="multi-column-content">
      <li>
        <div class="multi-column-teams">
          <div class="multi-column-single-team"><p>Фулхэм</p></div>
          <div class="multi-column-single-team"><p>Брентфорд</p></div>
        </div>
        <span class="market-odd-bc">2.45</span>
        <span class="market-odd-bc">3.25</span>
        <span class="market-odd-bc">2.90</span>
      </li>
    </ul>
  </div>
</body></html>
"#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn parses_complete_cards_only() {
        let matches = parse_matches(PAGE, "Лига 1", today(), &SelectorSet::default());
        assert_eq!(matches.len(), 2);

        let first = &matches[0];
        assert_eq!(first.home_team, "Арсенал");
        assert_eq!(first.away_team, "Челси");
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 10, 25).unwrap());
        assert_eq!(first.time.as_deref(), Some("19:00"));
        assert_eq!(first.league.as_deref(), Some("Лига 1"));
        assert_eq!(first.odds, Odds { home: 1.85, draw: 3.6, away: 4.2 });

        let second = &matches[1];
        assert_eq!(second.home_team, "Фулхэм");
        assert_eq!(second.date, NaiveDate::from_ymd_opt(2026, 11, 2).unwrap());
        assert_eq!(second.time, None);
    }

    #[test]
    fn counts_cards() {
        assert_eq!(count_match_elements(PAGE, &SelectorSet::default()), 4);
        assert_eq!(count_match_elements("<html><body><p>captcha</p></body></html>", &SelectorSet::default()), 0);
    }

    #[test]
    fn unrecognized_page_yields_nothing() {
        let html = "<html><body><div class=\"event\">Арсенал - Челси 1.85</div></body></html>";
        assert!(parse_matches(html, "Лига 1", today(), &SelectorSet::default()).is_empty());
    }

    #[test]
    fn missing_date_defaults_to_today() {
        let html = r#"<ul class="multi-column-content"><li>
            <div class="multi-column-teams">
              <div class="multi-column-single-team"><p>A</p></div>
              <div class="multi-column-single-team"><p>B</p></div>
            </div>
            <span class="market-odd-bc">1.5</span><span class="market-odd-bc">3.2</span><span class="market-odd-bc">2.1</span>
        </li></ul>"#;
        let matches = parse_matches(html, "Лига 2", today(), &SelectorSet::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].date, today());
    }

    #[test]
    fn year_inferred_from_proximity() {
        let today = today();
        assert_eq!(resolve_date_token("25.10", today), NaiveDate::from_ymd_opt(2026, 10, 25));
        assert_eq!(resolve_date_token("19.10", today), NaiveDate::from_ymd_opt(2026, 10, 19));
        assert_eq!(resolve_date_token("18.10", today), NaiveDate::from_ymd_opt(2027, 10, 18));
        assert_eq!(resolve_date_token("03.01", today), NaiveDate::from_ymd_opt(2027, 1, 3));
        assert_eq!(resolve_date_token("Пт 07.11.2026", today), NaiveDate::from_ymd_opt(2026, 11, 7));
        assert_eq!(resolve_date_token("31.02", today), None);
        assert_eq!(resolve_date_token("20.10.26", today), NaiveDate::from_ymd_opt(2026, 10, 20));
        assert_eq!(resolve_date_token("20.10.226", today), None);
        assert_eq!(resolve_date_token("Сегодня", today), None);
    }

    #[test]
    fn odd_parsing() {
        assert_eq!(parse_odd(" 1,75 "), Some(1.75));
        assert_eq!(parse_odd("0"), None);
        assert_eq!(parse_odd("-"), None);
    }
}

//! Prompt text. Output is asked for in Russian, with real odds inlined.

use crate::search::SearchSnippet;
use crate::types::{AnalysisRequest, ExpressSize, MatchWithOdds};
use std::fmt::Write;

const SEPARATOR: &str = "═══════════════════════════════════════";

fn match_line(index: usize, m: &MatchWithOdds) -> String {
    let mut line = format!("{}. {} | {}", index + 1, m.label(), m.date.format("%d.%m.%Y"));
    if let Some(time) = &m.time {
        let _ = write!(line, " {}", time);
    }
    if let Some(league) = &m.league {
        let _ = write!(line, " | {}", league);
    }
    let _ = write!(
        line,
        " | П1 {:.2} · X {:.2} · П2 {:.2}",
        m.odds.home, m.odds.draw, m.odds.away
    );
    line
}

fn match_list(candidates: &[MatchWithOdds]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, m)| match_line(i, m))
        .collect::<Vec<_>>()
        .join("\n")
}

fn exclusion_block(excluded: &[String]) -> String {
    if excluded.is_empty() {
        return String::new();
    }
    format!(
        "\nНЕ выбирай эти матчи, они уже были в недавних прогнозах:\n{}\n",
        excluded
            .iter()
            .map(|label| format!("- {}", label))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

pub fn single(candidates: &[MatchWithOdds], excluded: &[String]) -> String {
    format!(
        "Ты спортивный аналитик. Ниже список реальных матчей с РЕАЛЬНЫМИ коэффициентами букмекера \
         (П1 победа хозяев, X ничья, П2 победа гостей).\n\n\
         {list}\n{exclusions}\n\
         Выбери ОДИН матч с минимальным риском и дай прогноз на один исход.\n\
         Требования:\n\
         - поле match в формате \"Хозяева - Гости\", названия команд как в списке\n\
         - prediction: \"Победа хозяев\", \"Победа гостей\", \"Ничья\" или тотал\n\
         - odds: коэффициент из списка для выбранного исхода, от 1.30 до 1.60\n\
         - confidence: целое число от 70 до 85\n\
         - type: \"single\"",
        list = match_list(candidates),
        exclusions = exclusion_block(excluded),
    )
}

pub fn express(candidates: &[MatchWithOdds], excluded: &[String], size: ExpressSize) -> String {
    let legs = size.legs();
    format!(
        "Ты спортивный аналитик. Ниже список реальных матчей с РЕАЛЬНЫМИ коэффициентами букмекера \
         (П1 победа хозяев, X ничья, П2 победа гостей).\n\n\
         {list}\n{exclusions}\n\
         Составь экспресс ровно из {legs} РАЗНЫХ матчей этого списка.\n\
         Требования:\n\
         - в каждой ставке поле match в формате \"Хозяева - Гости\", названия команд как в списке\n\
         - prediction: \"Победа хозяев\", \"Победа гостей\", \"Ничья\" или тотал\n\
         - odds каждой ставки: коэффициент из списка для выбранного исхода, от 1.30 до 1.60\n\
         - total_odds: произведение коэффициентов всех ставок\n\
         - confidence: целое число от 0 до 100\n\
         - type: \"{tag}\"",
        list = match_list(candidates),
        exclusions = exclusion_block(excluded),
        legs = legs,
        tag = size.type_tag(),
    )
}

pub fn analysis(request: &AnalysisRequest) -> String {
    let mut prompt = String::from("Ты спортивный аналитик. Проанализируй матч.\n\n");
    let _ = writeln!(prompt, "Матч: {}", request.match_name.trim());
    if let Some(league) = request.league.as_deref().filter(|l| !l.trim().is_empty()) {
        let _ = writeln!(prompt, "Лига: {}", league.trim());
    }
    if let Some(date) = request.date.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(prompt, "Дата: {}", date.trim());
    }
    prompt.push_str(
        "\nДай самый вероятный исход, процент риска и коэффициент букмекера на этот исход.\n\
         Требования:\n\
         - match: название матча на русском в формате \"Хозяева - Гости\"\n\
         - prediction: исход, например \"Победа хозяев\" или \"Тотал больше 2.5\"\n\
         - riskPercent: целое число от 0 до 100\n\
         - odds: реальный коэффициент букмекера от 1.0 до 10.0",
    );
    prompt
}

/// Append web search context, or a warning not to invent odds when there is none
pub fn with_search_context(prompt: &str, snippets: &[SearchSnippet]) -> String {
    if snippets.is_empty() {
        return format!(
            "{}\n\nПоиск в интернете не дал результатов с коэффициентами букмекеров.\n\
             НЕ придумывай коэффициенты! Если реальный коэффициент неизвестен, верни odds = 0.",
            prompt
        );
    }

    let context = snippets
        .iter()
        .map(|s| format!("[Поисковый запрос: \"{}\"]\n{}", s.query, s.text))
        .collect::<Vec<_>>()
        .join(&format!("\n\n{}\n\n", SEPARATOR));

    format!(
        "{prompt}\n\n{sep}\nИНФОРМАЦИЯ ИЗ ИНТЕРНЕТА О МАТЧЕ И КОЭФФИЦИЕНТАХ:\n{sep}\n{context}\n{sep}\n\n\
         Бери коэффициент ТОЛЬКО из информации выше. Если там есть несколько значений для одного \
         исхода, используй наиболее частое. НЕ рассчитывай коэффициент сам. Если реального \
         коэффициента нет, верни odds = 0. Процент риска оцени по форме и статистике команд.",
        prompt = prompt,
        sep = SEPARATOR,
        context = context,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Odds;
    use chrono::NaiveDate;

    fn sample() -> MatchWithOdds {
        MatchWithOdds {
            home_team: "Спартак".to_string(),
            away_team: "Зенит".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            time: Some("19:30".to_string()),
            league: Some("РПЛ".to_string()),
            odds: Odds { home: 2.45, draw: 3.3, away: 2.8 },
        }
    }

    #[test]
    fn match_lines_carry_real_odds() {
        let prompt = single(&[sample()], &["ЦСКА - Локомотив".to_string()]);
        assert!(prompt.contains("1. Спартак - Зенит | 20.10.2026 19:30 | РПЛ | П1 2.45 · X 3.30 · П2 2.80"));
        assert!(prompt.contains("- ЦСКА - Локомотив"));
    }

    #[test]
    fn express_prompt_names_leg_count_and_tag() {
        let prompt = express(&[sample()], &[], ExpressSize::Five);
        assert!(prompt.contains("ровно из 5"));
        assert!(prompt.contains("\"express5\""));
        assert!(!prompt.contains("НЕ выбирай"));
    }

    #[test]
    fn analysis_prompt_has_match_and_league_lines() {
        let request = AnalysisRequest {
            match_name: "Спартак - Зенит".to_string(),
            league: Some("РПЛ".to_string()),
            date: None,
        };
        let prompt = analysis(&request);
        assert!(prompt.contains("Матч: Спартак - Зенит\n"));
        assert!(prompt.contains("Лига: РПЛ\n"));
        assert!(!prompt.contains("Дата:"));

        assert!(with_search_context(&prompt, &[]).contains("НЕ придумывай"));
        let enriched = with_search_context(
            &prompt,
            &[SearchSnippet { query: "q".to_string(), text: "П1 2.45".to_string() }],
        );
        assert!(enriched.contains("[Поисковый запрос: \"q\"]\nП1 2.45"));
    }
}

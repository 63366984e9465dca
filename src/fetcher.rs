use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::config::FEED_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::types::{BetDetails, Observation, OpportunityId, Snapshot};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchStats {
    pub feed_total: usize,
    pub rejected_malformed: usize,
    pub rejected_no_sportsbook: usize,
    pub rejected_no_market: usize,
    pub rejected_no_event: usize,
    pub parsed: usize,
}

enum Rejection {
    Malformed,
    NoSportsbook,
    NoMarket,
    NoEvent,
}

/// One row of the scraped feed. Numeric fields arrive as numbers or numeric
/// strings; `"None"` and empty strings count as missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedRow {
    #[serde(default, deserialize_with = "lenient_str")]
    pub sportsbook: Option<String>,
    #[serde(default, deserialize_with = "lenient_str")]
    pub event: Option<String>,
    #[serde(default, alias = "market", deserialize_with = "lenient_str")]
    pub bet_type: Option<String>,
    #[serde(default, alias = "line", deserialize_with = "lenient_str")]
    pub bet_line: Option<String>,
    #[serde(default, deserialize_with = "lenient_str")]
    pub sport: Option<String>,
    #[serde(default, deserialize_with = "lenient_str")]
    pub league: Option<String>,
    #[serde(default, deserialize_with = "lenient_str")]
    pub participant: Option<String>,
    #[serde(default, deserialize_with = "lenient_str")]
    pub home_team: Option<String>,
    #[serde(default, deserialize_with = "lenient_str")]
    pub away_team: Option<String>,
    #[serde(default, deserialize_with = "lenient_str")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub odds: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ev_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub win_probability: Option<f64>,
    #[serde(
        default,
        alias = "market_implied_probability",
        deserialize_with = "lenient_f64"
    )]
    pub market_implied_prob: Option<f64>,
    #[serde(default, deserialize_with = "lenient_str")]
    pub event_time: Option<String>,
}

/// GET the feed and parse it into observations stamped with `observed_at`.
pub async fn fetch_feed(url: &str, observed_at: DateTime<Utc>) -> Result<(Vec<Observation>, FetchStats)> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FEED_TIMEOUT_SECS))
        .build()?;

    let resp = client.get(url).send().await?.error_for_status()?;
    let body: serde_json::Value = resp.json().await?;
    parse_feed(&body, observed_at)
}

/// Parse a feed body (a JSON array of rows). Rows that cannot identify a line
/// are dropped and counted; rows with missing numbers are kept so the ranking
/// pass can report them as incomplete.
pub fn parse_feed(body: &serde_json::Value, observed_at: DateTime<Utc>) -> Result<(Vec<Observation>, FetchStats)> {
    let items = body
        .as_array()
        .ok_or_else(|| AppError::Feed("feed response was not an array".to_string()))?;

    let mut stats = FetchStats {
        feed_total: items.len(),
        ..Default::default()
    };
    let mut observations = Vec::with_capacity(items.len());

    for item in items {
        let parsed = serde_json::from_value::<FeedRow>(item.clone())
            .map_err(|_| Rejection::Malformed)
            .and_then(|row| parse_row(row, observed_at));
        match parsed {
            Ok(obs) => observations.push(obs),
            Err(Rejection::Malformed) => stats.rejected_malformed += 1,
            Err(Rejection::NoSportsbook) => stats.rejected_no_sportsbook += 1,
            Err(Rejection::NoMarket) => stats.rejected_no_market += 1,
            Err(Rejection::NoEvent) => stats.rejected_no_event += 1,
        }
    }

    stats.parsed = observations.len();
    debug!(?stats, "Parsed feed");
    Ok((observations, stats))
}

fn parse_row(row: FeedRow, observed_at: DateTime<Utc>) -> std::result::Result<Observation, Rejection> {
    let sportsbook = row.sportsbook.ok_or(Rejection::NoSportsbook)?;
    let market = row.bet_type.ok_or(Rejection::NoMarket)?;

    let event_teams = event_teams(
        row.home_team.as_deref(),
        row.away_team.as_deref(),
        row.description.as_deref(),
        row.participant.as_deref(),
    );
    let event = row
        .event
        .or_else(|| event_teams.clone())
        .or_else(|| row.description.clone())
        .ok_or(Rejection::NoEvent)?;
    let line = row
        .bet_line
        .or_else(|| row.participant.clone())
        .unwrap_or_default();

    let market_implied_probability = row
        .market_implied_prob
        .or_else(|| row.odds.and_then(implied_probability));

    Ok(Observation {
        id: OpportunityId::new(&sportsbook, &event, &market, &line),
        details: BetDetails {
            event,
            market,
            line,
            sport: row.sport,
            league: row.league,
            participant: row.participant,
            description: row.description,
            event_teams,
        },
        snapshot: Snapshot {
            odds: row.odds,
            ev_percent: row.ev_percent,
            win_probability: row.win_probability,
            market_implied_probability,
            event_time: row.event_time.as_deref().and_then(parse_event_time),
            sportsbook,
            observed_at,
        },
    })
}

/// Probability implied by American odds, in percent. Odds strictly between
/// -100 and +100 do not exist and yield None.
pub fn implied_probability(odds: f64) -> Option<f64> {
    if !odds.is_finite() {
        None
    } else if odds >= 100.0 {
        Some(100.0 / (odds + 100.0) * 100.0)
    } else if odds <= -100.0 {
        Some(odds.abs() / (odds.abs() + 100.0) * 100.0)
    } else {
        None
    }
}

/// Accepts RFC 3339, or naive `YYYY-MM-DDTHH:MM:SS` / `YYYY-MM-DD HH:MM`
/// taken as UTC.
pub fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// "home vs away" when both teams are known, else the two sides of a
/// "X vs Y" / "X vs. Y" description, else the participant.
pub fn event_teams(
    home: Option<&str>,
    away: Option<&str>,
    description: Option<&str>,
    participant: Option<&str>,
) -> Option<String> {
    if let (Some(h), Some(a)) = (home, away) {
        return Some(format!("{h} vs {a}"));
    }
    description
        .and_then(split_versus)
        .map(|(l, r)| format!("{l} vs {r}"))
        .or_else(|| participant.map(str::to_string))
}

fn split_versus(text: &str) -> Option<(&str, &str)> {
    let lower = text.to_ascii_lowercase();
    for sep in [" vs. ", " vs "] {
        if let Some(i) = lower.find(sep) {
            let left = text[..i].trim();
            let right = text[i + sep.len()..].trim();
            if !left.is_empty() && !right.is_empty() {
                return Some((left, right));
            }
        }
    }
    None
}

fn lenient_str<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty() && s != "None").then(|| s.to_string())
        }
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|x| x.is_finite()))
}

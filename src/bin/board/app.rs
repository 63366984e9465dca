use std::collections::BTreeMap;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror api/routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct SummaryResponse {
    pub total: usize,
    pub excluded: usize,
    pub average_ev: f64,
    pub average_edge: f64,
    pub grade_distribution: BTreeMap<String, usize>,
    pub mismatch_count: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct DetailsView {
    pub event: String,
    pub market: String,
    pub line: String,
    pub event_teams: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct SnapshotView {
    pub odds: Option<f64>,
    pub ev_percent: Option<f64>,
    pub sportsbook: String,
}

/// One trend metric. `state` is "measured" or "unavailable"; the other
/// fields are only present when measured.
#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct MovementView {
    pub state: String,
    pub direction: Option<String>,
    pub magnitude: Option<String>,
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TrendView {
    pub ev: MovementView,
    pub odds: MovementView,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct RankedOpportunity {
    pub id: String,
    pub details: DetailsView,
    pub current: SnapshotView,
    pub grade: String,
    pub composite_score: f64,
    pub mismatch: bool,
    pub edge: f64,
    pub trend: TrendView,
    pub time_bucket: String,
    pub bucket_color: String,
    pub time_to_event_secs: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct OpportunitiesResponse {
    pub total_active: usize,
    pub ranked: Vec<RankedOpportunity>,
    pub excluded: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct HealthResponse {
    pub active_opportunities: Option<usize>,
    pub last_poll_at: Option<String>,
    pub polls_failed: Option<u64>,
    pub write_queue_depth: Option<usize>,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub summary: SummaryResponse,
    pub board: OpportunitiesResponse,
    pub health: HealthResponse,
    pub last_refresh: std::time::Instant,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            summary: SummaryResponse::default(),
            board: OpportunitiesResponse::default(),
            health: HealthResponse::default(),
            last_refresh: std::time::Instant::now(),
            base_url,
        }
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let board_url = format!("{}/opportunities", self.base_url);
        let summary_url = format!("{}/stats/summary", self.base_url);
        let health_url = format!("{}/health", self.base_url);

        let (board_res, summary_res, health_res) = tokio::join!(
            client.get(&board_url).send(),
            client.get(&summary_url).send(),
            client.get(&health_url).send(),
        );

        let (board_resp, summary_resp) = match (board_res, summary_res) {
            (Ok(b), Ok(s)) => (b, s),
            (Err(e), _) | (_, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };

        let (board, summary) = tokio::join!(
            board_resp.json::<OpportunitiesResponse>(),
            summary_resp.json::<SummaryResponse>(),
        );

        match (board, summary) {
            (Ok(b), Ok(s)) => {
                self.board = b;
                self.summary = s;
                self.status = ConnectionStatus::Connected;
                self.last_refresh = std::time::Instant::now();

                if let Ok(h) = health_res {
                    if let Ok(health) = h.json::<HealthResponse>().await {
                        self.health = health;
                    }
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Arrow for one trend metric; doubled for a large move.
pub fn trend_arrow(m: &MovementView) -> &'static str {
    let large = m.magnitude.as_deref() == Some("large");
    match (m.direction.as_deref(), large) {
        (Some("improving"), true) => "▲▲",
        (Some("improving"), false) => "▲",
        (Some("worsening"), true) => "▼▼",
        (Some("worsening"), false) => "▼",
        (Some("stable"), _) => "─",
        _ => "·",
    }
}

pub fn format_odds(odds: Option<f64>) -> String {
    match odds {
        Some(o) if o > 0.0 => format!("+{o:.0}"),
        Some(o) => format!("{o:.0}"),
        None => "—".to_string(),
    }
}

pub fn format_pct(v: Option<f64>) -> String {
    v.map_or("—".to_string(), |v| format!("{v:.1}%"))
}

/// Compact time until the event: "started", "45m", "3h 10m", "2d 4h".
pub fn format_time_to_event(secs: i64) -> String {
    if secs < 0 {
        return "started".to_string();
    }
    let mins = secs / 60;
    let (d, h, m) = (mins / 1440, (mins / 60) % 24, mins % 60);
    if d > 0 {
        format!("{d}d {h}h")
    } else if h > 0 {
        format!("{h}h {m:02}m")
    } else {
        format!("{m}m")
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

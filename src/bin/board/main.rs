mod app;

use std::io;
use std::time::Duration;

use app::{
    format_odds, format_pct, format_time_to_event, trend_arrow, truncate, AppState,
    ConnectionStatus,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);

    // Initial fetch before rendering
    app.refresh(&client).await;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut table_state = TableState::default();

    let result = run_loop(&mut terminal, &mut app, &client, &mut table_state).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
    table_state: &mut TableState,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(2);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app, table_state))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            let max = app.board.ranked.len().saturating_sub(1);
                            let next = table_state.selected().map_or(0, |i| (i + 1).min(max));
                            table_state.select(Some(next));
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            let prev = table_state.selected().map_or(0, |i| i.saturating_sub(1));
                            table_state.select(Some(prev));
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, table_state: &mut TableState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // header
            Constraint::Min(0),    // board
            Constraint::Length(1), // footer
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_board(f, app, table_state, chunks[1]);
    render_footer(f, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };
    let s = &app.summary;
    let white = Style::default().fg(Color::White);

    let status_line = Line::from(vec![
        Span::styled(
            " EV Grader  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(format!("{} ranked", s.total), white),
        Span::raw("  │  "),
        Span::styled(format!("{} incomplete", s.excluded), Style::default().fg(Color::DarkGray)),
        Span::raw("  │  "),
        Span::styled(
            format!("{} flagged", s.mismatch_count),
            Style::default().fg(Color::Magenta),
        ),
        Span::raw("  │  "),
        Span::styled(
            format!("avg EV {:.1}% / edge {:.1}", s.average_ev, s.average_edge),
            white,
        ),
    ]);

    let mut grade_spans = vec![Span::raw(" ")];
    for grade in ["A", "B", "C", "D", "F"] {
        let count = s.grade_distribution.get(grade).copied().unwrap_or(0);
        grade_spans.push(Span::styled(
            format!("{grade}:{count}  "),
            Style::default().fg(grade_color(grade)),
        ));
    }

    let paragraph = Paragraph::new(vec![status_line, Line::from(grade_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_board(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = [
        "#", "Gr", "Score", "!", "EV%", "Edge", "Odds", "EV", "Px", "Event", "Line", "Book", "Starts",
    ]
    .iter()
    .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .board
        .ranked
        .iter()
        .enumerate()
        .map(|(i, o)| {
            let event = o.details.event_teams.as_deref().unwrap_or(&o.details.event);
            let flag = if o.mismatch { "⚑" } else { "" };
            let bucket = Style::default().fg(bucket_color(&o.bucket_color));

            Row::new(vec![
                Cell::from(format!("{}", i + 1)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(o.grade.clone()).style(
                    Style::default()
                        .fg(grade_color(&o.grade))
                        .add_modifier(Modifier::BOLD),
                ),
                Cell::from(format!("{:.1}", o.composite_score)),
                Cell::from(flag).style(Style::default().fg(Color::Magenta)),
                Cell::from(format_pct(o.current.ev_percent)).style(Style::default().fg(Color::Cyan)),
                Cell::from(format!("{:+.1}", o.edge)),
                Cell::from(format_odds(o.current.odds)),
                Cell::from(trend_arrow(&o.trend.ev)).style(arrow_style(trend_arrow(&o.trend.ev))),
                Cell::from(trend_arrow(&o.trend.odds)).style(arrow_style(trend_arrow(&o.trend.odds))),
                Cell::from(truncate(event, 26)),
                Cell::from(truncate(&o.details.line, 18)),
                Cell::from(truncate(&o.current.sportsbook, 10)),
                Cell::from(format_time_to_event(o.time_to_event_secs)).style(bucket),
            ])
        })
        .collect();

    let title = format!(
        " RANKED OPPORTUNITIES ({} active) ",
        app.board.total_active
    );
    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Length(2),
            Constraint::Length(5),
            Constraint::Length(1),
            Constraint::Length(6),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Length(2),
            Constraint::Length(2),
            Constraint::Min(12),
            Constraint::Length(18),
            Constraint::Length(10),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(table, area, state);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("scroll  "),
        Span::styled("⚑ high EV for its grade  ", Style::default().fg(Color::Magenta)),
        Span::styled("auto-refresh: 2s", Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn grade_color(grade: &str) -> Color {
    match grade {
        "A" => Color::Green,
        "B" => Color::LightGreen,
        "C" => Color::Yellow,
        "D" => Color::LightRed,
        _ => Color::Red,
    }
}

/// Terminal colour for the bucket colour name served by the API.
fn bucket_color(name: &str) -> Color {
    match name {
        "red" => Color::Red,
        "orange" => Color::Rgb(255, 165, 0),
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "green" => Color::Green,
        _ => Color::White,
    }
}

fn arrow_style(arrow: &str) -> Style {
    let color = match arrow.chars().next() {
        Some('▲') => Color::Green,
        Some('▼') => Color::Red,
        _ => Color::DarkGray,
    };
    Style::default().fg(color)
}

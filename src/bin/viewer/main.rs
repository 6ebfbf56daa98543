mod app;

use std::io;
use std::time::Duration;

use app::{format_score, format_time_ns, format_year, truncate, AppState, ConnectionStatus};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};

const REFRESH_SECS: u64 = 5;

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
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut table_state = TableState::default();
    if !app.listings.is_empty() {
        table_state.select(Some(0));
    }

    let result = run_loop(&mut terminal, &mut app, &client, &mut table_state).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
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
    let refresh_interval = Duration::from_secs(REFRESH_SECS);
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
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh(client).await;
                            clamp_selection(app, table_state);
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            let max = app.listings.len().saturating_sub(1);
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
            clamp_selection(app, table_state);
            last_tick = std::time::Instant::now();
        }
    }
}

fn clamp_selection(app: &AppState, state: &mut TableState) {
    if app.listings.is_empty() {
        state.select(None);
    } else {
        let max = app.listings.len() - 1;
        state.select(Some(state.selected().map_or(0, |i| i.min(max))));
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, table_state: &mut TableState) {
    let area = f.area();

    // Outer vertical split: header | body | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_body(f, app, table_state, chunks[1]);
    render_footer(f, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected if app.health.digest_running => {
            ("◌ digest running".to_string(), Color::Yellow)
        }
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let mut spans = vec![
        Span::styled(
            " Tesla Finder  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
    ];

    match &app.run {
        Some(run) => {
            spans.extend([
                Span::raw("  │  "),
                Span::styled(
                    format!("{} listings", run.total_listings),
                    Style::default().fg(Color::White),
                ),
                Span::raw("  │  "),
                Span::styled(run.price_range.clone(), Style::default().fg(Color::White)),
                Span::raw("  │  "),
                Span::styled(
                    format_time_ns(run.analyzed_at),
                    Style::default().fg(Color::DarkGray),
                ),
            ]);
        }
        None => {
            spans.push(Span::raw("  │  "));
            spans.push(Span::styled("no digest yet", Style::default().fg(Color::DarkGray)));
        }
    }

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, table_state: &mut TableState, area: Rect) {
    // Horizontal split: ranked table (65%) | detail (35%)
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    render_listings_table(f, app, table_state, halves[0]);
    render_detail(f, app, table_state.selected(), halves[1]);
}

fn rating_color(rating: &str) -> Color {
    match rating {
        "Sweet Spot" => Color::Green,
        "Balanced" => Color::Yellow,
        "Outlier" => Color::Red,
        _ => Color::DarkGray,
    }
}

fn render_listings_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["#", "Title", "Price", "Year", "Mileage", "Rating", "Score"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .listings
        .iter()
        .map(|l| {
            let color = rating_color(&l.balance_rating);
            Row::new(vec![
                Cell::from(l.rank.to_string()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&l.title, 32)),
                Cell::from(l.price.clone()),
                Cell::from(format_year(l.year)),
                Cell::from(l.mileage.clone().unwrap_or_else(|| "—".to_string())),
                Cell::from(l.balance_rating.clone()).style(Style::default().fg(color)),
                Cell::from(format_score(l.composite_score)).style(Style::default().fg(color)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Min(12),
            Constraint::Length(14),
            Constraint::Length(5),
            Constraint::Length(12),
            Constraint::Length(11),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " RANKED LISTINGS ",
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

fn render_detail(f: &mut Frame, app: &AppState, selected: Option<usize>, area: Rect) {
    let label = |s: &'static str| Span::styled(s, Style::default().fg(Color::Yellow));
    let or_dash = |v: Option<&str>| v.unwrap_or("—").to_string();

    let lines: Vec<Line> = match app.selected_listing(selected) {
        Some(l) => vec![
            Line::from(Span::styled(
                l.title.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(vec![label("Price     "), Span::raw(l.price.clone())]),
            Line::from(vec![label("Year      "), Span::raw(format_year(l.year))]),
            Line::from(vec![label("Mileage   "), Span::raw(or_dash(l.mileage.as_deref()))]),
            Line::from(vec![label("Location  "), Span::raw(or_dash(l.location.as_deref()))]),
            Line::from(""),
            Line::from(vec![
                label("Rating    "),
                Span::styled(
                    l.balance_rating.clone(),
                    Style::default().fg(rating_color(&l.balance_rating)),
                ),
            ]),
            Line::from(vec![label("Score     "), Span::raw(format_score(l.composite_score))]),
            Line::from(vec![
                label("z p/y/m   "),
                Span::raw(format!("{:.2} / {:.2} / {:.2}", l.price_z, l.year_z, l.mileage_z)),
            ]),
            Line::from(""),
            Line::from(vec![label("URL       "), Span::raw(or_dash(l.url.as_deref()))]),
        ],
        None => match &app.run {
            Some(run) => vec![Line::from(run.summary.clone())],
            None => vec![Line::from(Span::styled(
                "Waiting for the first digest…",
                Style::default().fg(Color::DarkGray),
            ))],
        },
    };

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " DETAIL ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );

    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("scroll listings  "),
        Span::styled(
            format!("auto-refresh: {REFRESH_SECS}s"),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}

//! Widget layout and rendering for the dashboard.

use hedged_race::{Branch, LoserPolicy};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, Wrap},
};

use super::styles::*;
use crate::{app::App, sim::branch_label};

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let size = frame.area();

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(0),
            Constraint::Length(5),
        ])
        .split(size);

    let body_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main_layout[2]);

    draw_header(frame, main_layout[0]);
    draw_session_stats(frame, main_layout[1], app);
    draw_branch_table(frame, body_layout[0], app);
    draw_detail_panel(frame, body_layout[1], app);
    draw_keybinds(frame, main_layout[3]);
}

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .title(title)
        .title_style(panel_title_style())
        .borders(Borders::ALL)
        .border_style(border_style())
}

fn draw_header(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Hedged Race :: Live Dashboard ")
        .title_style(header_style())
        .borders(Borders::ALL)
        .border_style(border_style());

    frame.render_widget(block, area);
}

fn format_uptime(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

fn bar(percent: f64, width: usize) -> String {
    let filled = ((percent / 100.0) * width as f64) as usize;
    format!(
        "[{}{}]",
        "█".repeat(filled.min(width)),
        "░".repeat(width.saturating_sub(filled))
    )
}

fn draw_session_stats(frame: &mut Frame, area: Rect, app: &App) {
    let uptime_str = format_uptime(app.session_uptime().as_secs());
    let success_rate = app.success_rate();
    let hedge_rate = app.hedge_rate();

    let text = vec![
        Line::from(vec![
            Span::raw("Session: ").style(muted_style()),
            Span::raw(format!("Uptime: {uptime_str} ")).style(text_style()),
            Span::raw("│ ").style(muted_style()),
            Span::raw(format!("Races: {} ", app.total_calls)).style(text_style()),
            Span::raw("│ ").style(muted_style()),
            Span::raw(format!("Success: {} ", app.total_successes)).style(success_style()),
            Span::raw("│ ").style(muted_style()),
            Span::raw(format!("Errors: {}", app.total_errors)).style(if app.total_errors > 0 {
                error_style()
            } else {
                text_style()
            }),
        ]),
        Line::from(vec![
            Span::raw("Performance: ").style(muted_style()),
            Span::raw(format!("{:.1} races/s ", app.calls_per_second())).style(highlight_style()),
            Span::raw("│ ").style(muted_style()),
            Span::raw(format!("Avg Latency: {:.0}ms ", app.average_latency())).style(text_style()),
            Span::raw("│ ").style(muted_style()),
            Span::raw("Success: ").style(muted_style()),
            Span::raw(bar(success_rate, 12)).style(if success_rate > 95.0 {
                success_style()
            } else if success_rate > 80.0 {
                highlight_style()
            } else {
                error_style()
            }),
            Span::raw(format!(" {success_rate:.1}% ")).style(text_style()),
            Span::raw("│ ").style(muted_style()),
            Span::raw(format!("Hedged: {hedge_rate:.1}%")).style(branch_style(Branch::Hedge)),
        ]),
    ];

    let paragraph = Paragraph::new(text).block(panel(" Session Analytics "));
    frame.render_widget(paragraph, area);
}

fn draw_branch_table(frame: &mut Frame, area: Rect, app: &App) {
    let header_cells = ["Branch", "Wins", "Failed", "Avg ms", "Latency Trend", "Win Share"]
        .into_iter()
        .map(|h| Cell::from(h).style(table_header_style()));
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let counters = &app.counters;
    let resolved: u64 = [Branch::Primary, Branch::Hedge]
        .iter()
        .map(|b| counters.wins(*b) + counters.failures(*b))
        .sum();
    let cutoff_ms = app.current_cutoff_ms();

    let rows = [Branch::Primary, Branch::Hedge].into_iter().map(|branch| {
        let wins = counters.wins(branch);
        let failed = counters.failures(branch);
        let share = if resolved > 0 {
            (wins + failed) as f64 / resolved as f64 * 100.0
        } else {
            0.0
        };

        let history: Vec<u64> = app
            .latency_history
            .get(&branch)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default();
        let avg_ms = if history.is_empty() {
            0.0
        } else {
            history.iter().sum::<u64>() as f64 / history.len() as f64
        };

        let cells = vec![
            Cell::from(branch_label(branch)).style(branch_style(branch)),
            Cell::from(wins.to_string()).style(if wins > 0 {
                success_style()
            } else {
                Style::default()
            }),
            Cell::from(failed.to_string()).style(if failed > 0 {
                error_style()
            } else {
                Style::default()
            }),
            Cell::from(format!("{avg_ms:.1}")),
            Cell::from(create_mini_sparkline(&history)).style(latency_style(avg_ms, cutoff_ms)),
            Cell::from(format!("{} {share:.0}%", bar(share, 10))).style(branch_style(branch)),
        ];

        Row::new(cells).height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(9),
            Constraint::Length(6),
            Constraint::Length(7),
            Constraint::Length(8),
            Constraint::Length(14),
            Constraint::Min(18),
        ],
    )
    .header(header)
    .block(panel(" Winners by Branch "))
    .column_spacing(2);

    frame.render_widget(table, area);
}

fn create_mini_sparkline(data: &[u64]) -> String {
    if data.is_empty() {
        return "───────────".to_string();
    }

    let chars = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let recent = &data[data.len().saturating_sub(11)..];
    let max_val = recent.iter().copied().max().unwrap_or(1);
    let min_val = recent.iter().copied().min().unwrap_or(0);
    let range = (max_val - min_val).max(1);

    recent
        .iter()
        .map(|&val| {
            let level = ((val - min_val) as f64 / range as f64 * 7.0) as usize;
            chars[level.min(7)]
        })
        .collect()
}

fn draw_detail_panel(frame: &mut Frame, area: Rect, app: &App) {
    let mut constraints = vec![
        Constraint::Length(8),
        Constraint::Min(0),
        Constraint::Length(5),
    ];
    if app.batch_mode {
        constraints.insert(2, Constraint::Length(3));
    }

    let detail_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    draw_estimator_section(frame, detail_layout[0], app);
    draw_last_race_section(frame, detail_layout[1], app);

    if app.batch_mode {
        draw_batch_progress(frame, detail_layout[2], app);
        draw_workload_section(frame, detail_layout[3], app);
    } else {
        draw_workload_section(frame, detail_layout[2], app);
    }
}

fn draw_estimator_section(frame: &mut Frame, area: Rect, app: &App) {
    let cfg = app.engine.config();
    let window_line = match app.window_snapshot() {
        Some(snap) => format!(
            "{}/{} samples, avg {:.1} ms, {} errors",
            snap.samples,
            cfg.window_size,
            snap.average.as_secs_f64() * 1000.0,
            snap.errors
        ),
        None => "- (fixed cutoff)".to_string(),
    };
    let losers = match cfg.loser_policy {
        LoserPolicy::Abort => "abort".to_string(),
        LoserPolicy::Drain => format!("drain ({} discarded)", app.counters.discarded()),
    };

    let text = vec![
        Line::from(vec![
            Span::raw("Strategy: ").style(muted_style()),
            Span::raw(app.estimator_string()).style(highlight_style()),
        ]),
        Line::from(vec![
            Span::raw("Cutoff  : ").style(muted_style()),
            Span::raw(format!("{:.1} ms", app.current_cutoff_ms())).style(success_style()),
        ]),
        Line::from(vec![
            Span::raw("Window  : ").style(muted_style()),
            Span::raw(window_line).style(text_style()),
        ]),
        Line::from(vec![
            Span::raw("Hedges  : ").style(muted_style()),
            Span::raw(format!("max {} per race", cfg.max_hedges)).style(text_style()),
        ]),
        Line::from(vec![
            Span::raw("Losers  : ").style(muted_style()),
            Span::raw(losers).style(text_style()),
        ]),
    ];

    let paragraph = Paragraph::new(text)
        .block(panel("  Estimator "))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn draw_last_race_section(frame: &mut Frame, area: Rect, app: &App) {
    let winner = app
        .last_branch
        .map(|b| Span::raw(branch_label(b)).style(branch_style(b)))
        .unwrap_or_else(|| Span::raw("-").style(muted_style()));

    let latency = match (app.last_latency_ms, app.last_cutoff_ms) {
        (Some(ms), Some(cutoff)) => {
            Span::raw(format!("{ms:.1} ms (cutoff {cutoff:.1} ms)")).style(latency_style(ms, cutoff))
        }
        _ => Span::raw("-").style(muted_style()),
    };

    let text = vec![
        Line::from(vec![
            Span::raw("Result  : ").style(muted_style()),
            Span::raw(&app.last_message).style(text_style()),
        ]),
        Line::from(vec![Span::raw("Winner  : ").style(muted_style()), winner]),
        Line::from(vec![Span::raw("Latency : ").style(muted_style()), latency]),
    ];

    let paragraph = Paragraph::new(text)
        .block(panel("  Last Race "))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn draw_batch_progress(frame: &mut Frame, area: Rect, app: &App) {
    let progress = if app.batch_count > 0 {
        (app.batch_current as f64 / app.batch_count as f64 * 100.0) as u16
    } else {
        0
    };

    let gauge = Gauge::default()
        .block(panel("  Batch Progress "))
        .gauge_style(success_style())
        .percent(progress.min(100))
        .label(format!("{}/{}", app.batch_current, app.batch_count));

    frame.render_widget(gauge, area);
}

fn draw_workload_section(frame: &mut Frame, area: Rect, app: &App) {
    let w = &app.workload;
    let tail = if w.tail_enabled {
        Span::raw(format!("{}% at ~{} ms", w.tail_pct, w.tail_ms)).style(highlight_style())
    } else {
        Span::raw("off").style(muted_style())
    };

    let batch_status = if app.batch_mode {
        Span::raw(format!("ON ({}/{})", app.batch_current, app.batch_count)).style(success_style())
    } else {
        Span::raw(format!("OFF (count: {})", app.batch_count)).style(muted_style())
    };

    let text = vec![
        Line::from(vec![
            Span::raw("Latency : ").style(muted_style()),
            Span::raw(format!("{}-{} ms", w.base_ms, w.base_ms + w.jitter_ms)).style(text_style()),
            Span::raw("  │  Fail: ").style(muted_style()),
            Span::raw(format!("{}%", w.fail_pct)).style(text_style()),
        ]),
        Line::from(vec![Span::raw("Tail    : ").style(muted_style()), tail]),
        Line::from(vec![Span::raw("Batch   : ").style(muted_style()), batch_status]),
    ];

    let paragraph = Paragraph::new(text)
        .block(panel("  Workload "))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn draw_keybinds(frame: &mut Frame, area: Rect) {
    let keybinds = vec![
        Line::from(vec![
            Span::raw("  ").style(muted_style()),
            Span::raw("r").style(highlight_style()),
            Span::raw(" Run race  │  ").style(muted_style()),
            Span::raw("b").style(highlight_style()),
            Span::raw(" Toggle batch  │  ").style(muted_style()),
            Span::raw(",/.").style(highlight_style()),
            Span::raw(" Batch count  │  ").style(muted_style()),
            Span::raw("Tab").style(highlight_style()),
            Span::raw(" Fixed/Adaptive").style(muted_style()),
        ]),
        Line::from(vec![
            Span::raw("  ").style(muted_style()),
            Span::raw("t").style(highlight_style()),
            Span::raw(" Slow tail │  ").style(muted_style()),
            Span::raw("s").style(highlight_style()),
            Span::raw(" Reset stats   │  ").style(muted_style()),
            Span::raw("q").style(highlight_style()),
            Span::raw(" Quit").style(muted_style()),
        ]),
    ];

    let paragraph = Paragraph::new(keybinds)
        .block(panel("  Keybinds "))
        .alignment(Alignment::Left);
    frame.render_widget(paragraph, area);
}

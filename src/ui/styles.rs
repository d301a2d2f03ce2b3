//! Colors and text styles for the dashboard.

use hedged_race::Branch;
use ratatui::prelude::*;

pub const HEADER_BG: Color = Color::Rgb(30, 30, 46);
pub const HEADER_FG: Color = Color::Rgb(180, 190, 254);

pub const TABLE_HEADER_FG: Color = Color::Rgb(137, 180, 250);

pub const PRIMARY_COLOR: Color = Color::Rgb(148, 226, 213);
pub const HEDGE_COLOR: Color = Color::Rgb(203, 166, 247);

pub const SUCCESS_COLOR: Color = Color::Rgb(166, 227, 161);
pub const ERROR_COLOR: Color = Color::Rgb(243, 139, 168);
pub const WARNING_COLOR: Color = Color::Rgb(249, 226, 175);

pub const BORDER_COLOR: Color = Color::Rgb(69, 71, 90);
pub const TEXT_COLOR: Color = Color::Rgb(205, 214, 244);
pub const MUTED_COLOR: Color = Color::Rgb(127, 132, 156);

pub fn header_style() -> Style {
    Style::default()
        .bg(HEADER_BG)
        .fg(HEADER_FG)
        .add_modifier(Modifier::BOLD)
}

pub fn table_header_style() -> Style {
    Style::default()
        .fg(TABLE_HEADER_FG)
        .add_modifier(Modifier::BOLD)
}

pub fn panel_title_style() -> Style {
    Style::default().fg(TEXT_COLOR).add_modifier(Modifier::BOLD)
}

pub fn text_style() -> Style {
    Style::default().fg(TEXT_COLOR)
}

pub fn border_style() -> Style {
    Style::default().fg(BORDER_COLOR)
}

pub fn branch_style(branch: Branch) -> Style {
    let color = match branch {
        Branch::Primary => PRIMARY_COLOR,
        Branch::Hedge => HEDGE_COLOR,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

pub fn success_style() -> Style {
    Style::default()
        .fg(SUCCESS_COLOR)
        .add_modifier(Modifier::BOLD)
}

pub fn error_style() -> Style {
    Style::default()
        .fg(ERROR_COLOR)
        .add_modifier(Modifier::BOLD)
}

pub fn highlight_style() -> Style {
    Style::default()
        .fg(WARNING_COLOR)
        .add_modifier(Modifier::BOLD)
}

pub fn muted_style() -> Style {
    Style::default().fg(MUTED_COLOR)
}

/// Green below the cutoff, yellow up to twice the cutoff, red beyond.
pub fn latency_style(latency_ms: f64, cutoff_ms: f64) -> Style {
    if latency_ms <= cutoff_ms {
        success_style()
    } else if latency_ms <= cutoff_ms * 2.0 {
        highlight_style()
    } else {
        error_style()
    }
}

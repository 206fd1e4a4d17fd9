//! Counters panel plus the one-line failure notification.

use perfhub::types::Metrics;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::ui::util::{fmt_rate, fmt_uptime};

pub struct StatsView {
    pub metrics: Metrics,
    pub received: u64,
    pub rate: Option<f64>,
}

pub fn draw_stats(f: &mut ratatui::Frame<'_>, area: Rect, v: &StatsView) {
    let row = |k: &'static str, val: String| {
        Line::from(vec![
            Span::styled(format!("{k:<20}"), Style::default().fg(Color::Gray)),
            Span::styled(val, Style::default().add_modifier(Modifier::BOLD)),
        ])
    };
    let lines = vec![
        row(
            "Available memory",
            format!("{:.2} GB", v.metrics.available_memory_gb),
        ),
        row("Processes", v.metrics.total_processes.to_string()),
        row("Agent uptime", fmt_uptime(v.metrics.system_uptime_sec)),
        row("Messages received", v.received.to_string()),
        row("Message rate", fmt_rate(v.rate)),
    ];
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Stats")),
        area,
    );
}

pub fn draw_notification(f: &mut ratatui::Frame<'_>, area: Rect, note: Option<&str>) {
    let line = match note {
        Some(text) => Line::from(Span::styled(
            text.to_string(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        None => Line::from(""),
    };
    f.render_widget(Paragraph::new(line), area);
}

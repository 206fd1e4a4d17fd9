//! CPU history sparkline + current usage gauge.

use std::collections::VecDeque;

use perfhub::types::Metrics;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Gauge, Sparkline},
};

use crate::ui::util::load_color;

pub fn draw_cpu(f: &mut ratatui::Frame<'_>, area: Rect, hist: &VecDeque<u64>, m: &Metrics) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let max_points = rows[0].width.saturating_sub(2) as usize;
    let start = hist.len().saturating_sub(max_points);
    let data: Vec<u64> = hist.iter().skip(start).copied().collect();
    let spark = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title("CPU history"))
        .data(&data)
        .max(100)
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(spark, rows[0]);

    let g = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("CPU"))
        .gauge_style(Style::default().fg(load_color(m.cpu_usage)))
        .ratio((m.cpu_usage / 100.0).clamp(0.0, 1.0))
        .label(format!("{:.1}%", m.cpu_usage));
    f.render_widget(g, rows[1]);
}

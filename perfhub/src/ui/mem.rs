//! Memory gauge.

use perfhub::types::Metrics;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Gauge},
};

pub fn draw_mem(f: &mut ratatui::Frame<'_>, area: Rect, m: &Metrics) {
    let g = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Memory"))
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio((m.memory_usage / 100.0).clamp(0.0, 1.0))
        .label(format!(
            "{:.1}% used | {:.2} GB available",
            m.memory_usage, m.available_memory_gb
        ));
    f.render_widget(g, area);
}

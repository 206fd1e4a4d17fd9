//! Top header: server, active transport and key hints.

use perfhub::session::TransportKind;
use ratatui::{
    layout::Rect,
    widgets::{Block, Borders},
};

pub fn draw_header(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    server: &str,
    active: Option<TransportKind>,
    connecting: Option<TransportKind>,
) {
    let transport = transport_label(active, connecting);
    let title = format!(
        "perfhub | {server} | transport: {transport} | [w] WebSocket [l] Long Polling [f] Frequent Polls [q] quit"
    );
    f.render_widget(Block::default().title(title).borders(Borders::BOTTOM), area);
}

fn transport_label(active: Option<TransportKind>, connecting: Option<TransportKind>) -> String {
    match (connecting, active) {
        (Some(kind), _) => format!("{} (connecting…)", kind.label()),
        (None, Some(kind)) => kind.label().to_string(),
        (None, None) => "disconnected".to_string(),
    }
}

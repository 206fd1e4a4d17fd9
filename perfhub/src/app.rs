//! App state and main loop: input handling, history and drawing. Transport
//! work happens on the controller task; the loop only reads its view.

use std::{collections::VecDeque, io, time::Duration};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use perfhub::controller::{TransportController, View};
use perfhub::session::TransportKind;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::time::sleep;

use crate::history::push_capped;
use crate::ui::{
    cpu::draw_cpu,
    header::draw_header,
    mem::draw_mem,
    stats::{draw_notification, draw_stats, StatsView},
};

const CPU_HISTORY: usize = 600;
const FRAME: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

enum Input {
    Quit,
    Select(TransportKind),
}

pub struct App {
    controller: Option<TransportController>,
    server: String,
    view: View,
    cpu_hist: VecDeque<u64>,
    should_quit: bool,
}

impl App {
    pub fn new(controller: TransportController, server: String) -> Self {
        Self {
            controller: Some(controller),
            server,
            view: View::default(),
            cpu_hist: VecDeque::with_capacity(CPU_HISTORY),
            should_quit: false,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        // Terminal setup
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        self.request(TransportKind::WebSocket);
        let res = self.event_loop(&mut terminal).await;

        // Teardown
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        // No session may outlive the process.
        if let Some(controller) = self.controller.take() {
            controller.shutdown(SHUTDOWN_GRACE).await;
        }
        res
    }

    async fn event_loop<B: ratatui::backend::Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
    ) -> anyhow::Result<()> {
        loop {
            // Input (non-blocking)
            while event::poll(Duration::from_millis(10))? {
                if let Event::Key(k) = event::read()? {
                    match map_key(k) {
                        Some(Input::Quit) => self.should_quit = true,
                        Some(Input::Select(kind)) => self.request(kind),
                        None => {}
                    }
                }
            }
            if self.should_quit {
                break;
            }

            if let Some(view) = self.controller.as_ref().map(TransportController::view) {
                self.update(view);
            }

            terminal.draw(|f| self.draw(f))?;
            sleep(FRAME).await;
        }
        Ok(())
    }

    fn request(&mut self, kind: TransportKind) {
        if self.view.active == Some(kind) {
            return;
        }
        if let Some(controller) = &self.controller {
            controller.request(kind);
        }
    }

    /// Takes the latest published view, restarting the history on a switch.
    fn update(&mut self, view: View) {
        if view.active != self.view.active || view.connecting.is_some() {
            self.cpu_hist.clear();
        }
        let fresh = view.received != self.view.received;
        if fresh && view.connecting.is_none() && view.active.is_some() {
            let v = view.metrics.cpu_usage.clamp(0.0, 100.0).round() as u64;
            push_capped(&mut self.cpu_hist, v, CPU_HISTORY);
        }
        self.view = view;
    }

    fn draw(&self, f: &mut ratatui::Frame<'_>) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // header
                Constraint::Min(8),    // cpu history + gauge
                Constraint::Length(3), // memory
                Constraint::Length(7), // stats
                Constraint::Length(1), // notification
            ])
            .split(f.area());

        let v = &self.view;
        draw_header(f, rows[0], &self.server, v.active, v.connecting);
        draw_cpu(f, rows[1], &self.cpu_hist, &v.metrics);
        draw_mem(f, rows[2], &v.metrics);
        draw_stats(
            f,
            rows[3],
            &StatsView {
                metrics: v.metrics,
                received: v.received,
                rate: v.rate,
            },
        );
        draw_notification(f, rows[4], v.notification.as_deref());
    }
}

fn map_key(k: KeyEvent) -> Option<Input> {
    if k.kind != KeyEventKind::Press {
        return None;
    }
    match k.code {
        KeyCode::Char('c') if k.modifiers.contains(KeyModifiers::CONTROL) => Some(Input::Quit),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Input::Quit),
        KeyCode::Char('w') | KeyCode::Char('W') => Some(Input::Select(TransportKind::WebSocket)),
        KeyCode::Char('l') | KeyCode::Char('L') => Some(Input::Select(TransportKind::LongPolling)),
        KeyCode::Char('f') | KeyCode::Char('F') => {
            Some(Input::Select(TransportKind::FrequentPolls))
        }
        _ => None,
    }
}

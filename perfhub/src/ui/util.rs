//! Small UI helpers: duration and rate formatting, load colors.

use ratatui::style::Color;

pub fn fmt_uptime(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

pub fn fmt_rate(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{r:.2} msg/s"),
        None => "n/a".into(),
    }
}

pub fn load_color(pct: f64) -> Color {
    match pct {
        x if x < 25.0 => Color::Green,
        x if x < 60.0 => Color::Yellow,
        _ => Color::Red,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats() {
        assert_eq!(fmt_uptime(0.4), "0s");
        assert_eq!(fmt_uptime(75.0), "1m 15s");
        assert_eq!(fmt_uptime(3723.9), "1h 02m 03s");
    }

    #[test]
    fn rate_formats() {
        assert_eq!(fmt_rate(None), "n/a");
        assert_eq!(fmt_rate(Some(1.0)), "1.00 msg/s");
    }
}

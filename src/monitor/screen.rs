use std::io;

use chrono::{DateTime, Local};

use super::display::{Display, WIDTH};

/// Layout of the status page: header, separator, then log lines.
#[derive(Debug, Clone, Copy)]
pub struct StatusScreen {
    pub header_y: u32,
    pub rule_y: u32,
    pub first_line_y: u32,
    pub line_step: u32,
}

impl Default for StatusScreen {
    fn default() -> Self {
        Self {
            header_y: 0,
            rule_y: 14,
            first_line_y: 16,
            line_step: 10,
        }
    }
}

impl StatusScreen {
    pub fn header(clock: &DateTime<Local>, cpu: f64) -> String {
        format!("Time: {} CPU: {:.1}%", clock.format("%H:%M"), cpu)
    }

    pub fn render<D: Display>(&self, display: &mut D, clock: &DateTime<Local>, cpu: f64, logs: &[String]) -> io::Result<()> {
        display.clear();
        display.draw_text(0, self.header_y, &Self::header(clock, cpu));
        display.hline(0, WIDTH - 1, self.rule_y);
        for (i, line) in logs.iter().enumerate() {
            display.draw_text(0, self.first_line_y + self.line_step * i as u32, line);
        }
        display.flush()
    }
}

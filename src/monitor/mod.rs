/**
 * Host status monitor
 *
 * Shows the clock, CPU usage and the tail of the kernel log on a 128x64
 * monochrome panel, refreshed on a fixed interval.
 */

pub mod cpu;
pub mod display;
pub mod klog;
pub mod screen;
pub mod wrap;

use std::io;

use chrono::Local;
use tracing::warn;

pub use cpu::{CpuError, CpuSample};
pub use display::{Display, TextDisplay};
pub use klog::{KernelLog, KernelLogError};
pub use screen::StatusScreen;
pub use wrap::wrap_text;

use crate::config::MonitorConfig;

pub struct Monitor<D: Display> {
    display: D,
    screen: StatusScreen,
    log: KernelLog,
    last_sample: Option<CpuSample>,
}

impl<D: Display> Monitor<D> {
    pub fn new(display: D, cfg: &MonitorConfig) -> Self {
        Self {
            display,
            screen: StatusScreen::default(),
            log: KernelLog::new(cfg),
            last_sample: None,
        }
    }

    /// Usage since boot for the first sample, then over each refresh interval.
    pub fn cpu_percent(&mut self, sample: CpuSample) -> f64 {
        let usage = match &self.last_sample {
            Some(prev) => CpuSample::usage_between(prev, &sample),
            None => sample.usage_since_boot(),
        };
        self.last_sample = Some(sample);
        usage
    }

    /// One frame: sample CPU, fetch logs, draw.
    pub fn refresh(&mut self) -> io::Result<()> {
        let cpu = match CpuSample::read() {
            Ok(sample) => self.cpu_percent(sample),
            Err(e) => {
                warn!(error = %e, "cpu usage unavailable");
                0.0
            }
        };
        let logs = self.log.fetch();
        self.screen.render(&mut self.display, &Local::now(), cpu, &logs)
    }

    /// Blanks the panel.
    pub fn clear(&mut self) -> io::Result<()> {
        self.display.clear();
        self.display.flush()
    }

    pub fn into_display(self) -> D {
        self.display
    }
}

/**
 * Operator command loop
 *
 * Each cycle drains whatever the board has sent, then blocks for one
 * operator line and dispatches it. Board output is handled between operator
 * lines, so a batch that arrives while the operator is idle is picked up at
 * the start of the next cycle. `send` is the only command that waits for the
 * board, bounded by the send timeout.
 */

pub mod operator;
pub mod report;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::batch::MeasurementBatch;
use crate::config::ReceiverConfig;
use crate::link::protocol::{Command, DeviceMessage, DeviceStatus};
use crate::link::{Link, Poll};
use crate::persist;
use crate::plot::Plotter;
use crate::session::SessionStore;

pub use operator::{LineOperator, Operator, OperatorCommand};

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("operator input failed: {0}")]
    Input(#[source] io::Error),

    #[error("console output failed: {0}")]
    Output(#[from] io::Error),
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Exit,
    EndOfInput,
    Interrupted,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    pub send_timeout: Duration,
    pub poll_interval: Duration,
    /// Pause at the end of each cycle.
    pub idle_delay: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self::from(&ReceiverConfig::default())
    }
}

impl From<&ReceiverConfig> for LoopTiming {
    fn from(cfg: &ReceiverConfig) -> Self {
        Self {
            send_timeout: cfg.send_timeout(),
            poll_interval: cfg.poll_interval(),
            idle_delay: cfg.idle_delay(),
        }
    }
}

pub struct CommandLoop<W: Write> {
    link: Link,
    store: SessionStore,
    output_dir: PathBuf,
    plotter: Option<Plotter>,
    timing: LoopTiming,
    interrupted: Arc<AtomicBool>,
    out: W,
}

impl<W: Write> CommandLoop<W> {
    pub fn new(link: Link, output_dir: PathBuf, plotter: Option<Plotter>, timing: LoopTiming, out: W) -> Self {
        Self {
            link,
            store: SessionStore::new(),
            output_dir,
            plotter,
            timing,
            interrupted: Arc::new(AtomicBool::new(false)),
            out,
        }
    }

    /// Shares an interrupt flag, typically set from a signal handler.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Runs until exit, end of input or interrupt. The link is closed on
    /// every path, including errors; reporting an error is left to the caller.
    pub fn run<O: Operator>(&mut self, operator: &mut O) -> Result<LoopExit, LoopError> {
        let outcome = self.cycle(operator);

        if self.link.close() {
            let _ = writeln!(self.out, "Connection to {} closed", self.link.name());
        }
        if let Ok(reason) = &outcome {
            info!(?reason, sessions = self.store.len(), "command loop finished");
        }
        outcome
    }

    fn cycle<O: Operator>(&mut self, operator: &mut O) -> Result<LoopExit, LoopError> {
        loop {
            if self.is_interrupted() {
                return Ok(LoopExit::Interrupted);
            }

            self.drain_link()?;

            write!(self.out, "\n> ")?;
            self.out.flush()?;
            let line = match operator.read_line().map_err(LoopError::Input)? {
                Some(line) => line,
                None => {
                    writeln!(self.out, "\nEnd of input, shutting down")?;
                    return Ok(LoopExit::EndOfInput);
                }
            };
            if self.is_interrupted() {
                return Ok(LoopExit::Interrupted);
            }

            if let Some(reason) = self.dispatch(OperatorCommand::parse(&line))? {
                return Ok(reason);
            }

            thread::sleep(self.timing.idle_delay);
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn dispatch(&mut self, command: OperatorCommand) -> Result<Option<LoopExit>, LoopError> {
        match command {
            OperatorCommand::Start => {
                self.forward(Command::Start)?;
            }
            OperatorCommand::Status => {
                self.forward(Command::Status)?;
            }
            OperatorCommand::Reset => {
                self.forward(Command::Reset)?;
            }
            OperatorCommand::Send => {
                if self.forward(Command::Send)? {
                    self.await_batch()?;
                }
            }
            OperatorCommand::Summary => self.summary()?,
            OperatorCommand::Save => self.save()?,
            OperatorCommand::Plot => self.replot()?,
            OperatorCommand::Help => report::print_help(&mut self.out)?,
            OperatorCommand::Exit => {
                writeln!(self.out, "Shutting down...")?;
                return Ok(Some(LoopExit::Exit));
            }
            OperatorCommand::Empty => {}
            OperatorCommand::Unknown(word) => {
                writeln!(self.out, "Unknown command '{}', type 'help' for the list", word)?;
            }
        }
        Ok(None)
    }

    fn forward(&mut self, command: Command) -> Result<bool, LoopError> {
        if self.link.send_command(command) {
            writeln!(self.out, "Sent {}", command.keyword())?;
            Ok(true)
        } else {
            writeln!(self.out, "Could not send {} to the board", command.keyword())?;
            Ok(false)
        }
    }

    //poll until a batch lands, the deadline passes or an interrupt arrives
    fn await_batch(&mut self) -> Result<(), LoopError> {
        let timeout = self.timing.send_timeout;
        let deadline = Instant::now() + timeout;
        writeln!(self.out, "Waiting up to {:.1} s for data...", timeout.as_secs_f64())?;

        loop {
            if self.drain_link()? > 0 {
                return Ok(());
            }
            if self.is_interrupted() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(timeout_ms = timeout.as_millis() as u64, "no batch after SEND");
                writeln!(self.out, "No data received within {:.1} s", timeout.as_secs_f64())?;
                return Ok(());
            }
            thread::sleep(self.timing.poll_interval.min(deadline - now));
        }
    }

    /// Handles every complete line the board has sent; returns the number of
    /// batches ingested.
    fn drain_link(&mut self) -> Result<usize, LoopError> {
        let mut batches = 0;
        loop {
            match self.link.try_read_message() {
                Poll::Idle => return Ok(batches),
                Poll::Skipped(_) => continue,
                Poll::Message(object) => {
                    if self.handle_message(DeviceMessage::route(object))? {
                        batches += 1;
                    }
                }
            }
        }
    }

    fn handle_message(&mut self, message: DeviceMessage) -> Result<bool, LoopError> {
        match message {
            DeviceMessage::Batch(batch) => {
                self.ingest(batch)?;
                return Ok(true);
            }
            DeviceMessage::Status { status, message } => {
                let detail = message.as_deref().unwrap_or("");
                writeln!(self.out, "[board] {} {}", status.as_str(), detail)?;
                match status {
                    DeviceStatus::DataReady => {
                        writeln!(self.out, "Data ready, type 'send' to fetch it")?;
                    }
                    DeviceStatus::Error => warn!(detail, "board reported an error"),
                    _ => debug!(status = status.as_str(), "board status"),
                }
            }
            DeviceMessage::Malformed(e) => {
                warn!(error = %e, "discarding batch");
                writeln!(self.out, "Discarded batch: {}", e)?;
            }
            DeviceMessage::Unrecognized(object) => {
                let keys: Vec<&str> = object.keys().map(String::as_str).collect();
                info!(?keys, "message with no known shape ignored");
            }
        }
        Ok(false)
    }

    fn ingest(&mut self, batch: MeasurementBatch) -> Result<(), LoopError> {
        let received_at = Local::now();
        if let Some(problem) = batch.length_mismatch() {
            warn!(session = %batch.session_id, "{}", problem);
        }

        let entry = self.store.append(batch, received_at);
        let batch = &entry.batch;
        report::print_batch(&mut self.out, batch, &received_at)?;

        match persist::write_json(batch, &self.output_dir, &received_at) {
            Ok(path) => writeln!(self.out, "Saved {}", path.display())?,
            Err(e) => {
                error!(error = %e, "could not save batch");
                writeln!(self.out, "Could not save batch: {}", e)?;
            }
        }
        match persist::write_table(batch, &self.output_dir, &received_at) {
            Ok(Some(path)) => writeln!(self.out, "Saved {}", path.display())?,
            Ok(None) => writeln!(self.out, "Batch incomplete, no table written")?,
            Err(e) => {
                error!(error = %e, "could not save table");
                writeln!(self.out, "Could not save table: {}", e)?;
            }
        }
        if let Some(plotter) = &self.plotter {
            match plotter.render_batch(batch, &self.output_dir, &received_at) {
                Ok(path) => writeln!(self.out, "Chart {}", path.display())?,
                Err(e) => {
                    error!(error = %e, "could not draw batch");
                    writeln!(self.out, "Could not draw charts: {}", e)?;
                }
            }
        }
        Ok(())
    }

    fn summary(&mut self) -> Result<(), LoopError> {
        if self.store.is_empty() {
            writeln!(self.out, "No sessions received yet")?;
            return Ok(());
        }
        report::print_sessions(&mut self.out, &self.store)?;

        if let Some(plotter) = &self.plotter {
            match plotter.render_summary(self.store.all(), &self.output_dir, &Local::now()) {
                Ok(Some(path)) => writeln!(self.out, "Summary chart {}", path.display())?,
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "could not draw summary");
                    writeln!(self.out, "Could not draw summary: {}", e)?;
                }
            }
        }
        Ok(())
    }

    fn save(&mut self) -> Result<(), LoopError> {
        match persist::write_sessions(&self.store, &self.output_dir, &Local::now()) {
            Ok(Some(path)) => writeln!(self.out, "All {} session(s) saved to {}", self.store.len(), path.display())?,
            Ok(None) => writeln!(self.out, "No sessions to save")?,
            Err(e) => {
                error!(error = %e, "could not save sessions");
                writeln!(self.out, "Could not save sessions: {}", e)?;
            }
        }
        Ok(())
    }

    fn replot(&mut self) -> Result<(), LoopError> {
        let Some(plotter) = &self.plotter else {
            writeln!(self.out, "Charts are disabled")?;
            return Ok(());
        };
        let Some(entry) = self.store.latest() else {
            writeln!(self.out, "No batch to plot yet")?;
            return Ok(());
        };
        match plotter.render_batch(&entry.batch, &self.output_dir, &Local::now()) {
            Ok(path) => writeln!(self.out, "Chart {}", path.display())?,
            Err(e) => {
                error!(error = %e, "could not draw batch");
                writeln!(self.out, "Could not draw charts: {}", e)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::{MockHandle, MockPort};
    use crate::plot::{summary_series, PlotSettings};
    use std::fs;
    use std::io::{Cursor, Read};

    const LATENCY_BATCH: &str = r#"{"session_id":7,"groups_count":2,"measurements_per_group":100,"avg_latency_us":[12.5,13.0],"rms_latency_us":[1.0,1.5],"avg_jitter_us":[0.5,0.75],"rms_jitter_us":[0.25,0.5],"statistics":{"latency":{"overall_avg_us":12.75,"overall_rms_us":1.25},"jitter":{"overall_avg_us":0.625}}}"#;

    fn fast_timing() -> LoopTiming {
        LoopTiming {
            send_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            idle_delay: Duration::ZERO,
        }
    }

    fn command_loop(dir: &Path, plots: bool) -> (CommandLoop<Vec<u8>>, MockHandle) {
        let (port, handle) = MockPort::new();
        let link = Link::from_port("mock0", Box::new(port));
        let plotter = plots.then(|| Plotter::new(PlotSettings::default()));
        let lp = CommandLoop::new(link, dir.join("out"), plotter, fast_timing(), Vec::new());
        (lp, handle)
    }

    fn text(lp: &CommandLoop<Vec<u8>>) -> String {
        String::from_utf8_lossy(lp.output()).into_owned()
    }

    fn files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_data_ready_prints_hint_only() {
        let dir = tempfile::tempdir().unwrap();
        let (mut lp, handle) = command_loop(dir.path(), true);
        handle.feed_line(r#"{"status":"data_ready","message":"ready"}"#);

        let mut op = LineOperator::new(Cursor::new("exit\n"));
        assert_eq!(lp.run(&mut op).unwrap(), LoopExit::Exit);

        let out = text(&lp);
        assert!(out.contains("[board] data_ready ready"));
        assert!(out.contains("type 'send'"));
        assert!(lp.store().is_empty());
        assert!(!lp.output_dir().exists());
    }

    #[test]
    fn test_send_timeout_keeps_looping() {
        let dir = tempfile::tempdir().unwrap();
        let (mut lp, handle) = command_loop(dir.path(), false);

        let mut op = LineOperator::new(Cursor::new("send\nstatus\nexit\n"));
        assert_eq!(lp.run(&mut op).unwrap(), LoopExit::Exit);

        assert!(text(&lp).contains("No data received within 0.2 s"));
        assert_eq!(handle.written_text(), "SEND\nSTATUS\n");
        assert!(lp.store().is_empty());
    }

    #[test]
    fn test_send_ingests_reply() {
        let dir = tempfile::tempdir().unwrap();
        let (mut lp, handle) = command_loop(dir.path(), true);
        handle.respond("SEND", r#"{"status":"sending"}"#);
        handle.respond("SEND", LATENCY_BATCH);

        let mut op = LineOperator::new(Cursor::new("send\nexit\n"));
        lp.run(&mut op).unwrap();

        assert_eq!(lp.store().len(), 1);
        assert_eq!(lp.store().all()[0].session_id(), "7");
        let out = text(&lp);
        assert!(out.contains("[board] sending"));
        assert!(out.contains("SESSION: 7"));
        assert!(!out.contains("No data received"));

        let names = files(lp.output_dir());
        assert_eq!(names.len(), 3, "{:?}", names);
        assert!(names.iter().any(|n| n.starts_with("latency_session_7_") && n.ends_with(".png")));
        assert!(names.iter().any(|n| n.starts_with("session_7_") && n.ends_with(".csv")));
        assert!(names.iter().any(|n| n.starts_with("session_7_") && n.ends_with(".json")));
    }

    #[test]
    fn test_exit_closes_once_and_stops_reading() {
        let dir = tempfile::tempdir().unwrap();
        let (mut lp, handle) = command_loop(dir.path(), false);

        let mut op = LineOperator::new(Cursor::new("exit\nstart\n"));
        assert_eq!(lp.run(&mut op).unwrap(), LoopExit::Exit);
        assert!(!lp.link().is_open());
        assert_eq!(handle.drops(), 1);
        assert!(handle.written().is_empty());
        assert!(text(&lp).contains("Connection to mock0 closed"));

        drop(lp);
        assert_eq!(handle.drops(), 1);

        let mut rest = String::new();
        op.into_inner().read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "start\n");
    }

    #[test]
    fn test_end_of_input_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let (mut lp, handle) = command_loop(dir.path(), false);

        let mut op = LineOperator::new(Cursor::new("start\n"));
        assert_eq!(lp.run(&mut op).unwrap(), LoopExit::EndOfInput);
        assert_eq!(handle.written_text(), "START\n");
        assert_eq!(handle.drops(), 1);
    }

    #[test]
    fn test_interrupt_stops_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let (lp, handle) = command_loop(dir.path(), false);
        let flag = Arc::new(AtomicBool::new(true));
        let mut lp = lp.with_interrupt(Arc::clone(&flag));

        let mut op = LineOperator::new(Cursor::new("start\n"));
        assert_eq!(lp.run(&mut op).unwrap(), LoopExit::Interrupted);
        assert!(handle.written().is_empty());
        assert_eq!(handle.drops(), 1);
    }

    #[test]
    fn test_same_session_twice_gives_two_series() {
        let dir = tempfile::tempdir().unwrap();
        let (mut lp, handle) = command_loop(dir.path(), true);
        handle.feed_line(LATENCY_BATCH);
        handle.feed_line(LATENCY_BATCH);

        let mut op = LineOperator::new(Cursor::new("summary\nexit\n"));
        lp.run(&mut op).unwrap();

        assert_eq!(lp.store().len(), 2);
        assert_eq!(summary_series(lp.store().all()).len(), 2);
        let out = text(&lp);
        assert!(out.contains("2 session(s) received"));
        assert!(out.contains("Summary chart"));
        assert!(files(lp.output_dir()).iter().any(|n| n.starts_with("summary_")));
    }

    #[test]
    fn test_malformed_lines_do_not_block_next_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (mut lp, handle) = command_loop(dir.path(), false);
        handle.feed(b"\xff\xfe not utf8\n");
        handle.feed_line("{not json");
        handle.feed_line("[1,2,3]");
        handle.feed_line(LATENCY_BATCH);

        let mut op = LineOperator::new(Cursor::new("exit\n"));
        lp.run(&mut op).unwrap();
        assert_eq!(lp.store().len(), 1);
    }

    #[test]
    fn test_operator_commands() {
        let dir = tempfile::tempdir().unwrap();
        let (mut lp, handle) = command_loop(dir.path(), false);

        let script = "\nfly\nHELP\nsummary\nsave\nplot\nreset\nquit\n";
        let mut op = LineOperator::new(Cursor::new(script));
        assert_eq!(lp.run(&mut op).unwrap(), LoopExit::Exit);

        let out = text(&lp);
        assert!(out.contains("Unknown command 'fly'"));
        assert!(out.contains("[Commands]"));
        assert!(out.contains("No sessions received yet"));
        assert!(out.contains("No sessions to save"));
        assert!(out.contains("Charts are disabled"));
        assert_eq!(handle.written_text(), "RESET\n");
    }

    #[test]
    fn test_save_writes_all_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut lp, handle) = command_loop(dir.path(), false);
        handle.feed_line(LATENCY_BATCH);

        let mut op = LineOperator::new(Cursor::new("save\nexit\n"));
        lp.run(&mut op).unwrap();

        assert!(text(&lp).contains("All 1 session(s) saved"));
        assert!(files(lp.output_dir()).iter().any(|n| n.starts_with("all_sessions_")));
    }

    #[test]
    fn test_start_status_reset_are_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let (mut lp, handle) = command_loop(dir.path(), false);

        let mut op = LineOperator::new(Cursor::new("start
status
reset
exit
"));
        assert_eq!(lp.run(&mut op).unwrap(), LoopExit::Exit);

        assert_eq!(handle.written_text(), "START\nSTATUS\nRESET\n");
        let out = text(&lp);
        assert!(out.contains("Sent START"));
        assert!(out.contains("Sent STATUS"));
        assert!(out.contains("Sent RESET"));
    }

    struct BrokenConsole;

    impl Write for BrokenConsole {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "console gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_output_failure_returns_error_and_closes_link() {
        let (port, handle) = MockPort::new();
        let link = Link::from_port("mock0", Box::new(port));
        let dir = tempfile::tempdir().unwrap();
        let mut lp = CommandLoop::new(link, dir.path().to_path_buf(), None, fast_timing(), BrokenConsole);

        let mut op = LineOperator::new(Cursor::new("start\n"));
        let err = lp.run(&mut op).unwrap_err();
        assert!(matches!(err, LoopError::Output(_)));
        assert!(!lp.link().is_open());
        assert_eq!(handle.drops(), 1);
        assert!(handle.written().is_empty());
    }
}

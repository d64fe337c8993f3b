use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;
use crate::config::MonitorConfig;
use super::wrap::wrap_text;

pub const TIMEOUT_LINE: &str = "Logs timeout";
pub const EMPTY_LINE: &str = "No kernel messages";
const ERROR_DETAIL_CHARS: usize = 20;
const WAIT_STEP: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum KernelLogError{
    #[error("failed to run {command}: {source}")]
    Spawn{
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{command} did not finish within {timeout:?}")]
    Timeout{ command: String, timeout: Duration },

    #[error("{command} failed with {status}")]
    Failed{ command: String, status: ExitStatus },

    #[error("failed waiting for {command}: {source}")]
    Wait{
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Recent kernel messages, trimmed and wrapped for a small screen.
#[derive(Debug, Clone)]
pub struct KernelLog{
    command: String,
    args: Vec<String>,
    timeout: Duration,
    raw_lines: usize,
    width: usize,
    max_lines: usize,
}

impl KernelLog{
    pub fn new(cfg: &MonitorConfig) -> Self{
        KernelLog{
            command: cfg.log_command.clone(),
            args: cfg.log_args.clone(),
            timeout: cfg.log_timeout(),
            raw_lines: cfg.raw_lines,
            width: cfg.wrap_width,
            max_lines: cfg.max_lines,
        }
    }

    /// Display lines; failures are reported as a single line.
    pub fn fetch(&self) -> Vec<String>{
        match self.run(){
            Ok(raw) => process_output(&raw, self.raw_lines, self.width, self.max_lines),
            Err(KernelLogError::Timeout{ .. }) =>{
                warn!(command = %self.command, "kernel log timed out");
                vec![TIMEOUT_LINE.to_string()]
            }
            Err(e) =>{
                warn!(error = %e, "kernel log unavailable");
                let detail: String = e.to_string().chars().take(ERROR_DETAIL_CHARS).collect();
                vec![format!("Error: {}", detail)]
            }
        }
    }

    /// Runs the log utility and returns its stdout, killing it at the timeout.
    pub fn run(&self) -> Result<String, KernelLogError>{
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| KernelLogError::Spawn{ command: self.command.clone(), source })?;

        //drain stdout on the side so a chatty child never blocks on a full pipe
        let reader = child.stdout.take().map(|mut stdout| thread::spawn(move ||{
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf);
            buf
        }));

        let deadline = Instant::now() + self.timeout;
        let status = loop{
            match child.try_wait(){
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline =>{
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(KernelLogError::Timeout{ command: self.command.clone(), timeout: self.timeout });
                }
                Ok(None) => thread::sleep(WAIT_STEP),
                Err(source) =>{
                    let _ = child.kill();
                    return Err(KernelLogError::Wait{ command: self.command.clone(), source });
                }
            }
        };

        //a failing utility (e.g. dmesg without permission) often prints nothing on stdout
        if !status.success(){
            return Err(KernelLogError::Failed{ command: self.command.clone(), status });
        }

        let bytes = reader.map(|h| h.join().unwrap_or_default()).unwrap_or_default();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

//drop the "[    1.234567]" stamp
fn strip_stamp(line: &str) -> &str{
    match line.split_once(']'){
        Some((_, rest)) => rest.trim(),
        None => line.trim(),
    }
}

/// Last `raw_lines` lines of `raw`, stamps stripped, wrapped to `width`,
/// keeping the last `max_lines` wrapped lines.
pub fn process_output(raw: &str, raw_lines: usize, width: usize, max_lines: usize) -> Vec<String>{
    let lines: Vec<&str> = raw.lines().collect();
    let start = lines.len().saturating_sub(raw_lines);

    let wrapped: Vec<String> = lines[start..]
        .iter()
        .map(|l| strip_stamp(l))
        .filter(|l| !l.is_empty())
        .flat_map(|l| wrap_text(l, width))
        .collect();
    if wrapped.is_empty(){
        return vec![EMPTY_LINE.to_string()];
    }

    let skip = wrapped.len().saturating_sub(max_lines);
    wrapped.into_iter().skip(skip).collect()
}

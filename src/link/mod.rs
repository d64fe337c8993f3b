pub mod protocol;
pub use protocol::*;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{self, Read, Write};
use std::time::Duration;
use serde_json::{Map, Value};
use serialport::SerialPort;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_BAUD: u32 = 115200;
pub const MAX_LINE_LEN: usize = 64 * 1024;
const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum LinkError{
    #[error("failed to open serial port {port}: {source}")]
    Open{
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(#[from] serialport::Error),
}

/// Why a received line was thrown away instead of delivered.
#[derive(Debug, Error)]
pub enum LineError{
    #[error("line is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("line is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotObject(&'static str),

    #[error("line exceeded {0} bytes without a terminator")]
    Overflow(usize),
}

/// Outcome of one non-blocking poll.
#[derive(Debug)]
pub enum Poll{
    Idle,
    Message(Map<String, Value>),
    Skipped(LineError),
}

/// Byte transport underneath a [`Link`].
pub trait LinkPort: Read + Write + Send{
    fn bytes_pending(&mut self) -> io::Result<u32>;
}

impl LinkPort for Box<dyn SerialPort>{
    fn bytes_pending(&mut self) -> io::Result<u32>{
        (**self).bytes_to_read().map_err(io::Error::from)
    }
}

pub struct Link{
    port: Option<Box<dyn LinkPort>>,
    name: String,
    rx_buffer: Vec<u8>,
}

impl Link{
    pub fn open(port_name: &str, baud_rate: u32, settle: Duration) -> Result<Self, LinkError>{
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|source| LinkError::Open{ port: port_name.to_string(), source })?;

        //the board resets when the port opens
        if !settle.is_zero(){
            std::thread::sleep(settle);
        }
        info!(port = port_name, baud = baud_rate, "serial link open");

        Ok(Self::from_port(port_name, Box::new(port)))
    }

    pub fn from_port(name: &str, port: Box<dyn LinkPort>) -> Self{
        Link{
            port: Some(port),
            name: name.to_string(),
            rx_buffer: Vec::with_capacity(512),
        }
    }

    pub fn name(&self) -> &str{
        &self.name
    }

    pub fn is_open(&self) -> bool{
        self.port.is_some()
    }

    /// Writes `command` plus a newline. Does nothing once the link is closed.
    pub fn send(&mut self, command: &str) -> bool{
        let Some(port) = self.port.as_mut() else{
            debug!(command, "link closed, command dropped");
            return false;
        };

        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(b'\n');

        match port.write_all(&frame).and_then(|_| port.flush()){
            Ok(()) =>{
                debug!(command, "command sent");
                true
            }
            Err(e) =>{
                warn!(command, error = %e, "serial write failed");
                false
            }
        }
    }

    pub fn send_command(&mut self, command: Command) -> bool{
        self.send(command.keyword())
    }

    /// Returns at once: a decoded object, a skipped line, or nothing pending.
    pub fn try_read_message(&mut self) -> Poll{
        loop{
            if let Some(line) = self.next_line(){
                if line.iter().all(|b| b.is_ascii_whitespace()){
                    continue;
                }
                return decode_line(&line);
            }

            if self.rx_buffer.len() > MAX_LINE_LEN{
                self.rx_buffer.clear();
                let err = LineError::Overflow(MAX_LINE_LEN);
                warn!(error = %err, "discarding receive buffer");
                return Poll::Skipped(err);
            }

            if !self.fill_buffer(){
                return Poll::Idle;
            }
        }
    }

    /// Releases the port. Returns false when it was already closed.
    pub fn close(&mut self) -> bool{
        match self.port.take(){
            Some(port) =>{
                drop(port);
                self.rx_buffer.clear();
                info!(port = %self.name, "serial link closed");
                true
            }
            None => false,
        }
    }

    fn next_line(&mut self) -> Option<Vec<u8>>{
        let end = self.rx_buffer.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.rx_buffer.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r'){
            line.pop();
        }
        Some(line)
    }

    //pull whatever is pending without blocking; false when nothing arrived
    fn fill_buffer(&mut self) -> bool{
        let Some(port) = self.port.as_mut() else{
            return false;
        };

        let pending = match port.bytes_pending(){
            Ok(n) => n as usize,
            Err(e) =>{
                debug!(error = %e, "could not query pending bytes");
                return false;
            }
        };
        if pending == 0{
            return false;
        }

        let mut read_buf = vec![0u8; pending.min(READ_CHUNK)];
        match port.read(&mut read_buf){
            Ok(n) if n > 0 =>{
                self.rx_buffer.extend_from_slice(&read_buf[..n]);
                true
            }
            Ok(_) => false,
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => false,
            Err(e) =>{
                warn!(error = %e, "serial read failed");
                false
            }
        }
    }
}

impl Drop for Link{
    fn drop(&mut self){
        self.close();
    }
}

fn decode_line(line: &[u8]) -> Poll{
    let text = match std::str::from_utf8(line){
        Ok(text) => text.trim(),
        Err(e) =>{
            warn!(bytes = line.len(), "skipping line with invalid UTF-8");
            return Poll::Skipped(LineError::Utf8(e));
        }
    };

    match serde_json::from_str::<Value>(text){
        Ok(Value::Object(map)) => Poll::Message(map),
        Ok(other) =>{
            let kind = json_kind(&other);
            warn!(line = text, kind, "skipping non-object JSON line");
            Poll::Skipped(LineError::NotObject(kind))
        }
        Err(e) =>{
            warn!(line = text, error = %e, "skipping malformed JSON line");
            Poll::Skipped(LineError::Json(e))
        }
    }
}

fn json_kind(value: &Value) -> &'static str{
    match value{
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn list_ports() -> Result<Vec<String>, LinkError>{
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

use std::io::{self, BufRead};

/// Source of operator command lines.
pub trait Operator {
    /// Blocks for the next line; `None` once input is exhausted.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

pub struct LineOperator<R> {
    input: R,
}

impl<R: BufRead> LineOperator<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    pub fn into_inner(self) -> R {
        self.input
    }
}

impl<R: BufRead> Operator for LineOperator<R> {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        match self.input.read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Start,
    Send,
    Status,
    Reset,
    Summary,
    Save,
    Plot,
    Help,
    Exit,
    Empty,
    Unknown(String),
}

impl OperatorCommand {
    pub fn parse(line: &str) -> Self {
        let Some(word) = line.split_whitespace().next() else {
            return OperatorCommand::Empty;
        };
        match word.to_lowercase().as_str() {
            "start" => OperatorCommand::Start,
            "send" => OperatorCommand::Send,
            "status" => OperatorCommand::Status,
            "reset" => OperatorCommand::Reset,
            "summary" => OperatorCommand::Summary,
            "save" => OperatorCommand::Save,
            "plot" => OperatorCommand::Plot,
            "help" | "?" => OperatorCommand::Help,
            "exit" | "quit" => OperatorCommand::Exit,
            _ => OperatorCommand::Unknown(word.to_string()),
        }
    }
}

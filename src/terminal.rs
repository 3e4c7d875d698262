use std::io::{self, IsTerminal};

/// Answers whether the process streams are attached to a terminal.
pub trait TerminalClient {
    /// Whether standard output is a terminal.
    fn stdout_is_terminal(&self) -> bool;
    /// Whether standard error is a terminal.
    fn stderr_is_terminal(&self) -> bool;
}

/// Terminal detection backed by the real process streams.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        io::stderr().is_terminal()
    }
}

//! Staging log writer

use super::context::UiContext;
use console::style;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::debug;

const STEP_PREFIX: &str = "-----> ";
const INDENT: &str = "       ";

/// User-facing staging log
///
/// Cheap to share by reference; writes are serialized through a mutex so
/// captured subprocess output and callouts never interleave mid-line.
pub struct BuildLog {
    sink: Mutex<Box<dyn Write + Send>>,
    ctx: UiContext,
}

impl BuildLog {
    /// Log to stdout
    pub fn stdout(ctx: UiContext) -> Self {
        Self::new(Box::new(io::stdout()), ctx)
    }

    /// Log into an in-memory buffer, returning a handle to read it back
    pub fn buffered() -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        let log = Self::new(Box::new(buffer.clone()), UiContext::non_interactive());
        (log, buffer)
    }

    /// Log to an arbitrary writer
    pub fn new(sink: Box<dyn Write + Send>, ctx: UiContext) -> Self {
        Self {
            sink: Mutex::new(sink),
            ctx,
        }
    }

    /// Start a new build step (`-----> title`)
    pub fn begin_step(&self, title: &str) {
        let line = if self.ctx.use_fancy_output() {
            format!("{}{}", style(STEP_PREFIX).cyan(), style(title).bold())
        } else {
            format!("{}{}", STEP_PREFIX, title)
        };
        self.write_line(&line);
    }

    /// Indented detail line
    pub fn info(&self, message: &str) {
        self.write_block("", message);
    }

    /// Warning callout
    pub fn warning(&self, message: &str) {
        let label = if self.ctx.use_fancy_output() {
            style("**WARNING**").yellow().bold().to_string()
        } else {
            "**WARNING**".to_string()
        };
        self.write_block(&format!("{} ", label), message);
    }

    /// Error callout (the build is about to fail)
    pub fn error(&self, message: &str) {
        let label = if self.ctx.use_fancy_output() {
            style("**ERROR**").red().bold().to_string()
        } else {
            "**ERROR**".to_string()
        };
        self.write_block(&format!("{} ", label), message);
    }

    /// Suggestion with a documentation link
    pub fn protip(&self, tip: &str, link: &str) {
        let label = if self.ctx.use_fancy_output() {
            style("PRO TIP:").green().to_string()
        } else {
            "PRO TIP:".to_string()
        };
        self.write_block(&format!("{} ", label), &format!("{}\nVisit {}", tip, link));
    }

    /// Debug line, only shown when BP_DEBUG is set
    pub fn debug(&self, message: &str) {
        debug!("{}", message);
        if self.ctx.debug() {
            self.write_block("DEBUG: ", message);
        }
    }

    /// Raw output line from a subprocess
    pub fn output(&self, line: &str) {
        self.write_line(&format!("{}{}", INDENT, line));
    }

    fn write_block(&self, label: &str, message: &str) {
        let mut lines = message.lines();
        if let Some(first) = lines.next() {
            self.write_line(&format!("{}{}{}", INDENT, label, first));
        }
        for rest in lines {
            self.write_line(&format!("{}{}", INDENT, rest));
        }
    }

    fn write_line(&self, line: &str) {
        if let Ok(mut sink) = self.sink.lock() {
            // Staging output is best effort; a closed pipe must not fail the build
            let _ = writeln!(sink, "{}", line);
            let _ = sink.flush();
        }
    }
}

/// Shared in-memory log sink
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// Everything written so far
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log buffer poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

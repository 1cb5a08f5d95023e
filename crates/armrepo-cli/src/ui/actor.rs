//! UI Actor - Single-threaded event processing
//!
//! Downloads report progress from a sampling task while the pipeline logs
//! from its own task. Every write to stdout goes through one thread that owns
//! the terminal, so a live progress line is never torn by another message.

use std::io::{Stdout, Write, stdout};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crossterm::QueueableCommand;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};

use super::progress::{format_completed, format_progress, format_size};

/// Events that can be sent to the UI actor
#[derive(Debug)]
pub enum UiEvent {
    /// Print a section header
    Section(String),
    /// A transfer is starting
    Fetching(String),
    /// Redraw the live progress line
    Progress { current: u64, total: u64 },
    /// Close the live line with a completion message
    Downloaded {
        label: String,
        size: u64,
        elapsed: Duration,
    },
    /// An artifact was added to a repository database
    Registered {
        repository: String,
        filename: String,
    },
    Info(String),
    Success(String),
    Warning(String),
    Error(String),
    Summary {
        count: usize,
        action: String,
        elapsed_secs: f64,
    },
    /// Stop the actor
    Shutdown,
}

/// Spawn the render thread.
pub fn spawn() -> (mpsc::Sender<UiEvent>, thread::JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel();
    let handle = thread::spawn(move || run_event_loop(&receiver));
    (sender, handle)
}

fn run_event_loop(receiver: &mpsc::Receiver<UiEvent>) {
    let mut renderer = Renderer::new();
    while let Ok(event) = receiver.recv() {
        if matches!(event, UiEvent::Shutdown) {
            break;
        }
        // Terminal write failures (closed pipe) are not worth aborting a run.
        let _ = renderer.handle(event);
    }
    let _ = renderer.close_live_line();
}

struct Renderer {
    out: Stdout,
    live: bool,
}

impl Renderer {
    fn new() -> Self {
        Self {
            out: stdout(),
            live: false,
        }
    }

    fn handle(&mut self, event: UiEvent) -> std::io::Result<()> {
        match event {
            UiEvent::Progress { current, total } => {
                // `\x1b[2K\r NN % / 100 %`
                self.out.queue(Clear(ClearType::CurrentLine))?;
                write!(self.out, "\r{}", format_progress(current, total))?;
                self.live = true;
            }
            UiEvent::Downloaded {
                label,
                size,
                elapsed,
            } => {
                self.close_live_line()?;
                writeln!(
                    self.out,
                    "{} {} {}",
                    format_completed(elapsed),
                    label.dim(),
                    format!("({})", format_size(size)).dim()
                )?;
            }
            other => {
                self.close_live_line()?;
                self.line(other)?;
            }
        }
        self.out.flush()
    }

    fn line(&mut self, event: UiEvent) -> std::io::Result<()> {
        match event {
            UiEvent::Section(title) => writeln!(self.out, "\n{}", title.bold()),
            UiEvent::Fetching(url) => writeln!(self.out, "{url}"),
            UiEvent::Registered {
                repository,
                filename,
            } => writeln!(self.out, "{} {filename} -> {repository}", "+".green()),
            UiEvent::Info(msg) => writeln!(self.out, "{msg}"),
            UiEvent::Success(msg) => writeln!(self.out, "{} {msg}", "✓".green()),
            UiEvent::Warning(msg) => writeln!(self.out, "{} {msg}", "!".yellow()),
            UiEvent::Error(msg) => writeln!(self.out, "{} {msg}", "✗".red()),
            UiEvent::Summary {
                count,
                action,
                elapsed_secs,
            } => writeln!(
                self.out,
                "{}",
                format!("{count} {action} in {elapsed_secs:.2}s").bold()
            ),
            UiEvent::Progress { .. } | UiEvent::Downloaded { .. } | UiEvent::Shutdown => Ok(()),
        }
    }

    fn close_live_line(&mut self) -> std::io::Result<()> {
        if self.live {
            writeln!(self.out)?;
            self.live = false;
        }
        Ok(())
    }
}

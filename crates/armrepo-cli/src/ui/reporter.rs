use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use std::time::Duration;

use armrepo_core::Reporter;

use super::actor::{self, UiEvent};

/// [`Reporter`] that renders to the terminal through the UI actor.
///
/// Dropping the reporter drains pending output before returning.
#[derive(Debug)]
pub struct TerminalReporter {
    sender: Sender<UiEvent>,
    handle: Option<JoinHandle<()>>,
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalReporter {
    pub fn new() -> Self {
        let (sender, handle) = actor::spawn();
        Self {
            sender,
            handle: Some(handle),
        }
    }

    fn send(&self, event: UiEvent) {
        let _ = self.sender.send(event);
    }
}

impl Drop for TerminalReporter {
    fn drop(&mut self) {
        self.send(UiEvent::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Reporter for TerminalReporter {
    fn section(&self, title: &str) {
        self.send(UiEvent::Section(title.to_string()));
    }

    fn fetching(&self, url: &str) {
        self.send(UiEvent::Fetching(url.to_string()));
    }

    fn downloading(&self, _label: &str, current: u64, total: u64) {
        self.send(UiEvent::Progress { current, total });
    }

    fn downloaded(&self, label: &str, size: u64, elapsed: Duration) {
        self.send(UiEvent::Downloaded {
            label: label.to_string(),
            size,
            elapsed,
        });
    }

    fn registered(&self, repository: &str, filename: &str) {
        self.send(UiEvent::Registered {
            repository: repository.to_string(),
            filename: filename.to_string(),
        });
    }

    fn info(&self, msg: &str) {
        self.send(UiEvent::Info(msg.to_string()));
    }

    fn success(&self, msg: &str) {
        self.send(UiEvent::Success(msg.to_string()));
    }

    fn warning(&self, msg: &str) {
        self.send(UiEvent::Warning(msg.to_string()));
    }

    fn error(&self, msg: &str) {
        self.send(UiEvent::Error(msg.to_string()));
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        self.send(UiEvent::Summary {
            count,
            action: action.to_string(),
            elapsed_secs,
        });
    }
}

//! Opening extension pages in a new tab

use std::process::Command;
use std::sync::{Arc, Mutex};

/// Routes that may be opened verbatim
pub const ALLOWED_PATHS: [&str; 8] = [
    "/",
    "/account/import-ledger",
    "/account/restore-json",
    "/account/create",
    "/account/import-seed",
    "/account/import-raw-seed",
    "/account/attach-qr",
    "/account/export-all",
];

/// Route families that may be opened with any suffix
pub const ALLOWED_PREFIXES: [&str; 6] = [
    "/governance/",
    "/send/",
    "/stake/",
    "/manageProxies/",
    "/manageIdentity/",
    "/socialRecovery/",
];

pub fn is_allowed_path(path: &str) -> bool {
    ALLOWED_PATHS.contains(&path) || ALLOWED_PREFIXES.iter().any(|p| path.starts_with(p))
}

pub trait TabOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Hands the url to an external program (`xdg-open`, `open`, a browser)
pub struct CommandOpener {
    program: String,
}

impl CommandOpener {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl TabOpener for CommandOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        Command::new(&self.program).arg(url).spawn()?;
        Ok(())
    }
}

/// Used when no open command is configured
pub struct LogOpener;

impl TabOpener for LogOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        tracing::info!("Open tab requested: {}", url);
        Ok(())
    }
}

/// Keeps every opened url, for tests
#[derive(Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<String>>,
}

impl RecordingOpener {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl TabOpener for RecordingOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(url.to_string());
        }
        Ok(())
    }
}

pub struct WindowGate {
    extension_url: String,
    opener: Arc<dyn TabOpener>,
}

impl WindowGate {
    pub fn new(extension_url: impl Into<String>, opener: Arc<dyn TabOpener>) -> Self {
        Self {
            extension_url: extension_url.into(),
            opener,
        }
    }

    /// Open `path` when it is on the allow-list. Refusals are logged and
    /// reported as `false`, never as an error.
    pub fn open(&self, path: &str) -> bool {
        if !is_allowed_path(path) {
            tracing::error!("Refusing to open window for path {}", path);
            return false;
        }

        let url = format!("{}#{}", self.extension_url, path);
        match self.opener.open(&url) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to open {}: {}", url, e);
                false
            }
        }
    }
}

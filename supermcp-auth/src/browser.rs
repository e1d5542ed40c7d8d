//! OS browser launching

use std::process::{Command, Stdio};
use std::sync::Arc;

/// Pluggable launcher so flows can be driven without a real browser
pub type BrowserLauncher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Launch the platform browser at a URL, detached from our process
pub fn open_browser(url: &str) -> std::io::Result<()> {
    let mut command = platform_command(url);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

#[cfg(target_os = "macos")]
fn platform_command(url: &str) -> Command {
    let mut command = Command::new("open");
    command.arg(url);
    command
}

#[cfg(target_os = "windows")]
fn platform_command(url: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", "", url]);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_command(url: &str) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(url);
    command
}

/// The default launcher as a [`BrowserLauncher`]
pub fn default_launcher() -> BrowserLauncher {
    Arc::new(|url| open_browser(url))
}

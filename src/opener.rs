//! Hands a saved image to the operating system's default viewer.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Platform families with a distinct "open this file" launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Other
        }
    }
}

/// Program and arguments that open `path` on `platform`.
pub fn open_command(platform: Platform, path: &Path) -> (&'static str, Vec<OsString>) {
    let path = path.as_os_str().to_owned();

    match platform {
        // the empty string is the window title `start` expects before the file
        Platform::Windows => ("cmd", vec!["/c".into(), "start".into(), "".into(), path]),
        Platform::MacOs => ("open", vec![path]),
        Platform::Other => ("xdg-open", vec![path]),
    }
}

/// Starts the viewer and returns without waiting for it. Only a failure to
/// spawn is reported; what the viewer does afterwards is not observed.
pub fn open_image(path: &Path) -> std::io::Result<()> {
    let (program, args) = open_command(Platform::current(), path);

    let child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    debug!(program, pid = child.id(), "viewer started");

    Ok(())
}

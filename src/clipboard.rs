//! Clipboard and external viewers: yanking message text, opening media.

use anyhow::{Context, Result};
use arboard::Clipboard;
use std::path::Path;
use std::process::Stdio;
use tracing::warn;

/// Copy text to the system clipboard.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = Clipboard::new().context("failed to access clipboard")?;
    clipboard
        .set_text(text)
        .context("failed to copy to clipboard")?;
    Ok(())
}

/// Open a media URL in the default handler (browser, image viewer, player).
pub fn open_url(url: &str) -> Result<()> {
    open_target(url)
}

fn open_target(target: &str) -> Result<()> {
    spawn_reaped(opener(), target)
}

/// Start `cmd target` in the background and wait on it from a task so the
/// child never lingers as a zombie. Needs a tokio runtime.
fn spawn_reaped(cmd: &str, target: &str) -> Result<()> {
    let mut child = tokio::process::Command::new(cmd)
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("spawning {} {}", cmd, target))?;
    let cmd = cmd.to_string();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if !status.success() => warn!(cmd, %status, "opener exited with failure"),
            Ok(_) => {}
            Err(e) => warn!(cmd, error = %e, "waiting on opener failed"),
        }
    });
    Ok(())
}

fn opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

/// Interpret pasted text as a file to upload.
///
/// Terminals paste dropped files as a path, sometimes quoted, sometimes as a
/// `file://` URL, sometimes with backslash-escaped spaces. Returns `None`
/// unless the result names an existing regular file.
pub fn pasted_file_path(pasted: &str) -> Option<std::path::PathBuf> {
    let text = pasted.trim();
    if text.is_empty() || text.contains('\n') {
        return None;
    }
    let text = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .or_else(|| text.strip_prefix('"').and_then(|t| t.strip_suffix('"')))
        .unwrap_or(text);
    let text = text.strip_prefix("file://").unwrap_or(text);
    let unescaped = unescape(text);
    let path = Path::new(&unescaped);
    path.is_file().then(|| path.to_path_buf())
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '%' => {
                let hex: String = chars.clone().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(b) if hex.len() == 2 && b.is_ascii() => {
                        out.push(b as char);
                        chars.nth(1);
                    }
                    _ => out.push('%'),
                }
            }
            c => out.push(c),
        }
    }
    out
}

//! Terminal helpers: byte formatting and pager selection.

use std::io::IsTerminal;
use std::process::{Child, Command, Stdio};

const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Formats a byte count with binary units, e.g. `1.5 MiB`.
pub fn human_bytes(bytes: i64) -> String {
    if bytes < 0 {
        return "???".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Spawns `$PAGER` (default `/usr/bin/less`; the default is Unix-only)
/// when stdout is a terminal too short for `lines` of output. The caller
/// writes into the child's stdin and waits for it.
pub fn maybe_pager(lines: usize) -> Option<Child> {
    if !std::io::stdout().is_terminal() {
        return None;
    }
    let height = std::env::var("LINES")
        .ok()
        .and_then(|lines| lines.parse::<usize>().ok())
        .unwrap_or(24);
    if lines < height {
        return None;
    }
    let pager = match std::env::var("PAGER") {
        Ok(pager) if !pager.trim().is_empty() => pager,
        _ if cfg!(unix) => "/usr/bin/less".to_string(),
        _ => return None,
    };
    Command::new(pager).stdin(Stdio::piped()).spawn().ok()
}

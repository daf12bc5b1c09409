//! CLI Commands

pub mod inspect;
pub mod merge;
pub mod split;
pub mod verify;

pub use inspect::run as inspect;
pub use merge::run as merge;
pub use split::run as split;
pub use verify::run as verify;

use trishard_core::{stem_for, HASH_HEX_LEN};

/// Accept either a stem or the original file name
pub fn resolve_stem(arg: &str) -> String {
    let is_stem = arg.len() == HASH_HEX_LEN && arg.bytes().all(|b| b.is_ascii_hexdigit());
    if is_stem {
        arg.to_ascii_lowercase()
    } else {
        stem_for(arg)
    }
}

/// Format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

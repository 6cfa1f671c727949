//! CLI command handlers, one file per command.

mod checksum;
mod pull;
mod resolve;

pub use checksum::run_checksum;
pub use pull::run_pull;
pub use resolve::run_resolve;

pub fn run_version() {
    println!("modelpull {}", env!("CARGO_PKG_VERSION"));
}

/// Human-readable size in binary units.
pub(crate) fn format_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

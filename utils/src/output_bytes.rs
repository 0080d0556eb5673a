const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Formats a byte count with binary prefixes, e.g. `100 B`, `1.50 KiB`, `12.00 MiB`.
///
/// Counts below 1 KiB are printed exactly; larger ones with two decimals.
pub fn output_bytes(n_bytes: u64) -> String {
    if n_bytes < 1024 {
        return format!("{n_bytes} B");
    }

    let mut value = n_bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{value:.2} {}", UNITS[unit])
}

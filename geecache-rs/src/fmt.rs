//! Provides helpers to parse and format byte sizes.
//!
//! These are used to read memory limits like `max_memory: 64m` from the config and to report
//! cache sizes in log messages.
use std::fmt::Write;

/// Lists the units used by [format_size] along with their size in bytes.
const UNITS: [(&str, usize); 5] = [
    ("PiB", 1 << 50),
    ("TiB", 1 << 40),
    ("GiB", 1 << 30),
    ("MiB", 1 << 20),
    ("KiB", 1 << 10),
];

/// Formats a given size in bytes.
///
/// This picks the largest binary unit (up to petabytes) in which the size is at least one and
/// limits the output to three significant digits.
///
/// # Examples
///
/// ```
/// assert_eq!(geecache::fmt::format_size(0), "0 bytes");
/// assert_eq!(geecache::fmt::format_size(1), "1 byte");
/// assert_eq!(geecache::fmt::format_size(100), "100 bytes");
/// assert_eq!(geecache::fmt::format_size(2 << 10), "2.00 KiB");
/// assert_eq!(geecache::fmt::format_size(8_734), "8.53 KiB");
/// assert_eq!(geecache::fmt::format_size(87_340), "85.3 KiB");
/// assert_eq!(geecache::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(geecache::fmt::format_size(64 * 1024 * 1024), "64.0 MiB");
/// assert_eq!(geecache::fmt::format_size(8_734_000_000), "8.13 GiB");
/// assert_eq!(geecache::fmt::format_size(87_340_000_000_000), "79.4 TiB");
/// assert_eq!(geecache::fmt::format_size(8_734_000_000_000_000), "7.76 PiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    match size_in_bytes {
        1 => return "1 byte".to_owned(),
        size if size < 1024 => return format!("{} bytes", size),
        _ => (),
    }

    let mut result = String::new();
    for (unit, unit_size) in UNITS {
        if size_in_bytes >= unit_size {
            let size = size_in_bytes as f64 / unit_size as f64;
            let _ = match size {
                size if size < 10. => write!(result, "{:.2} {}", size, unit),
                size if size < 100. => write!(result, "{:.1} {}", size, unit),
                size => write!(result, "{:.0} {}", size, unit),
            };
            break;
        }
    }

    result
}

/// Parses a byte size like `512`, `16k` or `2 GB`.
///
/// The number can be followed by one of these (case-insensitive) suffixes:
/// * **b**: bytes (same as no suffix)
/// * **k**: KiB (1024 bytes)
/// * **m**: MiB
/// * **g**: GiB
/// * **t**: TiB
///
/// An optional trailing **b** after the unit is accepted (`16kb`, `2 GB`).
///
/// # Examples
///
/// ```
/// assert_eq!(geecache::fmt::parse_size("100").unwrap(), 100);
/// assert_eq!(geecache::fmt::parse_size("100b").unwrap(), 100);
/// assert_eq!(geecache::fmt::parse_size("2k").unwrap(), 2048);
/// assert_eq!(geecache::fmt::parse_size("16kb").unwrap(), 16 * 1024);
/// assert_eq!(geecache::fmt::parse_size("64m").unwrap(), 64 * 1024 * 1024);
/// assert_eq!(geecache::fmt::parse_size("4 GB").unwrap(), 4 * 1024 * 1024 * 1024);
/// assert_eq!(geecache::fmt::parse_size("1 T").unwrap(), 1024 * 1024 * 1024 * 1024);
///
/// // Unknown suffixes, decimal and negative numbers are rejected...
/// assert_eq!(geecache::fmt::parse_size("3 Y").is_err(), true);
/// assert_eq!(geecache::fmt::parse_size("1.2g").is_err(), true);
/// assert_eq!(geecache::fmt::parse_size("-1").is_err(), true);
/// ```
pub fn parse_size(str: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref SIZE_EXPRESSION: regex::Regex =
            regex::Regex::new(r"^\s*(\d+)\s*(?i:([kmgt])?b?)\s*$").unwrap();
    }

    let input = str.as_ref();
    let captures = SIZE_EXPRESSION.captures(input).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a size. Expected a positive number optionally followed by \
             'b', 'k', 'm', 'g' or 't'.",
            input
        )
    })?;

    let number = captures[1]
        .parse::<usize>()
        .map_err(|error| anyhow::anyhow!("Cannot parse '{}' into a size: {}", input, error))?;
    let factor: usize = match captures.get(2).map(|unit| unit.as_str()) {
        Some("k") | Some("K") => 1 << 10,
        Some("m") | Some("M") => 1 << 20,
        Some("g") | Some("G") => 1 << 30,
        Some("t") | Some("T") => 1 << 40,
        _ => 1,
    };

    number
        .checked_mul(factor)
        .ok_or_else(|| anyhow::anyhow!("The size '{}' is too large.", input))
}

//! Common, ambient functionality shared across the pipeline.

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Commonly used command line arguments (verbosity flags).
#[derive(Parser, Debug, Clone)]
pub struct Args {
    /// Verbosity of the program.
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Canonical chromosome names recognised for X-linked gating (spec §4.9).
pub const CHROMS: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y", "M",
];

/// Normalise a chromosome name by stripping a `chr`/`Chr` prefix and upper-casing it.
///
/// Used to decide whether a variant is on the X chromosome for X-linked
/// inheritance pattern gating, and by the format detector's "strip for test
/// purposes only" rule (spec §4.3).
pub fn normalize_chrom(raw: &str) -> String {
    let stripped = raw
        .strip_prefix("chr")
        .or_else(|| raw.strip_prefix("Chr"))
        .or_else(|| raw.strip_prefix("CHR"))
        .unwrap_or(raw);
    stripped.to_ascii_uppercase()
}

/// Whether the given (possibly `chr`-prefixed) chromosome name is the X chromosome.
pub fn is_chrom_x(raw: &str) -> bool {
    normalize_chrom(raw) == "X"
}

/// The version of the `vannotate` package, reported in JSON `meta` blocks.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_chrom_strips_prefix() {
        assert_eq!(normalize_chrom("chrX"), "X");
        assert_eq!(normalize_chrom("CHR7"), "7");
        assert_eq!(normalize_chrom("7"), "7");
    }

    #[test]
    fn is_chrom_x_detects_both_forms() {
        assert!(is_chrom_x("X"));
        assert!(is_chrom_x("chrX"));
        assert!(!is_chrom_x("chr7"));
    }
}

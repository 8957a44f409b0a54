//! Format detector (spec §4.3): classifies each input string into one of
//! `{VCF-short, HGVS/rsID, CNV}`. Pure, total, and idempotent.

use crate::error::PipelineError;
use crate::model::InputFormat;
use regex::Regex;
use std::sync::OnceLock;

fn cnv_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[0-9XYM]+:[0-9]+-[0-9]+:(DEL|DUP|CNV)$").expect("valid regex")
    })
}

fn vcf_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9XYM]+-[0-9]+-[ACGT]+-[ACGT]+$").expect("valid regex"))
}

/// Classify a single input string. Empty input is a validation error; every
/// other non-empty string maps to exactly one format (spec §4.3, §8).
pub fn detect_format(input: &str) -> Result<InputFormat, PipelineError> {
    if input.is_empty() {
        return Err(PipelineError::validation("input must not be empty"));
    }

    // Strip a leading chr/Chr prefix for classification purposes only; the
    // original string is never mutated for output.
    let probe = input
        .strip_prefix("chr")
        .or_else(|| input.strip_prefix("Chr"))
        .unwrap_or(input);

    if cnv_re().is_match(probe) {
        return Ok(InputFormat::Cnv);
    }
    if vcf_re().is_match(probe) {
        return Ok(InputFormat::Vcf);
    }
    // Unknown CNV-shaped types (e.g. "INS") fall through to HGVS on purpose,
    // letting the remote service reject them (spec §4.3 edge case).
    Ok(InputFormat::Hgvs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_vcf_short() {
        assert_eq!(detect_format("1-12345-A-G").unwrap(), InputFormat::Vcf);
        assert_eq!(detect_format("chr1-12345-A-G").unwrap(), InputFormat::Vcf);
    }

    #[test]
    fn classifies_cnv() {
        assert_eq!(
            detect_format("7:117559600-117559609:DEL").unwrap(),
            InputFormat::Cnv
        );
        assert_eq!(
            detect_format("X:1000-2000:dup").unwrap(),
            InputFormat::Cnv
        );
    }

    #[test]
    fn classifies_hgvs_and_rsid() {
        assert_eq!(detect_format("rs6025").unwrap(), InputFormat::Hgvs);
        assert_eq!(
            detect_format("NM_000059.3:c.1000A>T").unwrap(),
            InputFormat::Hgvs
        );
    }

    #[test]
    fn unknown_cnv_type_falls_through_to_hgvs() {
        assert_eq!(
            detect_format("7:117559600-117559609:INS").unwrap(),
            InputFormat::Hgvs
        );
    }

    #[test]
    fn empty_input_is_a_validation_error() {
        assert!(matches!(
            detect_format(""),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn classification_is_total_and_idempotent() {
        for input in [
            "1-12345-A-G",
            "7:117559600-117559609:DEL",
            "rs6025",
            "weird$$input",
        ] {
            let first = detect_format(input).unwrap();
            let second = detect_format(input).unwrap();
            assert_eq!(first, second);
        }
    }
}

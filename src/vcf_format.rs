//! VCF formatter (spec §4.10): position/ALT grouping, CSQ assembly, INFO
//! composition, header preparation, and the top-level `format_vcf` assembly
//! entry point. Emits plain strings only — this crate never parses VCF.

use crate::inheritance::Pattern;
use crate::model::AnnotationRecord;
use indexmap::IndexMap;

/// One field in the `vlCsqFormat` column list, in emission order.
pub const VL_CSQ_FORMAT: &[&str] = &[
    "Allele",
    "Consequence",
    "IMPACT",
    "SYMBOL",
    "Gene",
    "Feature_type",
    "Feature",
    "BIOTYPE",
    "HGVSc",
    "HGVSp",
    "Protein_position",
    "Amino_acids",
    "Codons",
    "Existing_variation",
    "SIFT",
    "PolyPhen",
];

/// The original VCF record's INFO/QUAL/FILTER for one `(chrom, pos, ref, alt)`.
#[derive(Debug, Clone, Default)]
pub struct OriginalRecord {
    pub info: IndexMap<String, String>,
    pub qual: Option<String>,
    pub filter: Vec<String>,
}

/// `canonical key -> original record`, supplied by the (out-of-scope) VCF
/// reader collaborator.
pub type VcfRecordMap = IndexMap<String, OriginalRecord>;

/// Ensure `##fileformat=VCFv4.2` is first and the three `VL_*` INFO
/// definitions are present, preserving every other original header line
/// (spec §4.10 "Header preparation").
pub fn prepare_headers(original_headers: &[String]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::with_capacity(original_headers.len() + 4);
    headers.push("##fileformat=VCFv4.2".to_string());

    for line in original_headers {
        if !line.starts_with("##fileformat=") {
            headers.push(line.clone());
        }
    }

    let required = [
        (
            "VL_CSQ",
            r#"##INFO=<ID=VL_CSQ,Number=.,Type=String,Description="Consequence annotations">"#,
        ),
        (
            "VL_DED_INH",
            r#"##INFO=<ID=VL_DED_INH,Number=1,Type=String,Description="Deduced inheritance pattern">"#,
        ),
        (
            "VL_COMPHET",
            r#"##INFO=<ID=VL_COMPHET,Number=.,Type=String,Description="Compound heterozygous partner variants">"#,
        ),
    ];
    for (id, definition) in required {
        let tag = format!("ID={id},");
        if !headers.iter().any(|h| h.contains(&tag)) {
            headers.push(definition.to_string());
        }
    }

    headers.push("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO".to_string());
    headers
}

fn url_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Resolve one CSQ field for a given transcript consequence, falling back
/// first to the consequence matching `most_severe_consequence`, then to the
/// first non-empty value across all consequences (spec §4.10).
fn resolve_field(
    field: &str,
    current: &crate::model::TranscriptConsequence,
    annotation: &AnnotationRecord,
) -> String {
    let direct = field_value(field, current, annotation);
    if !direct.is_empty() {
        return url_encode(&direct);
    }

    if let Some(most_severe) = &annotation.most_severe_consequence {
        if let Some(matching) = annotation
            .transcript_consequences
            .iter()
            .find(|t| t.consequence_terms.iter().any(|c| c == most_severe))
        {
            let value = field_value(field, matching, annotation);
            if !value.is_empty() {
                return url_encode(&value);
            }
        }
    }

    for transcript in &annotation.transcript_consequences {
        let value = field_value(field, transcript, annotation);
        if !value.is_empty() {
            return url_encode(&value);
        }
    }

    String::new()
}

fn field_value(
    field: &str,
    transcript: &crate::model::TranscriptConsequence,
    annotation: &AnnotationRecord,
) -> String {
    match field {
        "Allele" => annotation.allele_string.split('/').next_back().unwrap_or_default().to_string(),
        "Consequence" => transcript.consequence_terms.join("&"),
        "IMPACT" => transcript.impact.map(|i| i.to_string()).unwrap_or_default(),
        "SYMBOL" => transcript.gene_symbol.clone().unwrap_or_default(),
        "Gene" => transcript.gene_id.clone().unwrap_or_default(),
        "Feature_type" => transcript.feature_type.clone().unwrap_or_default(),
        "Feature" => transcript.transcript_id.clone().unwrap_or_default(),
        "BIOTYPE" => transcript.biotype.clone().unwrap_or_default(),
        "HGVSc" => transcript.hgvsc.clone().unwrap_or_default(),
        "HGVSp" => transcript.hgvsp.clone().unwrap_or_default(),
        "Protein_position" => match (transcript.protein_start, transcript.protein_end) {
            (Some(s), Some(e)) if s == e => s.to_string(),
            (Some(s), Some(e)) => format!("{s}-{e}"),
            (Some(s), None) => s.to_string(),
            _ => String::new(),
        },
        "Amino_acids" => transcript.amino_acids.clone().unwrap_or_default(),
        "Codons" => transcript.codons.clone().unwrap_or_default(),
        "Existing_variation" => String::new(),
        "SIFT" => transcript.sift_prediction.clone().unwrap_or_default(),
        "PolyPhen" => transcript.polyphen_prediction.clone().unwrap_or_default(),
        _ => String::new(),
    }
}

/// One pipe-separated CSQ record per transcript consequence.
pub fn build_csq_entries(annotation: &AnnotationRecord) -> Vec<String> {
    annotation
        .transcript_consequences
        .iter()
        .map(|transcript| {
            VL_CSQ_FORMAT
                .iter()
                .map(|field| resolve_field(field, transcript, annotation))
                .collect::<Vec<_>>()
                .join("|")
        })
        .collect()
}

/// Replace `[;=,\s|]` with `_` (spec §4.10 "Unsafe characters").
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if ";=,|".contains(c) || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Compose the full INFO string for one annotation-bearing VCF data line.
///
/// `original_info` is preserved minus any pre-existing `VL_*` tags.
pub fn compose_info(
    annotation: &AnnotationRecord,
    original_info: &IndexMap<String, String>,
    all_annotations_at_alt: &[&AnnotationRecord],
) -> String {
    let mut parts: Vec<String> = original_info
        .iter()
        .filter(|(k, _)| !k.starts_with("VL_"))
        .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{k}={v}") })
        .collect();

    let csq_entries: Vec<String> = all_annotations_at_alt
        .iter()
        .flat_map(|a| build_csq_entries(a))
        .collect();
    if !csq_entries.is_empty() {
        parts.push(format!("VL_CSQ={}", csq_entries.join(",")));
    }

    if let Some(inheritance) = &annotation.inheritance {
        if !matches!(
            inheritance.prioritized_pattern,
            Pattern::Unknown | Pattern::UnknownWithMissingData | Pattern::Reference | Pattern::ErrorAnalysisFailed
        ) {
            let pattern_str = sanitize(&format!("{:?}", inheritance.prioritized_pattern));
            parts.push(format!("VL_DED_INH={pattern_str}"));
        }
        if let Some(comp_het) = &inheritance.comp_het {
            let confirmed_or_possible = matches!(
                inheritance.prioritized_pattern,
                Pattern::CompoundHeterozygous | Pattern::CompoundHeterozygousPossible
            );
            if confirmed_or_possible && !comp_het.partner_variant_keys.is_empty() {
                let partners = sanitize(&comp_het.partner_variant_keys.join("&"));
                let gene = sanitize(&comp_het.gene);
                parts.push(format!("VL_COMPHET={partners}|{gene}"));
            }
        }
    }

    parts.join(";")
}

/// Render FILTER: joins with `;` after stripping `PASS`, `.`, and empties;
/// defaults to `PASS` when nothing is left (spec §4.10).
pub fn render_filter(filter: &[String]) -> String {
    let cleaned: Vec<&String> = filter
        .iter()
        .filter(|f| !f.is_empty() && f.as_str() != "PASS" && f.as_str() != ".")
        .collect();
    if cleaned.is_empty() {
        "PASS".to_string()
    } else {
        cleaned.into_iter().cloned().collect::<Vec<_>>().join(";")
    }
}

/// Build one VCF data line for an ALT-grouped set of annotations.
pub fn build_data_line(
    chrom: &str,
    pos: i64,
    reference: &str,
    alt: &str,
    original: Option<&OriginalRecord>,
    annotations_at_alt: &[&AnnotationRecord],
) -> String {
    let qual = original
        .and_then(|o| o.qual.clone())
        .unwrap_or_else(|| ".".to_string());
    let filter = original
        .map(|o| render_filter(&o.filter))
        .unwrap_or_else(|| "PASS".to_string());
    let original_info = original.map(|o| o.info.clone()).unwrap_or_default();

    let info = annotations_at_alt
        .first()
        .map(|first| compose_info(first, &original_info, annotations_at_alt))
        .unwrap_or_default();

    format!("{chrom}\t{pos}\t.\t{reference}\t{alt}\t{qual}\t{filter}\t{info}")
}

/// Group annotations by position key `chrom:pos:ref`, then by ALT (spec
/// §4.10 "Grouping"). Insertion order is preserved at both levels so output
/// ordering follows the order annotations were produced in.
fn group_by_position(annotations: &[AnnotationRecord]) -> IndexMap<String, IndexMap<String, Vec<&AnnotationRecord>>> {
    let mut groups: IndexMap<String, IndexMap<String, Vec<&AnnotationRecord>>> = IndexMap::new();
    for annotation in annotations {
        let mut alleles = annotation.allele_string.splitn(2, '/');
        let reference = alleles.next().unwrap_or_default();
        let alt = alleles.next().unwrap_or(reference);
        let position_key = format!("{}:{}:{reference}", annotation.seq_region_name, annotation.start);
        groups
            .entry(position_key)
            .or_default()
            .entry(alt.to_string())
            .or_default()
            .push(annotation);
    }
    groups
}

/// Assemble the full VCF document: header lines, then one data line per
/// `(chrom, pos, ref, alt)` group in first-seen order, newline-terminated
/// (spec §4.10 "Emit header lines then data lines").
///
/// An empty `annotations` slice returns exactly the prepared header, per the
/// "VCF formatter with empty annotation list" testable property (spec §8).
pub fn format_vcf(
    original_headers: &[String],
    annotations: &[AnnotationRecord],
    vcf_record_map: &VcfRecordMap,
) -> String {
    let mut lines = prepare_headers(original_headers);

    for (position_key, by_alt) in group_by_position(annotations) {
        let mut segments = position_key.splitn(3, ':');
        let chrom = segments.next().unwrap_or_default();
        let pos: i64 = segments.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let reference = segments.next().unwrap_or_default();

        for (alt, annotations_at_alt) in by_alt {
            let original = annotations_at_alt
                .first()
                .and_then(|a| vcf_record_map.get(&a.variant_key));
            lines.push(build_data_line(chrom, pos, reference, &alt, original, &annotations_at_alt));
        }
    }

    let mut document = lines.join("\n");
    document.push('\n');
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inheritance::InheritanceResult;
    use crate::model::TranscriptConsequence;

    fn sample_annotation() -> AnnotationRecord {
        let mut annotation = AnnotationRecord::default();
        annotation.allele_string = "A/G".to_string();
        annotation.most_severe_consequence = Some("missense_variant".to_string());
        annotation.transcript_consequences = vec![TranscriptConsequence {
            gene_symbol: Some("BRCA1".to_string()),
            transcript_id: Some("NM_1".to_string()),
            consequence_terms: vec!["missense_variant".to_string()],
            ..Default::default()
        }];
        annotation
    }

    #[test]
    fn header_preparation_injects_missing_info_lines_and_keeps_originals() {
        let headers = prepare_headers(&["##contig=<ID=1>".to_string()]);
        assert_eq!(headers[0], "##fileformat=VCFv4.2");
        assert!(headers.iter().any(|h| h.contains("ID=VL_CSQ,")));
        assert!(headers.iter().any(|h| h.contains("ID=VL_DED_INH,")));
        assert!(headers.iter().any(|h| h.contains("ID=VL_COMPHET,")));
        assert!(headers.iter().any(|h| h == "##contig=<ID=1>"));
    }

    #[test]
    fn builds_csq_entry_with_url_encoded_fields() {
        let annotation = sample_annotation();
        let entries = build_csq_entries(&annotation);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("G|missense_variant|"));
    }

    #[test]
    fn csq_entry_field_layout_matches_vl_csq_format() {
        let annotation = sample_annotation();
        let entries = build_csq_entries(&annotation);
        insta::assert_snapshot!(entries.join("\n"), @"G|missense_variant||BRCA1|||NM_1|||||||||");
    }

    #[test]
    fn composes_info_with_ded_inh_and_sanitizes_unsafe_chars() {
        let mut annotation = sample_annotation();
        annotation.inheritance = Some(InheritanceResult {
            possible_patterns: vec![Pattern::DeNovo],
            prioritized_pattern: Pattern::DeNovo,
            segregation: IndexMap::new(),
            comp_het: None,
        });
        let info = compose_info(&annotation, &IndexMap::new(), &[&annotation]);
        assert!(info.contains("VL_DED_INH=DeNovo"));
        assert!(info.contains("VL_CSQ="));
    }

    #[test]
    fn filter_strips_pass_and_dots_defaulting_to_pass() {
        assert_eq!(render_filter(&["PASS".to_string()]), "PASS");
        assert_eq!(render_filter(&[".".to_string()]), "PASS");
        assert_eq!(
            render_filter(&["PASS".to_string(), "q10".to_string()]),
            "q10"
        );
    }

    #[test]
    fn format_vcf_with_no_annotations_returns_exactly_the_prepared_header() {
        let headers = ["##contig=<ID=1>".to_string()];
        let document = format_vcf(&headers, &[], &VcfRecordMap::new());
        let expected = format!("{}\n", prepare_headers(&headers).join("\n"));
        assert_eq!(document, expected);
    }

    #[test]
    fn format_vcf_groups_multiple_annotations_by_position_and_alt() {
        let mut annotation_a = sample_annotation();
        annotation_a.seq_region_name = "1".to_string();
        annotation_a.start = 12345;
        annotation_a.allele_string = "A/G".to_string();
        annotation_a.variant_key = "1-12345-A-G".to_string();

        let mut annotation_b = sample_annotation();
        annotation_b.seq_region_name = "1".to_string();
        annotation_b.start = 12345;
        annotation_b.allele_string = "A/T".to_string();
        annotation_b.variant_key = "1-12345-A-T".to_string();

        let mut vcf_record_map = VcfRecordMap::new();
        vcf_record_map.insert(
            "1-12345-A-G".to_string(),
            OriginalRecord {
                info: IndexMap::from([("DP".to_string(), "30".to_string())]),
                qual: Some("99".to_string()),
                filter: vec!["PASS".to_string()],
            },
        );

        let document = format_vcf(&[], &[annotation_a, annotation_b], &vcf_record_map);
        let data_lines: Vec<&str> = document
            .lines()
            .filter(|l| !l.starts_with('#'))
            .collect();

        assert_eq!(data_lines.len(), 2);
        let g_line = data_lines.iter().find(|l| l.contains("\tA\tG\t")).unwrap();
        assert!(g_line.starts_with("1\t12345\t.\tA\tG\t99\tPASS\t"));
        assert!(g_line.contains("DP=30"));

        let t_line = data_lines.iter().find(|l| l.contains("\tA\tT\t")).unwrap();
        assert!(t_line.starts_with("1\t12345\t.\tA\tT\t.\tPASS\t"));
    }
}

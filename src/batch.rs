//! Batch processor (spec §4.6) — the central coordinator.
//!
//! Given N original inputs, produces N-or-more annotation records (or a
//! per-input error) such that each record's `original_input` is faithfully
//! recoverable, while minimising remote calls: inputs that canonicalise to
//! the same VEP region share one network round trip.

use crate::cache::CacheManager;
use crate::error::PipelineError;
use crate::format::detect_format;
use crate::http::HttpClient;
use crate::model::{AnnotationRecord, InputFormat};
use crate::recoder::{RecoderClient, DEFAULT_CHUNK_SIZE};
use crate::vep::{format_cnv_region, format_vcf_region, VepClient};
use indexmap::IndexMap;
use multimap::MultiMap;

/// Whether a single input's failure aborts the whole batch or is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    PerInput,
    FailFast,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub cache_enabled: bool,
    pub chunk_size: usize,
    pub failure_mode: FailureMode,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            failure_mode: FailureMode::PerInput,
        }
    }
}

/// One fan-out entry: which original input (and, for the HGVS path, which
/// recoder allele) a formatted VEP region came from.
#[derive(Debug, Clone)]
struct FanoutEntry {
    original_input: String,
    allele: Option<String>,
    vcf_string: Option<String>,
    recoder_data: Option<crate::model::Node>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub annotations: Vec<AnnotationRecord>,
    /// `(original_input, error)` pairs, populated only in `FailureMode::PerInput`.
    pub failures: Vec<(String, PipelineError)>,
}

/// Run the full classify → canonicalise → annotate → merge pipeline for a
/// batch of raw input strings (spec §4.6 steps 1–6).
pub async fn process_batch(
    inputs: &[String],
    http: &HttpClient,
    cache: Option<&CacheManager>,
    options: &BatchOptions,
) -> Result<BatchResult, PipelineError> {
    let mut result = BatchResult::default();

    let mut vcf_like: Vec<(String, String)> = Vec::new(); // (original, formatted region)
    let mut cnv_like: Vec<(String, String)> = Vec::new();
    let mut hgvs_like: Vec<String> = Vec::new();

    for input in inputs {
        let format = match detect_format(input) {
            Ok(f) => f,
            Err(e) => {
                if options.failure_mode == FailureMode::FailFast {
                    return Err(e);
                }
                result.failures.push((input.clone(), e));
                continue;
            }
        };
        match format {
            InputFormat::Vcf => match format_vcf_from_short(input) {
                Ok(region) => vcf_like.push((input.clone(), region)),
                Err(e) => {
                    if options.failure_mode == FailureMode::FailFast {
                        return Err(e);
                    }
                    result.failures.push((input.clone(), e));
                }
            },
            InputFormat::Cnv => match format_cnv_from_notation(input) {
                Ok(region) => cnv_like.push((input.clone(), region)),
                Err(e) => {
                    if options.failure_mode == FailureMode::FailFast {
                        return Err(e);
                    }
                    result.failures.push((input.clone(), e));
                }
            },
            InputFormat::Hgvs => hgvs_like.push(input.clone()),
        }
    }

    // Fan-out table: formatted region -> list of (originalInput, allele, vcfString, recoderData)
    let mut fanout: MultiMap<String, FanoutEntry> = MultiMap::new();
    for (original, region) in &vcf_like {
        fanout.insert(
            region.clone(),
            FanoutEntry {
                original_input: original.clone(),
                allele: None,
                vcf_string: None,
                recoder_data: None,
            },
        );
    }
    for (original, region) in &cnv_like {
        fanout.insert(
            region.clone(),
            FanoutEntry {
                original_input: original.clone(),
                allele: None,
                vcf_string: None,
                recoder_data: None,
            },
        );
    }

    if !hgvs_like.is_empty() {
        let recoder = RecoderClient::new(http);
        let recoder_options = IndexMap::new();
        let recoder_results = recoder
            .recode_many(
                &hgvs_like,
                &recoder_options,
                options.chunk_size,
                options.cache_enabled,
                cache,
            )
            .await?;

        for (original, recoder_result) in hgvs_like.iter().zip(recoder_results.iter()) {
            let mut any_canonical = false;
            for (allele_key, entry) in recoder_result {
                for vcf_string in &entry.vcf_strings {
                    if let Some(region) = region_from_vcf_string(vcf_string) {
                        any_canonical = true;
                        fanout.insert(
                            region,
                            FanoutEntry {
                                original_input: original.clone(),
                                allele: Some(allele_key.clone()),
                                vcf_string: Some(vcf_string.clone()),
                                recoder_data: Some(crate::model::Node::Object(
                                    IndexMap::from([(
                                        allele_key.clone(),
                                        crate::model::Node::Array(
                                            entry
                                                .vcf_strings
                                                .iter()
                                                .map(|s| crate::model::Node::String(s.clone()))
                                                .collect(),
                                        ),
                                    )]),
                                )),
                            },
                        );
                    }
                }
            }
            if !any_canonical {
                let error = PipelineError::canonicalisation(
                    original.clone(),
                    "recoder returned no canonical VCF string",
                );
                if options.failure_mode == FailureMode::FailFast {
                    return Err(error);
                }
                result.failures.push((original.clone(), error));
            }
        }
    }

    let unique_regions: Vec<String> = fanout.keys().cloned().collect();
    if unique_regions.is_empty() {
        return Ok(result);
    }

    let vep = VepClient::new(http);
    let vep_options = IndexMap::new();
    let vep_annotations = vep
        .annotate_regions(&unique_regions, &vep_options, options.cache_enabled, cache)
        .await?;

    for (region, annotation) in unique_regions.iter().zip(vep_annotations.iter()) {
        let Some(entries) = fanout.get_vec(region) else {
            continue;
        };
        for entry in entries {
            let mut record = annotation.clone();
            record.original_input = entry.original_input.clone();
            record.input_format = detect_format(&entry.original_input).ok();
            record.input = region.clone();
            record.allele = entry.allele.clone();
            record.vcf_string = entry.vcf_string.clone();
            record.recoder_data = entry.recoder_data.clone();
            result.annotations.push(record);
        }
    }

    Ok(result)
}

fn format_vcf_from_short(input: &str) -> Result<String, PipelineError> {
    let probe = input.strip_prefix("chr").or_else(|| input.strip_prefix("Chr")).unwrap_or(input);
    let parts: Vec<&str> = probe.splitn(4, '-').collect();
    let [chrom, pos, reference, alt] = parts[..] else {
        return Err(PipelineError::validation(format!(
            "malformed VCF-short input: {input:?}"
        )));
    };
    Ok(format_vcf_region(chrom, pos, reference, alt))
}

fn format_cnv_from_notation(input: &str) -> Result<String, PipelineError> {
    let probe = input.strip_prefix("chr").or_else(|| input.strip_prefix("Chr")).unwrap_or(input);
    let parts: Vec<&str> = probe.splitn(3, ':').collect();
    let [chrom, range, kind] = parts[..] else {
        return Err(PipelineError::validation(format!("malformed CNV input: {input:?}")));
    };
    let (start, end) = range.split_once('-').ok_or_else(|| {
        PipelineError::validation(format!("malformed CNV range in input: {input:?}"))
    })?;
    Ok(format_cnv_region(chrom, start, end, kind))
}

/// Derive a VEP region string from a recoder-emitted VCF string
/// (`chrom-pos-ref-alt` or `chrom:pos:ref:alt`, colon and dash both seen in
/// the wild).
fn region_from_vcf_string(vcf_string: &str) -> Option<String> {
    let normalized = vcf_string.replace(':', "-");
    let parts: Vec<&str> = normalized.splitn(4, '-').collect();
    match parts[..] {
        [chrom, pos, reference, alt] => Some(format_vcf_region(chrom, pos, reference, alt)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_vcf_short_input() {
        assert_eq!(
            format_vcf_from_short("1-12345-A-G").unwrap(),
            "1 12345 . A G . . ."
        );
        assert_eq!(
            format_vcf_from_short("chr1-12345-A-G").unwrap(),
            "1 12345 . A G . . ."
        );
    }

    #[test]
    fn formats_cnv_notation() {
        assert_eq!(
            format_cnv_from_notation("7:117559600-117559609:DEL").unwrap(),
            "7 117559600 117559609 deletion 1"
        );
    }

    #[test]
    fn derives_region_from_vcf_string_variants() {
        assert_eq!(
            region_from_vcf_string("1:12345:A:T").as_deref(),
            Some("1 12345 . A T . . .")
        );
        assert_eq!(
            region_from_vcf_string("1-12345-A-T").as_deref(),
            Some("1 12345 . A T . . .")
        );
    }

    #[test]
    fn malformed_vcf_short_is_a_validation_error() {
        assert!(format_vcf_from_short("not-a-variant").is_err());
    }
}

//! VEP client (spec §4.5): region-batch annotation retrieval.

use crate::cache::CacheManager;
use crate::error::PipelineError;
use crate::http::HttpClient;
use crate::model::{AnnotationRecord, AnnotationRecordBuilder, Impact, Node, TranscriptConsequence, TranscriptConsequenceBuilder};
use indexmap::IndexMap;
use reqwest::Method;

pub struct VepClient<'a> {
    http: &'a HttpClient,
}

impl<'a> VepClient<'a> {
    pub fn new(http: &'a HttpClient) -> Self {
        Self { http }
    }

    /// `annotateRegions(regionStrings, options, cache) -> annotation[]`.
    ///
    /// The response array's order corresponds to the submitted region order
    /// (spec §5); the caller re-associates by index, not by value.
    pub async fn annotate_regions(
        &self,
        region_strings: &[String],
        options: &IndexMap<String, String>,
        cache_enabled: bool,
        cache: Option<&CacheManager>,
    ) -> Result<Vec<AnnotationRecord>, PipelineError> {
        let body = Node::Object(IndexMap::from([(
            "variants".to_string(),
            Node::Array(
                region_strings
                    .iter()
                    .map(|s| Node::String(s.clone()))
                    .collect(),
            ),
        )]));
        let query: Vec<(&str, &str)> = options.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        let data = self
            .http
            .fetch(
                "vep/human/region",
                &query,
                cache_enabled,
                Method::POST,
                Some(&body),
                cache,
            )
            .await?;

        let items = data.as_array().unwrap_or(&[]);
        if items.len() != region_strings.len() {
            tracing::warn!(
                submitted = region_strings.len(),
                returned = items.len(),
                "VEP response length does not match submitted region count"
            );
        }

        items
            .iter()
            .zip(region_strings.iter())
            .map(|(item, region)| parse_annotation(item, region))
            .collect()
    }
}

fn parse_annotation(node: &Node, region: &str) -> Result<AnnotationRecord, PipelineError> {
    let seq_region_name = node.get("seq_region_name").as_str().unwrap_or_default().to_string();
    let start = node.get("start").as_f64().unwrap_or(0.0) as i64;
    let end = node.get("end").as_f64().unwrap_or(0.0) as i64;
    let allele_string = node.get("allele_string").as_str().unwrap_or_default().to_string();
    let variant_key = format!(
        "{}-{}-{}",
        seq_region_name,
        start,
        allele_string.replace('/', "-")
    );

    let most_severe_consequence = node
        .get("most_severe_consequence")
        .as_str()
        .map(str::to_string);

    let transcript_consequences = node
        .get("transcript_consequences")
        .as_array()
        .map(|items| items.iter().map(parse_transcript_consequence).collect())
        .unwrap_or_default();

    let phenotypes = node
        .get("phenotypes")
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|p| {
                    p.get("phenotype")
                        .as_str()
                        .map(str::to_string)
                        .or_else(|| p.as_str().map(str::to_string))
                })
                .collect()
        })
        .unwrap_or_default();

    let cadd_phred = node.get("cadd_phred").as_f64();
    let dosage_sensitivity = node.get("dosage_sensitivity").as_str().map(str::to_string);

    let mut builder = AnnotationRecordBuilder::default();
    builder
        .input(region.to_string())
        .variant_key(variant_key)
        .seq_region_name(seq_region_name)
        .start(start)
        .end(end)
        .allele_string(allele_string)
        .transcript_consequences(transcript_consequences)
        .phenotypes(phenotypes);
    if let Some(msc) = most_severe_consequence {
        builder.most_severe_consequence(msc);
    }
    if let Some(sensitivity) = dosage_sensitivity {
        builder.dosage_sensitivity(sensitivity);
    }
    if let Some(phred) = cadd_phred {
        builder.cadd_phred(phred);
    }
    builder
        .build()
        .map_err(|e| PipelineError::Validation(e.to_string()))
}

fn parse_transcript_consequence(node: &Node) -> TranscriptConsequence {
    let consequence_terms = node
        .get("consequence_terms")
        .as_array()
        .map(|items| items.iter().filter_map(|n| n.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let impact = node
        .get("impact")
        .as_str()
        .and_then(|s| s.parse::<Impact>().ok());

    let mane = node.get("mane").as_bool().or_else(|| {
        node.get("mane_select").as_str().map(|s| !s.is_empty())
    });

    let mut builder = TranscriptConsequenceBuilder::default();
    builder.consequence_terms(consequence_terms);
    macro_rules! set_opt_str {
        ($field:ident, $key:expr) => {
            if let Some(value) = node.get($key).as_str().map(str::to_string) {
                builder.$field(value);
            }
        };
    }
    set_opt_str!(transcript_id, "transcript_id");
    set_opt_str!(gene_id, "gene_id");
    set_opt_str!(gene_symbol, "gene_symbol");
    set_opt_str!(feature_type, "feature_type");
    set_opt_str!(biotype, "biotype");
    set_opt_str!(hgvsc, "hgvsc");
    set_opt_str!(hgvsp, "hgvsp");
    set_opt_str!(amino_acids, "amino_acids");
    set_opt_str!(codons, "codons");
    set_opt_str!(sift_prediction, "sift_prediction");
    set_opt_str!(polyphen_prediction, "polyphen_prediction");
    if let Some(impact) = impact {
        builder.impact(impact);
    }
    if let Some(start) = node.get("protein_start").as_f64().map(|n| n as i64) {
        builder.protein_start(start);
    }
    if let Some(end) = node.get("protein_end").as_f64().map(|n| n as i64) {
        builder.protein_end(end);
    }
    if let Some(pick) = node.get("pick").as_f64().map(|n| n == 1.0) {
        builder.pick(pick);
    }
    if let Some(mane) = mane {
        builder.mane(mane);
    }
    if let Some(canonical) = node.get("canonical").as_f64().map(|n| n == 1.0) {
        builder.canonical(canonical);
    }
    builder.extra(extra_fields(node, KNOWN_TRANSCRIPT_CONSEQUENCE_FIELDS));
    builder.build().unwrap_or_default()
}

/// Field names `parse_transcript_consequence` promotes to a named struct
/// field; everything else on the response node is carried through `extra`
/// so path extraction (spec §4.7) and scoring can still reach it.
const KNOWN_TRANSCRIPT_CONSEQUENCE_FIELDS: &[&str] = &[
    "transcript_id",
    "gene_id",
    "gene_symbol",
    "feature_type",
    "consequence_terms",
    "impact",
    "biotype",
    "hgvsc",
    "hgvsp",
    "protein_start",
    "protein_end",
    "amino_acids",
    "codons",
    "sift_prediction",
    "polyphen_prediction",
    "pick",
    "mane",
    "mane_select",
    "canonical",
];

fn extra_fields(node: &Node, known: &[&str]) -> IndexMap<String, Node> {
    node.as_object()
        .map(|map| {
            map.iter()
                .filter(|(key, _)| !known.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Format a `CHROM-POS-REF-ALT` VCF-short string into the VEP region grammar:
/// `CHROM POS . REF ALT . . .` (spec §4.5, §8 scenario 1).
pub fn format_vcf_region(chrom: &str, pos: &str, reference: &str, alt: &str) -> String {
    format!("{chrom} {pos} . {reference} {alt} . . .")
}

/// Format a CNV region: `CHROM START END {deletion|duplication|CNV} 1`.
pub fn format_cnv_region(chrom: &str, start: &str, end: &str, kind: &str) -> String {
    let kind_name = match kind.to_ascii_uppercase().as_str() {
        "DEL" => "deletion",
        "DUP" => "duplication",
        other => other,
    };
    format!("{chrom} {start} {end} {kind_name} 1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_vcf_region_grammar() {
        assert_eq!(
            format_vcf_region("1", "12345", "A", "G"),
            "1 12345 . A G . . ."
        );
    }

    #[test]
    fn formats_cnv_region_grammar() {
        assert_eq!(
            format_cnv_region("7", "117559600", "117559609", "DEL"),
            "7 117559600 117559609 deletion 1"
        );
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn mismatched_response_length_logs_a_warning() {
        use crate::http::{HttpClient, HttpClientConfig};
        use tracing_test::logs_contain;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vep/human/region"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "seq_region_name": "1",
                "start": 1,
                "end": 1,
                "allele_string": "A/G",
            }])))
            .mount(&server)
            .await;

        let http = HttpClient::new(HttpClientConfig::new(server.uri())).unwrap();
        let vep = VepClient::new(&http);
        let regions = vec!["1 1 . A G . . .".to_string(), "1 2 . A G . . .".to_string()];
        let _ = vep.annotate_regions(&regions, &IndexMap::new(), false, None).await;

        assert!(logs_contain("VEP response length does not match submitted region count"));
    }

    #[test]
    fn parses_annotation_record_fields() {
        let node = Node::Object(IndexMap::from([
            ("seq_region_name".to_string(), Node::String("1".to_string())),
            ("start".to_string(), Node::Number(12345.0)),
            ("end".to_string(), Node::Number(12345.0)),
            ("allele_string".to_string(), Node::String("A/G".to_string())),
            (
                "most_severe_consequence".to_string(),
                Node::String("missense_variant".to_string()),
            ),
            ("transcript_consequences".to_string(), Node::Array(vec![])),
        ]));
        let annotation = parse_annotation(&node, "1 12345 . A G . . .").unwrap();
        assert_eq!(annotation.seq_region_name, "1");
        assert_eq!(annotation.variant_key, "1-12345-A-G");
        assert_eq!(
            annotation.most_severe_consequence.as_deref(),
            Some("missense_variant")
        );
    }
}

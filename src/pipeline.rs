//! Pipeline driver: the external-facing orchestration entry point wiring
//! format detection, canonicalisation, annotation retrieval, caching,
//! scoring, inheritance deduction, and feature enrichment into one `run()`
//! call (`[ADDED]`, SPEC_FULL.md §2).

use crate::batch::{process_batch, BatchOptions, FailureMode};
use crate::cache::{CacheManager, CacheManagerConfig};
use crate::error::PipelineError;
use crate::http::{HttpClient, HttpClientConfig};
use crate::inheritance::{self, RoleMap};
use crate::model::{AnnotationRecord, GenotypeMap, PedigreeEntry};
use crate::scoring::ScoringConfig;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub base_url: String,
    pub cache_enabled: bool,
    pub cache: CacheManagerConfig,
    pub chunk_size: usize,
    pub fail_fast: bool,
    pub calculate_inheritance: bool,
    pub role_map: Option<RoleMap>,
    pub pedigree: Option<Vec<PedigreeEntry>>,
    pub scoring_config: Option<ScoringConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: "https://rest.ensembl.org".to_string(),
            cache_enabled: true,
            cache: CacheManagerConfig::default(),
            chunk_size: crate::recoder::DEFAULT_CHUNK_SIZE,
            fail_fast: false,
            calculate_inheritance: false,
            role_map: None,
            pedigree: None,
            scoring_config: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunMeta {
    pub batch_size: usize,
    pub steps_performed: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub meta: RunMeta,
    pub annotation_data: Vec<AnnotationRecord>,
    /// `(original_input, error)` pairs for inputs that failed without
    /// aborting the batch (spec §7 "partial failure").
    pub failures: Vec<(String, String)>,
}

pub struct Pipeline {
    http: HttpClient,
    cache: Option<CacheManager>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let http = HttpClient::new(HttpClientConfig::new(config.base_url.clone()))?;
        let cache = config.cache_enabled.then(|| CacheManager::new(config.cache.clone()));
        Ok(Self { http, cache, config })
    }

    /// Run every configured stage over `inputs` and return the assembled
    /// output. Per-input failures are collected unless `fail_fast` is set,
    /// in which case the first error aborts the whole run (spec §7).
    pub async fn run(
        &self,
        inputs: &[String],
        genotypes: Option<&GenotypeMap>,
    ) -> Result<PipelineOutput, PipelineError> {
        let mut steps = vec!["format_detection".to_string(), "canonicalisation".to_string()];

        let batch_options = BatchOptions {
            cache_enabled: self.config.cache_enabled,
            chunk_size: self.config.chunk_size,
            failure_mode: if self.config.fail_fast {
                FailureMode::FailFast
            } else {
                FailureMode::PerInput
            },
        };

        let batch_result = process_batch(inputs, &self.http, self.cache.as_ref(), &batch_options).await?;
        steps.push("annotation_retrieval".to_string());

        let mut annotations = batch_result.annotations;

        if let Some(scoring_config) = &self.config.scoring_config {
            for annotation in &mut annotations {
                annotation.scores = crate::scoring::compute_scores(annotation, scoring_config);
            }
            steps.push("scoring".to_string());
        }

        if self.config.calculate_inheritance {
            if let Some(genotypes_by_variant) = genotypes {
                for annotation in &mut annotations {
                    if let Some(row) = genotypes_by_variant.get(&annotation.variant_key) {
                        let result = inheritance::deduce_for_variant(
                            &annotation.seq_region_name,
                            row,
                            self.config.pedigree.as_deref(),
                            self.config.role_map.as_ref(),
                        );
                        annotation.inheritance = Some(result);
                    }
                }

                if let Some(role_map) = &self.config.role_map {
                    inheritance::apply_compound_het(
                        &mut annotations,
                        genotypes_by_variant,
                        &role_map.index,
                        role_map.mother.as_deref(),
                        role_map.father.as_deref(),
                    );
                }
            }
            steps.push("inheritance_deduction".to_string());
        }

        Ok(PipelineOutput {
            meta: RunMeta {
                batch_size: inputs.len(),
                steps_performed: steps,
            },
            annotation_data: annotations,
            failures: batch_result
                .failures
                .into_iter()
                .map(|(input, err)| (input, err.to_string()))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inheritance::Pattern;
    use crate::model::GenotypeMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn default_config_points_at_ensembl() {
        let config = PipelineConfig::default();
        assert_eq!(config.base_url, "https://rest.ensembl.org");
        assert_eq!(config.chunk_size, crate::recoder::DEFAULT_CHUNK_SIZE);
    }

    /// Scenario 1 (spec §8): VCF input, single variant, JSON output.
    #[tokio::test]
    async fn vcf_input_single_variant_round_trips_original_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vep/human/region"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "seq_region_name": "1",
                "start": 12345,
                "end": 12345,
                "allele_string": "A/G",
                "most_severe_consequence": "missense_variant",
                "transcript_consequences": [{"gene_symbol": "DEMO", "consequence_terms": ["missense_variant"]}],
            }])))
            .mount(&server)
            .await;

        let pipeline = Pipeline::new(PipelineConfig {
            base_url: server.uri(),
            cache_enabled: false,
            ..Default::default()
        })
        .unwrap();

        let output = pipeline.run(&["1-12345-A-G".to_string()], None).await.unwrap();

        assert_eq!(output.annotation_data.len(), 1);
        let annotation = &output.annotation_data[0];
        assert_eq!(annotation.original_input, "1-12345-A-G");
        assert_eq!(annotation.input_format, Some(crate::model::InputFormat::Vcf));
        assert_eq!(annotation.input, "1 12345 . A G . . .");
    }

    /// Scenario 2 (spec §8): an HGVS/rsID input recoded to the same shape of
    /// region as a directly-given VCF input; both keep their own original input.
    #[tokio::test]
    async fn hgvs_input_recodes_alongside_direct_vcf_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/variant_recoder/human"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[{
                "A": {"vcf_string": ["5:169557518:G:A"]},
            }]])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/vep/human/region"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "seq_region_name": "5",
                    "start": 169557518,
                    "end": 169557518,
                    "allele_string": "G/A",
                    "most_severe_consequence": "missense_variant",
                    "transcript_consequences": [],
                },
                {
                    "seq_region_name": "5",
                    "start": 169557518,
                    "end": 169557518,
                    "allele_string": "G/A",
                    "most_severe_consequence": "missense_variant",
                    "transcript_consequences": [],
                },
            ])))
            .mount(&server)
            .await;

        let pipeline = Pipeline::new(PipelineConfig {
            base_url: server.uri(),
            cache_enabled: false,
            ..Default::default()
        })
        .unwrap();

        let output = pipeline
            .run(&["rs6025".to_string(), "5-169557518-G-A".to_string()], None)
            .await
            .unwrap();

        assert_eq!(output.annotation_data.len(), 2);
        let originals: Vec<&str> = output
            .annotation_data
            .iter()
            .map(|a| a.original_input.as_str())
            .collect();
        assert!(originals.contains(&"rs6025"));
        assert!(originals.contains(&"5-169557518-G-A"));
        assert!(output
            .annotation_data
            .iter()
            .all(|a| a.most_severe_consequence.as_deref() == Some("missense_variant")));
    }

    /// Scenario 3 (spec §8): CNV deletion with overlap and phenotype data.
    #[tokio::test]
    async fn cnv_deletion_carries_overlap_and_phenotype_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vep/human/region"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "seq_region_name": "7",
                "start": 117559600,
                "end": 117559609,
                "allele_string": "DEL",
                "most_severe_consequence": "transcript_ablation",
                "transcript_consequences": [{
                    "consequence_terms": ["transcript_ablation"],
                    "bp_overlap": 9,
                    "percentage_overlap": 100,
                }],
                "phenotypes": [{"phenotype": "Cystic fibrosis"}],
            }])))
            .mount(&server)
            .await;

        let pipeline = Pipeline::new(PipelineConfig {
            base_url: server.uri(),
            cache_enabled: false,
            ..Default::default()
        })
        .unwrap();

        let output = pipeline
            .run(&["7:117559600-117559609:DEL".to_string()], None)
            .await
            .unwrap();

        assert_eq!(output.annotation_data.len(), 1);
        let annotation = &output.annotation_data[0];
        assert_eq!(annotation.input_format, Some(crate::model::InputFormat::Cnv));
        assert!(annotation.phenotypes.iter().any(|p| p == "Cystic fibrosis"));

        let overlap = &annotation.transcript_consequences[0].extra;
        assert_eq!(overlap.get("bp_overlap"), Some(&crate::model::Node::Number(9.0)));
        assert_eq!(
            overlap.get("percentage_overlap"),
            Some(&crate::model::Node::Number(100.0))
        );
    }

    /// Scenario 6 (spec §8): compound-het detection across a trio.
    #[tokio::test]
    async fn compound_het_detected_across_trio_genotypes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vep/human/region"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "seq_region_name": "17",
                    "start": 100,
                    "end": 100,
                    "allele_string": "A/G",
                    "transcript_consequences": [{"gene_symbol": "BRCA1", "pick": 1}],
                },
                {
                    "seq_region_name": "17",
                    "start": 200,
                    "end": 200,
                    "allele_string": "C/T",
                    "transcript_consequences": [{"gene_symbol": "BRCA1", "pick": 1}],
                },
            ])))
            .mount(&server)
            .await;

        let pipeline = Pipeline::new(PipelineConfig {
            base_url: server.uri(),
            cache_enabled: false,
            calculate_inheritance: true,
            role_map: Some(crate::inheritance::RoleMap {
                index: "index".to_string(),
                mother: Some("mother".to_string()),
                father: Some("father".to_string()),
            }),
            ..Default::default()
        })
        .unwrap();

        let inputs = vec!["17-100-A-G".to_string(), "17-200-C-T".to_string()];
        let genotypes: GenotypeMap = IndexMap::from([
            (
                "17-100-A-G".to_string(),
                IndexMap::from([
                    ("index".to_string(), "0/1".to_string()),
                    ("mother".to_string(), "0/0".to_string()),
                    ("father".to_string(), "0/1".to_string()),
                ]),
            ),
            (
                "17-200-C-T".to_string(),
                IndexMap::from([
                    ("index".to_string(), "0/1".to_string()),
                    ("mother".to_string(), "0/1".to_string()),
                    ("father".to_string(), "0/0".to_string()),
                ]),
            ),
        ]);

        let output = pipeline.run(&inputs, Some(&genotypes)).await.unwrap();

        assert_eq!(output.annotation_data.len(), 2);
        for annotation in &output.annotation_data {
            let inheritance = annotation.inheritance.as_ref().expect("inheritance computed");
            assert_eq!(inheritance.prioritized_pattern, Pattern::CompoundHeterozygous);
            let comp_het = inheritance.comp_het.as_ref().expect("comp_het attached");
            assert_eq!(comp_het.partner_variant_keys.len(), 1);
        }
    }
}

//! Gene-scoped compound-heterozygous detection (spec §4.9).

use super::genotype;
use crate::model::{AnnotationRecord, GenotypeMap};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompHetInfo {
    pub gene: String,
    pub partner_variant_keys: Vec<String>,
    /// `true` when both parental origins (paternal and maternal) were
    /// confirmed; otherwise this is a `_possible` candidate (spec §4.9).
    pub confirmed: bool,
}

fn gene_symbol_of(annotation: &AnnotationRecord) -> Option<String> {
    annotation
        .prioritized_transcript()
        .and_then(|t| t.gene_symbol.clone())
}

/// Detect compound-het candidates across `annotations`, scoped per gene.
///
/// Within a gene, any two-or-more variants where the index sample is het are
/// grouped; if both parents are genotyped for every variant in the group,
/// each is classified paternal/maternal/ambiguous by which parent carries it,
/// and a confirmed comp-het requires at least one paternal and one maternal
/// variant. Otherwise (missing parental data) the group is marked as a
/// `_possible` candidate only (spec §4.9).
pub fn detect_compound_het(
    annotations: &[AnnotationRecord],
    genotypes: &GenotypeMap,
    index_sample: &str,
    mother_sample: Option<&str>,
    father_sample: Option<&str>,
) -> IndexMap<String, CompHetInfo> {
    let mut by_gene: IndexMap<String, Vec<&AnnotationRecord>> = IndexMap::new();
    for annotation in annotations {
        if let Some(gene) = gene_symbol_of(annotation) {
            by_gene.entry(gene).or_default().push(annotation);
        }
    }

    let mut result = IndexMap::new();

    for (gene, members) in by_gene {
        let het_variant_keys: Vec<&str> = members
            .iter()
            .filter(|a| {
                genotypes
                    .get(&a.variant_key)
                    .and_then(|row| row.get(index_sample))
                    .is_some_and(|gt| genotype::is_het(gt))
            })
            .map(|a| a.variant_key.as_str())
            .collect();

        if het_variant_keys.len() < 2 {
            continue;
        }

        let both_parents_known = mother_sample.is_some() && father_sample.is_some();
        let mut paternal = Vec::new();
        let mut maternal = Vec::new();
        let mut fully_genotyped = both_parents_known;

        if both_parents_known {
            let mother_sample = mother_sample.unwrap();
            let father_sample = father_sample.unwrap();
            for key in &het_variant_keys {
                let Some(row) = genotypes.get(*key) else {
                    fully_genotyped = false;
                    continue;
                };
                let (Some(mother_gt), Some(father_gt)) =
                    (row.get(mother_sample), row.get(father_sample))
                else {
                    fully_genotyped = false;
                    continue;
                };
                let father_has = genotype::is_variant(father_gt);
                let mother_has = genotype::is_variant(mother_gt);
                if father_has && !mother_has {
                    paternal.push(*key);
                } else if mother_has && !father_has {
                    maternal.push(*key);
                }
            }
        }

        let confirmed = fully_genotyped && !paternal.is_empty() && !maternal.is_empty();

        for key in &het_variant_keys {
            let partners = het_variant_keys
                .iter()
                .filter(|k| **k != *key)
                .map(|k| k.to_string())
                .collect();
            result.insert(
                key.to_string(),
                CompHetInfo {
                    gene: gene.clone(),
                    partner_variant_keys: partners,
                    confirmed,
                },
            );
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnnotationRecord;

    fn annotation(variant_key: &str, gene: &str) -> AnnotationRecord {
        let mut record = AnnotationRecord::default();
        record.variant_key = variant_key.to_string();
        record.transcript_consequences = vec![crate::model::TranscriptConsequence {
            gene_symbol: Some(gene.to_string()),
            pick: Some(true),
            ..Default::default()
        }];
        record
    }

    #[test]
    fn confirms_comp_het_with_one_paternal_one_maternal() {
        let annotations = vec![annotation("v1", "BRCA1"), annotation("v2", "BRCA1")];
        let genotypes: GenotypeMap = IndexMap::from([
            (
                "v1".to_string(),
                IndexMap::from([
                    ("index".to_string(), "0/1".to_string()),
                    ("mother".to_string(), "0/0".to_string()),
                    ("father".to_string(), "0/1".to_string()),
                ]),
            ),
            (
                "v2".to_string(),
                IndexMap::from([
                    ("index".to_string(), "0/1".to_string()),
                    ("mother".to_string(), "0/1".to_string()),
                    ("father".to_string(), "0/0".to_string()),
                ]),
            ),
        ]);

        let result = detect_compound_het(&annotations, &genotypes, "index", Some("mother"), Some("father"));
        assert!(result["v1"].confirmed);
        assert!(result["v2"].confirmed);
        assert_eq!(result["v1"].partner_variant_keys, vec!["v2".to_string()]);
    }

    #[test]
    fn marks_possible_when_parents_unknown() {
        let annotations = vec![annotation("v1", "BRCA1"), annotation("v2", "BRCA1")];
        let genotypes: GenotypeMap = IndexMap::from([
            ("v1".to_string(), IndexMap::from([("index".to_string(), "0/1".to_string())])),
            ("v2".to_string(), IndexMap::from([("index".to_string(), "0/1".to_string())])),
        ]);

        let result = detect_compound_het(&annotations, &genotypes, "index", None, None);
        assert!(!result["v1"].confirmed);
    }

    #[test]
    fn single_het_variant_in_gene_is_not_comp_het() {
        let annotations = vec![annotation("v1", "BRCA1")];
        let genotypes: GenotypeMap = IndexMap::from([(
            "v1".to_string(),
            IndexMap::from([("index".to_string(), "0/1".to_string())]),
        )]);
        let result = detect_compound_het(&annotations, &genotypes, "index", None, None);
        assert!(result.is_empty());
    }
}

//! Feature annotator (spec §4, "Attaching region/gene overlaps from
//! pre-built indexes"). The interval trees and gene sets themselves are
//! built by an external loader (BED / gene-list / JSON-gene, spec §1); this
//! module only consumes them.

use crate::model::{AnnotationRecord, Node};
use indexmap::IndexMap;
use std::collections::HashSet;

/// One user-supplied named region overlapping a variant.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureHit {
    pub name: String,
    pub start: i64,
    pub end: i64,
}

/// Per-chromosome interval index, built and owned by the external loader.
/// Implementors are free to back this with any interval-tree crate; the
/// annotator only ever calls `overlaps`.
pub trait IntervalIndex {
    fn overlaps(&self, chrom: &str, start: i64, end: i64) -> Vec<FeatureHit>;
}

/// A already-built gene set (by symbol or Ensembl gene id), also provided by
/// an external loader.
pub type GeneSet = HashSet<String>;

/// Attach `{regions: [...], inGeneSet: bool}`-shaped overlaps to one
/// annotation's `feature_overlaps` map, keyed by the supplied index name.
pub fn annotate_features(
    annotation: &mut AnnotationRecord,
    indexes: &IndexMap<String, Box<dyn IntervalIndex>>,
    gene_sets: &IndexMap<String, GeneSet>,
) {
    for (name, index) in indexes {
        let hits = index.overlaps(&annotation.seq_region_name, annotation.start, annotation.end);
        if !hits.is_empty() {
            annotation.feature_overlaps.insert(
                name.clone(),
                Node::Array(
                    hits.into_iter()
                        .map(|h| {
                            Node::Object(IndexMap::from([
                                ("name".to_string(), Node::String(h.name)),
                                ("start".to_string(), Node::Number(h.start as f64)),
                                ("end".to_string(), Node::Number(h.end as f64)),
                            ]))
                        })
                        .collect(),
                ),
            );
        }
    }

    for (name, genes) in gene_sets {
        let in_set = annotation
            .transcript_consequences
            .iter()
            .any(|t| t.gene_symbol.as_deref().is_some_and(|g| genes.contains(g))
                || t.gene_id.as_deref().is_some_and(|g| genes.contains(g)));
        if in_set {
            annotation
                .feature_overlaps
                .insert(name.clone(), Node::Bool(true));
        }
    }
}

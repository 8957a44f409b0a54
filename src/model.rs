//! Core data model (spec §3).
//!
//! `Node` is the recursive sum type annotations are read into (spec §9,
//! "heterogeneous annotation values"); the rest of this module is the
//! concrete record shapes that flow between pipeline stages.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A JSON-like value with a stable, explicit shape instead of relying on
/// `serde_json::Value`'s untyped `Map`. Path extraction (`src/extract.rs`)
/// and scoring (`src/scoring.rs`) walk this directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Node>),
    Object(IndexMap<String, Node>),
}

impl Default for Node {
    fn default() -> Self {
        Node::Null
    }
}

impl Node {
    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Number(n) => Some(*n),
            Node::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Look up a single field on an object node; `Node::Null` (not `None`) for
    /// any other node shape or a missing key, matching the extractor's
    /// "absent key yields default" contract (spec §4.7).
    pub fn get(&self, key: &str) -> Node {
        match self {
            Node::Object(map) => map.get(key).cloned().unwrap_or(Node::Null),
            _ => Node::Null,
        }
    }

    /// Walk a dot-separated path, treating `*` as "every element of the
    /// current array, flattened". Absent keys and type mismatches resolve to
    /// an empty result rather than erroring (spec §4.7).
    pub fn extract_path(&self, path: &str) -> Vec<Node> {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        Self::walk(std::slice::from_ref(self), &segments)
    }

    fn walk(current: &[Node], segments: &[&str]) -> Vec<Node> {
        let Some((head, rest)) = segments.split_first() else {
            return current.to_vec();
        };
        if *head == "*" {
            let mut next = Vec::new();
            for node in current {
                if let Node::Array(items) = node {
                    next.extend(items.iter().cloned());
                } else if !node.is_null() {
                    next.push(node.clone());
                }
            }
            Self::walk(&next, rest)
        } else {
            let next: Vec<Node> = current.iter().map(|node| node.get(head)).collect();
            Self::walk(&next, rest)
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Null => write!(f, ""),
            Node::Bool(b) => write!(f, "{b}"),
            Node::Number(n) => write!(f, "{n}"),
            Node::String(s) => write!(f, "{s}"),
            Node::Array(items) => write!(
                f,
                "{}",
                items
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join(";")
            ),
            Node::Object(_) => write!(f, "{}", serde_json::to_string(self).unwrap_or_default()),
        }
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Node::Null,
            serde_json::Value::Bool(b) => Node::Bool(b),
            serde_json::Value::Number(n) => Node::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Node::String(s),
            serde_json::Value::Array(items) => {
                Node::Array(items.into_iter().map(Node::from).collect())
            }
            serde_json::Value::Object(map) => Node::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Node::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Node> for serde_json::Value {
    fn from(node: Node) -> Self {
        match node {
            Node::Null => serde_json::Value::Null,
            Node::Bool(b) => serde_json::Value::Bool(b),
            Node::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Node::String(s) => serde_json::Value::String(s),
            Node::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Node::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

/// The three input notations the format detector classifies into (spec §3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Serialize, Deserialize)]
pub enum InputFormat {
    #[strum(serialize = "VCF")]
    Vcf,
    #[strum(serialize = "CNV")]
    Cnv,
    #[strum(serialize = "HGVS")]
    Hgvs,
}

/// Ordinal VEP impact scale: `MODIFIER < LOW < MODERATE < HIGH` (spec §3).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumString, Serialize, Deserialize,
)]
pub enum Impact {
    #[strum(serialize = "MODIFIER")]
    Modifier,
    #[strum(serialize = "LOW")]
    Low,
    #[strum(serialize = "MODERATE")]
    Moderate,
    #[strum(serialize = "HIGH")]
    High,
}

/// One predicted effect of a variant on one transcript or feature (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, derive_builder::Builder)]
#[builder(default, setter(into, strip_option))]
pub struct TranscriptConsequence {
    pub transcript_id: Option<String>,
    pub gene_id: Option<String>,
    pub gene_symbol: Option<String>,
    pub feature_type: Option<String>,
    #[builder(setter(each(name = "consequence_term")))]
    pub consequence_terms: Vec<String>,
    pub impact: Option<Impact>,
    pub biotype: Option<String>,
    pub hgvsc: Option<String>,
    pub hgvsp: Option<String>,
    pub protein_start: Option<i64>,
    pub protein_end: Option<i64>,
    pub amino_acids: Option<String>,
    pub codons: Option<String>,
    pub sift_prediction: Option<String>,
    pub polyphen_prediction: Option<String>,
    pub pick: Option<bool>,
    pub mane: Option<bool>,
    pub canonical: Option<bool>,
    /// Extra fields not promoted to a named field, kept for path extraction.
    #[serde(flatten)]
    pub extra: IndexMap<String, Node>,
}

/// The unit of output: one annotation record per `(originalInput, alleleKey)`
/// tuple the batch processor fans out (spec §3, §4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize, derive_builder::Builder)]
#[builder(default, setter(into, strip_option))]
pub struct AnnotationRecord {
    pub original_input: String,
    pub input_format: Option<InputFormat>,
    /// The VEP-formatted region string this annotation was retrieved for.
    pub input: String,
    /// Stable `CHROM-POS-REF-ALT` join key.
    pub variant_key: String,
    pub seq_region_name: String,
    pub start: i64,
    pub end: i64,
    pub allele_string: String,
    pub most_severe_consequence: Option<String>,
    #[builder(setter(each(name = "transcript_consequence")))]
    pub transcript_consequences: Vec<TranscriptConsequence>,
    pub phenotypes: Vec<String>,
    pub dosage_sensitivity: Option<String>,
    pub cadd_phred: Option<f64>,
    /// The recoder allele key this record was produced from, if canonicalised
    /// via the HGVS/rsID path.
    pub allele: Option<String>,
    pub vcf_string: Option<String>,
    pub recoder_data: Option<Node>,
    /// User-feature overlaps attached by the feature annotator.
    pub feature_overlaps: IndexMap<String, Node>,
    /// Inheritance result attached by the inheritance engine, if requested.
    pub inheritance: Option<crate::inheritance::InheritanceResult>,
    /// Computed scores attached by the scoring engine, if configured.
    pub scores: IndexMap<String, f64>,
}

impl AnnotationRecord {
    /// Cascade used by annotation-level scoring (spec §4.8): first transcript
    /// with `pick=1`, else `mane=1`, else `canonical=1`, else the first.
    pub fn prioritized_transcript(&self) -> Option<&TranscriptConsequence> {
        self.transcript_consequences
            .iter()
            .find(|t| t.pick == Some(true))
            .or_else(|| self.transcript_consequences.iter().find(|t| t.mane == Some(true)))
            .or_else(|| {
                self.transcript_consequences
                    .iter()
                    .find(|t| t.canonical == Some(true))
            })
            .or_else(|| self.transcript_consequences.first())
    }
}

/// `{key, data, expiresAt, createdAt}` cache entry (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub data: Node,
    /// Absolute expiry time, milliseconds since the Unix epoch.
    pub expires_at: i64,
    /// Absolute creation time, milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl CacheEntry {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Mapping from canonical variant key to (sample id -> genotype string).
pub type GenotypeMap = IndexMap<String, IndexMap<String, String>>;

/// `{familyId, sampleId, fatherId, motherId, sex, affectedStatus}` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PedigreeEntry {
    pub family_id: String,
    pub sample_id: String,
    /// `"0"` denotes an absent parent.
    pub father_id: String,
    /// `"0"` denotes an absent parent.
    pub mother_id: String,
    pub sex: Sex,
    pub affected_status: AffectedStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male = 1,
    Female = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AffectedStatus {
    Unaffected = 1,
    Affected = 2,
}

impl PedigreeEntry {
    pub fn has_father(&self) -> bool {
        self.father_id != "0"
    }

    pub fn has_mother(&self) -> bool {
        self.mother_id != "0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_extract_path_walks_objects_and_arrays() {
        let node = Node::Object(IndexMap::from([(
            "transcript_consequences".to_string(),
            Node::Array(vec![
                Node::Object(IndexMap::from([(
                    "gene_symbol".to_string(),
                    Node::String("BRCA1".to_string()),
                )])),
                Node::Object(IndexMap::from([(
                    "gene_symbol".to_string(),
                    Node::String("BRCA2".to_string()),
                )])),
            ]),
        )]));

        let genes = node.extract_path("transcript_consequences.*.gene_symbol");
        assert_eq!(
            genes,
            vec![
                Node::String("BRCA1".to_string()),
                Node::String("BRCA2".to_string())
            ]
        );
    }

    #[test]
    fn node_extract_path_missing_key_is_empty() {
        let node = Node::Object(IndexMap::new());
        assert!(node.extract_path("missing.path").iter().all(|n| n.is_null()));
    }

    #[test]
    fn input_format_serializes_as_unit_variant() {
        use serde_test::{assert_tokens, Token};

        assert_tokens(&InputFormat::Vcf, &[Token::UnitVariant {
            name: "InputFormat",
            variant: "Vcf",
        }]);
    }

    #[test]
    fn prioritized_transcript_cascade() {
        let mut rec = AnnotationRecord::default();
        rec.transcript_consequences = vec![
            TranscriptConsequence {
                transcript_id: Some("NM_1".into()),
                canonical: Some(true),
                ..Default::default()
            },
            TranscriptConsequence {
                transcript_id: Some("NM_2".into()),
                pick: Some(true),
                ..Default::default()
            },
        ];
        assert_eq!(
            rec.prioritized_transcript().unwrap().transcript_id.as_deref(),
            Some("NM_2")
        );
    }

    #[test]
    fn prioritized_transcript_falls_back_to_first() {
        let mut rec = AnnotationRecord::default();
        rec.transcript_consequences = vec![TranscriptConsequence {
            transcript_id: Some("NM_1".into()),
            ..Default::default()
        }];
        assert_eq!(
            rec.prioritized_transcript().unwrap().transcript_id.as_deref(),
            Some("NM_1")
        );
    }
}

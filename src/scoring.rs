//! Scoring engine (spec §4.8): variable extraction + formula evaluation over
//! the shared expression evaluator (`src/expr.rs`).

use crate::expr::{eval_str, Env, Value};
use crate::model::{AnnotationRecord, Node, TranscriptConsequence};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    AnnotationLevel,
    TranscriptLevel,
}

/// One variable's extraction rule: `{target, aggregator?, default}`, the same
/// shape the extractor uses, reused here under a different name for clarity
/// in configuration documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSpec {
    pub target: String,
    pub aggregator: Option<crate::extract::Aggregator>,
    pub default: Node,
}

/// Parse the legacy single-string grammar `agg:target|default:N` into the
/// object form (spec §9 "a single normalising step eliminates duplication").
pub fn parse_legacy_variable(spec: &str) -> Option<VariableSpec> {
    let mut aggregator = None;
    let mut target = None;
    let mut default = Node::Null;

    for part in spec.split('|') {
        if let Some(rest) = part.strip_prefix("agg:") {
            // `agg:max:cadd_phred` pairs the aggregator name with the target
            // that follows the second colon.
            let (agg_name, target_name) = rest.split_once(':')?;
            aggregator = match agg_name {
                "max" => Some(crate::extract::Aggregator::Max),
                "min" => Some(crate::extract::Aggregator::Min),
                "avg" | "average" => Some(crate::extract::Aggregator::Avg),
                "unique" => Some(crate::extract::Aggregator::Unique),
                _ => None,
            };
            target = Some(target_name.to_string());
        } else if let Some(value) = part.strip_prefix("default:") {
            default = value
                .parse::<f64>()
                .map(Node::Number)
                .unwrap_or_else(|_| Node::String(value.to_string()));
        }
    }

    target.map(|target| VariableSpec {
        target,
        aggregator,
        default,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub variables: IndexMap<String, VariableSpec>,
    pub formulas: IndexMap<Scope, IndexMap<String, String>>,
}

fn extract_variable(node: &Node, spec: &VariableSpec) -> Value {
    let extract_config = crate::extract::ExtractConfig {
        target: spec.target.clone(),
        aggregator: spec.aggregator,
        condition: None,
        default: spec.default.clone(),
        formatter: None,
    };
    Value::from_node(&crate::extract::extract_column(node, &extract_config))
}

fn annotation_to_node(annotation: &AnnotationRecord) -> Node {
    serde_json::to_value(annotation).map(Node::from).unwrap_or(Node::Null)
}

fn consequence_to_node(consequence: &TranscriptConsequence) -> Node {
    serde_json::to_value(consequence).map(Node::from).unwrap_or(Node::Null)
}

/// Compute every configured score for one annotation record.
///
/// Transcript-level formulas run once per transcript consequence, keyed
/// `{scoreName}@{transcriptId}`; annotation-level formulas run once against
/// the prioritised transcript (pick → mane → canonical → first, spec §4.8).
/// A formula that fails to evaluate is skipped, logged, and does not affect
/// the others (spec §7 category 6).
pub fn compute_scores(annotation: &AnnotationRecord, config: &ScoringConfig) -> IndexMap<String, f64> {
    let mut scores = IndexMap::new();
    let annotation_node = annotation_to_node(annotation);

    let mut base_env: Env = Env::new();
    for (name, spec) in &config.variables {
        base_env.insert(name.clone(), extract_variable(&annotation_node, spec));
    }

    if let Some(formulas) = config.formulas.get(&Scope::AnnotationLevel) {
        let mut env = base_env.clone();
        if let Some(transcript) = annotation.prioritized_transcript() {
            let transcript_node = consequence_to_node(transcript);
            for (name, spec) in &config.variables {
                if !env.contains_key(name) || env.get(name) == Some(&Value::Null) {
                    env.insert(name.clone(), extract_variable(&transcript_node, spec));
                }
            }
        }
        for (score_name, expression) in formulas {
            match eval_str(expression, &env) {
                Ok(value) => {
                    if let Some(n) = value.as_f64() {
                        scores.insert(score_name.clone(), n);
                    }
                }
                Err(e) => {
                    tracing::debug!(score = %score_name, error = %e, "formula evaluation failed, skipped");
                }
            }
        }
    }

    if let Some(formulas) = config.formulas.get(&Scope::TranscriptLevel) {
        for transcript in &annotation.transcript_consequences {
            let transcript_node = consequence_to_node(transcript);
            let mut env = base_env.clone();
            for (name, spec) in &config.variables {
                if !env.contains_key(name) || env.get(name) == Some(&Value::Null) {
                    env.insert(name.clone(), extract_variable(&transcript_node, spec));
                }
            }
            let transcript_id = transcript.transcript_id.clone().unwrap_or_default();
            for (score_name, expression) in formulas {
                match eval_str(expression, &env) {
                    Ok(value) => {
                        if let Some(n) = value.as_f64() {
                            scores.insert(format!("{score_name}@{transcript_id}"), n);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(score = %score_name, transcript = %transcript_id, error = %e, "formula evaluation failed, skipped");
                    }
                }
            }
        }
    }

    scores
}

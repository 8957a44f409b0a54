//! Data extractor (spec §4.7): path-addressed extraction, aggregation, and
//! tabular/flattened output shaping.

use crate::expr::{eval_str, Env, Value};
use crate::model::{AnnotationRecord, Node, TranscriptConsequence};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregator {
    Max,
    Min,
    #[serde(alias = "average")]
    Avg,
    Unique,
}

/// One column's extraction rule (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub target: String,
    pub aggregator: Option<Aggregator>,
    pub condition: Option<String>,
    pub default: Node,
    /// Joiner used when the extracted value is an array and no aggregator
    /// applies; `None` falls back to `;` (spec §4.7 `formatToTabular`).
    pub formatter: Option<String>,
}

/// Extract one column's value from an annotation-shaped `Node`.
///
/// The raw extraction is wrapped into a length-1 array when it is a scalar,
/// *before* aggregation, so a single matching value is never mistaken for "no
/// match" by an aggregator (spec §4.7 "scalar silently falls back" trap).
pub fn extract_column(node: &Node, config: &ExtractConfig) -> Node {
    let raw = node.extract_path(&config.target);
    let raw: Vec<Node> = raw.into_iter().filter(|n| !n.is_null()).collect();

    if let Some(condition) = &config.condition {
        let env: Env = Env::from([("value".to_string(), Value::Array(raw.iter().map(Value::from_node).collect()))]);
        match eval_str(condition, &env) {
            Ok(value) if !value.truthy() => return config.default.clone(),
            Ok(_) => {}
            Err(_) => return config.default.clone(),
        }
    }

    if raw.is_empty() {
        return config.default.clone();
    }

    match config.aggregator {
        Some(agg) => aggregate(&raw, agg).unwrap_or_else(|| config.default.clone()),
        None => {
            if raw.len() == 1 {
                raw.into_iter().next().unwrap()
            } else {
                Node::Array(raw)
            }
        }
    }
}

fn aggregate(values: &[Node], aggregator: Aggregator) -> Option<Node> {
    match aggregator {
        Aggregator::Max => values
            .iter()
            .filter_map(Node::as_f64)
            .fold(None, |acc, n| Some(acc.map_or(n, |a: f64| a.max(n))))
            .map(Node::Number),
        Aggregator::Min => values
            .iter()
            .filter_map(Node::as_f64)
            .fold(None, |acc, n| Some(acc.map_or(n, |a: f64| a.min(n))))
            .map(Node::Number),
        Aggregator::Avg => {
            let nums: Vec<f64> = values.iter().filter_map(Node::as_f64).collect();
            if nums.is_empty() {
                None
            } else {
                Some(Node::Number(nums.iter().sum::<f64>() / nums.len() as f64))
            }
        }
        Aggregator::Unique => {
            let mut seen: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            seen.sort();
            seen.dedup();
            Some(Node::Array(seen.into_iter().map(Node::String).collect()))
        }
    }
}

/// Produce one row per transcript consequence; annotation-scope columns are
/// duplicated across rows; variants with zero consequences still emit one
/// row with consequence-scope columns defaulted (spec §4.7).
pub fn flatten_annotation_data(
    annotations: &[AnnotationRecord],
    annotation_columns: &IndexMap<String, ExtractConfig>,
    consequence_columns: &IndexMap<String, ExtractConfig>,
) -> Vec<IndexMap<String, Node>> {
    let mut rows = Vec::new();
    for annotation in annotations {
        let annotation_node = annotation_to_node(annotation);
        let mut annotation_values = IndexMap::new();
        for (name, config) in annotation_columns {
            annotation_values.insert(name.clone(), extract_column(&annotation_node, config));
        }

        if annotation.transcript_consequences.is_empty() {
            let mut row = annotation_values.clone();
            for (name, config) in consequence_columns {
                row.insert(name.clone(), config.default.clone());
            }
            rows.push(row);
            continue;
        }

        for consequence in &annotation.transcript_consequences {
            let mut row = annotation_values.clone();
            let consequence_node = consequence_to_node(consequence);
            for (name, config) in consequence_columns {
                row.insert(name.clone(), extract_column(&consequence_node, config));
            }
            rows.push(row);
        }
    }
    rows
}

fn annotation_to_node(annotation: &AnnotationRecord) -> Node {
    serde_json::to_value(annotation)
        .map(Node::from)
        .unwrap_or(Node::Null)
}

fn consequence_to_node(consequence: &TranscriptConsequence) -> Node {
    serde_json::to_value(consequence)
        .map(Node::from)
        .unwrap_or(Node::Null)
}

fn node_to_field(node: &Node, formatter: Option<&str>) -> String {
    match (node, formatter) {
        (Node::Array(items), None) => items.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(";"),
        _ => node.to_string(),
    }
}

/// Render extracted rows as CSV/TSV text, columns in `column_order`, via
/// `csv::Writer` the same way the teacher writes its query-result rows
/// (`seqvars/query/mod.rs`'s `csv::WriterBuilder` + `delimiter`/`quote_style`
/// configuration), targeting an in-memory buffer instead of a file path.
pub fn format_to_tabular(
    rows: &[IndexMap<String, Node>],
    column_order: &[String],
    columns: &IndexMap<String, ExtractConfig>,
    delimiter: char,
) -> String {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter as u8)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer
        .write_record(column_order)
        .expect("writing to an in-memory buffer cannot fail");

    for row in rows {
        let fields: Vec<String> = column_order
            .iter()
            .map(|name| {
                let node = row.get(name).cloned().unwrap_or(Node::Null);
                let formatter = columns.get(name).and_then(|c| c.formatter.as_deref());
                node_to_field(&node, formatter)
            })
            .collect();
        writer
            .write_record(&fields)
            .expect("writing to an in-memory buffer cannot fail");
    }

    let bytes = writer
        .into_inner()
        .expect("in-memory csv writer has no pending flush errors");
    String::from_utf8(bytes).expect("csv::Writer only emits the bytes it was given, all UTF-8")
}

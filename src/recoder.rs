//! Recoder client (spec §4.4): single and batched canonicalisation against
//! the remote recoder service.

use crate::cache::CacheManager;
use crate::error::PipelineError;
use crate::http::HttpClient;
use crate::model::Node;
use indexmap::IndexMap;
use reqwest::Method;
use std::time::Duration;

/// Default chunk size for batched recoder calls.
pub const DEFAULT_CHUNK_SIZE: usize = 200;

/// Inter-chunk delay to avoid hammering the rate-limited remote service.
const INTER_CHUNK_DELAY: Duration = Duration::from_millis(100);

/// One allele entry of a recoder result: carries `vcf_string[]` entries
/// (spec §3 "Recoder result").
#[derive(Debug, Clone, Default)]
pub struct AlleleEntry {
    pub allele_key: String,
    pub vcf_strings: Vec<String>,
}

/// Map from allele label to its VCF-string candidates, for one input.
pub type RecoderResult = IndexMap<String, AlleleEntry>;

/// Default options merged into every request: ask for VCF-string output.
fn default_options() -> IndexMap<String, String> {
    IndexMap::from([("vcf_string".to_string(), "1".to_string())])
}

fn merge_options(options: &IndexMap<String, String>) -> IndexMap<String, String> {
    let mut merged = default_options();
    for (k, v) in options {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

pub struct RecoderClient<'a> {
    http: &'a HttpClient,
}

impl<'a> RecoderClient<'a> {
    pub fn new(http: &'a HttpClient) -> Self {
        Self { http }
    }

    /// `recode(variant, options, cache) -> result`.
    pub async fn recode(
        &self,
        variant: &str,
        options: &IndexMap<String, String>,
        cache_enabled: bool,
        cache: Option<&CacheManager>,
    ) -> Result<RecoderResult, PipelineError> {
        let merged = merge_options(options);
        let query: Vec<(&str, &str)> = merged.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let endpoint = format!("variant_recoder/human/{variant}");
        let data = self
            .http
            .fetch(&endpoint, &query, cache_enabled, Method::GET, None, cache)
            .await?;
        parse_recoder_response(&data)
    }

    /// `recodeMany(variants, options, cache) -> result[]`, chunked at
    /// `chunk_size` with ordering preserved across chunks (spec §4.4, §5).
    pub async fn recode_many(
        &self,
        variants: &[String],
        options: &IndexMap<String, String>,
        chunk_size: usize,
        cache_enabled: bool,
        cache: Option<&CacheManager>,
    ) -> Result<Vec<RecoderResult>, PipelineError> {
        let merged = merge_options(options);
        let mut results = Vec::with_capacity(variants.len());

        let chunk_size = chunk_size.max(1);
        let chunks: Vec<&[String]> = variants.chunks(chunk_size).collect();
        for (idx, chunk) in chunks.iter().enumerate() {
            let body = Node::Object(IndexMap::from([(
                "ids".to_string(),
                Node::Array(chunk.iter().map(|v| Node::String(v.clone())).collect()),
            )]));
            let query: Vec<(&str, &str)> =
                merged.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            let data = self
                .http
                .fetch(
                    "variant_recoder/human",
                    &query,
                    cache_enabled,
                    Method::POST,
                    Some(&body),
                    cache,
                )
                .await?;
            let chunk_results = parse_recoder_batch_response(&data, chunk.len())?;
            results.extend(chunk_results);

            if idx + 1 < chunks.len() {
                tokio::time::sleep(INTER_CHUNK_DELAY).await;
            }
        }

        Ok(results)
    }
}

fn parse_recoder_response(data: &Node) -> Result<RecoderResult, PipelineError> {
    // The Ensembl-style response is a one-element array containing one
    // object whose keys are allele labels.
    let obj = match data {
        Node::Array(items) => items.first().cloned().unwrap_or(Node::Null),
        other => other.clone(),
    };
    let map = obj.as_object().cloned().unwrap_or_default();

    let mut result = RecoderResult::new();
    for (allele_key, value) in map {
        let vcf_strings = value
            .get("vcf_string")
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        result.insert(
            allele_key.clone(),
            AlleleEntry {
                allele_key,
                vcf_strings,
            },
        );
    }
    Ok(result)
}

fn parse_recoder_batch_response(
    data: &Node,
    expected_len: usize,
) -> Result<Vec<RecoderResult>, PipelineError> {
    let items = data.as_array().unwrap_or(&[]);
    let mut out = Vec::with_capacity(expected_len);
    for item in items {
        out.push(parse_recoder_response(item)?);
    }
    Ok(out)
}

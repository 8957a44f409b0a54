//! Streaming driver (spec §4.11): line-wise ingestion and incremental
//! emission for inputs too large to hold in memory at once.

use crate::error::PipelineError;
use std::io::BufRead;

/// Default chunk size, matching the recoder client's batching default.
pub const DEFAULT_CHUNK_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Tabular,
    Json,
    Vcf,
}

/// Split `reader` line-wise (CRLF-agnostic — `BufRead::lines()` already
/// strips a trailing `\r`) and group into chunks of `chunk_size`, skipping
/// blank lines.
pub fn chunk_lines<R: BufRead>(reader: R, chunk_size: usize) -> Result<Vec<Vec<String>>, PipelineError> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = Vec::with_capacity(chunk_size);

    for line in reader.lines() {
        let line = line.map_err(|e| PipelineError::validation(format!("failed to read input line: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        current.push(line);
        if current.len() == chunk_size {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(chunk_size)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

/// Streaming mode never writes to a file — saving is the caller's job for
/// one-shot runs only (spec §4.11 step 5). Call this before starting a
/// stream so the caller fails fast with a clear message.
pub fn reject_file_output(save_path: Option<&str>, output_file: Option<&str>) -> Result<(), PipelineError> {
    if save_path.is_some() || output_file.is_some() {
        return Err(PipelineError::validation(
            "streaming mode does not support --save or --output-file; emit to stdout instead",
        ));
    }
    Ok(())
}

/// Incremental tabular writer: emits the header once, then one block of data
/// rows per completed chunk.
pub struct TabularEmitter {
    header_emitted: bool,
}

impl Default for TabularEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl TabularEmitter {
    pub fn new() -> Self {
        Self { header_emitted: false }
    }

    /// Returns the text to write for this chunk: the header line (only the
    /// first time) followed by the chunk's data rows.
    pub fn emit_chunk(&mut self, header: &str, rows: &str) -> String {
        let mut out = String::new();
        if !self.header_emitted {
            out.push_str(header);
            out.push('\n');
            self.header_emitted = true;
        }
        out.push_str(rows);
        out
    }
}

/// JSON streaming is supported but discouraged — callers should surface this
/// warning once per run when `OutputMode::Json` is selected in streaming
/// mode (spec §4.11 step 4).
pub fn json_streaming_warning() -> &'static str {
    "JSON output in streaming mode emits one object per chunk rather than a single array; prefer CSV/TSV/VCF for large inputs"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn chunk_lines_splits_crlf_and_lf_uniformly() {
        let input = "a\r\nb\nc\r\nd\n";
        let chunks = chunk_lines(Cursor::new(input), 2).unwrap();
        assert_eq!(chunks, vec![vec!["a".to_string(), "b".to_string()], vec!["c".to_string(), "d".to_string()]]);
    }

    #[test]
    fn chunk_lines_skips_blank_lines() {
        let input = "a\n\nb\n";
        let chunks = chunk_lines(Cursor::new(input), 10).unwrap();
        assert_eq!(chunks, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn file_output_is_rejected_in_streaming_mode() {
        assert!(reject_file_output(Some("out.csv"), None).is_err());
        assert!(reject_file_output(None, None).is_ok());
    }

    #[test]
    fn tabular_emitter_only_emits_header_once() {
        let mut emitter = TabularEmitter::new();
        let first = emitter.emit_chunk("h1,h2", "1,2\n");
        let second = emitter.emit_chunk("h1,h2", "3,4\n");
        assert!(first.starts_with("h1,h2\n"));
        assert!(!second.contains("h1,h2"));
    }
}

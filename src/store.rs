//! Columnar sequence store (§3.1, §4.3): loads TSV-style token records into
//! struct-of-arrays columns, with `eos` sentinels marking sequence boundaries.

use std::fs;
use std::path::Path;

use crate::error::{SeqCrfErrorKind, SeqCrfResult};

/// A named column layout: the schema declares column names in file order.
/// `cols` in SPEC_FULL.md §10.5 lets a caller remap/select a subset of the
/// file's columns instead of trusting positional order blindly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub names: Vec<String>,
}

impl Schema {
    pub fn new(names: Vec<String>) -> Self {
        Schema { names }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }
}

/// A columnar (struct-of-arrays) store of token records plus the boundary
/// indices (`eos_at`) that delimit sequences within it.
#[derive(Debug, Clone)]
pub struct SequenceStore {
    pub schema: Schema,
    columns: Vec<Vec<String>>,
    /// Record-row index (into `columns`) one-past the end of each sequence,
    /// always local to this store's own columns (0-based).
    eos_at: Vec<usize>,
    /// Offset added to reported sequence boundaries, set by
    /// `set_sequence_start_idx` when this store is a slice spliced back
    /// into a larger index space. Never affects `columns` indexing.
    base: usize,
}

impl SequenceStore {
    /// Parses record content where a blank line marks `eos`, per §4.3.1.
    /// `separator` is the single-character field delimiter (§4.3.1, §6.1:
    /// "configurable single-character separator (default tab)").
    pub fn from_str(schema: Schema, content: &str, separator: char) -> SeqCrfResult<Self> {
        let width = schema.width();
        let mut columns: Vec<Vec<String>> = vec![Vec::new(); width];
        let mut eos_at = Vec::new();

        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                if !columns[0].is_empty() && eos_at.last().copied() != Some(columns[0].len()) {
                    eos_at.push(columns[0].len());
                }
                continue;
            }
            let fields: Vec<&str> = line.split(separator).collect();
            if fields.len() != width {
                return Err(SeqCrfErrorKind::SchemaMismatch.with_error(anyhow::anyhow!(
                    "line {}: expected {} columns, got {}",
                    lineno + 1,
                    width,
                    fields.len()
                )));
            }
            for (col, field) in columns.iter_mut().zip(fields.iter()) {
                col.push((*field).to_string());
            }
        }
        if !columns[0].is_empty() && eos_at.last().copied() != Some(columns[0].len()) {
            eos_at.push(columns[0].len());
        }

        Ok(SequenceStore {
            schema,
            columns,
            eos_at,
            base: 0,
        })
    }

    pub fn from_path(schema: Schema, path: &Path, separator: char) -> SeqCrfResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_str(schema, &content, separator)
    }

    pub fn num_records(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn num_sequences(&self) -> usize {
        self.eos_at.len()
    }

    pub fn column(&self, name: &str) -> SeqCrfResult<&[String]> {
        let idx = self.schema.index_of(name).ok_or_else(|| {
            SeqCrfErrorKind::MissingColumn.with_error(anyhow::anyhow!("no such column: {name}"))
        })?;
        Ok(&self.columns[idx])
    }

    /// Writes a full-length column in place, appending it to the schema if
    /// `name` isn't already a column (the usual case for a guess-label
    /// column on first tagging). Used to write predictions back in place
    /// without disturbing record order (§4.9).
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> SeqCrfResult<()> {
        if values.len() != self.num_records() {
            return Err(SeqCrfErrorKind::PreconditionViolated.with_error(anyhow::anyhow!(
                "column length {} does not match record count {}",
                values.len(),
                self.num_records()
            )));
        }
        match self.schema.index_of(name) {
            Some(idx) => self.columns[idx] = values,
            None => {
                self.schema.names.push(name.to_string());
                self.columns.push(values);
            }
        }
        Ok(())
    }

    /// Iterates sequences as `(start, end)` record-index ranges local to this
    /// store's own columns (0-based), zero-copy.
    fn local_sequences(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let mut prev = 0usize;
        self.eos_at.iter().map(move |&end| {
            let start = prev;
            prev = end;
            (start, end)
        })
    }

    /// Iterates sequences as `(start, end)` record-index ranges, shifted by
    /// whatever base offset `set_sequence_start_idx` established. Use
    /// `column()` with these only after accounting for that offset; callers
    /// that need to index this store's own columns should prefer indices
    /// produced by iterating record positions directly.
    pub fn sequences(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let base = self.base;
        self.local_sequences().map(move |(s, e)| (s + base, e + base))
    }

    /// Row-count invariant: every `eos_at` boundary must not exceed the
    /// record count, and they must be strictly increasing (§8).
    fn check_boundary_invariant(&self) -> SeqCrfResult<()> {
        let mut prev = 0usize;
        for &b in &self.eos_at {
            if b <= prev || b > self.num_records() {
                return Err(SeqCrfErrorKind::PreconditionViolated.with_error(anyhow::anyhow!(
                    "non-monotonic or out-of-range sequence boundary: {b}"
                )));
            }
            prev = b;
        }
        Ok(())
    }

    /// Renders the store back to the blank-line-separated record form
    /// `from_str` reads, per §4.3.3: each record's selected `cols` (or all
    /// columns if `None`) joined by `separator`, one record per line, with a
    /// blank line immediately after each sequence's last record except the
    /// very last — the final record is not followed by a trailing newline.
    pub fn export(&self, cols: Option<&[&str]>, separator: char) -> SeqCrfResult<String> {
        let indices: Vec<usize> = match cols {
            Some(names) => names
                .iter()
                .map(|name| {
                    self.schema.index_of(name).ok_or_else(|| {
                        SeqCrfErrorKind::MissingColumn.with_error(anyhow::anyhow!("no such column: {name}"))
                    })
                })
                .collect::<SeqCrfResult<_>>()?,
            None => (0..self.schema.width()).collect(),
        };

        let seqs: Vec<(usize, usize)> = self.local_sequences().collect();
        let total = self.num_records();
        let mut out = String::new();
        for (seq_idx, &(start, end)) in seqs.iter().enumerate() {
            for row in start..end {
                let fields: Vec<&str> = indices.iter().map(|&ci| self.columns[ci][row].as_str()).collect();
                out.push_str(&fields.join(&separator.to_string()));
                if row + 1 != total {
                    out.push('\n');
                }
            }
            if seq_idx + 1 != seqs.len() {
                out.push('\n');
            }
        }
        Ok(out)
    }

    /// Splits sequences (never individual records) into two stores, per
    /// §4.3.4: the first part is the smallest prefix of sequences whose
    /// cumulative record count is `>= p * N`.
    pub fn weighted_split(&self, train_weight: f64) -> SeqCrfResult<(SequenceStore, SequenceStore)> {
        self.check_boundary_invariant()?;
        if !(0.0..=1.0).contains(&train_weight) {
            return Err(SeqCrfErrorKind::PreconditionViolated
                .with_error(anyhow::anyhow!("train_weight must be in [0,1]: {train_weight}")));
        }
        let threshold = (self.num_records() as f64) * train_weight;

        let seqs: Vec<(usize, usize)> = self.local_sequences().collect();
        let mut cut = seqs.len();
        let mut acc = 0usize;
        for (idx, &(start, end)) in seqs.iter().enumerate() {
            acc += end - start;
            if (acc as f64) >= threshold {
                cut = idx + 1;
                break;
            }
        }

        let train_store = self.slice_sequences(&seqs[..cut]);
        let test_store = self.slice_sequences(&seqs[cut..]);
        Ok((train_store, test_store))
    }

    fn slice_sequences(&self, ranges: &[(usize, usize)]) -> SequenceStore {
        let width = self.schema.width();
        let mut columns: Vec<Vec<String>> = vec![Vec::new(); width];
        let mut eos_at = Vec::new();
        for &(start, end) in ranges {
            for row in start..end {
                for (col, src) in columns.iter_mut().zip(self.columns.iter()) {
                    col.push(src[row].clone());
                }
            }
            eos_at.push(columns[0].len());
        }
        SequenceStore {
            schema: self.schema.clone(),
            columns,
            eos_at,
            base: 0,
        }
    }

    /// Sets the offset added to `sequences()`-reported boundaries, used when
    /// splicing a sub-store's results back into a larger index space without
    /// disturbing this store's own column indexing (§4.3.3).
    pub fn set_sequence_start_idx(&mut self, start: usize) {
        self.base = start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SequenceStore {
        let schema = Schema::new(vec!["word".into(), "pos".into()]);
        let content = "the\tDT\ndog\tNN\nbarks\tVBZ\n\ncats\tNNS\nmeow\tVBP\n\n";
        SequenceStore::from_str(schema, content, '\t').unwrap()
    }

    #[test]
    fn parses_sequences_on_blank_lines() {
        let store = sample();
        assert_eq!(store.num_records(), 5);
        assert_eq!(store.num_sequences(), 2);
        let ranges: Vec<_> = store.sequences().collect();
        assert_eq!(ranges, vec![(0, 3), (3, 5)]);
    }

    #[test]
    fn rejects_ragged_rows() {
        let schema = Schema::new(vec!["word".into(), "pos".into()]);
        let err = SequenceStore::from_str(schema, "the\tDT\ndog\n", '\t').unwrap_err();
        assert_eq!(err.kind(), SeqCrfErrorKind::SchemaMismatch);
    }

    #[test]
    fn export_round_trips_through_from_str() {
        let store = sample();
        let exported = store.export(None, '\t').unwrap();
        let reparsed = SequenceStore::from_str(store.schema.clone(), &exported, '\t').unwrap();
        assert_eq!(reparsed.num_records(), store.num_records());
        assert_eq!(reparsed.num_sequences(), store.num_sequences());
        assert_eq!(reparsed.column("word").unwrap(), store.column("word").unwrap());
    }

    #[test]
    fn export_has_no_trailing_newline_and_preserves_blank_separators() {
        let store = sample();
        let exported = store.export(None, '\t').unwrap();
        assert_eq!(
            exported,
            "the\tDT\ndog\tNN\nbarks\tVBZ\n\ncats\tNNS\nmeow\tVBP"
        );
    }

    #[test]
    fn export_honors_column_selection_and_separator() {
        let store = sample();
        let exported = store.export(Some(&["word"]), ',').unwrap();
        assert_eq!(exported, "the\ndog\nbarks\n\ncats\nmeow");
    }

    #[test]
    fn weighted_split_keeps_sequences_whole_and_rebases_eos() {
        let store = sample();
        let (train, test) = store.weighted_split(0.5).unwrap();
        assert_eq!(train.num_sequences() + test.num_sequences(), 2);
        assert_eq!(train.sequences().collect::<Vec<_>>(), vec![(0, train.num_records())]);
        assert_eq!(test.sequences().collect::<Vec<_>>(), vec![(0, test.num_records())]);
    }

    fn random_store(rng: &mut impl rand::Rng, num_sequences: usize) -> SequenceStore {
        let schema = Schema::new(vec!["word".into()]);
        let mut content = String::new();
        for _ in 0..num_sequences {
            let len = rng.gen_range(1..=5);
            for _ in 0..len {
                content.push_str("w\n");
            }
            content.push('\n');
        }
        SequenceStore::from_str(schema, &content, '\t').unwrap()
    }

    #[test]
    fn weighted_split_never_splits_a_sequence_across_both_halves() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let store = random_store(&mut rng, rng.gen_range(1..=20));
            let p = rng.gen_range(0.0..=1.0);
            let (train, test) = store.weighted_split(p).unwrap();
            assert_eq!(train.num_records() + test.num_records(), store.num_records());
            assert_eq!(train.num_sequences() + test.num_sequences(), store.num_sequences());
        }
    }

    #[test]
    fn rejects_out_of_range_weight() {
        let store = sample();
        let err = store.weighted_split(1.5).unwrap_err();
        assert_eq!(err.kind(), SeqCrfErrorKind::PreconditionViolated);
    }

    #[test]
    fn set_sequence_start_idx_shifts_boundaries() {
        let mut store = sample();
        store.set_sequence_start_idx(10);
        assert_eq!(store.sequences().collect::<Vec<_>>(), vec![(10, 13), (13, 15)]);
    }

    #[test]
    fn missing_column_is_an_error() {
        let store = sample();
        let err = store.column("chunk").unwrap_err();
        assert_eq!(err.kind(), SeqCrfErrorKind::MissingColumn);
    }
}

//! Feature extraction (§4.5): drives a compiled template across a sequence
//! store, producing a row-aligned feature matrix.

use crate::error::{SeqCrfErrorKind, SeqCrfResult};
use crate::store::SequenceStore;
use crate::template::FeatureTemplate;

/// A row-aligned parallel array to the source store (§3.4): row `i` holds
/// the form as element 0 and the `K` feature strings as elements `1..=K`.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub rows: Vec<Vec<String>>,
    pub width: usize,
}

impl FeatureMatrix {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Yields each sequence's contiguous slice of feature rows, mirroring
    /// `SequenceStore::sequences()` boundaries, ready to feed a CRF trainer
    /// or tagger.
    pub fn sequences<'a>(
        &'a self,
        store: &SequenceStore,
    ) -> impl Iterator<Item = &'a [Vec<String>]> + 'a {
        store.sequences().map(move |(s, e)| &self.rows[s..e])
    }
}

/// Extracts one feature row per token across every sequence in `store`,
/// preserving boundaries: each token's features are computed against its
/// own sequence's `[start, end)` range, so a window offset never reads a
/// neighboring sequence's records (§4.5 step 2).
pub fn extract(template: &FeatureTemplate, store: &SequenceStore) -> SeqCrfResult<FeatureMatrix> {
    let n = store.num_records();
    let width = 1 + template.vec.len();
    let mut rows = Vec::with_capacity(n);
    for (start, end) in store.sequences() {
        for i in start..end {
            rows.push(template.make_fts(store, (start, end), i)?);
        }
    }
    Ok(FeatureMatrix { rows, width })
}

/// Zips feature-row sequences with label-row sequences, sequence by
/// sequence; a length mismatch between a feature sequence and its paired
/// label sequence is a fatal contract violation (§4.5).
pub fn zip_with_labels<'a>(
    matrix: &'a FeatureMatrix,
    store: &'a SequenceStore,
    label_col: &str,
) -> SeqCrfResult<Vec<(&'a [Vec<String>], &'a [String])>> {
    let labels = store.column(label_col)?;
    let mut out = Vec::new();
    for (start, end) in store.sequences() {
        let feature_seq = &matrix.rows[start..end];
        let label_seq = &labels[start..end];
        if feature_seq.len() != label_seq.len() {
            return Err(SeqCrfErrorKind::PreconditionViolated.with_error(anyhow::anyhow!(
                "feature/label sequence length mismatch: {} vs {}",
                feature_seq.len(),
                label_seq.len()
            )));
        }
        out.push((feature_seq, label_seq));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceBundle;
    use crate::store::Schema;

    fn store() -> SequenceStore {
        let schema = Schema::new(vec!["form".into(), "postag".into()]);
        let content = "The\tDT\nrabbit\tNN\nruns\tVBZ\n\nIt\tPRP\nhops\tVBZ\n\n";
        SequenceStore::from_str(schema, content, '\t').unwrap()
    }

    fn template() -> FeatureTemplate {
        let mut t = FeatureTemplate::new();
        t.parse_ftvec_templ("word:[-1:1]", &ResourceBundle::new()).unwrap();
        t
    }

    #[test]
    fn extract_produces_row_per_token() {
        let s = store();
        let t = template();
        let matrix = extract(&t, &s).unwrap();
        assert_eq!(matrix.num_rows(), s.num_records());
        assert_eq!(matrix.width, 1 + t.vec.len());
    }

    #[test]
    fn sequences_align_with_store_boundaries() {
        let s = store();
        let t = template();
        let matrix = extract(&t, &s).unwrap();
        let seqs: Vec<&[Vec<String>]> = matrix.sequences(&s).collect();
        assert_eq!(seqs.len(), 2);
        assert_eq!(seqs[0].len(), 3);
        assert_eq!(seqs[1].len(), 2);
    }

    #[test]
    fn zip_with_labels_matches_by_sequence() {
        let s = store();
        let t = template();
        let matrix = extract(&t, &s).unwrap();
        let zipped = zip_with_labels(&matrix, &s, "postag").unwrap();
        assert_eq!(zipped.len(), 2);
        assert_eq!(zipped[0].1, &["DT".to_string(), "NN".to_string(), "VBZ".to_string()]);
    }

    #[test]
    fn zip_with_labels_rejects_unknown_column() {
        let s = store();
        let t = template();
        let matrix = extract(&t, &s).unwrap();
        let err = zip_with_labels(&matrix, &s, "netag").unwrap_err();
        assert_eq!(err.kind(), SeqCrfErrorKind::MissingColumn);
    }

    #[test]
    fn first_token_of_second_sequence_does_not_see_first_sequence() {
        // absolute index 3 ("It") is the first token of the second
        // sequence; w[-1] must read "None", not "runs" (absolute index 2,
        // the last token of the first sequence).
        let s = store();
        let t = template();
        let matrix = extract(&t, &s).unwrap();
        assert_eq!(matrix.rows[3][0], "It");
        assert_eq!(matrix.rows[3][1], "w[-1]=None");
    }
}

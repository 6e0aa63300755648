//! Evaluation (§4.6): plain accuracy for POS-style tagging, external CoNLL
//! scorer for chunk-style tagging.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write as _;
use std::process::{Command, Stdio};

use crate::store::SequenceStore;

/// One category's evaluation figures (§3.5). Only the fields relevant to
/// the evaluation mode that produced it are populated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryResult {
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f_score: Option<f64>,
    pub accuracy: Option<f64>,
}

pub type AccuracyResult = HashMap<String, CategoryResult>;

/// Per-category accuracy over `gold_col`, with a distinguished `Total` key
/// (§4.6.1).
pub fn eval_pos(store: &SequenceStore, gold_col: &str, guess_col: &str) -> crate::error::SeqCrfResult<AccuracyResult> {
    let postag = store.column(gold_col)?;
    let guess = store.column(guess_col)?;

    let mut correct: HashMap<&str, usize> = HashMap::new();
    let mut total: HashMap<&str, usize> = HashMap::new();
    let mut total_correct = 0usize;

    for (gold, pred) in postag.iter().zip(guess.iter()) {
        *total.entry(gold.as_str()).or_insert(0) += 1;
        if gold == pred {
            *correct.entry(gold.as_str()).or_insert(0) += 1;
            total_correct += 1;
        }
    }

    let mut out = AccuracyResult::new();
    for (tag, n) in &total {
        let c = correct.get(tag).copied().unwrap_or(0);
        out.insert(
            (*tag).to_string(),
            CategoryResult {
                accuracy: Some(c as f64 / *n as f64),
                ..Default::default()
            },
        );
    }
    out.insert(
        "Total".to_string(),
        CategoryResult {
            accuracy: Some(total_correct as f64 / postag.len().max(1) as f64),
            ..Default::default()
        },
    );
    Ok(out)
}

/// External-collaborator boundary for the CoNLL chunk-evaluation program
/// (§4.7's sibling boundary for C6; §6.4).
pub trait ConllEvaluator {
    fn evaluate(&self, input: &str) -> anyhow::Result<String>;
}

/// Invokes a real external scoring script as a subprocess, feeding it on
/// stdin and capturing stdout.
pub struct ExternalConllEvaluator {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalConllEvaluator {
    pub fn new(program: impl Into<String>) -> Self {
        ExternalConllEvaluator {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

impl ConllEvaluator for ExternalConllEvaluator {
    /// Writes `input` to a randomized temp file and invokes the program
    /// with that file as standard input, deleting it on both the success
    /// and failure paths (§5).
    fn evaluate(&self, input: &str) -> anyhow::Result<String> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(input.as_bytes())?;
        tmp.flush()?;

        let stdin_file = File::open(tmp.path())?;
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::from(stdin_file))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        // `tmp` is removed here regardless of whether `output` succeeded.
        drop(tmp);

        let output = output?;
        if !output.status.success() {
            anyhow::bail!(
                "conll evaluator exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Renders `(form, postag, chunktag, guesstag)` as space-separated lines,
/// a blank line between sequences (§4.6.2, §6.4).
fn render_conll_input(store: &SequenceStore) -> crate::error::SeqCrfResult<String> {
    let form = store.column("form")?;
    let postag = store.column("postag")?;
    let chunktag = store.column("chunktag")?;
    let guess = store.column("guesstag")?;

    let mut out = String::new();
    for (start, end) in store.sequences() {
        for i in start..end {
            out.push_str(&format!("{} {} {} {}\n", form[i], postag[i], chunktag[i], guess[i]));
        }
        out.push('\n');
    }
    Ok(out)
}

/// Parses the scorer's ampersand-delimited table into `{category:
/// {precision, recall, f-score}}`, renaming `Overall` to `Total` (§4.6.2).
fn parse_conll_report(report: &str) -> AccuracyResult {
    let mut out = AccuracyResult::new();
    for line in report.lines() {
        if !line.contains('&') {
            continue;
        }
        let fields: Vec<String> = line
            .split('&')
            .map(|f| f.trim().trim_end_matches("\\\\").trim().to_string())
            .collect();
        if fields.len() < 4 {
            continue;
        }
        let category = if fields[0] == "Overall" { "Total" } else { fields[0].as_str() };
        let parse_pct = |s: &str| s.trim_end_matches('%').parse::<f64>().ok();
        out.insert(
            category.to_string(),
            CategoryResult {
                precision: parse_pct(&fields[1]),
                recall: parse_pct(&fields[2]),
                f_score: parse_pct(&fields[3]),
                accuracy: None,
            },
        );
    }
    out
}

/// Runs the external CoNLL evaluator over `store`'s `(form, postag,
/// chunktag, guesstag)` columns. Failures are caught, logged, and an empty
/// result returned (§4.6.2, §7).
pub fn eval_chunk(store: &SequenceStore, evaluator: &dyn ConllEvaluator) -> AccuracyResult {
    let input = match render_conll_input(store) {
        Ok(s) => s,
        Err(e) => {
            log::error!("failed to render conll input: {e}");
            return AccuracyResult::new();
        }
    };
    match evaluator.evaluate(&input) {
        Ok(report) => parse_conll_report(&report),
        Err(e) => {
            log::error!("conll evaluator failed: {e:#}");
            AccuracyResult::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Schema;

    fn pos_store() -> SequenceStore {
        let schema = Schema::new(vec!["form".into(), "postag".into(), "guesstag".into()]);
        let content = "The\tDT\tDT\nrabbit\tNN\tVB\nruns\tVBZ\tVBZ\n\n";
        SequenceStore::from_str(schema, content, '\t').unwrap()
    }

    #[test]
    fn pos_accuracy_buckets_by_tag() {
        let store = pos_store();
        let result = eval_pos(&store, "postag", "guesstag").unwrap();
        assert_eq!(result["DT"].accuracy, Some(1.0));
        assert_eq!(result["NN"].accuracy, Some(0.0));
        assert_eq!(result["Total"].accuracy, Some(2.0 / 3.0));
    }

    struct StubEvaluator(&'static str);
    impl ConllEvaluator for StubEvaluator {
        fn evaluate(&self, _input: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingEvaluator;
    impl ConllEvaluator for FailingEvaluator {
        fn evaluate(&self, _input: &str) -> anyhow::Result<String> {
            anyhow::bail!("scorer crashed")
        }
    }

    fn chunk_store() -> SequenceStore {
        let schema = Schema::new(vec![
            "form".into(),
            "postag".into(),
            "chunktag".into(),
            "guesstag".into(),
        ]);
        let content = "The\tDT\tB-NP\tB-NP\nrabbit\tNN\tI-NP\tI-NP\n\n";
        SequenceStore::from_str(schema, content, '\t').unwrap()
    }

    #[test]
    fn chunk_eval_parses_report_and_renames_overall() {
        let report = "NP & 91.23% & 89.10% & 90.15 \\\\\nOverall & 90.00% & 88.00% & 89.00 \\\\\n";
        let store = chunk_store();
        let result = eval_chunk(&store, &StubEvaluator(report));
        assert_eq!(result["NP"].precision, Some(91.23));
        assert_eq!(result["Total"].f_score, Some(89.00));
        assert!(!result.contains_key("Overall"));
    }

    #[test]
    fn chunk_eval_returns_empty_on_failure() {
        let store = chunk_store();
        let result = eval_chunk(&store, &FailingEvaluator);
        assert!(result.is_empty());
    }

    #[test]
    fn render_conll_input_is_space_separated_with_blank_sequence_breaks() {
        let store = chunk_store();
        let rendered = render_conll_input(&store).unwrap();
        assert_eq!(rendered, "The DT B-NP B-NP\nrabbit NN I-NP I-NP\n\n");
    }
}

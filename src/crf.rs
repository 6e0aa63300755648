//! The CRF library boundary (§4.7): the core depends only on these traits,
//! never on a concrete linear-chain CRF implementation.

use std::collections::HashMap;
use std::path::Path;

/// A linear-chain CRF trainer. Implementations own whatever native library
/// or pure-Rust model they wrap; this crate only ever calls through the
/// trait.
pub trait CrfTrainer {
    /// Sets hyperparameters from the `[crfsuite]` configuration section,
    /// passed through unchanged (§4.8).
    fn set_params(&mut self, params: &HashMap<String, String>) -> anyhow::Result<()>;

    /// Appends one sequence's feature rows paired with its label row.
    fn append(&mut self, feature_rows: &[Vec<String>], label_rows: &[String]) -> anyhow::Result<()>;

    /// Trains on everything appended so far and writes the model to
    /// `model_path`.
    fn train(&mut self, model_path: &Path) -> anyhow::Result<()>;
}

/// A linear-chain CRF tagger: opens a trained model and produces Viterbi
/// label sequences.
pub trait CrfTagger {
    fn open(model_path: &Path) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn tag(&self, feature_rows: &[Vec<String>]) -> anyhow::Result<Vec<String>>;
}

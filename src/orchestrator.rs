//! Tagger orchestrator (§4.9): wires configuration, resources, the
//! sequence store, the feature template, a CRF trainer/tagger, and the
//! evaluator into the three public operations a caller actually uses.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::Config;
use crate::crf::{CrfTagger, CrfTrainer};
use crate::error::{SeqCrfErrorKind, SeqCrfResult};
use crate::eval::{eval_chunk, eval_pos, AccuracyResult, ConllEvaluator};
use crate::extractor::{self, FeatureMatrix};
use crate::resources::{read_resource, ResourceBundle};
use crate::store::{Schema, SequenceStore};
use crate::template::FeatureTemplate;

/// Named column presets for the three corpora shapes this engine supports
/// (§4.3.1).
pub fn column_preset(name: &str) -> SeqCrfResult<Vec<String>> {
    let names = match name {
        "pos" => vec!["form", "postag"],
        "chunk" => vec!["form", "postag", "chunktag"],
        "ne" => vec!["form", "postag", "chunktag", "netag", "guesstag"],
        other => {
            return Err(SeqCrfErrorKind::SchemaMismatch
                .with_error(anyhow::anyhow!("unknown column preset: {other}")))
        }
    };
    Ok(names.into_iter().map(String::from).collect())
}

/// Owns configuration, loaded resources, and the compiled feature template;
/// the thing a caller constructs once and calls `train`/`tag`/`test` on.
pub struct TaggerOrchestrator {
    config: Config,
    resources: ResourceBundle,
    template: FeatureTemplate,
}

impl TaggerOrchestrator {
    /// Loads resources named in `config.resources` and compiles the
    /// template named in `config.tagger.ftvec`.
    pub fn new(config: Config) -> SeqCrfResult<Self> {
        config.check_recognized_keys();

        let mut resources = ResourceBundle::new();
        for (name, path) in &config.resources {
            log::info!("loading resource `{name}` from {path}");
            let resource = read_resource(name, Path::new(path))?;
            resources.insert(name.clone(), Rc::new(resource));
        }

        let mut template = FeatureTemplate::new();
        if let Some(ftvec) = config.ftvec() {
            log::info!("compiling feature template");
            template.parse_ftvec_templ(ftvec, &resources)?;
        }

        Ok(TaggerOrchestrator {
            config,
            resources,
            template,
        })
    }

    fn load_store(&self, path: &str) -> SeqCrfResult<SequenceStore> {
        let names = match self.config.tagger_get("cols") {
            Some(preset) => match column_preset(preset) {
                Ok(names) => names,
                Err(_) => preset.split(',').map(|s| s.trim().to_string()).collect(),
            },
            None => column_preset("pos")?,
        };
        SequenceStore::from_path(Schema::new(names), Path::new(path), self.config.tab_sep())
    }

    fn extract(&self, store: &SequenceStore) -> SeqCrfResult<FeatureMatrix> {
        extractor::extract(&self.template, store)
    }

    /// Extracts features (unless supplied), extracts labels from
    /// `label_col` (unless supplied), trains the CRF trainer, writes the
    /// model, and persists the sanitized configuration alongside it.
    pub fn train(
        &self,
        trainer: &mut dyn CrfTrainer,
        data: Option<SequenceStore>,
        label_col: Option<&str>,
    ) -> SeqCrfResult<()> {
        let store = match data {
            Some(s) => s,
            None => {
                let path = self.config.train_path().ok_or_else(|| {
                    SeqCrfErrorKind::PreconditionViolated.with_error(anyhow::anyhow!("no training data configured"))
                })?;
                self.load_store(path)?
            }
        };
        let label_col = label_col.unwrap_or_else(|| self.config.label_col());

        log::info!("extracting features for {} records", store.num_records());
        let matrix = self.extract(&store)?;
        let zipped = extractor::zip_with_labels(&matrix, &store, label_col)?;

        trainer
            .set_params(&self.config.crfsuite)
            .map_err(|e| SeqCrfErrorKind::ExternalToolFailure.with_error(e))?;
        for (features, labels) in &zipped {
            trainer
                .append(features, labels)
                .map_err(|e| SeqCrfErrorKind::ExternalToolFailure.with_error(e))?;
        }

        let model_path = self.config.model_path().ok_or_else(|| {
            SeqCrfErrorKind::PreconditionViolated.with_error(anyhow::anyhow!("no model path configured"))
        })?;
        log::info!("training CRF model -> {model_path}");
        trainer
            .train(Path::new(model_path))
            .map_err(|e| SeqCrfErrorKind::ExternalToolFailure.with_error(e))?;

        let sidecar = model_sidecar_path(model_path);
        fs::write(&sidecar, self.config.sanitized().render())?;
        log::info!("wrote config sidecar -> {}", sidecar.display());
        Ok(())
    }

    /// Extracts features, tags each sequence with `tagger`, and writes
    /// predictions back into `guess_col` without reordering records (§4.9).
    pub fn tag(&self, data: &mut SequenceStore, tagger: &dyn CrfTagger, guess_col: &str) -> SeqCrfResult<()> {
        let matrix = self.extract(data)?;
        let mut predictions = vec![String::new(); data.num_records()];

        for (start, end) in data.sequences() {
            let feature_seq = &matrix.rows[start..end];
            let labels = tagger
                .tag(feature_seq)
                .map_err(|e| SeqCrfErrorKind::ExternalToolFailure.with_error(e))?;
            if labels.len() != feature_seq.len() {
                return Err(SeqCrfErrorKind::PreconditionViolated.with_error(anyhow::anyhow!(
                    "tagger returned {} labels for {} tokens",
                    labels.len(),
                    feature_seq.len()
                )));
            }
            predictions[start..end].clone_from_slice(&labels);
        }

        data.set_column(guess_col, predictions)
    }

    /// Opens the saved model if no tagger is supplied, tags `data`, invokes
    /// the configured evaluator, and returns `(result, data)` (§4.9).
    pub fn test<T: CrfTagger>(
        &self,
        data: Option<SequenceStore>,
        tagger: Option<T>,
        label_col: Option<&str>,
        conll_evaluator: Option<&dyn ConllEvaluator>,
    ) -> SeqCrfResult<(AccuracyResult, SequenceStore)> {
        let mut store = match data {
            Some(s) => s,
            None => {
                let path = self.config.test_path().ok_or_else(|| {
                    SeqCrfErrorKind::PreconditionViolated.with_error(anyhow::anyhow!("no test data configured"))
                })?;
                self.load_store(path)?
            }
        };
        let gold_col = label_col.unwrap_or_else(|| self.config.label_col());

        let tagger = match tagger {
            Some(t) => t,
            None => {
                let model_path = self.config.model_path().ok_or_else(|| {
                    SeqCrfErrorKind::PreconditionViolated.with_error(anyhow::anyhow!("no model path configured"))
                })?;
                T::open(Path::new(model_path)).map_err(|e| SeqCrfErrorKind::ExternalToolFailure.with_error(e))?
            }
        };

        let guess_col = self.config.guess_label_col().to_string();
        self.tag(&mut store, &tagger, &guess_col)?;

        let result = match self.config.eval_func() {
            "pos" => eval_pos(&store, gold_col, &guess_col)?,
            "chunk" => match conll_evaluator {
                Some(ev) => eval_chunk(&store, ev),
                None => {
                    log::warn!("chunk evaluation requested but no conll evaluator supplied");
                    AccuracyResult::new()
                }
            },
            other => {
                return Err(SeqCrfErrorKind::PreconditionViolated
                    .with_error(anyhow::anyhow!("unknown eval_func: {other}")))
            }
        };

        Ok((result, store))
    }
}

fn model_sidecar_path(model_path: &str) -> PathBuf {
    let mut p = PathBuf::from(model_path);
    let ext = p.extension().map(|e| format!("{}.cfg", e.to_string_lossy())).unwrap_or_else(|| "cfg".to_string());
    p.set_extension(ext);
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_path_appends_cfg_suffix() {
        assert_eq!(model_sidecar_path("model.crfsuite"), PathBuf::from("model.crfsuite.cfg"));
        assert_eq!(model_sidecar_path("model"), PathBuf::from("model.cfg"));
    }

    #[test]
    fn column_preset_known_names() {
        assert_eq!(column_preset("pos").unwrap(), vec!["form", "postag"]);
        assert_eq!(
            column_preset("chunk").unwrap(),
            vec!["form", "postag", "chunktag"]
        );
    }

    #[test]
    fn column_preset_rejects_unknown_name() {
        let err = column_preset("bogus").unwrap_err();
        assert_eq!(err.kind(), SeqCrfErrorKind::SchemaMismatch);
    }
}

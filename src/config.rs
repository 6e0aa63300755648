//! Configuration (§4.8): a hand-rolled `[section]` / `key = value` reader,
//! in the same spirit as the teacher's own hand-parsed `.def` formats —
//! no external ini crate for a small, fully-owned grammar.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{SeqCrfErrorKind, SeqCrfResult};

/// A single `[section]`'s flat string -> string map.
pub type Section = HashMap<String, String>;

/// The three configuration sections mirrored from the original tool's INI
/// file: `tagger`, `crfsuite`, `resources` (§4.8).
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub tagger: Section,
    pub crfsuite: Section,
    pub resources: Section,
}

const RECOGNIZED_TAGGER_KEYS: &[&str] = &[
    "train",
    "test",
    "cols",
    "tab_sep",
    "ftvec",
    "label_col",
    "guess_label_col",
    "model",
    "eval_func",
    "verbose",
];

impl Config {
    pub fn from_path(path: &Path) -> SeqCrfResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses the `[section]` / `key = value` grammar line by line, `#` and
    /// `;` starting a whole-line comment, tilde-expanding every value the
    /// way the original tool's `expandpaths` walks every configuration
    /// value, not just resource paths (§4.8, §10.5).
    pub fn parse(content: &str) -> SeqCrfResult<Self> {
        let mut config = Config::default();
        let mut current: Option<String> = None;

        for (lineno, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(body) = line.strip_prefix('[') {
                let name = body.strip_suffix(']').ok_or_else(|| {
                    SeqCrfErrorKind::Config
                        .with_error(anyhow::anyhow!("line {}: unterminated section header", lineno + 1))
                })?;
                current = Some(name.trim().to_string());
                continue;
            }
            let section_name = current.as_ref().ok_or_else(|| {
                SeqCrfErrorKind::Config.with_error(anyhow::anyhow!(
                    "line {}: key outside of any [section]",
                    lineno + 1
                ))
            })?;
            let (key, value) = line.split_once('=').ok_or_else(|| {
                SeqCrfErrorKind::Config.with_error(anyhow::anyhow!("line {}: expected key = value", lineno + 1))
            })?;
            let key = key.trim().to_string();
            let value = expand_tilde(value.trim());

            let section = match section_name.as_str() {
                "tagger" => &mut config.tagger,
                "crfsuite" => &mut config.crfsuite,
                "resources" => &mut config.resources,
                other => {
                    return Err(SeqCrfErrorKind::Config
                        .with_error(anyhow::anyhow!("line {}: unrecognized section [{other}]", lineno + 1)));
                }
            };
            section.insert(key, value);
        }
        Ok(config)
    }

    pub fn tagger_get(&self, key: &str) -> Option<&str> {
        self.tagger.get(key).map(|s| s.as_str())
    }

    pub fn train_path(&self) -> Option<&str> {
        self.tagger_get("train")
    }

    pub fn test_path(&self) -> Option<&str> {
        self.tagger_get("test")
    }

    pub fn model_path(&self) -> Option<&str> {
        self.tagger_get("model")
    }

    pub fn label_col(&self) -> &str {
        self.tagger_get("label_col").unwrap_or("postag")
    }

    pub fn guess_label_col(&self) -> &str {
        self.tagger_get("guess_label_col").unwrap_or("guesstag")
    }

    pub fn tab_sep(&self) -> char {
        self.tagger_get("tab_sep").and_then(|s| s.chars().next()).unwrap_or('\t')
    }

    pub fn ftvec(&self) -> Option<&str> {
        self.tagger_get("ftvec")
    }

    pub fn eval_func(&self) -> &str {
        self.tagger_get("eval_func").unwrap_or("pos")
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self.tagger_get("verbose"), Some("1") | Some("true"))
    }

    /// Warns (does not fail) about `tagger` keys outside the recognized set,
    /// since an unrecognized key is a likely typo rather than a hard error.
    pub fn check_recognized_keys(&self) {
        for key in self.tagger.keys() {
            if !RECOGNIZED_TAGGER_KEYS.contains(&key.as_str()) {
                log::warn!("unrecognized tagger config key: {key}");
            }
        }
    }

    /// Produces a rendering with `resources` paths and the `tagger`
    /// `train`/`test`/`model` paths elided, suitable for persisting
    /// alongside a trained model (§6.5, §10.5).
    pub fn sanitized(&self) -> Config {
        let mut tagger = self.tagger.clone();
        for key in ["train", "test", "model"] {
            if tagger.contains_key(key) {
                tagger.insert(key.to_string(), "<elided>".to_string());
            }
        }
        let resources = self
            .resources
            .keys()
            .map(|k| (k.clone(), "<elided>".to_string()))
            .collect();
        Config {
            tagger,
            crfsuite: self.crfsuite.clone(),
            resources,
        }
    }

    /// Renders back to `[section]` / `key = value` text, in section order
    /// `tagger`, `crfsuite`, `resources`, keys sorted for determinism.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, section) in [("tagger", &self.tagger), ("crfsuite", &self.crfsuite), ("resources", &self.resources)]
        {
            out.push_str(&format!("[{name}]\n"));
            let mut keys: Vec<&String> = section.keys().collect();
            keys.sort();
            for key in keys {
                out.push_str(&format!("{key} = {}\n", section[key]));
            }
            out.push('\n');
        }
        out
    }
}

fn expand_tilde(value: &str) -> String {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut path = std::path::PathBuf::from(home);
            path.push(rest);
            return path.to_string_lossy().into_owned();
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[tagger]
train = ~/data/train.tsv
cols = pos
ftvec = word:[-1:1];pos:[-1]

[crfsuite]
algorithm = lbfgs
c2 = 1.0

[resources]
brown = ~/res/brown.txt
";

    #[test]
    fn parses_three_sections() {
        let cfg = Config::parse(SAMPLE).unwrap();
        assert_eq!(cfg.tagger_get("cols"), Some("pos"));
        assert_eq!(cfg.crfsuite.get("algorithm").map(|s| s.as_str()), Some("lbfgs"));
        assert!(cfg.resources.contains_key("brown"));
    }

    #[test]
    fn expands_tilde_in_every_value() {
        let cfg = Config::parse(SAMPLE).unwrap();
        let home = std::env::var("HOME").unwrap();
        assert_eq!(cfg.train_path().unwrap(), format!("{home}/data/train.tsv"));
        assert_eq!(cfg.resources.get("brown").unwrap(), &format!("{home}/res/brown.txt"));
    }

    #[test]
    fn rejects_key_outside_section() {
        let err = Config::parse("cols = pos\n").unwrap_err();
        assert_eq!(err.kind(), SeqCrfErrorKind::Config);
    }

    #[test]
    fn rejects_unrecognized_section() {
        let err = Config::parse("[bogus]\nx = 1\n").unwrap_err();
        assert_eq!(err.kind(), SeqCrfErrorKind::Config);
    }

    #[test]
    fn sanitized_elides_paths() {
        let cfg = Config::parse(SAMPLE).unwrap();
        let clean = cfg.sanitized();
        assert_eq!(clean.train_path(), Some("<elided>"));
        assert_eq!(clean.resources.get("brown").unwrap(), "<elided>");
        assert_eq!(clean.crfsuite.get("algorithm").map(|s| s.as_str()), Some("lbfgs"));
    }

    #[test]
    fn render_round_trips_keys() {
        let cfg = Config::parse(SAMPLE).unwrap();
        let rendered = cfg.render();
        let reparsed = Config::parse(&rendered).unwrap();
        assert_eq!(reparsed.crfsuite.get("c2"), cfg.crfsuite.get("c2"));
    }
}

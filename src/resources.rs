//! External resource readers (§4.2): cluster maps, embedding maps, affix sets.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use crate::error::{SeqCrfErrorKind, SeqCrfResult};

/// A form -> cluster-id map, shared by the `brown` and `cls` features.
#[derive(Debug, Clone, Default)]
pub struct ClusterMap(pub HashMap<String, String>);

impl ClusterMap {
    pub fn get(&self, form: &str) -> Option<&str> {
        self.0.get(form).map(|s| s.as_str())
    }
}

/// A form -> fixed-length embedding vector map. All vectors share `dim`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingMap {
    pub dim: usize,
    pub vectors: HashMap<String, Vec<f32>>,
}

impl EmbeddingMap {
    pub fn get(&self, form: &str, j: usize) -> Option<f32> {
        self.vectors.get(form).and_then(|v| v.get(j)).copied()
    }
}

/// A set of affix strings, used by the `suff`/`pref` family of features.
#[derive(Debug, Clone, Default)]
pub struct AffixSet(pub HashSet<String>);

impl AffixSet {
    /// Longest affix present in the set that is a prefix (`is_suffix = false`)
    /// or suffix (`is_suffix = true`) of `form`, capped at `max_len` chars.
    pub fn longest_affix(&self, form: &str, is_suffix: bool, max_len: usize) -> Option<&str> {
        let chars: Vec<char> = form.chars().collect();
        let cap = max_len.min(chars.len());
        for len in (1..=cap).rev() {
            let candidate: String = if is_suffix {
                chars[chars.len() - len..].iter().collect()
            } else {
                chars[..len].iter().collect()
            };
            if let Some(found) = self.0.get(&candidate) {
                return Some(found.as_str());
            }
        }
        None
    }
}

/// The shape-tagged union of resource kinds described in §3.3.
#[derive(Debug, Clone)]
pub enum Resource {
    Cluster(ClusterMap),
    Embedding(EmbeddingMap),
    Affix(AffixSet),
}

impl Resource {
    pub fn as_cluster(&self) -> Option<&ClusterMap> {
        match self {
            Resource::Cluster(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_embedding(&self) -> Option<&EmbeddingMap> {
        match self {
            Resource::Embedding(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_affix(&self) -> Option<&AffixSet> {
        match self {
            Resource::Affix(a) => Some(a),
            _ => None,
        }
    }
}

/// Loaded resources, keyed by configured name (`brown`, `cls`, `emb`, ...),
/// owned by the orchestrator and referenced (never copied) by template entries.
pub type ResourceBundle = HashMap<String, Rc<Resource>>;

/// Reads a Brown-clustering file: whitespace-separated `<cluster-id> <word> [<count>]`.
pub fn read_brown(path: &Path) -> SeqCrfResult<Resource> {
    let content = fs::read_to_string(path)?;
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut cols = line.split_whitespace();
        let cluster = cols
            .next()
            .ok_or_else(|| SeqCrfErrorKind::SchemaMismatch.with_error(anyhow::anyhow!("empty brown row")))?;
        let word = cols.next().ok_or_else(|| {
            SeqCrfErrorKind::SchemaMismatch.with_error(anyhow::anyhow!("missing word in brown row: {line}"))
        })?;
        map.insert(word.to_string(), cluster.to_string());
    }
    Ok(Resource::Cluster(ClusterMap(map)))
}

/// Reads a flat-cluster file: whitespace-separated `<word> <cluster-id>`.
pub fn read_cls(path: &Path) -> SeqCrfResult<Resource> {
    let content = fs::read_to_string(path)?;
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut cols = line.split_whitespace();
        let word = cols
            .next()
            .ok_or_else(|| SeqCrfErrorKind::SchemaMismatch.with_error(anyhow::anyhow!("empty cls row")))?;
        let cluster = cols.next().ok_or_else(|| {
            SeqCrfErrorKind::SchemaMismatch.with_error(anyhow::anyhow!("missing cluster in cls row: {line}"))
        })?;
        map.insert(word.to_string(), cluster.to_string());
    }
    Ok(Resource::Cluster(ClusterMap(map)))
}

/// Reads a word2vec plain-text embedding file, skipping an optional `<vocab> <dim>` header.
pub fn read_emb(path: &Path) -> SeqCrfResult<Resource> {
    let content = fs::read_to_string(path)?;
    let mut lines = content.lines().filter(|l| !l.trim().is_empty()).peekable();

    if let Some(first) = lines.peek() {
        let parts: Vec<&str> = first.split_whitespace().collect();
        if parts.len() == 2 && parts.iter().all(|p| p.parse::<usize>().is_ok()) {
            lines.next();
        }
    }

    let mut dim = None;
    let mut vectors = HashMap::new();
    for line in lines {
        let mut parts = line.split_whitespace();
        let word = parts.next().ok_or_else(|| {
            SeqCrfErrorKind::SchemaMismatch.with_error(anyhow::anyhow!("empty embedding row"))
        })?;
        let vec: Vec<f32> = parts
            .map(|p| {
                p.parse::<f32>().map_err(|e| {
                    SeqCrfErrorKind::SchemaMismatch.with_error(anyhow::anyhow!("{e}: {p}"))
                })
            })
            .collect::<SeqCrfResult<_>>()?;
        match dim {
            None => dim = Some(vec.len()),
            Some(d) if d != vec.len() => {
                return Err(SeqCrfErrorKind::SchemaMismatch.with_error(anyhow::anyhow!(
                    "inconsistent embedding width for {word}: expected {d}, got {}",
                    vec.len()
                )));
            }
            _ => {}
        }
        vectors.insert(word.to_string(), vec);
    }
    Ok(Resource::Embedding(EmbeddingMap {
        dim: dim.unwrap_or(0),
        vectors,
    }))
}

/// Reads an affix set: one affix string per non-blank line.
pub fn read_affix(path: &Path) -> SeqCrfResult<Resource> {
    let content = fs::read_to_string(path)?;
    let set = content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect();
    Ok(Resource::Affix(AffixSet(set)))
}

/// Dispatches to the reader for a configured resource name, per §4.2.
///
/// The set of recognized names is closed; an unrecognized name is an
/// `UnknownResource` failure raised at orchestrator startup.
pub fn read_resource(name: &str, path: &Path) -> SeqCrfResult<Resource> {
    match name {
        "brown" => read_brown(path),
        "cls" => read_cls(path),
        "emb" => read_emb(path),
        "suff" | "pref" | "medpref" | "medsuff" | "nounsuff" | "verbsuff" | "adjsuff"
        | "advsuff" | "inflsuff" => read_affix(path),
        other => Err(SeqCrfErrorKind::UnknownResource
            .with_error(anyhow::anyhow!("no reader registered for resource `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_brown_clusters() {
        let f = write_tmp("0101\tthe\t120\n0110\tdog\t30\n");
        let r = read_brown(f.path()).unwrap();
        let c = r.as_cluster().unwrap();
        assert_eq!(c.get("the"), Some("0101"));
        assert_eq!(c.get("dog"), Some("0110"));
        assert_eq!(c.get("cat"), None);
    }

    #[test]
    fn reads_embeddings_with_header() {
        let f = write_tmp("2 3\nthe 0.1 0.2 0.3\ndog 0.4 0.5 0.6\n");
        let r = read_emb(f.path()).unwrap();
        let e = r.as_embedding().unwrap();
        assert_eq!(e.dim, 3);
        assert_eq!(e.get("the", 1), Some(0.2));
        assert_eq!(e.get("missing", 0), None);
    }

    #[test]
    fn rejects_inconsistent_embedding_width() {
        let f = write_tmp("the 0.1 0.2\ndog 0.1\n");
        let err = read_emb(f.path()).unwrap_err();
        assert_eq!(err.kind(), SeqCrfErrorKind::SchemaMismatch);
    }

    #[test]
    fn reads_affix_set() {
        let f = write_tmp("ing\ned\ntion\n");
        let r = read_affix(f.path()).unwrap();
        let a = r.as_affix().unwrap();
        assert_eq!(a.longest_affix("running", true, 4), Some("ing"));
        assert_eq!(a.longest_affix("cats", true, 4), None);
    }

    #[test]
    fn unknown_resource_name_fails() {
        let f = write_tmp("irrelevant");
        let err = read_resource("bogus", f.path()).unwrap_err();
        assert_eq!(err.kind(), SeqCrfErrorKind::UnknownResource);
    }
}

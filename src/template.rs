//! Feature template DSL and built-in feature functions (§4.1.2, §4.4).

use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{SeqCrfErrorKind, SeqCrfResult};
use crate::range::{ngram_starts, parse_range};
use crate::resources::{Resource, ResourceBundle};
use crate::store::SequenceStore;

static ISNUM_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9/]+$").unwrap());

/// The four logical columns a template can reference, remapped to physical
/// column names via `cols` (§4.4.1) so one template can be reused against
/// data whose physical schema renames them.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub form: String,
    pub postag: String,
    pub chunktag: String,
    pub netag: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        ColumnMap {
            form: "form".into(),
            postag: "postag".into(),
            chunktag: "chunktag".into(),
            netag: "netag".into(),
        }
    }
}

/// A captured parameter to a compiled template entry.
#[derive(Debug, Clone)]
pub enum Param {
    Text(String),
    Int(i64),
    Resource(Rc<Resource>),
}

/// One compiled feature-template entry: a feature function name, the
/// relative offset it's fanned out to, and whatever parameters were
/// captured for it at compile time (§3.2).
#[derive(Debug, Clone)]
pub struct TemplateEntry {
    pub feature: String,
    pub rel: i64,
    pub params: Vec<Param>,
}

/// Signature shared by every built-in and user-supplied feature function.
/// The `(usize, usize)` is the `[start, end)` record range of the current
/// sequence within `data`'s columns — offsets are bounds-checked against
/// this range, not the whole store, so a window never bleeds across a
/// sequence boundary (§4.5 step 2).
pub type FeatureFn = fn(&SequenceStore, usize, &ColumnMap, i64, &[Param], (usize, usize)) -> SeqCrfResult<String>;

/// Signature for a window generator: given the parsed window list and the
/// leftover (non-window) params, produce the template entries to append.
pub type WindowGenFn = fn(&str, &[i64], &[Param]) -> SeqCrfResult<Vec<TemplateEntry>>;

/// The compiled feature vector plus the registries used to compile and
/// evaluate it (§4.4.1).
pub struct FeatureTemplate {
    pub vec: Vec<TemplateEntry>,
    pub cols: ColumnMap,
    fn_registry: HashMap<String, FeatureFn>,
    win_fnx: HashMap<String, WindowGenFn>,
}

impl Default for FeatureTemplate {
    fn default() -> Self {
        FeatureTemplate::new()
    }
}

impl FeatureTemplate {
    pub fn new() -> Self {
        let mut fn_registry: HashMap<String, FeatureFn> = HashMap::new();
        fn_registry.insert("word".into(), ft_word);
        fn_registry.insert("pos".into(), ft_pos);
        fn_registry.insert("chunk".into(), ft_chunk);
        fn_registry.insert("can".into(), ft_can);
        fn_registry.insert("isnum".into(), ft_isnum);
        fn_registry.insert("ln".into(), ft_ln);
        fn_registry.insert("short".into(), ft_short);
        fn_registry.insert("long".into(), ft_long);
        fn_registry.insert("brown".into(), ft_brown);
        fn_registry.insert("cls".into(), ft_cls);
        fn_registry.insert("emb".into(), ft_emb);
        fn_registry.insert("nword".into(), ft_nword);
        fn_registry.insert("npos".into(), ft_npos);
        fn_registry.insert("nchunk".into(), ft_nchunk);
        fn_registry.insert("suff".into(), ft_suff);
        fn_registry.insert("pref".into(), ft_pref);
        fn_registry.insert("medpref".into(), ft_medpref);
        fn_registry.insert("medsuff".into(), ft_medsuff);
        fn_registry.insert("nounsuff".into(), ft_nounsuff);
        fn_registry.insert("verbsuff".into(), ft_verbsuff);
        fn_registry.insert("adjsuff".into(), ft_adjsuff);
        fn_registry.insert("advsuff".into(), ft_advsuff);
        fn_registry.insert("inflsuff".into(), ft_inflsuff);

        let mut win_fnx: HashMap<String, WindowGenFn> = HashMap::new();
        win_fnx.insert("emb".into(), win_emb);
        win_fnx.insert("nword".into(), win_ngram);
        win_fnx.insert("npos".into(), win_ngram);
        win_fnx.insert("nchunk".into(), win_ngram);

        FeatureTemplate {
            vec: Vec::new(),
            cols: ColumnMap::default(),
            fn_registry,
            win_fnx,
        }
    }

    /// Registers or overrides a feature function by name (§4.4.1: "plus any
    /// user-supplied overrides").
    pub fn register_feature(&mut self, name: &str, f: FeatureFn) {
        self.fn_registry.insert(name.to_string(), f);
    }

    pub fn register_window_gen(&mut self, name: &str, f: WindowGenFn) {
        self.win_fnx.insert(name.to_string(), f);
    }

    fn lookup_fn(&self, name: &str) -> SeqCrfResult<FeatureFn> {
        self.fn_registry
            .get(name)
            .copied()
            .ok_or_else(|| SeqCrfErrorKind::UnknownFeature.with_error(anyhow::anyhow!("unknown feature: {name}")))
    }

    /// Compiles a DSL string (§4.1.2) into `self.vec`, resolving resource
    /// names against `resources`.
    pub fn parse_ftvec_templ(&mut self, s: &str, resources: &ResourceBundle) -> SeqCrfResult<()> {
        let stripped: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        for feature in stripped.split(';') {
            if feature.is_empty() {
                continue;
            }
            self.parse_feature(feature, resources)?;
        }
        Ok(())
    }

    fn parse_feature(&mut self, feature: &str, resources: &ResourceBundle) -> SeqCrfResult<()> {
        let (name, rest) = match feature.split_once(':') {
            Some((n, r)) => (n, Some(r)),
            None => (feature, None),
        };

        // No colon, or a colon with nothing after it: both are the bare
        // parameterless feature (§4.1.2 edge rules).
        let rest = match rest {
            None | Some("") => {
                self.lookup_fn(name)?;
                self.vec.push(TemplateEntry {
                    feature: name.to_string(),
                    rel: 0,
                    params: resource_param(name, resources).into_iter().collect(),
                });
                return Ok(());
            }
            Some(r) => r,
        };

        self.lookup_fn(name)?;

        let (window_str, paramlist_str) = if let Some(body) = rest.strip_prefix('[') {
            let close = bracket_close(body).ok_or_else(|| {
                SeqCrfErrorKind::MalformedTemplate
                    .with_error(anyhow::anyhow!("unterminated window in: {feature}"))
            })?;
            let window = &body[..close];
            let remainder = &body[close + 1..];
            let params = remainder.strip_prefix(',').unwrap_or(remainder);
            (window.to_string(), params.to_string())
        } else {
            ("0".to_string(), rest.to_string())
        };

        let window = parse_range(&window_str)?;
        let mut param_tokens = split_params(&paramlist_str);

        let mut params: Vec<Param> = Vec::new();
        if let Some(resource) = resources.get(name) {
            params.push(Param::Resource(resource.clone()));
        }
        params.append(&mut param_tokens);

        let entries = self.add_win_features(name, &window, &params)?;
        self.vec.extend(entries);
        Ok(())
    }

    /// Fans a window out into template entries via the function-specific
    /// window generator, or the generic one if none is registered (§4.1.2).
    fn add_win_features(&self, name: &str, window: &[i64], params: &[Param]) -> SeqCrfResult<Vec<TemplateEntry>> {
        match self.win_fnx.get(name) {
            Some(gen) => gen(name, window, params),
            None => Ok(win_generic(name, window, params)),
        }
    }

    /// Produces one feature row for token `i` of the sequence spanning
    /// `[seq_start, seq_end)`: the form at `i`, followed by the result of
    /// every compiled entry in order (§4.4.4). `i` is an absolute index into
    /// `data`'s columns; offsets that land outside `[seq_start, seq_end)`
    /// are out-of-bounds for this sequence even if they remain a valid
    /// index into the whole store (§4.5 step 2).
    pub fn make_fts(
        &self,
        data: &SequenceStore,
        seq_bounds: (usize, usize),
        i: usize,
    ) -> SeqCrfResult<Vec<String>> {
        let form_col = data.column(&self.cols.form)?;
        let mut row = Vec::with_capacity(1 + self.vec.len());
        row.push(form_col[i].clone());
        for entry in &self.vec {
            let f = self.lookup_fn(&entry.feature)?;
            row.push(f(data, i, &self.cols, entry.rel, &entry.params, seq_bounds)?);
        }
        Ok(row)
    }
}

fn resource_param(name: &str, resources: &ResourceBundle) -> Option<Param> {
    resources.get(name).map(|r| Param::Resource(r.clone()))
}

/// Finds the index (within `s`, i.e. relative to the char after the opening
/// `[`) of the matching `]`, respecting nested brackets.
fn bracket_close(s: &str) -> Option<usize> {
    let mut depth = 1i32;
    for (idx, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits a comma-separated parameter list, respecting `[`/`]` nesting so a
/// token like `emb`'s dimension-subset range-spec isn't split internally.
fn split_params(s: &str) -> Vec<Param> {
    if s.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (idx, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                out.push(token_to_param(&s[start..idx]));
                start = idx + 1;
            }
            _ => {}
        }
    }
    out.push(token_to_param(&s[start..]));
    out
}

fn token_to_param(tok: &str) -> Param {
    if let Ok(n) = tok.parse::<i64>() {
        Param::Int(n)
    } else {
        Param::Text(tok.to_string())
    }
}

// --- window generators -----------------------------------------------------

fn win_generic(name: &str, window: &[i64], params: &[Param]) -> Vec<TemplateEntry> {
    window
        .iter()
        .map(|&i| TemplateEntry {
            feature: name.to_string(),
            rel: i,
            params: params.to_vec(),
        })
        .collect()
}

fn win_emb(name: &str, window: &[i64], params: &[Param]) -> SeqCrfResult<Vec<TemplateEntry>> {
    let emb = params
        .iter()
        .find(|p| matches!(p, Param::Resource(_)))
        .cloned()
        .ok_or_else(|| {
            SeqCrfErrorKind::MalformedTemplate.with_error(anyhow::anyhow!("emb feature requires an embedding resource"))
        })?;

    let dims: Vec<i64> = match params.iter().find_map(|p| match p {
        Param::Text(t) if t.starts_with('[') && t.ends_with(']') => Some(t.clone()),
        _ => None,
    }) {
        Some(spec) => parse_range(&spec[1..spec.len() - 1])?,
        None => {
            let d = match &emb {
                Param::Resource(r) => r.as_embedding().map(|e| e.dim).unwrap_or(0),
                _ => 0,
            };
            (0..d as i64).collect()
        }
    };

    let mut out = Vec::new();
    for &i in window {
        for &j in &dims {
            out.push(TemplateEntry {
                feature: name.to_string(),
                rel: i,
                params: vec![emb.clone(), Param::Int(j)],
            });
        }
    }
    Ok(out)
}

fn win_ngram(name: &str, window: &[i64], params: &[Param]) -> SeqCrfResult<Vec<TemplateEntry>> {
    let n = params
        .iter()
        .find_map(|p| match p {
            Param::Int(n) => Some(*n as usize),
            _ => None,
        })
        .unwrap_or(2);
    let starts = ngram_starts(window, n);
    Ok(starts
        .into_iter()
        .map(|i| TemplateEntry {
            feature: name.to_string(),
            rel: i,
            params: vec![Param::Int(n as i64)],
        })
        .collect())
}

// --- built-in feature functions --------------------------------------------

const NONE: &str = "None";

/// Looks up `col[i + rel]`, bounds-checked against the current sequence's
/// `[start, end)` range rather than the whole store (§4.5 step 2): an
/// offset that spills into a neighboring sequence is out-of-bounds here
/// even though it indexes a valid cell of `col`.
fn at_offset<'a>(col: &'a [String], i: usize, rel: i64, bounds: (usize, usize)) -> Option<&'a str> {
    let (start, end) = bounds;
    let idx = i as i64 + rel;
    if idx < start as i64 || idx >= end as i64 {
        None
    } else {
        Some(col[idx as usize].as_str())
    }
}

fn ft_word(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, _p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.form)?;
    Ok(format!("w[{rel}]={}", at_offset(col, i, rel, bounds).unwrap_or(NONE)))
}

fn ft_pos(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, _p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.postag)?;
    Ok(format!("p[{rel}]={}", at_offset(col, i, rel, bounds).unwrap_or(NONE)))
}

fn ft_chunk(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, _p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.chunktag)?;
    Ok(format!("ch[{rel}]={}", at_offset(col, i, rel, bounds).unwrap_or(NONE)))
}

fn canonicalize(form: &str) -> String {
    form.chars()
        .map(|c| {
            if c.is_ascii_digit() {
                '#'
            } else if c.is_alphanumeric() || c == '_' {
                'x'
            } else {
                '*'
            }
        })
        .collect()
}

fn ft_can(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, _p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.form)?;
    let value = at_offset(col, i, rel, bounds).map(canonicalize).unwrap_or_else(|| NONE.to_string());
    Ok(format!("can[{rel}]={value}"))
}

fn is_numeric_form(form: &str) -> bool {
    ISNUM_PATTERN.is_match(form)
}

fn ft_isnum(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, _p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.form)?;
    let value = match at_offset(col, i, rel, bounds) {
        Some(form) => is_numeric_form(form).to_string(),
        None => NONE.to_string(),
    };
    Ok(format!("isnum[{rel}]={value}"))
}

fn ft_ln(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, _p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.form)?;
    let value = match at_offset(col, i, rel, bounds) {
        Some(form) => form.chars().count().to_string(),
        None => NONE.to_string(),
    };
    Ok(format!("ln[{rel}]={value}"))
}

fn int_param(params: &[Param], default: i64) -> i64 {
    params
        .iter()
        .find_map(|p| match p {
            Param::Int(n) => Some(*n),
            _ => None,
        })
        .unwrap_or(default)
}

fn ft_short(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.form)?;
    let threshold = int_param(p, 2);
    let value = match at_offset(col, i, rel, bounds) {
        Some(form) => ((form.chars().count() as i64) < threshold).to_string(),
        None => NONE.to_string(),
    };
    Ok(format!("short[{rel}]={value}"))
}

fn ft_long(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.form)?;
    let threshold = int_param(p, 12);
    let value = match at_offset(col, i, rel, bounds) {
        Some(form) => ((form.chars().count() as i64) > threshold).to_string(),
        None => NONE.to_string(),
    };
    Ok(format!("long[{rel}]={value}"))
}

fn resource_param_of(params: &[Param]) -> Option<&Rc<Resource>> {
    params.iter().find_map(|p| match p {
        Param::Resource(r) => Some(r),
        _ => None,
    })
}

fn ft_brown(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.form)?;
    let prefix_len = p.iter().find_map(|pp| match pp {
        Param::Int(n) => Some(*n as usize),
        _ => None,
    });
    let label = match prefix_len {
        Some(n) => format!("cn[{rel}]:{n}="),
        None => format!("cn[{rel}]:full="),
    };
    let value = match at_offset(col, i, rel, bounds) {
        None => NONE.to_string(),
        Some(form) => {
            let cluster = resource_param_of(p).and_then(|r| r.as_cluster()).and_then(|c| c.get(form));
            match cluster {
                None => NONE.to_string(),
                Some(id) => match prefix_len {
                    Some(n) => id.chars().take(n).collect(),
                    None => id.to_string(),
                },
            }
        }
    };
    Ok(format!("{label}{value}"))
}

fn ft_cls(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.form)?;
    let value = match at_offset(col, i, rel, bounds) {
        None => NONE.to_string(),
        Some(form) => resource_param_of(p)
            .and_then(|r| r.as_cluster())
            .and_then(|c| c.get(form))
            .map(|s| s.to_string())
            .unwrap_or_else(|| NONE.to_string()),
    };
    Ok(format!("cnum[{rel}]={value}"))
}

fn ft_emb(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.form)?;
    let j = p
        .iter()
        .rev()
        .find_map(|pp| match pp {
            Param::Int(n) => Some(*n as usize),
            _ => None,
        })
        .unwrap_or(0);
    let value = match at_offset(col, i, rel, bounds) {
        None => NONE.to_string(),
        Some(form) => resource_param_of(p)
            .and_then(|r| r.as_embedding())
            .and_then(|e| e.get(form, j))
            .map(|v| v.to_string())
            .unwrap_or_else(|| NONE.to_string()),
    };
    Ok(format!("emb[{rel}][{j}]={value}"))
}

fn ngram_value(col: &[String], i: usize, rel: i64, n: i64, bounds: (usize, usize)) -> Option<String> {
    let (seq_start, seq_end) = bounds;
    let start = i as i64 + rel;
    if start < seq_start as i64 {
        return None;
    }
    let start = start as usize;
    if start + n as usize > seq_end {
        return None;
    }
    Some(col[start..start + n as usize].join(""))
}

fn ft_nword(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.form)?;
    let n = int_param(p, 2);
    let value = ngram_value(col, i, rel, n, bounds).unwrap_or_else(|| NONE.to_string());
    Ok(format!("{n}w[{rel}]={value}"))
}

fn ft_npos(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.postag)?;
    let n = int_param(p, 2);
    let value = ngram_value(col, i, rel, n, bounds).unwrap_or_else(|| NONE.to_string());
    Ok(format!("{n}p[{rel}]={value}"))
}

fn ft_nchunk(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    let col = data.column(&cols.chunktag)?;
    let n = int_param(p, 2);
    let value = ngram_value(col, i, rel, n, bounds).unwrap_or_else(|| NONE.to_string());
    Ok(format!("{n}ch[{rel}]={value}"))
}

const AFFIX_MAX_LEN: usize = 6;

fn affix_feature(
    data: &SequenceStore,
    i: usize,
    cols: &ColumnMap,
    rel: i64,
    p: &[Param],
    bounds: (usize, usize),
    is_suffix: bool,
    tag: Option<&str>,
) -> SeqCrfResult<String> {
    let col = data.column(&cols.form)?;
    let label = match tag {
        Some(t) => format!("{t}sfx[{rel}]="),
        None => format!("sfx[{rel}]="),
    };
    let value = match at_offset(col, i, rel, bounds) {
        None => NONE.to_string(),
        Some(form) => resource_param_of(p)
            .and_then(|r| r.as_affix())
            .and_then(|a| a.longest_affix(form, is_suffix, AFFIX_MAX_LEN))
            .map(|s| s.to_string())
            .unwrap_or_else(|| NONE.to_string()),
    };
    Ok(format!("{label}{value}"))
}

fn ft_suff(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    affix_feature(data, i, cols, rel, p, bounds, true, None)
}

fn ft_pref(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    affix_feature(data, i, cols, rel, p, bounds, false, None)
}

fn ft_medpref(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    affix_feature(data, i, cols, rel, p, bounds, false, Some("med"))
}

fn ft_medsuff(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    affix_feature(data, i, cols, rel, p, bounds, true, Some("med"))
}

fn ft_nounsuff(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    affix_feature(data, i, cols, rel, p, bounds, true, Some("noun"))
}

fn ft_verbsuff(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    affix_feature(data, i, cols, rel, p, bounds, true, Some("verb"))
}

fn ft_adjsuff(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    affix_feature(data, i, cols, rel, p, bounds, true, Some("adj"))
}

fn ft_advsuff(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    affix_feature(data, i, cols, rel, p, bounds, true, Some("adv"))
}

fn ft_inflsuff(data: &SequenceStore, i: usize, cols: &ColumnMap, rel: i64, p: &[Param], bounds: (usize, usize)) -> SeqCrfResult<String> {
    affix_feature(data, i, cols, rel, p, bounds, true, Some("infl"))
}

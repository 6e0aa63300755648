//! Range/DSL atom parsing (§4.1 of the design spec).

use crate::error::{SeqCrfErrorKind, SeqCrfResult};

/// Parses a comma-separated list of integer atoms or inclusive `a:b` ranges
/// into the flat list of integers they denote, in scan order.
///
/// `"-3:1,4"` -> `[-3,-2,-1,0,1,4]`
pub fn parse_range(s: &str) -> SeqCrfResult<Vec<i64>> {
    let stripped: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for atom in stripped.split(',') {
        if atom.is_empty() {
            continue;
        }
        if let Some((a, b)) = atom.split_once(':') {
            let lo: i64 = a
                .parse()
                .map_err(|e| SeqCrfErrorKind::MalformedRange.with_error(anyhow::anyhow!("{e}: {atom}")))?;
            let hi: i64 = b
                .parse()
                .map_err(|e| SeqCrfErrorKind::MalformedRange.with_error(anyhow::anyhow!("{e}: {atom}")))?;
            if lo > hi {
                return Err(SeqCrfErrorKind::MalformedRange.with_error(anyhow::anyhow!(
                    "range start exceeds end: {atom}"
                )));
            }
            out.extend(lo..=hi);
        } else {
            let n: i64 = atom.parse().map_err(|e| {
                SeqCrfErrorKind::MalformedRange.with_error(anyhow::anyhow!("{e}: {atom}"))
            })?;
            out.push(n);
        }
    }
    Ok(out)
}

/// Derives n-gram starting indices from a flat window (§4.1.3).
///
/// For every maximal consecutive run `a, a+1, ..., a+k` in `window`, emits
/// the starts `a, a+1, ..., a+k-n+1` (nothing if the run is shorter than `n`).
pub fn ngram_starts(window: &[i64], n: usize) -> Vec<i64> {
    if n == 0 {
        return Vec::new();
    }
    let n = n as i64;
    let mut out = Vec::new();
    let mut run_start_idx = 0usize;
    let mut idx = 0usize;
    while idx < window.len() {
        let at_end = idx + 1 == window.len();
        let breaks = at_end || window[idx + 1] != window[idx] + 1;
        if breaks {
            let run = &window[run_start_idx..=idx];
            let k = run.len() as i64 - 1;
            if k + 1 >= n {
                let a = run[0];
                let mut start = a;
                while start <= a + k - n + 1 {
                    out.push(start);
                    start += 1;
                }
            }
            run_start_idx = idx + 1;
        }
        idx += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_atoms() {
        assert_eq!(parse_range("-3:1,4").unwrap(), vec![-3, -2, -1, 0, 1, 4]);
        assert_eq!(parse_range("1:3,6,8:9").unwrap(), vec![1, 2, 3, 6, 8, 9]);
    }

    #[test]
    fn ignores_whitespace() {
        assert_eq!(parse_range(" -3 : 1 , 4 ").unwrap(), vec![-3, -2, -1, 0, 1, 4]);
    }

    #[test]
    fn empty_string_is_empty_list() {
        assert_eq!(parse_range("").unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn rejects_malformed_atom() {
        let err = parse_range("a:b").unwrap_err();
        assert_eq!(err.kind(), SeqCrfErrorKind::MalformedRange);
    }

    #[test]
    fn rejects_inverted_range() {
        let err = parse_range("4:1").unwrap_err();
        assert_eq!(err.kind(), SeqCrfErrorKind::MalformedRange);
    }

    #[test]
    fn idempotent_round_trip() {
        let original = parse_range("-3:1,4").unwrap();
        let serialized = original
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let reparsed = parse_range(&serialized).unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn ngram_window_derivation() {
        let mut window: Vec<i64> = (0..=9).collect();
        window.extend(12..=14);
        assert_eq!(
            ngram_starts(&window, 3),
            (0..=7).chain(std::iter::once(12)).collect::<Vec<i64>>()
        );
    }

    #[test]
    fn ngram_requires_full_run() {
        // a lone point is a run of length 1; n=2 needs k+1>=2
        assert_eq!(ngram_starts(&[2], 2), Vec::<i64>::new());
        assert_eq!(ngram_starts(&[-1, 0], 2), vec![-1]);
    }
}

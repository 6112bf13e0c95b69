//! Derive an index query from a regex pattern.
//!
//! The derived query must over-approximate the regex: every line the regex
//! matches has to be returned by the index query, so that re-applying the regex
//! to the candidates gives exactly the regex's matches. The index stores lines as
//! lower-cased alphanumeric tokens, so the derivation walks the regex HIR and
//! collects alphanumeric runs of literal text that any match must contain.
//!
//! Case-insensitive matching relies on the index lower-casing tokens, which
//! is weaker than the regex engine's Unicode simple case folding. A character
//! that folds to an ASCII letter without lower-casing to it is not covered:
//! `(?i)stuff` matches `ſtuff` (U+017F LATIN SMALL LETTER LONG S), but the
//! stored token is `ſtuff` and `*stuff*` misses it. The KELVIN SIGN (U+212A)
//! lower-cases to `k` and is found. Such lines only show up in a live scan.

use regex_syntax::hir::{Hir, HirKind, Literal};

use crate::utils::index_tokens;

/// Query that matches every indexed line.
pub const MATCH_ALL: &str = "*";

/// Build the index query for `pattern`.
///
/// The result is a space separated list of `*term*` wildcard clauses combined
/// with OR. Any line the regex can match contains at least one of the terms as a
/// substring of one of its tokens. When no such terms can be proven (classes,
/// optional parts, empty-matching patterns) the query degrades to [`MATCH_ALL`].
pub fn derive_index_query(pattern: &str) -> String {
    let terms = match regex_syntax::parse(pattern) {
        Ok(hir) => required_terms(&hir).unwrap_or_default(),
        Err(_) => Vec::new(),
    };

    let mut unique: Vec<String> = Vec::with_capacity(terms.len());
    for term in terms {
        if !unique.contains(&term) {
            unique.push(term);
        }
    }

    if unique.is_empty() {
        return MATCH_ALL.to_string();
    }
    unique
        .iter()
        .map(|t| format!("*{}*", t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Terms of which at least one appears in every match of `hir`, or `None` when
/// nothing can be required.
fn required_terms(hir: &Hir) -> Option<Vec<String>> {
    match hir.kind() {
        HirKind::Literal(lit) => {
            let runs = index_tokens(&literal_to_string(lit)?);
            (!runs.is_empty()).then_some(runs)
        }
        HirKind::Concat(subs) => {
            // Every part is present in a match, so any part's terms would do. Keep
            // them all to stay close to the literal text of the pattern.
            let terms: Vec<String> = subs.iter().filter_map(required_terms).flatten().collect();
            (!terms.is_empty()).then_some(terms)
        }
        HirKind::Alternation(alts) => {
            // A branch without terms could match without any of the others'.
            let mut terms = Vec::new();
            for alt in alts.iter() {
                terms.extend(required_terms(alt)?);
            }
            Some(terms)
        }
        HirKind::Capture(capture) => required_terms(&capture.sub),
        HirKind::Repetition(rep) if rep.min >= 1 => required_terms(&rep.sub),
        _ => None,
    }
}

fn literal_to_string(lit: &Literal) -> Option<String> {
    std::str::from_utf8(&lit.0).ok().map(|s| s.to_string())
}

//! Free-text query grammar for the line index.
//!
//! Clauses are separated by whitespace and combined with OR. A leading `+` makes
//! a clause required and a leading `-` excludes it. `*` and `?` inside a clause
//! are wildcards over a single token, a bare `*` matches every line, and a
//! quoted string (or a clause that tokenizes into several words) is a phrase.

use tantivy::query::{AllQuery, BooleanQuery, Occur, PhraseQuery, Query, RegexQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::Term;

use crate::error::{Result, SearchError};
use crate::utils::index_tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    Should,
    Must,
    MustNot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseTerm {
    MatchAll,
    Word(String),
    /// Anchored regex over a single lower-cased token
    Wildcard(String),
    Phrase(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub occurrence: Occurrence,
    pub term: ClauseTerm,
}

/// A parsed, validated free-text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeTextQuery {
    clauses: Vec<Clause>,
}

impl FreeTextQuery {
    pub fn parse(text: &str) -> Result<Self> {
        let mut clauses = Vec::new();
        let mut chars = text.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            let Some(&first) = chars.peek() else {
                break;
            };

            let occurrence = match first {
                '+' => {
                    chars.next();
                    Occurrence::Must
                }
                '-' => {
                    chars.next();
                    Occurrence::MustNot
                }
                _ => Occurrence::Should,
            };

            let term = if chars.next_if_eq(&'"').is_some() {
                let mut phrase = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    phrase.push(c);
                }
                if !closed {
                    return Err(SearchError::InvalidQuery(format!(
                        "unterminated quote in '{}'",
                        text
                    )));
                }
                words_term(&phrase)
            } else {
                let mut word = String::new();
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    word.push(c);
                }
                if word.is_empty() {
                    return Err(SearchError::InvalidQuery(format!(
                        "dangling operator in '{}'",
                        text
                    )));
                }
                bare_term(&word)
            };

            // Clauses made only of punctuation carry nothing the index can match.
            if let Some(term) = term {
                clauses.push(Clause { occurrence, term });
            }
        }

        if clauses.is_empty() {
            return Err(SearchError::InvalidQuery(format!(
                "no searchable terms in '{}'",
                text
            )));
        }
        Ok(Self { clauses })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_match_all(&self) -> bool {
        self.clauses
            .iter()
            .all(|c| c.term == ClauseTerm::MatchAll && c.occurrence != Occurrence::MustNot)
    }

    /// Build the tantivy query against the tokenized line field.
    pub fn to_query(&self, field: Field) -> Result<Box<dyn Query>> {
        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let occur = match clause.occurrence {
                Occurrence::Should => Occur::Should,
                Occurrence::Must => Occur::Must,
                Occurrence::MustNot => Occur::MustNot,
            };
            subqueries.push((occur, term_query(&clause.term, field)?));
        }

        // A purely negative query means "everything except".
        if subqueries.iter().all(|(occur, _)| *occur == Occur::MustNot) {
            subqueries.push((Occur::Must, Box::new(AllQuery)));
        }

        if subqueries.len() == 1 && subqueries[0].0 != Occur::MustNot {
            if let Some((_, query)) = subqueries.pop() {
                return Ok(query);
            }
        }
        Ok(Box::new(BooleanQuery::new(subqueries)))
    }
}

fn term_query(term: &ClauseTerm, field: Field) -> Result<Box<dyn Query>> {
    Ok(match term {
        ClauseTerm::MatchAll => Box::new(AllQuery),
        ClauseTerm::Word(word) => Box::new(TermQuery::new(
            Term::from_field_text(field, word),
            IndexRecordOption::Basic,
        )),
        ClauseTerm::Wildcard(pattern) => Box::new(
            RegexQuery::from_pattern(pattern, field)
                .map_err(|e| SearchError::InvalidQuery(e.to_string()))?,
        ),
        ClauseTerm::Phrase(words) => Box::new(PhraseQuery::new(
            words
                .iter()
                .map(|w| Term::from_field_text(field, w))
                .collect(),
        )),
    })
}

fn bare_term(word: &str) -> Option<ClauseTerm> {
    if word.chars().all(|c| c == '*') {
        return Some(ClauseTerm::MatchAll);
    }
    if word.contains(['*', '?']) {
        return wildcard_term(word);
    }
    words_term(word)
}

fn words_term(text: &str) -> Option<ClauseTerm> {
    let mut words = index_tokens(text);
    match words.len() {
        0 => None,
        1 => words.pop().map(ClauseTerm::Word),
        _ => Some(ClauseTerm::Phrase(words)),
    }
}

fn wildcard_term(word: &str) -> Option<ClauseTerm> {
    let word = word.to_lowercase();
    // Tokens never contain punctuation, so a wildcard with nothing else to match is useless.
    if !word.chars().any(char::is_alphanumeric) {
        return None;
    }
    let mut pattern = String::with_capacity(word.len() + 8);
    for c in word.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    Some(ClauseTerm::Wildcard(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(text: &str) -> Vec<(Occurrence, ClauseTerm)> {
        FreeTextQuery::parse(text)
            .unwrap()
            .clauses()
            .iter()
            .map(|c| (c.occurrence, c.term.clone()))
            .collect()
    }

    #[test]
    fn test_words_are_or_clauses() {
        assert_eq!(
            terms("foo Bar"),
            vec![
                (Occurrence::Should, ClauseTerm::Word("foo".into())),
                (Occurrence::Should, ClauseTerm::Word("bar".into())),
            ]
        );
    }

    #[test]
    fn test_required_and_prohibited() {
        assert_eq!(
            terms("+foo -bar"),
            vec![
                (Occurrence::Must, ClauseTerm::Word("foo".into())),
                (Occurrence::MustNot, ClauseTerm::Word("bar".into())),
            ]
        );
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(
            terms("*Handle* fo?"),
            vec![
                (Occurrence::Should, ClauseTerm::Wildcard(".*handle.*".into())),
                (Occurrence::Should, ClauseTerm::Wildcard("fo.".into())),
            ]
        );
        assert_eq!(terms("*"), vec![(Occurrence::Should, ClauseTerm::MatchAll)]);
        assert!(FreeTextQuery::parse("*").unwrap().is_match_all());
    }

    #[test]
    fn test_phrases() {
        assert_eq!(
            terms("\"impl Display\""),
            vec![(
                Occurrence::Should,
                ClauseTerm::Phrase(vec!["impl".into(), "display".into()])
            )]
        );
        // Punctuation inside a bare clause splits it into a phrase
        assert_eq!(
            terms("handle_request"),
            vec![(
                Occurrence::Should,
                ClauseTerm::Phrase(vec!["handle".into(), "request".into()])
            )]
        );
    }

    #[test]
    fn test_punctuation_only_clauses_are_dropped() {
        assert_eq!(terms("{ foo }"), vec![(Occurrence::Should, ClauseTerm::Word("foo".into()))]);
    }

    #[test]
    fn test_invalid_queries() {
        for text in ["", "   ", "{ }", "\"unterminated", "+", "*-*"] {
            assert!(
                matches!(FreeTextQuery::parse(text), Err(SearchError::InvalidQuery(_))),
                "expected {:?} to be rejected",
                text
            );
        }
    }
}

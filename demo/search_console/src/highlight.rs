// Stem-aware highlighting of query terms inside retrieved passages
use std::collections::HashSet;

use colored::Colorize;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

const TOKEN_PATTERN: &str = r"\b\w+\b|[^\w\s]|\s+";

pub struct Highlighter {
    stemmer: Stemmer,
    tokens: Regex,
    word: Regex,
}

impl Highlighter {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            stemmer: Stemmer::create(Algorithm::English),
            tokens: Regex::new(TOKEN_PATTERN)?,
            word: Regex::new(r"^\w")?,
        })
    }

    /// Words, single punctuation marks and whitespace runs; concatenating them gives back `text`
    /// (modulo characters the pattern does not cover).
    pub fn tokenize<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.tokens.find_iter(text).map(|m| m.as_str()).collect()
    }

    fn stem(&self, word: &str) -> String {
        self.stemmer.stem(&word.to_lowercase()).into_owned()
    }

    /// Stems of every word in `text`; punctuation and spacing are dropped
    pub fn stem_words(&self, text: &str) -> HashSet<String> {
        self.tokenize(text)
            .into_iter()
            .filter(|t| self.word.is_match(t))
            .map(|t| self.stem(t))
            .collect()
    }

    /// Rebuild `text`, passing each word whose stem matches a query stem through `mark`.
    pub fn highlight_with<F>(&self, text: &str, query: &str, mark: F) -> String
    where
        F: Fn(&str) -> String,
    {
        let stems = self.stem_words(query);
        let mut out = String::with_capacity(text.len());
        for token in self.tokenize(text) {
            if self.word.is_match(token) && stems.contains(&self.stem(token)) {
                out.push_str(&mark(token));
            } else {
                out.push_str(token);
            }
        }
        out
    }

    /// Terminal rendition: matches in bold black on yellow
    pub fn highlight(&self, text: &str, query: &str) -> String {
        self.highlight_with(text, query, |w| w.black().on_yellow().bold().to_string())
    }
}

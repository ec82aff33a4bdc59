//!
//! Transcript aliases: mapping any known name of a transcript to its canonical label
//!
//! Aliases and canonical names live in one flat namespace. Every alias points
//! to exactly one canonical transcript, and every transcript of the project
//! maps at least to itself.
//!
//! ```rust
//! # use dredge::corpus::TranscriptCorpus;
//! let aliases = vec![("WBGene0001".to_string(), vec!["aap-1".to_string()])];
//! let transcripts = vec!["WBGene0001".to_string(), "WBGene0002".to_string()];
//! let corpus = TranscriptCorpus::build(&transcripts, &aliases);
//! assert_eq!(corpus.canonical("aap-1"), Some("WBGene0001"));
//! assert_eq!(corpus.canonical("WBGene0002"), Some("WBGene0002"));
//! ```
use std::collections::{HashMap, HashSet};
use indicatif::ProgressBar;
use log::debug;
use crate::utils::PROGRESS_CHUNK;

/// Parses an alias file: one row per canonical transcript,
/// `canonical[,|\t]alias1[,|\t]alias2...`. Blank lines and blank fields are skipped.
pub fn parse_alias_file(text: &str) -> Vec<(String, Vec<String>)> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let mut fields = line
            .split(|c: char| c == ',' || c == '\t')
            .map(|f| f.trim())
            .filter(|f| !f.is_empty());

        if let Some(canonical) = fields.next() {
            let aliases: Vec<String> = fields.map(|f| f.to_string()).collect();
            entries.push((canonical.to_string(), aliases));
        }
    }
    entries
}

/// Outcome of matching a user supplied list of names against the corpus
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    /// canonical names, input order, no duplicates
    pub found: Vec<String>,
    /// names the corpus does not know, input order, no duplicates
    pub not_found: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TranscriptCorpus {
    // (alias, canonical) in order of first registration; used for prefix search
    pairs: Vec<(String, String)>,
    // alias -> position in `pairs`
    index: HashMap<String, usize>,
}

impl TranscriptCorpus {
    /// Builds the corpus without progress reporting
    pub fn build(transcripts: &[String], aliases: &[(String, Vec<String>)]) -> Self {
        TranscriptCorpus::build_with_progress(transcripts, aliases, &ProgressBar::hidden())
    }

    /// Builds the corpus, advancing `bar` once per chunk of [`PROGRESS_CHUNK`] entries.
    ///
    /// First all declared aliases (and their canonical names) are registered,
    /// then every transcript not seen so far is added as its own canonical entry.
    /// If an alias is declared for two canonical transcripts, the later declaration wins.
    pub fn build_with_progress(
        transcripts: &[String],
        aliases: &[(String, Vec<String>)],
        bar: &ProgressBar,
    ) -> Self {
        let mut corpus = TranscriptCorpus::default();
        bar.set_length((aliases.len() + transcripts.len()) as u64);

        for chunk in aliases.chunks(PROGRESS_CHUNK) {
            for (canonical, alias_list) in chunk {
                corpus.register(canonical, canonical);
                for alias in alias_list {
                    corpus.register(alias, canonical);
                }
            }
            bar.inc(chunk.len() as u64);
        }
        corpus.flatten_chains();

        for chunk in transcripts.chunks(PROGRESS_CHUNK) {
            for t in chunk {
                if !corpus.index.contains_key(t) {
                    corpus.register(t, t);
                }
            }
            bar.inc(chunk.len() as u64);
        }
        bar.finish_and_clear();

        debug!(
            "transcript corpus: {} names for {} transcripts",
            corpus.pairs.len(),
            transcripts.len()
        );
        corpus
    }

    fn register(&mut self, alias: &str, canonical: &str) {
        match self.index.get(alias) {
            Some(&i) => self.pairs[i].1 = canonical.to_string(),
            None => {
                self.index.insert(alias.to_string(), self.pairs.len());
                self.pairs.push((alias.to_string(), canonical.to_string()));
            }
        }
    }

    /// Points every alias at the end of its chain: a canonical name that a
    /// later row declared as an alias of another canonical is not an end.
    fn flatten_chains(&mut self) {
        let resolved: Vec<String> = self.pairs.iter().map(|(_, c)| self.chain_end(c).to_string()).collect();
        for (pair, canonical) in self.pairs.iter_mut().zip(resolved) {
            pair.1 = canonical;
        }
    }

    fn chain_end<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        // bounded, a chain visits every pair at most once
        for _ in 0..self.pairs.len() {
            match self.index.get(current) {
                Some(&i) if self.pairs[i].1 != current => current = &self.pairs[i].1,
                _ => break,
            }
        }
        current
    }

    /// canonical label of any known name
    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.index.get(name).map(|&i| self.pairs[i].1.as_str())
    }

    /// canonical label, or the name itself if the corpus does not know it
    pub fn canonical_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.canonical(name).unwrap_or(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// number of registered names (aliases + canonical names)
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// all `(alias, canonical)` pairs in insertion order
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// every name that resolves to `canonical`, the canonical name included
    pub fn aliases_of(&self, canonical: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(_, c)| c == canonical)
            .map(|(a, _)| a.as_str())
            .collect()
    }

    /// First `limit` `(alias, canonical)` pairs whose alias starts with `prefix`
    /// (case sensitive), in insertion order. A linear scan over all names.
    pub fn search_by_prefix(&self, prefix: &str, limit: usize) -> Vec<(&str, &str)> {
        self.pairs
            .iter()
            .filter(|(alias, _)| alias.starts_with(prefix))
            .take(limit)
            .map(|(a, c)| (a.as_str(), c.as_str()))
            .collect()
    }

    /// Resolves user supplied names (e.g. an imported list of saved transcripts)
    pub fn resolve_imports<S: AsRef<str>>(&self, names: &[S]) -> ImportResult {
        self.resolve_imports_with_progress(names, &ProgressBar::hidden())
    }

    pub fn resolve_imports_with_progress<S: AsRef<str>>(&self, names: &[S], bar: &ProgressBar) -> ImportResult {
        let mut result = ImportResult::default();
        let mut seen_found: HashSet<&str> = HashSet::new();
        let mut seen_missing: HashSet<&str> = HashSet::new();
        bar.set_length(names.len() as u64);

        for chunk in names.chunks(PROGRESS_CHUNK) {
            for name in chunk {
                let name = name.as_ref().trim();
                if name.is_empty() {
                    continue;
                }
                match self.canonical(name) {
                    Some(c) => {
                        if seen_found.insert(c) {
                            result.found.push(c.to_string());
                        }
                    }
                    None => {
                        if seen_missing.insert(name) {
                            result.not_found.push(name.to_string());
                        }
                    }
                }
            }
            bar.inc(chunk.len() as u64);
        }
        bar.finish_and_clear();
        result
    }
}

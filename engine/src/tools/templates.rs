//! Clause library
//!
//! Loads reference clauses from `*.txt` files and ranks them against a query
//! with TF-IDF cosine similarity. Small enough to keep in memory; rebuilt on
//! each engine start.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Similarity search over a reference corpus
pub trait TemplateSource: Send + Sync {
    /// Up to `k` reference texts, best match first
    fn search(&self, query: &str, k: usize) -> Vec<String>;
}

/// Common English words that carry no signal for clause matching
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "it", "in", "on", "of", "to", "and", "or", "for", "with", "this",
    "that", "be", "are", "was", "were", "been", "have", "has", "had", "do", "does", "will",
    "would", "could", "should", "may", "might", "can", "not", "no", "but", "if", "at", "by",
    "from", "as", "into", "about", "so", "its", "you", "your", "i", "my", "we", "our", "they",
    "them", "their", "me", "please", "need", "want",
];

/// One clause file
#[derive(Debug, Clone)]
pub struct Clause {
    /// File name the clause was loaded from
    pub source: String,
    pub text: String,
}

/// TF-IDF ranked clause corpus
pub struct ClauseLibrary {
    clauses: Vec<Clause>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    embeddings: Vec<Vec<f32>>,
}

impl ClauseLibrary {
    /// Load every `*.txt` file in `dir`, sorted by file name.
    ///
    /// A missing directory yields an empty library.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            warn!("Clause directory not found: {}", dir.display());
            return Ok(Self::from_clauses(Vec::new()));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read clause directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("txt") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut clauses = Vec::with_capacity(paths.len());
        for path in paths {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read clause {}", path.display()))?;
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            clauses.push(Clause { source, text });
        }

        info!("Loaded {} clauses from {}", clauses.len(), dir.display());
        Ok(Self::from_clauses(clauses))
    }

    /// Build the index over an in-memory corpus
    pub fn from_clauses(clauses: Vec<Clause>) -> Self {
        let tokenized: Vec<Vec<String>> = clauses.iter().map(|c| tokenize(&c.text)).collect();

        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for tokens in &tokenized {
            let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            for term in unique {
                *doc_freq.entry(term.to_string()).or_insert(0) += 1;
                if !vocabulary.contains_key(term) {
                    let idx = vocabulary.len();
                    vocabulary.insert(term.to_string(), idx);
                }
            }
        }

        let n = clauses.len() as f32;
        let mut idf = vec![0.0f32; vocabulary.len()];
        for (term, &idx) in &vocabulary {
            let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
            idf[idx] = (n / df.max(1.0)).ln() + 1.0;
        }

        let mut library = Self {
            clauses,
            vocabulary,
            idf,
            embeddings: Vec::new(),
        };
        library.embeddings = tokenized.iter().map(|t| library.embed_tokens(t)).collect();
        library
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    fn embed_tokens(&self, tokens: &[String]) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.vocabulary.len()];
        for token in tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                vector[idx] += self.idf[idx];
            }
        }
        normalize(&mut vector);
        vector
    }
}

impl TemplateSource for ClauseLibrary {
    /// Ranks by cosine similarity; ties keep file-name order, so a query with
    /// no overlapping terms returns the first `k` clauses.
    fn search(&self, query: &str, k: usize) -> Vec<String> {
        if self.clauses.is_empty() || k == 0 {
            return Vec::new();
        }

        let query_vec = self.embed_tokens(&tokenize(query));
        let mut scored: Vec<(usize, f32)> = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (i, dot(&query_vec, e)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        debug!(
            "Clause search '{}' top score {:.3}",
            query,
            scored.first().map(|s| s.1).unwrap_or_default()
        );

        scored
            .into_iter()
            .take(k)
            .map(|(i, _)| self.clauses[i].text.clone())
            .collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Both vectors are unit length, so the dot product is the cosine
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

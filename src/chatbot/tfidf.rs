//! TF-IDF vectors for short questions

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-z0-9]+").expect("token pattern is valid")
});

/// Lowercase and strip diacritics (`Ângulo` → `angulo`)
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .nfkd()
        .filter(|c| c.is_ascii())
        .collect()
}

/// Alphanumeric words of the normalized text
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize_text(text);
    TOKEN_RE
        .find_iter(&normalized)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Unigrams followed by bigrams
fn features(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tokens.to_vec();
    out.extend(tokens.windows(2).map(|w| format!("{} {}", w[0], w[1])));
    out
}

/// Vocabulary and smoothed inverse document frequencies
#[derive(Debug, Clone, Default)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    /// Learn the vocabulary from a corpus.
    ///
    /// idf = ln((1 + n) / (1 + df)) + 1
    pub fn fit<S: AsRef<str>>(documents: &[S]) -> Self {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: Vec<usize> = Vec::new();

        for doc in documents {
            let mut seen: Vec<usize> = features(&tokenize(doc.as_ref()))
                .into_iter()
                .map(|term| {
                    let next = vocabulary.len();
                    *vocabulary.entry(term).or_insert(next)
                })
                .collect();
            seen.sort_unstable();
            seen.dedup();

            doc_freq.resize(vocabulary.len(), 0);
            for idx in seen {
                doc_freq[idx] += 1;
            }
        }

        let n = documents.len() as f32;
        let idf = doc_freq
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        Self { vocabulary, idf }
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// L2-normalised vector; terms outside the vocabulary are ignored
    pub fn transform(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.vocabulary.len()];
        for term in features(&tokenize(text)) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                vector[idx] += self.idf[idx];
            }
        }

        let mag: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag > 0.0 {
            for val in vector.iter_mut() {
                *val /= mag;
            }
        }
        vector
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

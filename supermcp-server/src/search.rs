//! BM25 search over the tool catalog
//!
//! The index is built from the catalog's published tool texts and keyed by
//! the catalog ETag: when the ETag moves, the next search rebuilds. Scores
//! are max-normalized into [0, 1].

use std::collections::HashMap;

use supermcp_registry::CatalogTool;

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// One scored hit
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub package_id: String,
    pub tool: CatalogTool,
    pub score: f64,
}

struct IndexedDoc {
    package_id: String,
    tool: CatalogTool,
    term_counts: HashMap<String, usize>,
    length: usize,
}

/// BM25 index over the catalog's tools
pub struct SearchIndex {
    etag: String,
    docs: Vec<IndexedDoc>,
    document_frequency: HashMap<String, usize>,
    average_length: f64,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

impl SearchIndex {
    /// Build an index over the given tools, stamped with the catalog ETag.
    pub fn build(etag: String, tools: Vec<(String, CatalogTool)>) -> Self {
        let mut docs = Vec::with_capacity(tools.len());
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for (package_id, tool) in tools {
            let text = format!(
                "{} {} {} {}",
                tool.name,
                tool.namespaced,
                tool.description.as_deref().unwrap_or(""),
                tool.summary
            );
            let tokens = tokenize(&text);
            let length = tokens.len();

            let mut term_counts: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *term_counts.entry(token).or_default() += 1;
            }
            for term in term_counts.keys() {
                *document_frequency.entry(term.clone()).or_default() += 1;
            }

            docs.push(IndexedDoc {
                package_id,
                tool,
                term_counts,
                length,
            });
        }

        let average_length = if docs.is_empty() {
            0.0
        } else {
            docs.iter().map(|d| d.length as f64).sum::<f64>() / docs.len() as f64
        };

        Self {
            etag,
            docs,
            document_frequency,
            average_length,
        }
    }

    /// Whether this index matches the current catalog state
    pub fn is_current(&self, etag: &str) -> bool {
        self.etag == etag
    }

    /// Score every document against the query; hits come back sorted,
    /// max-normalized into [0, 1], zero-score documents dropped.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let terms = tokenize(query);
        if terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let total_docs = self.docs.len() as f64;
        let mut hits: Vec<SearchHit> = self
            .docs
            .iter()
            .filter_map(|doc| {
                let mut score = 0.0;
                for term in &terms {
                    let Some(&term_count) = doc.term_counts.get(term) else {
                        continue;
                    };
                    let df = self.document_frequency.get(term).copied().unwrap_or(0) as f64;
                    let idf = ((total_docs - df + 0.5) / (df + 0.5) + 1.0).ln();
                    let tf = term_count as f64;
                    let denominator =
                        tf + K1 * (1.0 - B + B * doc.length as f64 / self.average_length.max(1.0));
                    score += idf * (tf * (K1 + 1.0)) / denominator;
                }
                (score > 0.0).then(|| SearchHit {
                    package_id: doc.package_id.clone(),
                    tool: doc.tool.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);

        if let Some(max) = hits.first().map(|h| h.score) {
            if max > 0.0 {
                for hit in &mut hits {
                    hit.score /= max;
                }
            }
        }
        hits
    }
}

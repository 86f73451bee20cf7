use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SalesFlowError};

/// One ranked passage returned by a knowledge lookup.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Snippet {
    pub source: String,
    pub text: String,
    pub score: f32,
}

/// The opaque knowledge-query capability policy agents consult.
///
/// Implementations must answer an unknown collection with an empty result.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn query(&self, collection: &str, question: &str, k: usize) -> Result<Vec<Snippet>>;
}

pub type DynKnowledgeBase = Arc<dyn KnowledgeBase>;

/// Renders snippets as the markdown context block handed back to callers.
/// Empty input renders as an empty string.
pub fn format_context(snippets: &[Snippet]) -> String {
    if snippets.is_empty() {
        return String::new();
    }
    let mut parts = vec!["# Relevant Knowledge Base Information\n".to_string()];
    for (index, snippet) in snippets.iter().enumerate() {
        parts.push(format!("## Source {}: {}", index + 1, snippet.source));
        parts.push(snippet.text.clone());
        parts.push(String::new());
    }
    parts.join("\n")
}

#[derive(Clone, Debug)]
struct Chunk {
    source: String,
    text: String,
    terms: HashSet<String>,
}

/// In-process knowledge base ranking paragraphs by term overlap.
#[derive(Default)]
pub struct MemoryKnowledgeBase {
    collections: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl MemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded with a short policy document for each policy agent.
    pub fn with_builtin_policies() -> Self {
        let base = Self::new();
        for (collection, source, text) in BUILTIN_POLICIES {
            base.add_document(collection, source, text);
        }
        base
    }

    /// Splits `text` on blank lines and indexes every paragraph.
    pub fn add_document(&self, collection: &str, source: &str, text: &str) -> usize {
        let chunks: Vec<Chunk> = text
            .split("\n\n")
            .map(str::trim)
            .filter(|paragraph| !paragraph.is_empty())
            .map(|paragraph| Chunk {
                source: source.to_string(),
                text: paragraph.to_string(),
                terms: terms(paragraph),
            })
            .collect();
        let added = chunks.len();
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .extend(chunks);
        debug!(collection, source, chunks = added, "knowledge_document_added");
        added
    }

    /// Loads `<dir>/<collection>/*.md|*.txt`; each subdirectory becomes one
    /// collection. Returns the number of documents read.
    pub fn load_dir(&self, dir: &Path) -> Result<usize> {
        let mut documents = 0;
        for entry in fs::read_dir(dir).map_err(|err| io_error(dir, err))? {
            let collection_dir = entry.map_err(|err| io_error(dir, err))?.path();
            if !collection_dir.is_dir() {
                continue;
            }
            let Some(collection) = collection_dir.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            for file in fs::read_dir(&collection_dir).map_err(|err| io_error(&collection_dir, err))? {
                let path = file.map_err(|err| io_error(&collection_dir, err))?.path();
                let supported = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "md" || ext == "txt");
                if !supported {
                    continue;
                }
                let text = fs::read_to_string(&path).map_err(|err| io_error(&path, err))?;
                let source = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("unknown");
                self.add_document(collection, source, &text);
                documents += 1;
            }
        }
        info!(dir = %dir.display(), documents, "knowledge_loaded");
        Ok(documents)
    }

    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl KnowledgeBase for MemoryKnowledgeBase {
    async fn query(&self, collection: &str, question: &str, k: usize) -> Result<Vec<Snippet>> {
        let wanted = terms(question);
        let collections = self.collections.read();
        let Some(chunks) = collections.get(collection) else {
            debug!(collection, "knowledge_collection_unknown");
            return Ok(Vec::new());
        };
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked: Vec<(usize, Snippet)> = chunks
            .iter()
            .enumerate()
            .filter_map(|(position, chunk)| {
                let hits = chunk.terms.intersection(&wanted).count();
                (hits > 0).then(|| {
                    (
                        position,
                        Snippet {
                            source: chunk.source.clone(),
                            text: chunk.text.clone(),
                            score: hits as f32 / wanted.len() as f32,
                        },
                    )
                })
            })
            .collect();
        ranked.sort_by(|(pos_a, a), (pos_b, b)| {
            b.score.total_cmp(&a.score).then_with(|| pos_a.cmp(pos_b))
        });
        Ok(ranked.into_iter().take(k).map(|(_, snippet)| snippet).collect())
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "what", "how", "does", "your", "you", "with", "can", "our", "about",
    "is", "a", "an", "of", "to", "in", "do", "i", "we", "my", "me", "on", "or",
];

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| !STOPWORDS.contains(&word.as_str()))
        .collect()
}

fn io_error(path: &Path, err: std::io::Error) -> SalesFlowError {
    SalesFlowError::Config(format!("{}: {err}", path.display()))
}

const BUILTIN_POLICIES: [(&str, &str, &str); 4] = [
    (
        "product_policy_agent",
        "product_catalog.md",
        "Business Internet plans: Internet 100 (100 Mbps) at $79.99/mo for small teams of 5-20, \
Internet 500 (500 Mbps) at $149.99/mo for medium teams of 20-50, Internet 1 Gig at $249.99/mo \
for large offices.\n\n\
Business Voice: Voice Basic at $29.99/mo per line, Voice Pro at $49.99/mo per line with \
auto-attendant and call analytics.\n\n\
Managed services: Managed WiFi at $99.99/mo and Managed Security at $149.99/mo.\n\n\
Pricing discounts: a 10% bundle discount applies to two or more products; a 5% contract \
discount applies to terms of 24 months or longer. Installation is $99 for Internet products.",
    ),
    (
        "order_policy_agent",
        "order_policy.md",
        "Order requirements: every order needs a qualified prospect id, at least one product and \
a validated service address.\n\n\
Order cancellation: orders may be cancelled without fee before installation is scheduled; \
later cancellations carry a $150 fee.\n\n\
Order modification: products can be added or removed until the installation date is confirmed.",
    ),
    (
        "service_policy_agent",
        "service_policy.md",
        "Service level agreement: 99.9% uptime for standard plans and 99.99% uptime for Internet \
1 Gig, with credits for missed availability.\n\n\
Support: 24/7 technical support with a four hour response time for outages.\n\n\
Serviceability: fiber network coverage is confirmed by zip code before an order is accepted.",
    ),
    (
        "fulfillment_policy_agent",
        "fulfillment_policy.md",
        "Installation scheduling: installation is scheduled 7-14 business days after the order is \
submitted, in four hour windows.\n\n\
Equipment: Internet orders include an ONT and a business router; voice orders include VoIP \
phones; WiFi orders include managed access points.\n\n\
Equipment returns: equipment must be returned within 30 days of cancellation.",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ranks_by_term_overlap() {
        let base = MemoryKnowledgeBase::new();
        base.add_document(
            "docs",
            "a.md",
            "Internet pricing starts at 79.99.\n\nVoice lines are sold separately.",
        );
        let hits = base.query("docs", "internet pricing", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "a.md");
        assert!(hits[0].text.starts_with("Internet pricing"));
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let base = MemoryKnowledgeBase::with_builtin_policies();
        assert!(base.query("nope", "pricing", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn builtin_product_policy_mentions_prices() {
        let base = MemoryKnowledgeBase::with_builtin_policies();
        let hits = base
            .query("product_policy_agent", "internet plans price", 3)
            .await
            .unwrap();
        let context = format_context(&hits);
        assert!(context.starts_with("# Relevant Knowledge Base Information"));
        assert!(context.contains("$79.99"));
    }

    #[test]
    fn load_dir_reads_collections() {
        let dir = tempfile::tempdir().unwrap();
        let collection = dir.path().join("service_policy_agent");
        fs::create_dir(&collection).unwrap();
        fs::write(collection.join("sla.md"), "Uptime is 99.9%.").unwrap();
        fs::write(collection.join("ignored.bin"), "binary").unwrap();

        let base = MemoryKnowledgeBase::new();
        assert_eq!(base.load_dir(dir.path()).unwrap(), 1);
        assert_eq!(base.collections(), vec!["service_policy_agent".to_string()]);
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Facts pulled out of one user message. `None`/`false` means "not seen in
/// this message", never "known to be absent".
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entities {
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub employee_count: Option<u32>,
    pub has_address: bool,
    pub has_service_interest: bool,
}

/// Opaque entity extraction capability; the algorithm behind it is not a
/// contract.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, message: &str) -> Result<Entities>;
}

/// Placeholder heuristics: a company is "from <words> LLC|Inc|Corp", a
/// contact is the word after "I'm", a head count is the first number in a
/// message mentioning employees.
#[derive(Clone, Debug, Default)]
pub struct KeywordEntityExtractor;

const COMPANY_SUFFIXES: [&str; 4] = ["llc", "inc", "corp", "corporation"];
const ADDRESS_WORDS: [&str; 6] = ["street", "st", "avenue", "ave", "road", "rd"];
const SERVICE_WORDS: [&str; 6] = ["internet", "voice", "wifi", "security", "backup", "service"];

fn normalized(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

impl KeywordEntityExtractor {
    fn company_name(words: &[&str]) -> Option<String> {
        let from = words.iter().position(|word| normalized(word) == "from")?;
        let candidates = &words[from + 1..words.len().min(from + 5)];
        let end = candidates
            .iter()
            .position(|word| COMPANY_SUFFIXES.contains(&normalized(word).as_str()))?;
        let name = candidates[..=end].join(" ");
        Some(name.trim_end_matches(|c: char| c == ',' || c == '.' || c == '!').to_string())
    }

    fn contact_name(message_lower: &str, words: &[&str]) -> Option<String> {
        if let Some(pos) = words
            .iter()
            .position(|word| matches!(normalized(word).as_str(), "i'm" | "im"))
        {
            return words.get(pos + 1).map(|name| name.trim_matches(',').to_string());
        }
        if message_lower.contains("my name is") {
            let pos = words
                .windows(3)
                .position(|w| normalized(w[0]) == "my" && normalized(w[1]) == "name" && normalized(w[2]) == "is")?;
            return words.get(pos + 3).map(|name| name.trim_matches(',').to_string());
        }
        None
    }
}

#[async_trait]
impl EntityExtractor for KeywordEntityExtractor {
    async fn extract(&self, message: &str) -> Result<Entities> {
        let lower = message.to_lowercase();
        let words: Vec<&str> = message.split_whitespace().collect();
        let tokens: Vec<String> = words.iter().map(|word| normalized(word)).collect();

        let employee_count = if lower.contains("employee") {
            tokens.iter().find_map(|token| token.parse::<u32>().ok())
        } else {
            None
        };

        Ok(Entities {
            company_name: Self::company_name(&words),
            contact_name: Self::contact_name(&lower, &words),
            employee_count,
            has_address: tokens.iter().any(|token| ADDRESS_WORDS.contains(&token.as_str())),
            has_service_interest: tokens
                .iter()
                .any(|token| SERVICE_WORDS.iter().any(|word| token.starts_with(word))),
        })
    }
}

//! Query and index tokenization / 查询与索引分词
//!
//! - Queries: comma-separated terms, trimmed, lowercased / 查询：逗号分隔
//! - Index: lowercase words from payload text leaves / 索引：负载文本的小写词

use serde_json::{Map, Value};

/// Split a search query into lowercase terms / 对搜索查询进行分词
///
/// Example: `"Alice, 5 ,, "` -> `["alice", "5"]`
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lowercase words of a text, punctuation trimmed / 文本分词
pub fn index_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Deduplicated tokens of every string and number in a payload / 负载分词
///
/// Order follows first appearance.
pub fn payload_tokens(payload: &Map<String, Value>) -> Vec<String> {
    let mut tokens = Vec::new();
    for value in payload.values() {
        collect_tokens(value, &mut tokens);
    }
    tokens
}

fn collect_tokens(value: &Value, tokens: &mut Vec<String>) {
    match value {
        Value::String(text) => push_unique(tokens, index_tokens(text)),
        Value::Number(number) => push_unique(tokens, vec![number.to_string()]),
        Value::Array(items) => items.iter().for_each(|item| collect_tokens(item, tokens)),
        Value::Object(fields) => fields.values().for_each(|field| collect_tokens(field, tokens)),
        Value::Bool(_) | Value::Null => {}
    }
}

fn push_unique(tokens: &mut Vec<String>, new: Vec<String>) {
    for token in new {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tokenize_query() {
        assert_eq!(tokenize_query("Alice, 5"), vec!["alice", "5"]);
        assert_eq!(tokenize_query(" ,  , "), Vec::<String>::new());
        assert_eq!(tokenize_query("María José"), vec!["maría josé"]);
    }

    #[test]
    fn test_index_tokens() {
        assert_eq!(index_tokens("Alice  Smith, (5)"), vec!["alice", "smith", "5"]);
        assert!(index_tokens(" -- ").is_empty());
    }

    #[test]
    fn test_payload_tokens() {
        let payload = json!({
            "name": "Alice Smith",
            "age": 5,
            "image": { "#text": "photo.jpg" },
            "tags": ["smith", "New"],
            "consent": true
        });
        let tokens = payload_tokens(payload.as_object().unwrap());
        assert_eq!(tokens, vec!["alice", "smith", "5", "photo.jpg", "new"]);
    }
}

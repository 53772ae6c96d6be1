//! Naming: type name -> singular/plural/snake/kebab identifiers, and key case conversion
//! between API bodies (camelCase) and database columns (snake_case).

use serde::Serialize;
use serde_json::{Map, Value};

/// Convert a single identifier from snake_case to camelCase.
/// e.g. "user_id" -> "userId", "created_at" -> "createdAt"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.chars() {
        if c == '_' || c == '-' {
            capitalize_next = !out.is_empty();
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Split an identifier into lowercase words. Acronyms stay together:
/// "HTTPRequest" -> ["http", "request"], "createdById" -> ["created", "by", "id"].
fn words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Convert an identifier (PascalCase, camelCase or already snake) to snake_case.
/// e.g. "userId" -> "user_id", "TwoWords" -> "two_words", "HTTPRequest" -> "http_request"
pub fn to_snake_case(s: &str) -> String {
    words(s).join("_")
}

/// Same as [`to_snake_case`] with dashes: "TwoWords" -> "two-words".
pub fn to_kebab_case(s: &str) -> String {
    words(s).join("-")
}

const UNCOUNTABLE: &[&str] = &[
    "equipment", "information", "rice", "money", "species", "series", "fish", "sheep", "deer",
    "news", "data", "metadata", "feedback", "software", "media",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("ox", "oxen"),
    ("leaf", "leaves"),
    ("knife", "knives"),
    ("life", "lives"),
    ("wife", "wives"),
    ("half", "halves"),
    ("wolf", "wolves"),
    ("shelf", "shelves"),
    ("hero", "heroes"),
    ("potato", "potatoes"),
    ("tomato", "tomatoes"),
    ("index", "indices"),
    ("matrix", "matrices"),
    ("criterion", "criteria"),
    ("analysis", "analyses"),
    ("status", "statuses"),
];

fn pluralize_word(word: &str) -> String {
    let lower = word.to_lowercase();
    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == lower) {
        return match_case(word, plural);
    }
    let ends_with_any = |suffixes: &[&str]| suffixes.iter().any(|s| lower.ends_with(s));
    if ends_with_any(&["ss", "us", "x", "z", "ch", "sh"]) {
        return format!("{}es", word);
    }
    // A trailing single "s" is read as already plural.
    if lower.ends_with('s') {
        return word.to_string();
    }
    if lower.ends_with('y') {
        let before = lower.chars().rev().nth(1);
        if before.map(|c| !"aeiou".contains(c)).unwrap_or(false) {
            return format!("{}ies", &word[..word.len() - 1]);
        }
    }
    format!("{}s", word)
}

/// Apply the capitalisation of `original`'s first letter to `replacement`.
fn match_case(original: &str, replacement: &str) -> String {
    let starts_upper = original.chars().next().map(char::is_uppercase).unwrap_or(false);
    if !starts_upper {
        return replacement.to_string();
    }
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// English plural of an identifier; only the last word is inflected.
/// e.g. "category" -> "categories", "HistoryEntry" -> "HistoryEntries", "child" -> "children"
pub fn pluralize(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let split = (1..chars.len())
        .rev()
        .find(|&i| chars[i].is_uppercase() && chars[i - 1].is_lowercase())
        .unwrap_or(0);
    let head: String = chars[..split].iter().collect();
    let tail: String = chars[split..].iter().collect();
    format!("{}{}", head, pluralize_word(&tail))
}

/// Every identifier derived from a model's type name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNames {
    pub singular: String,
    pub plural: String,
    pub snake_singular: String,
    pub snake_plural: String,
    pub kebab_singular: String,
    pub kebab_plural: String,
}

impl ResourceNames {
    pub fn from_type_name(name: &str) -> Self {
        let plural = pluralize(name);
        ResourceNames {
            singular: name.to_string(),
            snake_singular: to_snake_case(name),
            kebab_singular: to_kebab_case(name),
            snake_plural: to_snake_case(&plural),
            kebab_plural: to_kebab_case(&plural),
            plural,
        }
    }
}

/// Lowercase with `_` and `-` removed: `unit_price`, `unitPrice` and `Unit-Price`
/// all fold to `unitprice`.
pub fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Rename the keys of `obj` to the matching key of `known` (compared folded).
/// Keys with no match become camelCase.
pub fn object_keys_to_model_keys(obj: &mut Map<String, Value>, known: &Map<String, Value>) {
    let keys: Vec<String> = obj.keys().cloned().collect();
    for k in keys {
        let folded = fold_key(&k);
        let target = known
            .keys()
            .find(|candidate| fold_key(candidate) == folded)
            .cloned()
            .unwrap_or_else(|| to_camel_case(&k));
        if target != k {
            if let Some(v) = obj.remove(&k) {
                obj.insert(target, v);
            }
        }
    }
}

// crates/core/src/catalog.rs
//! Parsed pricing catalog and model-name resolution.
//!
//! The upstream catalog keys models as `provider/name`
//! (e.g. `xai/grok-code-fast-1`) while clients report short names
//! (e.g. `grok-code`). Resolution walks:
//!   1. exact key
//!   2. version normalization (claude-3-5-sonnet ↔ claude-3.5-sonnet)
//!   3. preferred provider prefixes over the original + normalized forms
//!   4. fuzzy all-words match, ranked so original providers beat resellers

use std::collections::HashMap;

use regex_lite::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Original providers preferred over resellers.
pub const PREFERRED_PROVIDERS: [&str; 5] =
    ["xai/", "anthropic/", "openai/", "google/", "mistral/"];
pub const RESELLER_PROVIDERS: [&str; 3] = ["azure_ai/", "bedrock/", "vertex_ai/"];

/// One catalog entry, costs in USD per individual token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub input_cost_per_token: Decimal,
    pub output_cost_per_token: Decimal,
    pub cache_read_input_token_cost: Option<Decimal>,
}

/// The full pricing catalog, keyed by provider-prefixed model name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse the upstream JSON document. Entries are any objects; missing
    /// cost fields read as zero and unknown fields are ignored. Rates are
    /// lifted into `Decimal` at parse time.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut entries = HashMap::new();
        if let Some(map) = value.as_object() {
            for (name, raw) in map {
                let Some(obj) = raw.as_object() else { continue };
                let cost = |field: &str| -> Option<Decimal> {
                    obj.get(field)
                        .and_then(serde_json::Value::as_f64)
                        .and_then(Decimal::from_f64)
                };
                entries.insert(
                    name.clone(),
                    CatalogEntry {
                        input_cost_per_token: cost("input_cost_per_token")
                            .unwrap_or(Decimal::ZERO),
                        output_cost_per_token: cost("output_cost_per_token")
                            .unwrap_or(Decimal::ZERO),
                        cache_read_input_token_cost: cost("cache_read_input_token_cost"),
                    },
                );
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert(&mut self, name: &str, entry: CatalogEntry) {
        self.entries.insert(name.to_string(), entry);
    }

    /// Multi-step model resolution. Returns the matched catalog key and its
    /// entry, or `None` when nothing matches.
    pub fn resolve(&self, model: &str) -> Option<(&str, &CatalogEntry)> {
        let mut candidates: Vec<String> = vec![model.to_string()];

        let normalized = normalize_version(model);
        if normalized != model {
            candidates.push(normalized.clone());
        }
        let denormalized = denormalize_version(model);
        if denormalized != model {
            candidates.push(denormalized);
        }

        for prefix in PREFERRED_PROVIDERS {
            candidates.push(format!("{prefix}{model}"));
            if normalized != model {
                candidates.push(format!("{prefix}{normalized}"));
            }
        }

        for candidate in &candidates {
            if let Some((key, entry)) = self.entries.get_key_value(candidate.as_str()) {
                return Some((key.as_str(), entry));
            }
        }

        // Last resort: every query word must appear somewhere in the key.
        let mut matches = fuzzy_match(model, self.entries.keys());
        matches.sort_by_key(|name| (provider_priority(name), name.to_string()));
        matches
            .first()
            .and_then(|name| self.entries.get_key_value(name.as_str()))
            .map(|(key, entry)| (key.as_str(), entry))
    }
}

/// claude-3-5-sonnet → claude-3.5-sonnet
fn normalize_version(model: &str) -> String {
    let re = Regex::new(r"(\d)-(\d)").expect("valid regex");
    re.replace_all(model, "$1.$2").into_owned()
}

/// claude-3.5-sonnet → claude-3-5-sonnet
fn denormalize_version(model: &str) -> String {
    let re = Regex::new(r"(\d)\.(\d)").expect("valid regex");
    re.replace_all(model, "$1-$2").into_owned()
}

/// Lower is better: preferred providers first, unknown in the middle,
/// resellers last.
fn provider_priority(name: &str) -> usize {
    for (i, prefix) in PREFERRED_PROVIDERS.iter().enumerate() {
        if name.starts_with(prefix) {
            return i;
        }
    }
    for (i, prefix) in RESELLER_PROVIDERS.iter().enumerate() {
        if name.starts_with(prefix) {
            return 100 + i;
        }
    }
    50
}

fn fuzzy_match<'a>(query: &str, candidates: impl Iterator<Item = &'a String>) -> Vec<&'a String> {
    let lowered = query.to_lowercase().replace(['-', '.'], " ");
    let words: Vec<&str> = lowered.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    candidates
        .filter(|candidate| {
            let lower = candidate.to_lowercase();
            words.iter().all(|word| lower.contains(word))
        })
        .collect()
}

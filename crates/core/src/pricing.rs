// crates/core/src/pricing.rs
//! Decimal cost arithmetic over per-million token rates.
//!
//! Rates are USD per million tokens. All arithmetic stays in `Decimal`
//! from catalog parse to the rounded total; cost never touches an f64.
//! Cache pricing defaults when a catalog entry omits it:
//!   - cache read  = 10% of the input rate
//!   - cache write = 125% of the input rate
//! Reasoning tokens are priced at the output rate.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::catalog::{Catalog, CatalogEntry};
use crate::error::CoreError;

const MILLION: Decimal = dec!(1_000_000);

/// Per-model pricing in USD per million tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPricing {
    pub input_per_million: Decimal,
    pub output_per_million: Decimal,
    pub cache_read_per_million: Decimal,
    pub cache_write_per_million: Decimal,
}

impl ModelPricing {
    /// Build pricing from base rates, applying the cache defaults for
    /// whichever explicit cache rates are absent.
    pub fn new(
        input_per_million: Decimal,
        output_per_million: Decimal,
        cache_read_per_million: Option<Decimal>,
        cache_write_per_million: Option<Decimal>,
    ) -> Self {
        Self {
            input_per_million,
            output_per_million,
            cache_read_per_million: cache_read_per_million
                .unwrap_or(input_per_million * dec!(0.1)),
            cache_write_per_million: cache_write_per_million
                .unwrap_or(input_per_million * dec!(1.25)),
        }
    }

    /// Zero-price default for models nothing knows about. Tokens still
    /// count; money never gets invented.
    pub fn zero() -> Self {
        Self {
            input_per_million: Decimal::ZERO,
            output_per_million: Decimal::ZERO,
            cache_read_per_million: Decimal::ZERO,
            cache_write_per_million: Decimal::ZERO,
        }
    }

    /// Resolve pricing for a model: catalog first (multi-step resolution),
    /// then the built-in table, then zero.
    pub fn for_model(model: &str, catalog: &Catalog) -> Self {
        if let Some((_, entry)) = catalog.resolve(model) {
            return Self::from_entry(entry);
        }
        builtin_pricing()
            .get(model)
            .cloned()
            .unwrap_or_else(Self::zero)
    }

    /// Lift a catalog entry (USD per token) into per-million rates.
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        Self::new(
            entry.input_cost_per_token * MILLION,
            entry.output_cost_per_token * MILLION,
            entry.cache_read_input_token_cost.map(|c| c * MILLION),
            None,
        )
    }
}

/// Token counters for one (date, model) bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCounts {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub reasoning_tokens: i64,
}

impl TokenCounts {
    pub fn total(&self) -> i64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_read_tokens
            + self.cache_write_tokens
            + self.reasoning_tokens
    }

    pub fn add(&mut self, other: &TokenCounts) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
        self.reasoning_tokens += other.reasoning_tokens;
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        for (field, value) in [
            ("input_tokens", self.input_tokens),
            ("output_tokens", self.output_tokens),
            ("cache_read_tokens", self.cache_read_tokens),
            ("cache_write_tokens", self.cache_write_tokens),
            ("reasoning_tokens", self.reasoning_tokens),
        ] {
            if value < 0 {
                return Err(CoreError::NegativeTokens { field, value });
            }
        }
        Ok(())
    }
}

/// Total cost in USD for a token bucket, rounded half-even to 4 fractional
/// digits. Each term is count / 1M × per-million rate, so intermediate
/// precision is whatever `Decimal` carries (28 significant digits).
pub fn calculate_cost(counts: &TokenCounts, pricing: &ModelPricing) -> Result<Decimal, CoreError> {
    counts.validate()?;

    let per = |count: i64, rate: Decimal| Decimal::from(count) / MILLION * rate;

    let total = per(counts.input_tokens, pricing.input_per_million)
        + per(counts.output_tokens, pricing.output_per_million)
        + per(counts.cache_read_tokens, pricing.cache_read_per_million)
        + per(counts.cache_write_tokens, pricing.cache_write_per_million)
        + per(counts.reasoning_tokens, pricing.output_per_million);

    Ok(total.round_dp_with_strategy(4, RoundingStrategy::MidpointNearestEven))
}

/// Percentage of input-side tokens served from cache, 2 fractional digits.
/// 0.00 when there were no input-side tokens at all.
pub fn cache_efficiency(cache_read_tokens: i64, input_tokens: i64) -> Decimal {
    let denominator = cache_read_tokens + input_tokens;
    if denominator == 0 {
        return dec!(0.00);
    }
    (Decimal::from(cache_read_tokens) / Decimal::from(denominator) * dec!(100))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Built-in per-million pricing for common models, used only when the
/// catalog is unreachable and has no match. Last reviewed 2026-01-06.
pub fn builtin_pricing() -> HashMap<String, ModelPricing> {
    let mut m = HashMap::new();
    let mut insert = |model: &str, input: Decimal, output: Decimal| {
        m.insert(model.to_string(), ModelPricing::new(input, output, None, None));
    };

    // Claude 3.5
    insert("claude-3-5-sonnet-20241022", dec!(3.00), dec!(15.00));
    insert("claude-3-5-sonnet-20240620", dec!(3.00), dec!(15.00));
    insert("claude-3-5-haiku-20241022", dec!(1.00), dec!(5.00));
    // Claude 3
    insert("claude-3-opus-20240229", dec!(15.00), dec!(75.00));
    insert("claude-3-sonnet-20240229", dec!(3.00), dec!(15.00));
    insert("claude-3-haiku-20240307", dec!(0.25), dec!(1.25));
    // GPT-4
    insert("gpt-4o", dec!(2.50), dec!(10.00));
    insert("gpt-4o-mini", dec!(0.15), dec!(0.60));
    insert("gpt-4-turbo", dec!(10.00), dec!(30.00));
    insert("gpt-4", dec!(30.00), dec!(60.00));
    // GPT-3.5
    insert("gpt-3.5-turbo", dec!(0.50), dec!(1.50));
    // Gemini
    insert("gemini-2.0-flash-exp", dec!(0.00), dec!(0.00));
    insert("gemini-1.5-pro", dec!(1.25), dec!(5.00));
    insert("gemini-1.5-flash", dec!(0.075), dec!(0.30));

    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sonnet() -> ModelPricing {
        builtin_pricing()
            .get("claude-3-5-sonnet-20241022")
            .cloned()
            .unwrap()
    }

    #[test]
    fn cache_defaults_derive_from_input_rate() {
        let p = ModelPricing::new(dec!(3.00), dec!(15.00), None, None);
        assert_eq!(p.cache_read_per_million, dec!(0.300));
        assert_eq!(p.cache_write_per_million, dec!(3.7500));
    }

    #[test]
    fn explicit_cache_pricing_wins_over_defaults() {
        let p = ModelPricing::new(dec!(3.00), dec!(15.00), Some(dec!(0.50)), None);
        assert_eq!(p.cache_read_per_million, dec!(0.50));
        assert_eq!(p.cache_write_per_million, dec!(3.7500));
    }

    #[test]
    fn zero_tokens_cost_nothing_for_every_model() {
        let counts = TokenCounts::default();
        for pricing in builtin_pricing().values() {
            assert_eq!(calculate_cost(&counts, pricing).unwrap(), dec!(0.0000));
        }
    }

    #[test]
    fn sonnet_cost_small_batch() {
        // 1000 in at $3/M + 500 out at $15/M = 0.003 + 0.0075 = 0.0105
        let counts = TokenCounts {
            input_tokens: 1000,
            output_tokens: 500,
            ..Default::default()
        };
        assert_eq!(calculate_cost(&counts, &sonnet()).unwrap(), dec!(0.0105));
    }

    #[test]
    fn reasoning_priced_at_output_rate() {
        let only_reasoning = TokenCounts {
            reasoning_tokens: 1_000_000,
            ..Default::default()
        };
        let only_output = TokenCounts {
            output_tokens: 1_000_000,
            ..Default::default()
        };
        let p = sonnet();
        assert_eq!(
            calculate_cost(&only_reasoning, &p).unwrap(),
            calculate_cost(&only_output, &p).unwrap(),
        );
    }

    #[test]
    fn grok_code_fast_scenario() {
        // Catalog rates: input 2e-7, output 1.5e-6, cache read 2e-8 per token.
        let p = ModelPricing::new(dec!(0.20), dec!(1.50), Some(dec!(0.02)), None);
        let counts = TokenCounts {
            input_tokens: 338_210,
            output_tokens: 4_434,
            cache_read_tokens: 303_680,
            ..Default::default()
        };
        let cost = calculate_cost(&counts, &p).unwrap();
        // 0.0676420 + 0.0066510 + 0.0060736 = 0.0803666 → 0.0804
        assert_eq!(cost, dec!(0.0804));
        assert!(cost < dec!(0.10));
    }

    #[test]
    fn negative_counts_rejected() {
        let counts = TokenCounts {
            input_tokens: -1,
            ..Default::default()
        };
        assert!(matches!(
            calculate_cost(&counts, &sonnet()),
            Err(CoreError::NegativeTokens {
                field: "input_tokens",
                value: -1
            })
        ));
    }

    #[test]
    fn rounding_is_half_even() {
        // 150 tokens at $1/M = 0.00015, a tie at 4dp; even neighbor is 0.0002
        let p = ModelPricing::new(dec!(1.00), dec!(0.00), Some(dec!(0.00)), Some(dec!(0.00)));
        let counts = TokenCounts {
            input_tokens: 150,
            ..Default::default()
        };
        assert_eq!(calculate_cost(&counts, &p).unwrap(), dec!(0.0002));
        // 250 tokens = 0.00025, also a tie; even neighbor is again 0.0002
        let counts = TokenCounts {
            input_tokens: 250,
            ..Default::default()
        };
        assert_eq!(calculate_cost(&counts, &p).unwrap(), dec!(0.0002));
    }

    #[test]
    fn cache_efficiency_boundaries() {
        assert_eq!(cache_efficiency(0, 0), dec!(0.00));
        assert_eq!(cache_efficiency(0, 1000), dec!(0.00));
        assert_eq!(cache_efficiency(500, 0), dec!(100.00));
        assert_eq!(cache_efficiency(50_000, 50_000), dec!(50.00));
    }

    #[test]
    fn unknown_model_prices_at_zero() {
        let catalog = Catalog::empty();
        let p = ModelPricing::for_model("unheard-of-model", &catalog);
        assert_eq!(p, ModelPricing::zero());
    }
}

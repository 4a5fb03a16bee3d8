// src/services/price_normalizer.rs
//! Reconciles the many shapes a model uses for prices into one bounded form.

use serde_json::{Map, Value};

use crate::models::{PriceEstimate, PriceRange, TieredPrice};

const LIST_KEYS: &[&str] = &["prices", "values", "list", "options", "candidates", "suggestions"];
const PRIMARY_KEYS: &[&str] = &["best", "primary", "main", "price", "value", "estimate"];
const TIER_KEYS: &[&str] = &[
    "low", "mid", "high", "median", "average", "avg", "mean", "min", "max",
];

const LOW_KEYS: &[&str] = &["low", "lowest", "quick_sale"];
const MID_KEYS: &[&str] = &[
    "mid", "median", "average", "avg", "mean", "typical", "best", "primary", "main", "price",
    "value", "estimate",
];
const HIGH_KEYS: &[&str] = &["high", "highest", "top"];
const RANGE_MIN_KEYS: &[&str] = &["min", "low"];
const RANGE_MAX_KEYS: &[&str] = &["max", "high"];

/// Inclusive bounds every emitted price must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBounds {
    pub min: i64,
    pub max: i64,
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            min: 300,
            max: 9_999_999,
        }
    }
}

impl PriceBounds {
    pub fn new(min: i64, max: i64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn contains(&self, price: i64) -> bool {
        (self.min..=self.max).contains(&price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricePolicy {
    /// Up to three prices, most likely first.
    OrderedList,
    /// low/mid/high plus a range.
    Tiered,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceNormalizer {
    bounds: PriceBounds,
}

impl PriceNormalizer {
    pub fn new(bounds: PriceBounds) -> Self {
        Self { bounds }
    }

    /// `None` when the payload holds no usable price.
    pub fn normalize(&self, policy: PricePolicy, raw: &Value) -> Option<PriceEstimate> {
        match policy {
            PricePolicy::OrderedList => {
                let list = self.ordered_list(raw);
                (!list.is_empty()).then_some(PriceEstimate::List(list))
            }
            PricePolicy::Tiered => self.tiered(raw).map(PriceEstimate::Tiered),
        }
    }

    /// Integer price within bounds, or `None`. Values are truncated, never
    /// clamped.
    pub fn coerce(&self, value: &Value) -> Option<i64> {
        let number = match value {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => {
                let cleaned: String = s
                    .trim()
                    .chars()
                    .filter(|c| !matches!(c, ',' | '¥' | '￥' | '円' | ' '))
                    .collect();
                cleaned.parse::<f64>().ok()?
            }
            _ => return None,
        };
        if !number.is_finite() {
            return None;
        }
        let price = number.trunc();
        if price < i64::MIN as f64 || price > i64::MAX as f64 {
            return None;
        }
        let price = price as i64;
        self.bounds.contains(price).then_some(price)
    }

    /// Ordered-list policy: empty, or exactly three entries.
    pub fn ordered_list(&self, raw: &Value) -> Vec<i64> {
        let mut numbers = Vec::new();
        match raw {
            Value::Object(map) => {
                for key in LIST_KEYS {
                    if let Some(Value::Array(items)) = map.get(*key) {
                        numbers.extend(items.iter().filter_map(|v| self.coerce(v)));
                    }
                }
                for key in PRIMARY_KEYS.iter().chain(TIER_KEYS) {
                    if let Some(price) = map.get(*key).and_then(|v| self.coerce(v)) {
                        numbers.push(price);
                    }
                }
            }
            Value::Array(items) => numbers.extend(items.iter().filter_map(|v| self.coerce(v))),
            other => numbers.extend(self.coerce(other)),
        }

        let mut ordered: Vec<i64> = Vec::with_capacity(3);
        for price in numbers {
            if !ordered.contains(&price) {
                ordered.push(price);
            }
        }
        if let Some(&last) = ordered.last() {
            while ordered.len() < 3 {
                ordered.push(last);
            }
        }
        ordered.truncate(3);
        ordered
    }

    /// Tiered policy: low <= mid <= high and range.min <= range.max.
    pub fn tiered(&self, raw: &Value) -> Option<TieredPrice> {
        let mut pool = Vec::new();
        let mut named = (None, None, None);
        let mut explicit_range = (None, None);

        match raw {
            Value::Object(map) => {
                for key in LIST_KEYS {
                    if let Some(Value::Array(items)) = map.get(*key) {
                        pool.extend(items.iter().filter_map(|v| self.coerce(v)));
                    }
                }
                named = (
                    self.first_of(map, LOW_KEYS),
                    self.first_of(map, MID_KEYS),
                    self.first_of(map, HIGH_KEYS),
                );
                explicit_range = self.range_of(map);
                pool.extend([named.0, named.1, named.2].into_iter().flatten());
                pool.extend([explicit_range.0, explicit_range.1].into_iter().flatten());
            }
            Value::Array(items) => pool.extend(items.iter().filter_map(|v| self.coerce(v))),
            other => pool.extend(self.coerce(other)),
        }

        if pool.is_empty() {
            return None;
        }
        pool.sort_unstable();
        let pool_min = pool[0];
        let pool_max = pool[pool.len() - 1];
        let pool_mid = pool[pool.len() / 2];

        let mut range_min = explicit_range.0.unwrap_or(pool_min);
        let mut range_max = explicit_range.1.unwrap_or(pool_max);
        if range_min > range_max {
            std::mem::swap(&mut range_min, &mut range_max);
        }

        let mut tiers = match named {
            (None, None, None) => [pool_min, pool_mid, pool_max],
            (low, mid, high) => {
                let low = low.unwrap_or(range_min);
                let high = high.unwrap_or(range_max);
                let mid = mid.unwrap_or_else(|| pool_mid.clamp(low.min(high), low.max(high)));
                [low, mid, high]
            }
        };
        tiers.sort_unstable();

        Some(TieredPrice {
            low: tiers[0],
            mid: tiers[1],
            high: tiers[2],
            range: PriceRange {
                min: range_min,
                max: range_max,
            },
        })
    }

    fn first_of(&self, map: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
        keys.iter().find_map(|key| map.get(*key).and_then(|v| self.coerce(v)))
    }

    /// Range bounds from a nested `range` object or `[min, max]` pair, else
    /// from top-level `min`/`max`.
    fn range_of(&self, map: &Map<String, Value>) -> (Option<i64>, Option<i64>) {
        match map.get("range") {
            Some(Value::Object(range)) => (
                self.first_of(range, RANGE_MIN_KEYS),
                self.first_of(range, RANGE_MAX_KEYS),
            ),
            Some(Value::Array(pair)) => {
                let mut values: Vec<i64> = pair.iter().filter_map(|v| self.coerce(v)).collect();
                values.sort_unstable();
                (values.first().copied(), values.last().copied())
            }
            _ => (
                map.get("min").and_then(|v| self.coerce(v)),
                map.get("max").and_then(|v| self.coerce(v)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer() -> PriceNormalizer {
        PriceNormalizer::default()
    }

    fn loose() -> PriceNormalizer {
        PriceNormalizer::new(PriceBounds::new(1, 9_999_999))
    }

    fn tier_values(t: &TieredPrice) -> [i64; 5] {
        [t.low, t.mid, t.high, t.range.min, t.range.max]
    }

    #[test]
    fn coerce_drops_out_of_range_and_non_numeric() {
        let n = normalizer();
        assert_eq!(n.coerce(&json!(1200)), Some(1200));
        assert_eq!(n.coerce(&json!(1200.9)), Some(1200));
        assert_eq!(n.coerce(&json!("1,500")), Some(1500));
        assert_eq!(n.coerce(&json!("¥2000")), Some(2000));
        assert_eq!(n.coerce(&json!(299)), None);
        assert_eq!(n.coerce(&json!(10_000_000)), None);
        assert_eq!(n.coerce(&json!("about 500")), None);
        assert_eq!(n.coerce(&json!(true)), None);
        assert_eq!(n.coerce(&json!(null)), None);
    }

    #[test]
    fn ordered_list_dedupes_preserving_order() {
        assert_eq!(
            normalizer().ordered_list(&json!([1000, 1000, 500, 2000])),
            vec![1000, 500, 2000]
        );
    }

    #[test]
    fn ordered_list_pads_with_last_value() {
        assert_eq!(loose().ordered_list(&json!([100])), vec![100, 100, 100]);
        assert_eq!(
            normalizer().ordered_list(&json!([800, 1200])),
            vec![800, 1200, 1200]
        );
    }

    #[test]
    fn ordered_list_from_keyed_object() {
        let raw = json!({
            "best": 1500,
            "prices": [1200, "oops", 1800],
            "low": 900,
            "high": 1800
        });
        // list keys first, then scalar keys
        assert_eq!(normalizer().ordered_list(&raw), vec![1200, 1800, 1500]);
    }

    #[test]
    fn ordered_list_scalar_and_empty() {
        assert_eq!(normalizer().ordered_list(&json!(3000)), vec![3000, 3000, 3000]);
        assert!(normalizer().ordered_list(&json!([1, 2, 3])).is_empty());
        assert!(normalizer().ordered_list(&json!("n/a")).is_empty());
        assert!(normalizer().normalize(PricePolicy::OrderedList, &json!([])).is_none());
    }

    #[test]
    fn ordered_list_is_always_three_and_bounded() {
        let n = normalizer();
        let inputs = [
            json!([500, 600, 700, 800, 900]),
            json!({"values": [400], "mean": 650}),
            json!([50, 20_000_000, 4000]),
        ];
        for input in inputs {
            let list = n.ordered_list(&input);
            assert_eq!(list.len(), 3, "input {input}");
            assert!(list.iter().all(|p| n.bounds.contains(*p)));
        }
    }

    #[test]
    fn tiered_from_named_fields() {
        let raw = json!({
            "low": 800, "mid": 1000, "high": 1500,
            "range": {"min": 700, "max": 1600}
        });
        let t = normalizer().tiered(&raw).unwrap();
        assert_eq!((t.low, t.mid, t.high), (800, 1000, 1500));
        assert_eq!(t.range, PriceRange { min: 700, max: 1600 });
    }

    #[test]
    fn tiered_from_unordered_list() {
        let t = normalizer().tiered(&json!([1200, 800, 1500])).unwrap();
        assert_eq!((t.low, t.mid, t.high), (800, 1200, 1500));
        assert_eq!(t.range, PriceRange { min: 800, max: 1500 });
    }

    #[test]
    fn tiered_fills_missing_tiers_from_range() {
        let raw = json!({"median": 1000, "range": {"min": 500, "max": 2000}});
        let t = normalizer().tiered(&raw).unwrap();
        assert_eq!((t.low, t.mid, t.high), (500, 1000, 2000));
    }

    #[test]
    fn tiered_range_from_pool_when_absent() {
        let raw = json!({"low": 900, "high": 3000});
        let t = normalizer().tiered(&raw).unwrap();
        assert_eq!((t.low, t.high), (900, 3000));
        assert!(t.mid >= t.low && t.mid <= t.high);
        assert_eq!(t.range, PriceRange { min: 900, max: 3000 });
    }

    #[test]
    fn tiered_orders_swapped_values() {
        let raw = json!({"low": 5000, "mid": 3000, "high": 1000, "range": [4000, 900]});
        let t = normalizer().tiered(&raw).unwrap();
        assert_eq!((t.low, t.mid, t.high), (1000, 3000, 5000));
        assert_eq!(t.range, PriceRange { min: 900, max: 4000 });
    }

    #[test]
    fn tiered_scalar_and_out_of_range() {
        let t = normalizer().tiered(&json!("1200")).unwrap();
        assert_eq!(tier_values(&t), [1200; 5]);

        let raw = json!({"low": 10, "mid": 1000});
        let t = normalizer().tiered(&raw).unwrap();
        assert!(tier_values(&t).iter().all(|v| *v == 1000));

        assert!(normalizer().tiered(&json!({"low": "cheap"})).is_none());
        assert!(normalizer().normalize(PricePolicy::Tiered, &json!(null)).is_none());
    }
}

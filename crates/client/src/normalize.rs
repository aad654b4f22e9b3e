//! Product normalization.
//!
//! Maps the aggregation envelope's per-source results onto
//! [`ProductEntry`], whatever shape each source reports. This is total:
//! malformed or missing fields fall back to defaults and a source that
//! failed or sent no data is skipped, so no upstream response can make
//! this return an error or panic.

use std::sync::LazyLock;

use pricewatch_core::{Platform, ProductEntry};
use regex::Regex;
use serde_json::Value;

const PRICE_FIELDS: &[&str] = &["price", "currentPrice", "finalPrice"];
const MRP_FIELDS: &[&str] = &["mrp", "originalPrice"];
const TITLE_FIELDS: &[&str] = &["title", "name"];
const IMAGE_FIELDS: &[&str] = &["imageUrl", "image"];
const LINK_FIELDS: &[&str] = &["productLink", "url"];

const DEFAULT_TITLE: &str = "Product";
const DEFAULT_LINK: &str = "#";
const DEFAULT_PLACEHOLDER_IMAGE: &str = "/modern-tech-product.png";

static LEADING_NUMBER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)").ok());
static PERCENTAGE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(\d+)%").ok());

/// Converts raw aggregation envelopes into sorted product lists.
#[derive(Debug, Clone)]
pub struct Normalizer {
    placeholder_image: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_IMAGE)
    }
}

impl Normalizer {
    pub fn new(placeholder_image: impl Into<String>) -> Self {
        Self { placeholder_image: placeholder_image.into() }
    }

    /// Normalize an envelope into entries sorted by ascending price.
    pub fn normalize(&self, raw: &Value) -> Vec<ProductEntry> {
        if raw.get("success").and_then(Value::as_bool) != Some(true) {
            return Vec::new();
        }
        let Some(sources) = raw.get("sources").and_then(Value::as_object) else {
            return Vec::new();
        };

        let mut products: Vec<ProductEntry> = sources
            .iter()
            .filter_map(|(source_id, source)| {
                if source.get("success").and_then(Value::as_bool) != Some(true) {
                    tracing::debug!(source = %source_id, "skipping failed source");
                    return None;
                }
                let data = source.get("data").filter(|d| d.is_object())?;
                Some(self.entry(source_id, data))
            })
            .collect();

        products.sort_by(|a, b| a.price.total_cmp(&b.price));
        products
    }

    fn entry(&self, source_id: &str, data: &Value) -> ProductEntry {
        ProductEntry {
            platform: Platform::from_source_id(source_id),
            title: first_text(data, TITLE_FIELDS).unwrap_or(DEFAULT_TITLE).to_string(),
            price: first_amount(data, PRICE_FIELDS).unwrap_or(0.0),
            mrp: first_amount(data, MRP_FIELDS).filter(|mrp| *mrp > 0.0),
            discount: data.get("discount").and_then(parse_discount),
            image: first_text(data, IMAGE_FIELDS)
                .unwrap_or(&self.placeholder_image)
                .to_string(),
            link: first_text(data, LINK_FIELDS).unwrap_or(DEFAULT_LINK).to_string(),
            rating: data.get("rating").and_then(parse_rating),
        }
    }
}

/// Normalize with the default placeholder image.
pub fn normalize(raw: &Value) -> Vec<ProductEntry> {
    Normalizer::default().normalize(raw)
}

fn first_text<'a>(data: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|field| data.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn first_amount(data: &Value, fields: &[&str]) -> Option<f64> {
    fields.iter().find_map(|field| data.get(*field).and_then(parse_amount))
}

/// Parse a numeric or currency-formatted amount such as `"₹1,299"`.
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

fn parse_amount_str(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '₹' | '$' | ',') && !c.is_whitespace())
        .collect();
    let cleaned = strip_currency_code(&cleaned);
    let number = LEADING_NUMBER.as_ref()?.find(cleaned)?;
    number.as_str().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn strip_currency_code(s: &str) -> &str {
    for code in ["Rs.", "Rs", "INR"] {
        if let Some(rest) = s.strip_prefix(code) {
            return rest;
        }
    }
    s
}

fn parse_discount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|d| d.is_finite() && *d > 0.0),
        Value::String(s) => PERCENTAGE
            .as_ref()?
            .captures(s)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok()),
        _ => None,
    }
}

fn parse_rating(value: &Value) -> Option<f64> {
    let rating = match value {
        Value::Object(obj) => obj.get("stars").and_then(Value::as_f64),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    rating.filter(|r| r.is_finite() && *r > 0.0)
}

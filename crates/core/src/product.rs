//! Canonical product model shared by every context.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Retail platform a product entry came from.
///
/// Known upstream identifiers map onto the fixed variants; anything else
/// is carried verbatim so no upstream result is dropped for its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    Amazon,
    Flipkart,
    Reliance,
    Myntra,
    Other(String),
}

impl Platform {
    /// Map an upstream source identifier onto a platform.
    pub fn from_source_id(id: &str) -> Self {
        match id {
            "amazon" => Self::Amazon,
            "flipkart" => Self::Flipkart,
            "relianceDigital" | "reliance" => Self::Reliance,
            "myntra" => Self::Myntra,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Amazon => "amazon",
            Self::Flipkart => "flipkart",
            Self::Reliance => "reliance",
            Self::Myntra => "myntra",
            Self::Other(id) => id,
        }
    }
}

impl From<String> for Platform {
    fn from(id: String) -> Self {
        Self::from_source_id(&id)
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.as_str().to_string()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One platform's offer, normalized.
///
/// `price` is always finite; `0.0` means the upstream price was missing or
/// unparsable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductEntry {
    pub platform: Platform,
    pub title: String,
    pub price: f64,
    pub mrp: Option<f64>,
    /// Percentage off MRP.
    pub discount: Option<f64>,
    pub image: String,
    pub link: String,
    pub rating: Option<f64>,
}

/// The cheapest entry with a known (positive) price, falling back to the
/// first entry when none has one.
pub fn best_deal(products: &[ProductEntry]) -> Option<&ProductEntry> {
    products
        .iter()
        .filter(|p| p.price > 0.0)
        .min_by(|a, b| a.price.total_cmp(&b.price))
        .or_else(|| products.first())
}

static PRODUCT_PAGE_PATTERNS: LazyLock<Vec<(Platform, Regex)>> = LazyLock::new(|| {
    [
        (Platform::Amazon, r"amazon\.(in|com)/.+/(dp|gp/product)/"),
        (Platform::Flipkart, r"flipkart\.com/.+/p/"),
        (Platform::Myntra, r"myntra\.com/.+/p/"),
        (Platform::Reliance, r"reliancedigital\.in/.+/p/"),
    ]
    .into_iter()
    .filter_map(|(platform, pattern)| Regex::new(pattern).ok().map(|re| (platform, re)))
    .collect()
});

/// Whether `url` looks like a product detail page on a supported platform.
pub fn is_product_page(url: &str) -> bool {
    PRODUCT_PAGE_PATTERNS.iter().any(|(_, re)| re.is_match(url))
}

/// Supported platform mentioned anywhere in `url`, if any.
pub fn detect_platform(url: &str) -> Option<Platform> {
    let lower = url.to_lowercase();
    [
        ("amazon", Platform::Amazon),
        ("flipkart", Platform::Flipkart),
        ("myntra", Platform::Myntra),
        ("reliance", Platform::Reliance),
    ]
    .into_iter()
    .find(|(needle, _)| lower.contains(needle))
    .map(|(_, platform)| platform)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(platform: Platform, price: f64) -> ProductEntry {
        ProductEntry {
            platform,
            title: "X".to_string(),
            price,
            mrp: None,
            discount: None,
            image: String::new(),
            link: "#".to_string(),
            rating: None,
        }
    }

    #[test]
    fn test_platform_mapping() {
        assert_eq!(Platform::from_source_id("relianceDigital"), Platform::Reliance);
        assert_eq!(Platform::from_source_id("amazon"), Platform::Amazon);
        assert_eq!(Platform::from_source_id("croma"), Platform::Other("croma".to_string()));
    }

    #[test]
    fn test_platform_serializes_as_string() {
        let json = serde_json::to_string(&Platform::Reliance).unwrap();
        assert_eq!(json, "\"reliance\"");
        let other: Platform = serde_json::from_str("\"croma\"").unwrap();
        assert_eq!(other.as_str(), "croma");
    }

    #[test]
    fn test_best_deal_skips_unpriced() {
        let products = vec![entry(Platform::Myntra, 0.0), entry(Platform::Amazon, 499.0), entry(Platform::Flipkart, 520.0)];
        assert_eq!(best_deal(&products).unwrap().platform, Platform::Amazon);
    }

    #[test]
    fn test_best_deal_falls_back_to_first() {
        let products = vec![entry(Platform::Myntra, 0.0)];
        assert_eq!(best_deal(&products).unwrap().platform, Platform::Myntra);
        assert!(best_deal(&[]).is_none());
    }

    #[test]
    fn test_is_product_page() {
        assert!(is_product_page("https://www.amazon.in/Apple-iPhone/dp/B0CHX1W1XY"));
        assert!(is_product_page("https://www.flipkart.com/apple-iphone-15/p/itm6ac6485515ae4"));
        assert!(is_product_page("https://www.reliancedigital.in/apple-iphone/p/493839312"));
        assert!(!is_product_page("https://www.amazon.in/s?k=iphone"));
        assert!(!is_product_page("https://example.com/p/1"));
    }

    #[test]
    fn test_detect_platform() {
        assert_eq!(detect_platform("https://www.Flipkart.com/x"), Some(Platform::Flipkart));
        assert_eq!(detect_platform("https://www.reliancedigital.in/x"), Some(Platform::Reliance));
        assert_eq!(detect_platform("https://example.com"), None);
    }
}

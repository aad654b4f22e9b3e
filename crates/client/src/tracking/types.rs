//! Tracking request and response types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pricewatch_core::ProductEntry;
use serde::Serialize;
use serde_json::Value;

use super::error::TrackingError;

/// Per-platform snapshot sent when a comparison is tracked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSnapshot {
    pub price: f64,
    pub mrp: Option<f64>,
    pub discount: Option<f64>,
    pub product_link: String,
    pub image_url: String,
    pub last_updated: DateTime<Utc>,
}

/// Body of `POST /tracking`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRequest {
    pub product_name: String,
    pub original_link: String,
    pub platforms: BTreeMap<String, PlatformSnapshot>,
    pub notify_by_email: bool,
    #[serde(rename = "notifyByWhatsApp")]
    pub notify_by_whatsapp: bool,
}

impl TrackingRequest {
    /// Build a request from a displayed comparison.
    ///
    /// The product name is the first entry's title. Returns `None` when
    /// there is nothing to track.
    pub fn from_products(original_link: &str, products: &[ProductEntry], now: DateTime<Utc>) -> Option<Self> {
        let first = products.first()?;
        let platforms = products
            .iter()
            .map(|p| {
                let snapshot = PlatformSnapshot {
                    price: p.price,
                    mrp: p.mrp,
                    discount: p.discount,
                    product_link: p.link.clone(),
                    image_url: p.image.clone(),
                    last_updated: now,
                };
                (p.platform.as_str().to_string(), snapshot)
            })
            .collect();

        Some(Self {
            product_name: first.title.clone(),
            original_link: original_link.to_string(),
            platforms,
            notify_by_email: true,
            notify_by_whatsapp: true,
        })
    }
}

/// A tracked product as listed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedProduct {
    pub id: String,
    pub product_name: String,
    pub lowest_price: f64,
    pub lowest_price_platform: String,
    pub image_url: Option<String>,
}

impl TrackedProduct {
    /// Read one item, tolerating the field spellings the backend has used.
    pub fn from_value(item: &Value) -> Self {
        let text = |fields: &[&str]| {
            fields
                .iter()
                .filter_map(|f| item.get(*f).and_then(Value::as_str))
                .find(|s| !s.is_empty())
                .map(str::to_string)
        };

        let lowest_price = ["lowestPrice", "currentLowestPrice"]
            .iter()
            .filter_map(|f| item.get(*f).and_then(Value::as_f64))
            .find(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(0.0);

        let image_url = text(&["imageUrl"]).or_else(|| {
            item.get("platforms")
                .and_then(Value::as_object)
                .and_then(|platforms| platforms.values().next())
                .and_then(|first| first.get("imageUrl"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        Self {
            id: text(&["_id", "id"]).unwrap_or_default(),
            product_name: text(&["productName"]).unwrap_or_else(|| "Unknown Product".to_string()),
            lowest_price,
            lowest_price_platform: text(&["lowestPricePlatform", "currentLowestPricePlatform"])
                .unwrap_or_else(|| "Unknown".to_string()),
            image_url,
        }
    }
}

/// Extract the item list from any of the list response shapes:
/// `{success, data: [...]}`, a bare array, `{data: [...]}` or `{tracks: [...]}`.
pub fn parse_track_list(body: &Value) -> Result<Vec<TrackedProduct>, TrackingError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("data")
            .and_then(Value::as_array)
            .or_else(|| obj.get("tracks").and_then(Value::as_array))
            .ok_or_else(|| TrackingError::Parse("no track list in response".to_string()))?,
        other => return Err(TrackingError::Parse(format!("unexpected list response: {other}"))),
    };
    Ok(items.iter().map(TrackedProduct::from_value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch_core::Platform;
    use serde_json::json;

    fn entry(platform: Platform, title: &str, price: f64) -> ProductEntry {
        ProductEntry {
            platform,
            title: title.to_string(),
            price,
            mrp: Some(price * 1.2),
            discount: None,
            image: "https://img.example/x.jpg".to_string(),
            link: "https://shop.example/x".to_string(),
            rating: None,
        }
    }

    #[test]
    fn test_request_wire_shape() {
        let now = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z").unwrap().with_timezone(&Utc);
        let products = vec![entry(Platform::Flipkart, "Phone", 100.0), entry(Platform::Amazon, "Phone X", 120.0)];
        let request = TrackingRequest::from_products("https://www.flipkart.com/p/1", &products, now).unwrap();

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["productName"], "Phone");
        assert_eq!(body["originalLink"], "https://www.flipkart.com/p/1");
        assert_eq!(body["notifyByEmail"], true);
        assert_eq!(body["notifyByWhatsApp"], true);
        assert_eq!(body["platforms"]["amazon"]["price"], 120.0);
        assert_eq!(body["platforms"]["flipkart"]["productLink"], "https://shop.example/x");
        assert_eq!(body["platforms"]["flipkart"]["imageUrl"], "https://img.example/x.jpg");
        assert!(body["platforms"]["flipkart"]["discount"].is_null());
        assert!(body["platforms"]["flipkart"]["lastUpdated"].as_str().unwrap().starts_with("2026-01-02T03:04:05"));
    }

    #[test]
    fn test_request_needs_products() {
        assert!(TrackingRequest::from_products("https://a", &[], Utc::now()).is_none());
    }

    #[test]
    fn test_list_shapes() {
        let item = json!({"_id": "t1", "productName": "Phone", "lowestPrice": 99.0, "lowestPricePlatform": "amazon"});
        let shapes = [
            json!({"success": true, "data": [item.clone()]}),
            json!([item.clone()]),
            json!({"data": [item.clone()]}),
            json!({"tracks": [item.clone()]}),
        ];
        for body in shapes {
            let tracks = parse_track_list(&body).unwrap();
            assert_eq!(tracks.len(), 1, "shape {body}");
            assert_eq!(tracks[0].id, "t1");
        }

        assert!(parse_track_list(&json!({"success": true})).is_err());
        assert!(parse_track_list(&json!("nope")).is_err());
    }

    #[test]
    fn test_item_fallback_fields() {
        let item = json!({
            "id": "t2",
            "currentLowestPrice": 450,
            "currentLowestPricePlatform": "flipkart",
            "platforms": {"flipkart": {"imageUrl": "https://img/f.jpg"}}
        });
        let track = TrackedProduct::from_value(&item);
        assert_eq!(track.id, "t2");
        assert_eq!(track.product_name, "Unknown Product");
        assert_eq!(track.lowest_price, 450.0);
        assert_eq!(track.lowest_price_platform, "flipkart");
        assert_eq!(track.image_url.as_deref(), Some("https://img/f.jpg"));
    }

    #[test]
    fn test_item_defaults() {
        let track = TrackedProduct::from_value(&json!({}));
        assert_eq!(track.id, "");
        assert_eq!(track.lowest_price, 0.0);
        assert_eq!(track.lowest_price_platform, "Unknown");
        assert!(track.image_url.is_none());
    }
}

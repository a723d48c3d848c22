use serde::{Deserialize, Deserializer, Serialize};

/// A catalog entry, owned and maintained outside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub regular_price: f64,
    pub avg_rating: f64,
    pub review_count: i64,
    #[serde(deserialize_with = "deserialize_flag")]
    pub in_stock: bool,
}

/// Accepts the spellings catalog exports use for booleans
/// (`True`/`False` from Python writers, `true`/`false`, `1`/`0`).
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(i) => Ok(i != 0),
        Flag::Text(s) => parse_flag(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid boolean flag: {:?}", s))),
    }
}

pub(crate) fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_spellings() {
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag(" 1 "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_deserialize_json_product() {
        let json = r#"{
            "product_id": "SKU-TVS-9F3C",
            "product_name": "Acme Vision-Max 55-inch 4K TV",
            "category": "TVs",
            "regular_price": 899.99,
            "avg_rating": 4.4,
            "review_count": 1200,
            "in_stock": true
        }"#;
        let product: Product = serde_json::from_str(json).unwrap();
        assert!(product.in_stock);
        assert_eq!(product.review_count, 1200);
    }
}

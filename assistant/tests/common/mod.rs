#![allow(dead_code)]

use std::collections::HashMap;
use storefront_config::feature_toggles::FeatureToggles;
use storefront_config::AssistantConfig;

/// Configuration built from explicit pairs instead of the process environment.
pub fn config_with(pairs: &[(&str, String)], toggles: FeatureToggles) -> AssistantConfig {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();
    AssistantConfig::from_lookup(move |key| map.get(key).cloned(), toggles)
        .expect("valid test configuration")
}

pub fn catalog_json() -> &'static str {
    r#"{
        "products": [
            {
                "id": "gid://shopify/Product/1001",
                "title": "Snowboard",
                "handle": "snowboard",
                "vendor": "Hydrogen Vendor",
                "priceRange": {"minVariantPrice": {"amount": "100", "currencyCode": "USD"}}
            },
            {
                "id": "gid://shopify/Product/1002",
                "title": "Board Wax",
                "handle": "board-wax"
            }
        ],
        "collections": [
            {"id": "gid://shopify/Collection/7", "title": "Winter", "handle": "winter"}
        ]
    }"#
}

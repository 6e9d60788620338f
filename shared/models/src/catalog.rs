//! Catalog entities as exported by the commerce API, and their mapping into
//! index records.

use serde::{Deserialize, Serialize};

use crate::index::{IndexRecord, RecordType};

/// Anything that can be stored in the vector index.
pub trait ToIndexRecord {
    fn record_type(&self) -> RecordType;

    fn to_index_record(&self) -> IndexRecord;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    pub amount: String,
    pub currency_code: String,
}

impl Money {
    pub fn new(amount: impl Into<String>, currency_code: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            currency_code: currency_code.into(),
        }
    }

    /// `"<amount> <currency>"`, or just whichever part is present.
    pub fn display(&self) -> String {
        [self.amount.trim(), self.currency_code.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRange {
    pub min_variant_price: Money,
    #[serde(default)]
    pub max_variant_price: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub available_for_sale: Option<bool>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
    #[serde(default)]
    pub featured_image: Option<ImageRef>,
}

impl ProductRecord {
    pub fn price(&self) -> Option<&Money> {
        self.price_range.as_ref().map(|range| &range.min_variant_price)
    }
}

impl ToIndexRecord for ProductRecord {
    fn record_type(&self) -> RecordType {
        RecordType::Product
    }

    fn to_index_record(&self) -> IndexRecord {
        let price = self.price().map(Money::display).unwrap_or_default();
        let alt_text = self
            .featured_image
            .as_ref()
            .and_then(|image| image.alt_text.as_deref())
            .unwrap_or_default();

        IndexRecord::new(
            RecordType::Product,
            &self.id,
            [
                self.title.as_str(),
                self.handle.as_str(),
                self.description.as_str(),
                self.vendor.as_str(),
                price.as_str(),
                alt_text,
            ],
        )
        .with_field("source_id", self.id.as_str())
        .with_field("title", self.title.as_str())
        .with_field("handle", self.handle.as_str())
        .with_field("vendor", self.vendor.as_str())
        .with_field("product_type", self.product_type.as_str())
        .with_field("tags", self.tags.clone())
        .with_optional_field("available", self.available_for_sale)
        .with_optional_field("price", self.price().map(|m| m.amount.clone()))
        .with_optional_field("currency", self.price().map(|m| m.currency_code.clone()))
        .with_optional_field("image_url", self.featured_image.as_ref().map(|i| i.url.clone()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

impl ToIndexRecord for CollectionRecord {
    fn record_type(&self) -> RecordType {
        RecordType::Collection
    }

    fn to_index_record(&self) -> IndexRecord {
        let alt_text = self
            .image
            .as_ref()
            .and_then(|image| image.alt_text.as_deref())
            .unwrap_or_default();

        IndexRecord::new(
            RecordType::Collection,
            &self.id,
            [
                self.title.as_str(),
                self.handle.as_str(),
                self.description.as_str(),
                alt_text,
            ],
        )
        .with_field("source_id", self.id.as_str())
        .with_field("title", self.title.as_str())
        .with_field("handle", self.handle.as_str())
        .with_optional_field("image_url", self.image.as_ref().map(|i| i.url.clone()))
    }
}

/// A full catalog snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogExport {
    #[serde(default)]
    pub products: Vec<ProductRecord>,
    #[serde(default)]
    pub collections: Vec<CollectionRecord>,
}

impl CatalogExport {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.collections.is_empty()
    }
}

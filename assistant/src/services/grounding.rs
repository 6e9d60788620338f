use std::sync::Arc;
use storefront_models::{ChatMessage, ProductCard, Role};

use crate::services::query::{format_search_results, QueryPipeline};

/// Most products attached to one answer.
pub const MAX_GROUNDING_PRODUCTS: usize = 3;

const PRODUCT_KEYWORDS: &[&str] = &[
    "product",
    "recommend",
    "suggest",
    "looking for",
    "show me",
    "find",
    "buy",
    "shop",
    "price",
    "cost",
    "cheap",
    "gift",
    "in stock",
    "available",
    "collection",
];

/// Whether a user message reads like a request for products.
pub fn wants_products(text: &str) -> bool {
    let text = text.to_lowercase();
    PRODUCT_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

/// Looks up catalog products relevant to the latest user message.
pub struct ProductGrounding {
    query: Arc<QueryPipeline>,
}

impl ProductGrounding {
    pub fn new(query: Arc<QueryPipeline>) -> Self {
        Self { query }
    }

    /// At most [`MAX_GROUNDING_PRODUCTS`] cards, or none when the last user
    /// message does not ask for products. Search failures degrade to none.
    pub async fn ground(&self, messages: &[ChatMessage]) -> Vec<ProductCard> {
        let Some(last_user) = messages.iter().rev().find(|m| m.role == Role::User) else {
            return Vec::new();
        };
        if !wants_products(&last_user.content) {
            return Vec::new();
        }

        match self
            .query
            .search_products(&last_user.content, MAX_GROUNDING_PRODUCTS, None)
            .await
        {
            Ok(results) => format_search_results(&results)
                .iter()
                .filter_map(ProductCard::from_result)
                .take(MAX_GROUNDING_PRODUCTS)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "product grounding failed, answering without products");
                Vec::new()
            }
        }
    }
}

/// System message listing the products the answer may refer to.
pub fn grounding_prompt(products: &[ProductCard]) -> Option<ChatMessage> {
    if products.is_empty() {
        return None;
    }
    let listing = products
        .iter()
        .map(ProductCard::summary)
        .collect::<Vec<_>>()
        .join("\n");
    Some(ChatMessage::system(format!(
        "These catalog products match the customer's request. Recommend only from this list \
         and do not invent prices:\n{}",
        listing
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::retry::RetryPolicy;
    use crate::services::vector_index::VectorIndexClient;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn grounding_for(server: &MockServer) -> ProductGrounding {
        let index = VectorIndexClient::new(server.uri(), "key", "2025-04")
            .unwrap()
            .with_retry_policy(RetryPolicy::none());
        ProductGrounding::new(Arc::new(QueryPipeline::new(Arc::new(index), "catalog")))
    }

    #[test]
    fn test_keyword_heuristic() {
        assert!(wants_products("Can you RECOMMEND a snowboard?"));
        assert!(wants_products("I'm looking for a gift"));
        assert!(!wants_products("What are your opening hours?"));
    }

    #[test]
    fn test_grounding_prompt_lists_products() {
        assert!(grounding_prompt(&[]).is_none());
        let card = ProductCard {
            id: "product_1".to_string(),
            title: "Wax".to_string(),
            handle: "wax".to_string(),
            price: None,
            currency: None,
            image_url: None,
            score: 0.3,
        };
        let prompt = grounding_prompt(&[card]).unwrap();
        assert_eq!(prompt.role, Role::System);
        assert!(prompt.content.ends_with("- Wax (handle: wax)"));
    }

    #[tokio::test]
    async fn test_ground_caps_products_and_skips_untitled_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/records/namespaces/catalog/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"hits": [
                    {"_id": "product_1", "_score": 0.9, "fields": {"title": "Board", "content": "Board"}},
                    {"_id": "product_2", "_score": 0.8, "fields": {"content": "no title"}},
                    {"_id": "product_3", "_score": 0.7, "fields": {"title": "Wax"}},
                    {"_id": "product_4", "_score": 0.6, "fields": {"title": "Bindings"}}
                ]}
            })))
            .mount(&server)
            .await;

        let cards = grounding_for(&server)
            .ground(&[ChatMessage::user("recommend a snowboard setup")])
            .await;

        let titles: Vec<&str> = cards.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Board", "Wax"]);
    }

    #[tokio::test]
    async fn test_ground_skips_search_for_small_talk() {
        let server = MockServer::start().await;
        let cards = grounding_for(&server)
            .ground(&[ChatMessage::user("hello there")])
            .await;

        assert!(cards.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ground_degrades_on_search_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/records/namespaces/catalog/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cards = grounding_for(&server)
            .ground(&[ChatMessage::user("show me jackets")])
            .await;
        assert!(cards.is_empty());
    }
}

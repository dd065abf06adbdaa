use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use nutrilog_core::ninjas::{NutritionItem, NutritionResponse, RecipeItem};
use nutrilog_core::service::{NutritionLookupProvider, RecipeLookupProvider};

/// Connect, read and overall request budget. reqwest has no write timeout;
/// the overall budget bounds the write of the request.
pub const TIMEOUT: Duration = Duration::from_secs(30);

const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Failed to reach {service}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to parse {service} response")]
    Decode {
        service: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// One transport shared by both clients.
pub fn build_transport() -> Result<reqwest::Client> {
    transport_with_timeout(TIMEOUT)
}

fn transport_with_timeout(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!(
            "nutrilog/{} (nutrition tracker)",
            env!("CARGO_PKG_VERSION")
        ))
        .timeout(timeout)
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Single-attempt GET with `?query=` and the API key header. Request and
/// response bodies are logged at debug level; the key never is.
async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    service: &'static str,
    url: &str,
    api_key: &str,
    query: &str,
) -> Result<T, RemoteError> {
    debug!(method = "GET", url, query, "--> {service}");
    let resp = client
        .get(url)
        .header(API_KEY_HEADER, api_key)
        .query(&[("query", query)])
        .send()
        .await
        .map_err(|source| RemoteError::Transport { service, source })?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|source| RemoteError::Transport { service, source })?;
    debug!(status = status.as_u16(), body = %body, "<-- {service}");

    if !status.is_success() {
        return Err(RemoteError::Status {
            service,
            status,
            body,
        });
    }
    serde_json::from_str(&body).map_err(|source| RemoteError::Decode { service, source })
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

pub struct NutritionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NutritionClient {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn lookup(&self, query: &str) -> Result<Vec<NutritionItem>, RemoteError> {
        let url = endpoint(&self.base_url, "/v1/nutrition");
        let response: NutritionResponse =
            get_json(&self.client, "nutrition API", &url, &self.api_key, query).await?;
        Ok(response.items)
    }
}

#[async_trait]
impl NutritionLookupProvider for NutritionClient {
    async fn lookup_nutrition(&self, query: &str) -> Result<Vec<NutritionItem>> {
        Ok(self.lookup(query).await?)
    }
}

pub struct RecipeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RecipeClient {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn lookup(&self, query: &str) -> Result<Vec<RecipeItem>, RemoteError> {
        let url = endpoint(&self.base_url, "/v1/recipe");
        get_json(&self.client, "recipe API", &url, &self.api_key, query).await
    }
}

#[async_trait]
impl RecipeLookupProvider for RecipeClient {
    async fn lookup_recipes(&self, query: &str) -> Result<Vec<RecipeItem>> {
        Ok(self.lookup(query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn nutrition_client(server: &MockServer) -> NutritionClient {
        NutritionClient::new(build_transport().unwrap(), &server.uri(), "test-key")
    }

    fn recipe_client(server: &MockServer) -> RecipeClient {
        RecipeClient::new(build_transport().unwrap(), &server.uri(), "test-key")
    }

    #[tokio::test]
    async fn test_nutrition_lookup_sends_key_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/nutrition"))
            .and(query_param("query", "200g rice"))
            .and(header("X-Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "name": "rice",
                    "calories": 254.8,
                    "serving_size_g": 200.0,
                    "fat_total_g": 0.6,
                    "fat_saturated_g": 0.2,
                    "protein_g": 5.4,
                    "sodium_mg": 2,
                    "potassium_mg": 84,
                    "cholesterol_mg": 0,
                    "carbohydrates_total_g": 56.8,
                    "fiber_g": 0.8,
                    "sugar_g": 0.2
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let items = nutrition_client(&server).lookup("200g rice").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "rice");
        assert!((items[0].serving_size_g - 200.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_recipe_lookup_decodes_top_level_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/recipe"))
            .and(query_param("query", "pad thai"))
            .and(header("X-Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "title": "Pad Thai",
                    "ingredients": "rice noodles|tamarind|peanuts",
                    "servings": "2 Servings",
                    "instructions": "Soak noodles. Stir-fry."
                }
            ])))
            .mount(&server)
            .await;

        let recipes = recipe_client(&server).lookup("pad thai").await.unwrap();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].title, "Pad Thai");
        assert_eq!(recipes[0].servings, "2 Servings");
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/recipe"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API Key."))
            .mount(&server)
            .await;

        let err = recipe_client(&server).lookup("soup").await.unwrap_err();
        match err {
            RemoteError::Status { status, body, .. } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "Invalid API Key.");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/nutrition"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"items\": 3}"))
            .mount(&server)
            .await;

        let err = nutrition_client(&server).lookup("apple").await.unwrap_err();
        assert!(matches!(err, RemoteError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // Reserve a port, then release it so nothing is listening there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let uri = format!("http://{addr}");
        let client = NutritionClient::new(build_transport().unwrap(), &uri, "test-key");
        let err = client.lookup("apple").await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_slow_response_times_out_as_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/recipe"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let transport = transport_with_timeout(Duration::from_millis(200)).unwrap();
        let client = RecipeClient::new(transport, &server.uri(), "test-key");
        match client.lookup("soup").await.unwrap_err() {
            RemoteError::Transport { source, .. } => assert!(source.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_provider_impl_converts_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/nutrition"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = nutrition_client(&server);
        let err = client.lookup_nutrition("apple").await.unwrap_err();
        assert!(format!("{err:#}").contains("boom"));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint("https://api.example.com/", "/v1/recipe"),
            "https://api.example.com/v1/recipe"
        );
    }
}

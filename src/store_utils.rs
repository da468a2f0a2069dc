// store_utils.rs
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;
use std::fs;
use url::Url;

const DEFAULT_DATABASE: &str = "Estudiantes";
const DEFAULT_COLLECTION: &str = "Estudiantes_Materias";
const FIND_LIMIT: u64 = 50_000;

/// Connection settings for the student document store, served over its HTTP data
/// API. The credential is never passed around as a bare argument: it is loaded once
/// from the secrets file (or environment) and travels inside this config.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub endpoint: String,
    pub api_key: String,
    pub data_source: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl StoreConfig {
    /// Loads the store credential from `~/.attriml/secrets.json`, falling back to the
    /// `ATTRIML_ENDPOINT` / `ATTRIML_API_KEY` / `ATTRIML_DATA_SOURCE` environment
    /// variables when the file is absent.
    pub fn from_secrets() -> Result<Self, Box<dyn Error>> {
        let secrets_path = dirs::home_dir()
            .ok_or("Could not find home directory")?
            .join(".attriml")
            .join("secrets.json");

        if secrets_path.exists() {
            let raw = fs::read_to_string(&secrets_path)?;
            return Self::from_json(&raw);
        }

        let endpoint = std::env::var("ATTRIML_ENDPOINT")
            .map_err(|_| "Neither ~/.attriml/secrets.json nor ATTRIML_ENDPOINT is set")?;
        let api_key = std::env::var("ATTRIML_API_KEY")
            .map_err(|_| "ATTRIML_API_KEY is not set")?;
        let data_source = std::env::var("ATTRIML_DATA_SOURCE")
            .map_err(|_| "ATTRIML_DATA_SOURCE is not set")?;
        StoreConfig {
            endpoint,
            api_key,
            data_source,
            database: default_database(),
            collection: default_collection(),
        }
        .validated()
    }

    /// Parses a secrets JSON document into a validated config.
    pub fn from_json(raw: &str) -> Result<Self, Box<dyn Error>> {
        let config: StoreConfig = serde_json::from_str(raw)?;
        config.validated()
    }

    fn validated(self) -> Result<Self, Box<dyn Error>> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| format!("Invalid store endpoint '{}': {}", self.endpoint, e))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(format!(
                "Store endpoint must be http(s), got '{}'",
                url.scheme()
            )
            .into());
        }
        if self.api_key.is_empty() {
            return Err("Store api_key must not be empty".into());
        }
        Ok(self)
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}/action/{}", self.endpoint.trim_end_matches('/'), action)
    }
}

/// Connector for the student document store.
pub struct StoreConnect;

impl StoreConnect {
    async fn post_action(
        config: &StoreConfig,
        action: &str,
        body: Value,
    ) -> Result<Value, Box<dyn Error>> {
        let client = Client::new();
        let response = client
            .post(config.action_url(action))
            .header("api-key", &config.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(format!(
                "Store request '{}' failed with status {}",
                action,
                response.status()
            )
            .into());
        }
        let value: Value = response.json().await?;
        Ok(value)
    }

    /// Fetches every student document in the collection as raw JSON. Decoding and
    /// defaulting are the flattener's job, not the store boundary's.
    pub async fn find_all(config: &StoreConfig) -> Result<Vec<Value>, Box<dyn Error>> {
        let body = json!({
            "dataSource": config.data_source,
            "database": config.database,
            "collection": config.collection,
            "filter": {},
            "limit": FIND_LIMIT,
        });
        let value = Self::post_action(config, "find", body).await?;
        let documents = value["documents"]
            .as_array()
            .ok_or("Store response is missing the 'documents' array")?
            .clone();
        Ok(documents)
    }

    /// Counts the documents in the collection without transferring them.
    pub async fn count(config: &StoreConfig) -> Result<u64, Box<dyn Error>> {
        let body = json!({
            "dataSource": config.data_source,
            "database": config.database,
            "collection": config.collection,
            "pipeline": [{"$count": "total"}],
        });
        let value = Self::post_action(config, "aggregate", body).await?;
        let documents = value["documents"]
            .as_array()
            .ok_or("Store response is missing the 'documents' array")?;
        // An empty collection aggregates to no rows at all.
        let total = documents
            .first()
            .and_then(|doc| doc["total"].as_u64())
            .unwrap_or(0);
        Ok(total)
    }
}

use crate::offline::error::NetworkError;
use crate::offline::http::{Credentials, Request, Response};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;

/// Headers carrying the user's credentials; only sent with `credentials: include`.
const CREDENTIAL_HEADERS: [&str; 2] = ["cookie", "authorization"];

/// Outbound HTTP as seen by the controller.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// reqwest-backed network.
pub struct HttpNetwork {
    client: Client,
}

impl Default for HttpNetwork {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl HttpNetwork {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let mut builder = self
            .client
            .request(request.method.into(), request.url.clone());

        for (name, value) in &request.headers {
            let credential = CREDENTIAL_HEADERS.contains(&name.as_str());
            if credential && request.credentials != Credentials::Include {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
            source: Default::default(),
        })
    }
}

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;

use crate::core::config::Config;
use crate::core::error::{ApiError, FailureKind};

/// Every endpoint of the task service lives under this prefix.
pub const API_PREFIX: [&str; 2] = ["api", "v1"];

/// Shared HTTP transport for the task service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|err| ApiError::Request(format!("invalid base URL {:?}: {}", base_url, err)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Request(format!("invalid base URL {:?}", base_url.as_str())));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .default_headers(headers)
            .user_agent(concat!("queuedash/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::from_reqwest)?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(&config.api_base_url, config.api_token.clone(), config.timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds `<base>/api/v1/<segments...>`, percent-encoding each segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::Request(format!("invalid base URL {:?}", self.base_url.as_str())))?;
            path.pop_if_empty();
            path.extend(API_PREFIX.iter().copied());
            path.extend(segments.iter().copied());
        }
        Ok(url)
    }

    pub(crate) fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = match self.endpoint(segments) {
            Ok(url) => url,
            Err(err) => return Err(intercept(&format!("{} {}", method, self.base_url), err)),
        };
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        Ok(builder)
    }

    /// Sends the request and decodes a 2xx JSON body. Failures are
    /// classified and logged here, then handed back unchanged.
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let request = match builder.build() {
            Ok(request) => request,
            Err(err) => return Err(intercept("<unbuilt request>", ApiError::from_reqwest(err))),
        };
        let target = format!("{} {}", request.method(), request.url());
        debug!(request = %target, "Sending request");

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(err) => return Err(intercept(&target, ApiError::from_reqwest(err))),
        };

        decode::<T>(response).await.map_err(|err| intercept(&target, err))
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::from_response_body(status.as_u16(), &body));
    }
    let bytes = response.bytes().await.map_err(ApiError::from_reqwest)?;
    serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
}

fn intercept(target: &str, err: ApiError) -> ApiError {
    match err.kind() {
        FailureKind::Server => error!(
            kind = %FailureKind::Server,
            request = target,
            status = ?err.status(),
            error = %err,
            "Task service returned an error"
        ),
        FailureKind::Network => error!(
            kind = %FailureKind::Network,
            request = target,
            error = %err,
            "No response from task service"
        ),
        FailureKind::Local => error!(
            kind = %FailureKind::Local,
            request = target,
            error = %err,
            "Request could not be sent"
        ),
    }
    err
}

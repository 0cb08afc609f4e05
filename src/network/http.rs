use std::time::Duration;

use crate::http::{Method, Request, Response};
use crate::network::{Network, NetworkError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Network backed by a real HTTP client.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  /// Build a client with the default request timeout.
  pub fn new() -> Result<Self, NetworkError> {
    let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
    Ok(Self { client })
  }

  /// Wrap an existing client.
  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }
}

fn to_reqwest_method(method: &Method) -> Result<reqwest::Method, NetworkError> {
  match method {
    Method::Get => Ok(reqwest::Method::GET),
    Method::Head => Ok(reqwest::Method::HEAD),
    Method::Post => Ok(reqwest::Method::POST),
    Method::Other(name) => reqwest::Method::from_bytes(name.as_bytes())
      .map_err(|_| NetworkError::InvalidMethod(name.clone())),
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let response = self
      .client
      .request(to_reqwest_method(&request.method)?, request.url.clone())
      .send()
      .await?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|value| (name.as_str().to_string(), value.to_string()))
      })
      .collect();
    let body = response.bytes().await?.to_vec();

    tracing::debug!(url = %request.url, status, bytes = body.len(), "network response");
    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn maps_known_and_custom_methods() {
    assert_eq!(to_reqwest_method(&Method::Head).unwrap(), reqwest::Method::HEAD);
    assert_eq!(
      to_reqwest_method(&Method::Other("PATCH".into())).unwrap(),
      reqwest::Method::PATCH
    );
  }

  #[tokio::test]
  async fn invalid_method_is_an_error_not_a_get() {
    let network = HttpNetwork::new().unwrap();
    let request = Request::get(url::Url::parse("http://127.0.0.1:9/").unwrap())
      .with_method(Method::Other("BAD METHOD".into()));

    let result = network.fetch(&request).await;
    assert!(matches!(result, Err(NetworkError::InvalidMethod(name)) if name == "BAD METHOD"));
  }
}

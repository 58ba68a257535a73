//! Request/response values seen at the network boundary, and the fetch seam.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// What kind of resource a request is for, when the caller knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
  #[default]
  Unknown,
  Image,
}

/// One field of a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
  Text {
    name: String,
    value: String,
  },
  File {
    name: String,
    file_name: String,
    mime_type: String,
    bytes: Vec<u8>,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
  Json(serde_json::Value),
  Multipart(Vec<FormPart>),
}

#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
  pub headers: Vec<(String, String)>,
  pub body: Option<Body>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      destination: Destination::Unknown,
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_bearer(self, token: &str) -> Self {
    self.with_header("Authorization", format!("Bearer {}", token))
  }

  pub fn with_json(mut self, value: serde_json::Value) -> Self {
    self.body = Some(Body::Json(value));
    self
  }

  pub fn with_multipart(mut self, parts: Vec<FormPart>) -> Self {
    self.body = Some(Body::Multipart(parts));
    self
  }

  /// GET and HEAD only read; everything else may change server state.
  pub fn is_read(&self) -> bool {
    self.method == Method::GET || self.method == Method::HEAD
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  #[cfg(test)]
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// A JSON response with the given status.
  pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
    let body = serde_json::to_vec(value).unwrap_or_default();
    Self {
      status,
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body,
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  /// The request never got an answer
  #[error("network error: {0}")]
  Network(String),
  /// The request could not be built; sending it again will not help
  #[error("invalid request: {0}")]
  InvalidRequest(String),
}

/// Sends a request to the network.
#[async_trait]
pub trait Fetch: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// [`Fetch`] over reqwest.
pub struct HttpFetcher {
  http: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(timeout: Duration) -> Result<Self, FetchError> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
    Ok(Self { http })
  }
}

#[async_trait]
impl Fetch for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    let mut builder = self
      .http
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    match &request.body {
      Some(Body::Json(value)) => builder = builder.json(value),
      Some(Body::Multipart(parts)) => builder = builder.multipart(multipart_form(parts)?),
      None => {}
    }

    let response = builder
      .send()
      .await
      .map_err(|e| FetchError::Network(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| FetchError::Network(e.to_string()))?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

fn multipart_form(parts: &[FormPart]) -> Result<Form, FetchError> {
  let mut form = Form::new();
  for part in parts {
    form = match part {
      FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
      FormPart::File {
        name,
        file_name,
        mime_type,
        bytes,
      } => {
        let file = Part::bytes(bytes.clone())
          .file_name(file_name.clone())
          .mime_str(mime_type)
          .map_err(|e| FetchError::InvalidRequest(format!("bad MIME type '{}': {}", mime_type, e)))?;
        form.part(name.clone(), file)
      }
    };
  }
  Ok(form)
}

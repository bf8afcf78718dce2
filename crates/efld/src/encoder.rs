//! HTTP client for the external face descriptor service.

use async_trait::async_trait;
use efl_core::{ClassifierError, Descriptor, FaceEncoder};
use reqwest::{header, StatusCode};
use serde::Deserialize;
use std::time::Duration;

pub struct HttpEncoder {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct DescriptorResponse {
    descriptor: Vec<f32>,
}

impl HttpEncoder {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/descriptor", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl FaceEncoder for HttpEncoder {
    async fn derive_descriptor(&self, image: &[u8]) -> Result<Descriptor, ClassifierError> {
        let resp = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => {
                let body: DescriptorResponse = resp
                    .json()
                    .await
                    .map_err(|e| ClassifierError::Malformed(e.to_string()))?;
                if body.descriptor.is_empty() {
                    return Err(ClassifierError::Malformed("empty descriptor".into()));
                }
                Ok(Descriptor::new(body.descriptor))
            }
            StatusCode::UNPROCESSABLE_ENTITY => Err(ClassifierError::NoSingleFace),
            status => Err(ClassifierError::Unavailable(format!(
                "encoder returned {status}"
            ))),
        }
    }
}

use serde::Deserialize;
use std::time::Duration;

use crate::detect::recognizer::Recognizer;
use crate::error::RecognitionError;

/// Captioning service reached over HTTP.
///
/// The image is POSTed as the raw request body. The service may answer with
/// plain text or JSON in one of the shapes accepted by `parse_caption`.
pub struct HttpRecognizer {
    endpoint: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CaptionPayload {
    Caption { caption: String },
    Generated { generated_text: String },
    Batch(Vec<GeneratedText>),
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

impl HttpRecognizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Recognizer for HttpRecognizer {
    fn name(&self) -> &'static str {
        "http"
    }

    fn describe(&self, image: &[u8]) -> Result<String, RecognitionError> {
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/octet-stream")
            .send_bytes(image)
            .map_err(|e| RecognitionError::new(format!("{}: {}", self.endpoint, e)))?;
        let is_json = response.content_type().contains("json");
        let body = response
            .into_string()
            .map_err(|e| RecognitionError::new(format!("read caption response: {}", e)))?;
        parse_caption(&body, is_json)
    }
}

/// Extracts the caption from a recognizer response body.
pub(crate) fn parse_caption(body: &str, is_json: bool) -> Result<String, RecognitionError> {
    if !is_json {
        return Ok(body.trim().to_string());
    }
    let payload: CaptionPayload = serde_json::from_str(body)
        .map_err(|e| RecognitionError::new(format!("malformed caption response: {}", e)))?;
    match payload {
        CaptionPayload::Caption { caption } => Ok(caption),
        CaptionPayload::Generated { generated_text } => Ok(generated_text),
        CaptionPayload::Batch(items) => items
            .into_iter()
            .next()
            .map(|item| item.generated_text)
            .ok_or_else(|| RecognitionError::new("caption response contained no results")),
    }
}

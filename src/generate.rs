use std::time::Duration;

use base64::Engine as _;

use crate::{
    error::{LifelineError, LifelineResult},
    model::Diagram,
};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

const SYSTEM_PROMPT: &str = "\
You are an expert software architect and diagram generator.
Your task is to extract sequence diagram structures from user input (text description or image).
You must identify:
1. Actors (participants/lifelines)
2. Messages (interactions between actors in chronological order)

Return the result purely as a JSON object matching the requested schema.";

/// Generator configuration. The credential is injected (flag or environment);
/// this crate never persists it.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub api_key: String,
    pub text_model: String,
    pub image_model: String,
    pub api_base: String,
}

impl GeneratorConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Build a config from the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> LifelineResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| LifelineError::validation("GEMINI_API_KEY is not set"))?;
        if api_key.trim().is_empty() {
            return Err(LifelineError::validation("GEMINI_API_KEY is empty"));
        }
        Ok(Self::new(api_key))
    }
}

/// An image payload ready for the generator: MIME type plus base64 data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: String,
}

impl ImagePayload {
    /// Extract MIME type and base64 data from a `data:` URL.
    ///
    /// A missing MIME type defaults to `image/png`; a string without the
    /// `data:` scheme is taken as a bare base64 payload. An empty payload is
    /// a hard failure.
    pub fn from_data_url(url: &str) -> LifelineResult<Self> {
        let (mime_type, data) = match url.strip_prefix("data:") {
            Some(rest) => match rest.split_once(";base64,") {
                Some((mime, payload)) => {
                    let mime = if mime.is_empty() { "image/png" } else { mime };
                    (mime.to_string(), payload.to_string())
                }
                None => ("image/png".to_string(), String::new()),
            },
            None => ("image/png".to_string(), url.to_string()),
        };

        if data.is_empty() {
            return Err(LifelineError::generation("invalid image data"));
        }
        Ok(Self { mime_type, data })
    }

    /// Encode raw image bytes as a payload.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// Client for the external AI diagram generator.
///
/// The service is a black box with a request/response contract: it accepts a
/// credential plus free text or an image payload and must return a JSON
/// object with `actors` and `messages` arrays. Any failure leaves the
/// caller's diagram untouched.
pub struct DiagramGenerator {
    cfg: GeneratorConfig,
    http: reqwest::blocking::Client,
}

impl DiagramGenerator {
    pub fn new(cfg: GeneratorConfig) -> LifelineResult<Self> {
        if cfg.api_key.trim().is_empty() {
            return Err(LifelineError::validation("generator api key is empty"));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LifelineError::generation(format!("failed to build http client: {e}")))?;
        Ok(Self { cfg, http })
    }

    /// Generate a diagram from a free-text description.
    #[tracing::instrument(skip_all)]
    pub fn generate_from_text(&self, text: &str) -> LifelineResult<Diagram> {
        if text.trim().is_empty() {
            return Err(LifelineError::validation("description text is empty"));
        }
        let parts = serde_json::json!([{
            "text": format!("Generate a sequence diagram from this description: \"{text}\"")
        }]);
        self.request(&self.cfg.text_model, parts)
    }

    /// Generate a diagram from an image (e.g. a whiteboard photo or an
    /// existing diagram screenshot).
    #[tracing::instrument(skip_all)]
    pub fn generate_from_image(&self, payload: &ImagePayload) -> LifelineResult<Diagram> {
        let parts = serde_json::json!([
            {
                "inlineData": {
                    "mimeType": payload.mime_type,
                    "data": payload.data
                }
            },
            {
                "text": "Analyze this image and extract the sequence diagram structure (actors and messages)."
            }
        ]);
        self.request(&self.cfg.image_model, parts)
    }

    fn request(&self, model: &str, parts: serde_json::Value) -> LifelineResult<Diagram> {
        let url = format!("{}/models/{}:generateContent", self.cfg.api_base, model);
        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema()
            }
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.cfg.api_key.as_str())
            .json(&body)
            .send()
            .map_err(|e| LifelineError::generation(format!("generator request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(LifelineError::generation(format!(
                "generator returned {status}: {}",
                detail.trim()
            )));
        }

        let value: serde_json::Value = response
            .json()
            .map_err(|e| LifelineError::generation(format!("unreadable generator response: {e}")))?;

        let raw = extract_response_text(&value)
            .ok_or_else(|| LifelineError::generation("no data returned from generator"))?;
        parse_diagram_response(&raw)
    }
}

/// The JSON schema the generator must populate; mirrors the diagram model.
fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "actors": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "STRING" },
                        "name": { "type": "STRING" }
                    },
                    "required": ["id", "name"]
                }
            },
            "messages": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "STRING" },
                        "sourceId": { "type": "STRING" },
                        "targetId": { "type": "STRING" },
                        "label": { "type": "STRING" },
                        "order": { "type": "INTEGER" }
                    },
                    "required": ["id", "sourceId", "targetId", "label", "order"]
                }
            }
        },
        "required": ["actors", "messages"]
    })
}

/// First textual payload of the response: the top-level `text` convenience
/// field if present, otherwise the first text part of the first candidate.
fn extract_response_text(response: &serde_json::Value) -> Option<String> {
    if let Some(text) = response.get("text").and_then(|t| t.as_str()) {
        return Some(text.to_string());
    }

    response
        .pointer("/candidates/0/content/parts")?
        .as_array()?
        .iter()
        .find_map(|part| part.get("text").and_then(|t| t.as_str()))
        .map(str::to_string)
}

/// Strip surrounding Markdown code-fence markers (```` ```json … ``` ````)
/// the generator sometimes wraps its JSON in.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Parse the generator's textual response into a [`Diagram`]. A parse
/// failure is a hard acquisition failure.
pub fn parse_diagram_response(raw: &str) -> LifelineResult<Diagram> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(cleaned)
        .map_err(|e| LifelineError::generation(format!("malformed diagram JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped_case_insensitively() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```JSON\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn parse_accepts_fenced_diagram_json() {
        let raw = "```json\n{\"actors\":[{\"id\":\"a\",\"name\":\"A\"}],\"messages\":[]}\n```";
        let diagram = parse_diagram_response(raw).unwrap();
        assert_eq!(diagram.actors.len(), 1);
        assert!(diagram.messages.is_empty());
    }

    #[test]
    fn parse_rejects_non_json_payload() {
        assert!(matches!(
            parse_diagram_response("sorry, I cannot help with that"),
            Err(LifelineError::Generation(_))
        ));
    }

    #[test]
    fn data_url_splits_mime_and_payload() {
        let payload = ImagePayload::from_data_url("data:image/jpeg;base64,AAAA").unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!(payload.data, "AAAA");
    }

    #[test]
    fn bare_payload_defaults_to_png() {
        let payload = ImagePayload::from_data_url("AAAA").unwrap();
        assert_eq!(payload.mime_type, "image/png");
        assert_eq!(payload.data, "AAAA");
    }

    #[test]
    fn empty_image_data_is_a_hard_failure() {
        assert!(ImagePayload::from_data_url("data:image/png;base64,").is_err());
        assert!(ImagePayload::from_data_url("").is_err());
    }

    #[test]
    fn from_bytes_round_trips_through_base64() {
        let payload = ImagePayload::from_bytes("image/png", b"\x89PNG");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(payload.data.as_bytes())
            .unwrap();
        assert_eq!(decoded, b"\x89PNG");
    }

    #[test]
    fn response_text_prefers_direct_then_candidates() {
        let direct = serde_json::json!({ "text": "{}" });
        assert_eq!(extract_response_text(&direct), Some("{}".to_string()));

        let nested = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "inlineData": {} }, { "text": "{\"x\":1}" }] }
            }]
        });
        assert_eq!(extract_response_text(&nested), Some("{\"x\":1}".to_string()));

        let empty = serde_json::json!({ "candidates": [] });
        assert_eq!(extract_response_text(&empty), None);
    }
}

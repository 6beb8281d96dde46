//! Wire shapes for the `streamGenerateContent` endpoint.
//!
//! The endpoint delivers loosely-shaped chunks (parts arrays, optional
//! fields). They are decoded into these typed structs and then mapped into
//! the closed `Fragment` union exactly once, here at the boundary.

use base64::Engine;
use serde::{Deserialize, Serialize};

use storyboard_core::Fragment;

/// Content container used in both requests and responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Untagged union of text and inline media parts.
///
/// Variant order matters for `#[serde(untagged)]` decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: InlineData,
    },
}

/// Base64 inline payload carrying generated or uploaded images.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Top-level request body for `streamGenerateContent`.
#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

/// One SSE chunk of a streamed response.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

impl Part {
    /// Map one wire part into a fragment. Inline data with an undecodable
    /// payload is dropped here with a warning rather than poisoning the
    /// stream.
    pub fn into_fragment(self) -> Option<Fragment> {
        match self {
            Part::Text { text } => Some(Fragment::Text { content: text }),
            Part::InlineData { inline_data } => {
                match base64::engine::general_purpose::STANDARD.decode(&inline_data.data) {
                    Ok(bytes) => Some(Fragment::Image {
                        bytes,
                        media_type: inline_data.mime_type,
                    }),
                    Err(err) => {
                        tracing::warn!(
                            "skipping {} part with undecodable inline data: {err}",
                            inline_data.mime_type
                        );
                        None
                    }
                }
            }
        }
    }
}

impl StreamChunk {
    /// All fragments carried by this chunk, in wire order.
    pub fn into_fragments(self) -> Vec<Fragment> {
        self.candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(Part::into_fragment)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_part_decodes_to_text_fragment() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"A cat."}]}}]}"#,
        )
        .unwrap();
        assert_eq!(
            chunk.into_fragments(),
            vec![Fragment::Text {
                content: "A cat.".to_string()
            }]
        );
    }

    #[test]
    fn inline_data_part_decodes_to_image_fragment() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"png-bytes");
        let json = format!(
            r#"{{"candidates":[{{"content":{{"parts":[{{"inlineData":{{"mimeType":"image/png","data":"{encoded}"}}}}]}}}}]}}"#
        );
        let chunk: StreamChunk = serde_json::from_str(&json).unwrap();
        assert_eq!(
            chunk.into_fragments(),
            vec![Fragment::Image {
                bytes: b"png-bytes".to_vec(),
                media_type: "image/png".to_string()
            }]
        );
    }

    #[test]
    fn bad_inline_payload_is_skipped() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"inlineData":{"mimeType":"image/png","data":"%%%"}}]}}]}"#,
        )
        .unwrap();
        assert!(chunk.into_fragments().is_empty());
    }

    #[test]
    fn chunk_without_candidates_yields_nothing() {
        let chunk: StreamChunk = serde_json::from_str(r#"{}"#).unwrap();
        assert!(chunk.into_fragments().is_empty());

        let chunk: StreamChunk =
            serde_json::from_str(r#"{"candidates":[{"content":null}]}"#).unwrap();
        assert!(chunk.into_fragments().is_empty());
    }

    #[test]
    fn mixed_parts_preserve_wire_order() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"x");
        let json = format!(
            r#"{{"candidates":[{{"content":{{"parts":[{{"text":"Before."}},{{"inlineData":{{"mimeType":"image/png","data":"{encoded}"}}}},{{"text":"After."}}]}}}}]}}"#
        );
        let chunk: StreamChunk = serde_json::from_str(&json).unwrap();
        let fragments = chunk.into_fragments();
        assert_eq!(fragments.len(), 3);
        assert!(matches!(fragments[0], Fragment::Text { .. }));
        assert!(matches!(fragments[1], Fragment::Image { .. }));
        assert!(matches!(fragments[2], Fragment::Text { .. }));
    }
}

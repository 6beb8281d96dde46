use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver};

use crate::wire::{Content, GenerateContentRequest, InlineData, Part, StreamChunk};
use storyboard_common::GenerationRequest;
use storyboard_core::{Config, FragmentSource, StreamEvent};

/// Standing instructions appended to every prompt so the model interleaves
/// one illustration after each sentence of the story.
const STYLE_INSTRUCTIONS: &str = "\
Tell the story as a sequence of short, punchy sentences.
After every single sentence, generate one matching illustration: minimalist \
black ink on white, simple and expressive.
No introduction and no commentary; start the story immediately and keep \
sentences and illustrations coming until it is complete.";

/// Streaming client for the `streamGenerateContent` endpoint.
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, config: &Config) -> Self {
        Self {
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request_body(&self, request: &GenerationRequest) -> GenerateContentRequest {
        let mut parts = vec![Part::Text {
            text: format!("{}\n\n{STYLE_INSTRUCTIONS}", request.prompt),
        }];
        if let Some(attachment) = &request.attachment {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: attachment.media_type.clone(),
                    data: attachment.data.clone(),
                },
            });
        }
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
        }
    }
}

#[async_trait]
impl FragmentSource for GeminiClient {
    async fn stream(&self, request: GenerationRequest) -> Result<Receiver<StreamEvent>> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let body = self.request_body(&request);

        let client = reqwest::Client::new();
        let resp = client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("generation request failed ({status}): {}", parse_api_error(&text)));
        }

        let stream = resp.bytes_stream();
        let (tx, rx) = mpsc::channel::<StreamEvent>(64);
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let mut buf: Vec<u8> = Vec::new();
            let mut stream = Box::pin(stream);
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buf.extend_from_slice(&bytes);
                        // SSE frames are separated by a blank line.
                        while let Some(pos) = memchr::memmem::find(&buf, b"\n\n") {
                            let frame: Vec<u8> = buf.drain(..pos + 2).collect();
                            let Ok(text) = String::from_utf8(frame) else {
                                continue;
                            };
                            for line in text.lines() {
                                let line = line.trim_start();
                                let Some(rest) = line.strip_prefix("data: ") else {
                                    continue;
                                };
                                if rest == "[DONE]" {
                                    let _ = tx.send(StreamEvent::Completed).await;
                                    return;
                                }
                                match serde_json::from_str::<StreamChunk>(rest) {
                                    Ok(chunk) => {
                                        for fragment in chunk.into_fragments() {
                                            if tx
                                                .send(StreamEvent::Fragment(fragment))
                                                .await
                                                .is_err()
                                            {
                                                return;
                                            }
                                        }
                                    }
                                    Err(err) => {
                                        tracing::warn!("skipping malformed stream chunk: {err}");
                                    }
                                }
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                        return;
                    }
                }
            }
            let _ = tx.send(StreamEvent::Completed).await;
        });
        Ok(rx)
    }
}

/// Pull the human-readable message out of an API error body, falling back
/// to the raw text.
fn parse_api_error(body: &str) -> String {
    if let Some(start) = body.find(r#"{"error":"#) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body[start..]) {
            if let Some(message) = value["error"]["message"].as_str() {
                return message.to_string();
            }
        }
    }
    body.to_string()
}

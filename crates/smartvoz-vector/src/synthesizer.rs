//! Answer synthesis over retrieved evidence.
//!
//! Synthesis is presentation only. Validation decisions are taken on the
//! typed [`EvidenceHit`] fields before any text produced here is used.
//! Answers may be read to callers, so they never name individual clients;
//! the raw evidence text is for operators.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use smartvoz_core::error::{Result, SmartvozError};
use smartvoz_core::types::DocumentKind;

use crate::gateway::EvidenceHit;

/// Answer used when retrieval produced no evidence at all.
pub const NO_EVIDENCE_ANSWER: &str = "No se encontró información relacionada.";

/// Turns a query plus evidence into a short answer text.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Whether answers are written for the caller's question rather than
    /// summarised from evidence metadata.
    fn is_generative(&self) -> bool {
        false
    }

    async fn synthesize(&self, query: &str, hits: &[EvidenceHit], evidence: &str)
        -> Result<String>;
}

// ---------------------------------------------------------------------------
// ExtractiveSynthesizer
// ---------------------------------------------------------------------------

/// Deterministic synthesizer that summarises each hit from its typed fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSynthesizer;

impl ExtractiveSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous variant, also used as the fallback when another
    /// synthesizer fails.
    pub fn summarize(&self, hits: &[EvidenceHit]) -> String {
        if hits.is_empty() {
            return NO_EVIDENCE_ANSWER.to_string();
        }
        hits.iter()
            .map(summarize_hit)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn summarize_hit(hit: &EvidenceHit) -> String {
    match hit.matched_type {
        DocumentKind::Company => format!("Empresa registrada: {}.", hit.matched_name),
        DocumentKind::Client => {
            let companies = join_names(hit.companies.iter().map(|c| c.name.as_str()));
            format!("Hay un cliente registrado asociado a {}.", companies)
        }
        DocumentKind::ClientGroup => format!(
            "La empresa {} tiene {} clientes registrados.",
            hit.matched_name,
            hit.clients.len()
        ),
        DocumentKind::ServiceGroup => {
            if hit.services.is_empty() {
                format!("La empresa {} no tiene servicios registrados.", hit.matched_name)
            } else {
                format!(
                    "Servicios de {}: {}.",
                    hit.matched_name,
                    join_names(hit.services.iter().map(String::as_str))
                )
            }
        }
        DocumentKind::Protocol => match &hit.protocol {
            Some(protocol) if !protocol.steps.is_empty() => {
                let steps: Vec<String> = protocol
                    .steps
                    .iter()
                    .enumerate()
                    .map(|(i, s)| format!("{}. {}", i + 1, s.text))
                    .collect();
                format!("Protocolo {}: {}", hit.matched_name, steps.join(" "))
            }
            _ => format!("Protocolo {} sin pasos registrados.", hit.matched_name),
        },
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let names: Vec<&str> = names.collect();
    match names.len() {
        0 => "ninguna empresa".to_string(),
        1 => names[0].to_string(),
        n => format!("{} y {}", names[..n - 1].join(", "), names[n - 1]),
    }
}

#[async_trait]
impl AnswerSynthesizer for ExtractiveSynthesizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn synthesize(
        &self,
        _query: &str,
        hits: &[EvidenceHit],
        _evidence: &str,
    ) -> Result<String> {
        Ok(self.summarize(hits))
    }
}

// ---------------------------------------------------------------------------
// OpenAiChatSynthesizer
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "Eres el asistente de un centro de atención telefónica. \
Responde en español, en dos o tres frases, usando SOLO la evidencia entregada. \
Propón pasos concretos para resolver el problema del cliente. Si la evidencia no contiene \
la respuesta, dilo. No inventes datos de clientes ni de empresas, nunca menciones nombres de \
clientes y no menciones otras empresas ni sus registros.";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// Synthesizer backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatSynthesizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiChatSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatSynthesizer")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiChatSynthesizer {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SmartvozError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn build_prompt(query: &str, evidence: &str) -> String {
        format!("Pregunta: {}\n\nEvidencia:\n{}\n\nRespuesta:", query, evidence)
    }
}

#[async_trait]
impl AnswerSynthesizer for OpenAiChatSynthesizer {
    fn name(&self) -> &str {
        "openai-chat"
    }

    fn is_generative(&self) -> bool {
        true
    }

    async fn synthesize(
        &self,
        query: &str,
        hits: &[EvidenceHit],
        evidence: &str,
    ) -> Result<String> {
        if hits.is_empty() {
            return Ok(NO_EVIDENCE_ANSWER.to_string());
        }
        let prompt = Self::build_prompt(query, evidence);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SmartvozError::Provider(format!("Chat request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SmartvozError::Provider(format!(
                "Chat API error {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SmartvozError::Provider(format!("Failed to parse chat response: {}", e)))?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SmartvozError::Provider("Empty response from chat model".to_string()))?;
        debug!(model = %self.model, chars = answer.len(), "Synthesized answer");
        Ok(answer)
    }
}

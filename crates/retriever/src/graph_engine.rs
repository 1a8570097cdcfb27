//! Client for an out-of-process graph/index engine.
//!
//! The engine answers `context_at_position` requests; transport framing is its own business.
//! [`ChannelGraphEngine`] hands requests to whatever task owns the connection.

use crate::error::{Result, RetrieverError};
use crate::retriever::{ContextRetriever, RetrieverOptions};
use async_trait::async_trait;
use context_protocol::{
    base_language_id, pack_snippets, ContextAtPositionRequest, ContextAtPositionResponse,
    ContextSnippet, RetrieverIdentifier,
};
use tokio::sync::{mpsc, oneshot};

#[async_trait]
pub trait GraphEngine: Send + Sync {
    async fn context_at_position(
        &self,
        request: ContextAtPositionRequest,
    ) -> Result<ContextAtPositionResponse>;
}

/// One request in flight to the engine task.
#[derive(Debug)]
pub struct EngineRequest {
    pub request: ContextAtPositionRequest,
    pub reply: oneshot::Sender<std::result::Result<ContextAtPositionResponse, String>>,
}

#[derive(Debug, Clone)]
pub struct ChannelGraphEngine {
    requests: mpsc::Sender<EngineRequest>,
}

impl ChannelGraphEngine {
    /// Returns the engine handle plus the receiving end the engine task serves.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<EngineRequest>) {
        let (requests, receiver) = mpsc::channel(buffer.max(1));
        (Self { requests }, receiver)
    }
}

#[async_trait]
impl GraphEngine for ChannelGraphEngine {
    async fn context_at_position(
        &self,
        request: ContextAtPositionRequest,
    ) -> Result<ContextAtPositionResponse> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(EngineRequest { request, reply })
            .await
            .map_err(|_| RetrieverError::EngineClosed)?;
        response
            .await
            .map_err(|_| RetrieverError::EngineClosed)?
            .map_err(RetrieverError::Engine)
    }
}

/// Exposes a [`GraphEngine`] as a context retriever for the languages it indexes.
pub struct GraphEngineRetriever<E> {
    engine: E,
    languages: Vec<String>,
}

impl<E: GraphEngine> GraphEngineRetriever<E> {
    pub fn new(engine: E, languages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            engine,
            languages: languages.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl<E: GraphEngine> ContextRetriever for GraphEngineRetriever<E> {
    fn identifier(&self) -> RetrieverIdentifier {
        RetrieverIdentifier::GraphEngine
    }

    async fn retrieve(&self, options: &RetrieverOptions) -> Result<Vec<ContextSnippet>> {
        let request = ContextAtPositionRequest {
            uri: options.document.uri.clone(),
            content: options.document.text.clone(),
            position: options.position,
            max_chars: options.hints.max_chars,
            context_range: options.context_range,
        };
        let response = tokio::select! {
            () = options.cancel.cancelled() => return Err(RetrieverError::Aborted),
            response = self.engine.context_at_position(request) => response?,
        };

        let candidates = response
            .symbols
            .into_iter()
            .map(ContextSnippet::Symbol)
            .chain(response.files.into_iter().map(ContextSnippet::File))
            .map(|snippet| snippet.with_identifier(RetrieverIdentifier::GraphEngine));
        Ok(pack_snippets(candidates, options.hints.max_chars))
    }

    fn is_supported_for_language_id(&self, language_id: &str) -> bool {
        let base = base_language_id(language_id);
        self.languages.iter().any(|language| language == base)
    }
}

use crate::config::ContextConfig;
use crate::provider::{workspace_uri, SessionGraphProvider};
use crate::session::{Session, Step};
use anyhow::{anyhow, Context as AnyhowContext, Result};
use context_completions_cache::{CachedCompletions, Completion, CompletionsCache};
use context_graph::{GraphSectionRetriever, SectionObserver, TopLevelSectionProvider};
use context_mixer::ContextMixer;
use context_protocol::{
    ContentChange, ContextSnippet, ContextSummary, DocumentState, Position, Range, RetrieverIdentifier,
    TextDocument, Uri,
};
use context_retriever::{
    CachedRetriever, ContextRetriever, EditorEvent, EditorEventHandler, EditorHost, JaccardSimilarityStrategy,
    MemoryEditorHost, RecentEditsRetriever, RetrieverHints, RetrieverOptions,
};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// One JSON line of replay output
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepOutput {
    Context {
        path: String,
        snippets: Vec<ContextSnippet>,
        summary: ContextSummary,
    },
    CacheGet {
        path: String,
        hit: Option<CachedCompletions>,
    },
    Sections {
        tree: String,
    },
}

/// Drives the whole pipeline from a recorded session against an in-memory editor.
pub struct Replay {
    root: String,
    host: Arc<MemoryEditorHost>,
    handlers: Vec<Arc<dyn EditorEventHandler>>,
    observer: Arc<SectionObserver>,
    jaccard: CachedRetriever<JaccardSimilarityStrategy>,
    mixer: ContextMixer,
    completions: CompletionsCache,
    config: ContextConfig,
}

impl Replay {
    pub async fn new(session: &Session, config: ContextConfig) -> Result<Self> {
        let host = Arc::new(MemoryEditorHost::new(Some(session.root.clone())));
        let editor: Arc<dyn EditorHost> = host.clone();

        let observer = Arc::new(SectionObserver::new(
            editor.clone(),
            Arc::new(TopLevelSectionProvider),
            Arc::new(SessionGraphProvider::new(&session.root, &session.symbols)),
            config.section_observer.clone(),
        ));
        let jaccard = CachedRetriever::new(
            JaccardSimilarityStrategy::new(config.jaccard.clone()),
            editor.clone(),
            &config.cached_retriever,
        );
        let recent_edits = Arc::new(RecentEditsRetriever::new(editor, &config.recent_edits));

        let mut retrievers: Vec<Arc<dyn ContextRetriever>> = Vec::new();
        for identifier in &config.retrievers {
            match identifier {
                RetrieverIdentifier::JaccardSimilarity => retrievers.push(Arc::new(jaccard.clone())),
                RetrieverIdentifier::RecentEdits => retrievers.push(recent_edits.clone()),
                RetrieverIdentifier::GraphSection => {
                    retrievers.push(Arc::new(GraphSectionRetriever::new(observer.clone())));
                }
                other => log::warn!("{} is not available in replays, skipping", other.as_str()),
            }
        }
        let mixer = ContextMixer::new(retrievers, config.mixer.clone())?;
        let handlers: Vec<Arc<dyn EditorEventHandler>> =
            vec![Arc::new(jaccard.clone()), recent_edits, observer.clone()];

        let mut replay = Self {
            root: session.root.clone(),
            handlers,
            host,
            observer,
            jaccard,
            mixer,
            completions: CompletionsCache::new(config.completions_cache),
            config,
        };

        for document in &session.documents {
            replay
                .step(&Step::Open {
                    path: document.path.clone(),
                    language_id: document.language_id.clone(),
                    text: document.text.clone(),
                })
                .await?;
        }
        replay
            .step(&Step::Visible {
                paths: session.visible.clone(),
            })
            .await?;
        Ok(replay)
    }

    /// Run `steps` in order, writing one JSON line per step that produces output.
    pub async fn run(&mut self, steps: &[Step], out: &mut impl Write) -> Result<()> {
        for (index, step) in steps.iter().enumerate() {
            let output = self
                .step(step)
                .await
                .with_context(|| format!("Step {} failed", index + 1))?;
            if let Some(output) = output {
                writeln!(out, "{}", serde_json::to_string(&output)?)?;
            }
        }
        out.flush()?;
        Ok(())
    }

    pub async fn step(&mut self, step: &Step) -> Result<Option<StepOutput>> {
        match step {
            Step::Open {
                path,
                language_id,
                text,
            } => {
                let document = TextDocument::new(self.uri(path), language_id.clone(), text.clone());
                let event = self.host.open(document);
                self.dispatch(&event).await;
            }
            Step::Change { path, range, text } => {
                let event = self.host.change(
                    &self.uri(path),
                    vec![ContentChange {
                        range: *range,
                        text: text.clone(),
                    }],
                )?;
                self.dispatch(&event).await;
            }
            Step::Select { path, line, character } => {
                let event = self.host.select(&self.uri(path), Position::new(*line, *character))?;
                self.dispatch(&event).await;
            }
            Step::Visible { paths } => {
                let uris: Vec<Uri> = paths.iter().map(|path| self.uri(path)).collect();
                let event = self.host.set_visible(&uris);
                self.dispatch(&event).await;
            }
            Step::Rename { from, to } => {
                let event = self.host.rename(&self.uri(from), &self.uri(to));
                self.dispatch(&event).await;
            }
            Step::Delete { path } => {
                let event = self.host.delete(&self.uri(path));
                self.dispatch(&event).await;
            }
            Step::Context {
                path,
                line,
                character,
                max_chars,
            } => {
                let document = self.document(path)?;
                let options = RetrieverOptions::new(
                    document,
                    Position::new(*line, *character),
                    self.config.cached_retriever.context_size,
                )
                .with_hints(RetrieverHints {
                    max_chars: max_chars.unwrap_or(self.config.max_chars),
                    ..RetrieverHints::default()
                });
                let range = prompt_range(&options.document, &options.doc_state);
                let options = options.with_context_range(Some(range));

                let mixed = self.mixer.get_context(&options).await?;
                return Ok(Some(StepOutput::Context {
                    path: path.clone(),
                    snippets: mixed.snippets,
                    summary: mixed.summary,
                }));
            }
            Step::CacheAdd {
                path,
                line,
                character,
                log_id,
                completions,
            } => {
                let state = self.document_state(path, Position::new(*line, *character))?;
                let completions: Vec<Completion> = completions.iter().map(Completion::new).collect();
                self.completions.add(log_id, &state, &completions);
            }
            Step::CacheGet { path, line, character } => {
                let state = self.document_state(path, Position::new(*line, *character))?;
                return Ok(Some(StepOutput::CacheGet {
                    path: path.clone(),
                    hit: self.completions.get(&state),
                }));
            }
            Step::Sections => {
                return Ok(Some(StepOutput::Sections {
                    tree: self.observer.debug_print(None, &[]),
                }));
            }
            Step::SleepMs { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
        }
        Ok(None)
    }

    pub fn dispose(&self) {
        self.observer.dispose();
        self.jaccard.dispose();
    }

    async fn dispatch(&self, event: &EditorEvent) {
        for handler in &self.handlers {
            handler.handle_event(event).await;
        }
    }

    fn uri(&self, path: &str) -> Uri {
        workspace_uri(&self.root, path)
    }

    fn document(&self, path: &str) -> Result<TextDocument> {
        self.host
            .document(&self.uri(path))
            .ok_or_else(|| anyhow!("Unknown document {path}"))
    }

    fn document_state(&self, path: &str, position: Position) -> Result<DocumentState> {
        let sizes = self.config.cached_retriever.context_size;
        let document = self.document(path)?;
        Ok(DocumentState::from_document(
            &document,
            position,
            sizes.prefix_chars,
            sizes.suffix_chars,
        ))
    }
}

/// Lines already covered by the prompt's prefix and suffix.
fn prompt_range(document: &TextDocument, state: &DocumentState) -> Range {
    let start = document.position_at(state.position.saturating_sub(state.prefix.len()));
    let end = document.position_at(state.position + state.suffix.len());
    Range { start, end }
}

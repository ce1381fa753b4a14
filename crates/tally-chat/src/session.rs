//! Chat session: one streamed request/response cycle at a time

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::StreamExt;
use parking_lot::Mutex;
use tally_ai::{
    ChatMessage, ChunkStream, CompletionApi, CompletionRequest, CurrencyConverter, TokenUsage,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    cost::{CostCalculator, PricingTable},
    error::{Error, Result},
    events::{ChatEvent, SessionPhase},
    handle::SessionHandle,
    storage::KeyValueStorage,
    store::{STORAGE_KEY, SharedStore, Thread, ThreadId, Turn},
    title::{DEFAULT_TITLE_LANGUAGE, DEFAULT_TITLE_MODEL, TitleSynthesizer},
};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Prior turns sent as context with each request
    pub context_turns: usize,
    /// Currency costs are stored and shown in
    pub display_currency: String,
    pub title_model: String,
    pub title_language: String,
    /// Longest allowed silence between two chunks
    pub stream_timeout: Duration,
    pub conversion_timeout: Duration,
    /// Longest wait for a synthesized title before keeping the placeholder
    pub title_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context_turns: 9,
            display_currency: "JPY".to_string(),
            title_model: DEFAULT_TITLE_MODEL.to_string(),
            title_language: DEFAULT_TITLE_LANGUAGE.to_string(),
            stream_timeout: Duration::from_secs(60),
            conversion_timeout: Duration::from_secs(10),
            title_timeout: Duration::from_secs(20),
        }
    }
}

/// The answer being streamed. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingState {
    pub partial_content: String,
    pub is_active: bool,
}

impl StreamingState {
    fn begin(&mut self) {
        self.partial_content.clear();
        self.is_active = true;
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// How a successful submit ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The answer was committed at `thread_index`
    Committed {
        thread_index: usize,
        turn: Turn,
        /// Whether the final save succeeded
        persisted: bool,
    },
    /// The thread was deleted while the answer streamed; nothing was written
    Dropped,
}

/// The request/response controller
pub struct ChatSession {
    config: SessionConfig,
    store: SharedStore,
    api: Arc<dyn CompletionApi>,
    storage: Arc<dyn KeyValueStorage>,
    cost: CostCalculator,
    titles: TitleSynthesizer,
    event_tx: broadcast::Sender<ChatEvent>,
    handle: SessionHandle,
    streaming: Mutex<StreamingState>,
    phase: Mutex<SessionPhase>,
    // Orders snapshot + write pairs so an older snapshot never lands last
    persist_lock: tokio::sync::Mutex<()>,
    /// Successful writes so far
    persists: AtomicU64,
}

impl ChatSession {
    pub fn new(
        config: SessionConfig,
        store: SharedStore,
        api: Arc<dyn CompletionApi>,
        converter: Arc<dyn CurrencyConverter>,
        storage: Arc<dyn KeyValueStorage>,
        pricing: PricingTable,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let cost = CostCalculator::new(
            pricing,
            converter,
            config.display_currency.clone(),
            config.conversion_timeout,
        );
        let titles = TitleSynthesizer::new(
            Arc::clone(&api),
            config.title_model.clone(),
            config.title_language.clone(),
        );
        Self {
            config,
            store,
            api,
            storage,
            cost,
            titles,
            event_tx,
            handle: SessionHandle::new(),
            streaming: Mutex::new(StreamingState::default()),
            phase: Mutex::new(SessionPhase::Idle),
            persist_lock: tokio::sync::Mutex::new(()),
            persists: AtomicU64::new(0),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    pub fn pricing(&self) -> &PricingTable {
        self.cost.pricing()
    }

    pub fn display_currency(&self) -> &str {
        self.cost.display_currency()
    }

    /// Get a cloneable handle for aborting from outside
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    /// Snapshot of the in-progress answer
    pub fn streaming(&self) -> StreamingState {
        self.streaming.lock().clone()
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.lock() = phase;
        self.emit(ChatEvent::Phase { phase });
    }

    /// Write the whole store to durable storage
    pub async fn persist(&self) -> Result<()> {
        let _order = self.persist_lock.lock().await;
        let json = self.store.lock().to_json()?;
        self.storage.set(STORAGE_KEY, &json).await?;
        self.persists.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(bytes = json.len(), "persisted conversation store");
        self.emit(ChatEvent::Persisted);
        Ok(())
    }

    /// Add an empty thread at the front, make it active, and persist
    pub async fn new_thread(&self) -> Result<usize> {
        self.store.lock().add_thread();
        self.persist().await?;
        Ok(0)
    }

    /// Delete a thread and persist
    pub async fn delete_thread(&self, index: usize) -> Result<Thread> {
        let removed = self.store.lock().delete_thread(index)?;
        tracing::info!(index, title = %removed.title, "deleted thread");
        self.persist().await?;
        Ok(removed)
    }

    /// Change the active thread
    pub fn select_thread(&self, index: usize) -> Result<()> {
        self.store.lock().select(index)
    }

    /// Send `user_text` on a thread and stream the answer into it
    pub async fn submit(
        &self,
        thread_index: usize,
        user_text: &str,
        model_id: &str,
    ) -> Result<SubmitOutcome> {
        let guard = self.handle.try_begin().ok_or(Error::Busy)?;

        self.set_phase(SessionPhase::Submitting);
        let result = self
            .run_cycle(thread_index, user_text, model_id, guard.token())
            .await;
        self.streaming.lock().reset();

        match &result {
            Ok(SubmitOutcome::Committed { .. }) => {}
            Ok(SubmitOutcome::Dropped) => self.set_phase(SessionPhase::Idle),
            Err(e) => {
                tracing::warn!("Submit failed: {}", e);
                self.set_phase(SessionPhase::Failed);
                self.emit(ChatEvent::Error {
                    message: e.to_string(),
                });
            }
        }
        self.emit(ChatEvent::SubmitEnd);
        drop(guard);

        result
    }

    async fn run_cycle(
        &self,
        thread_index: usize,
        user_text: &str,
        model_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SubmitOutcome> {
        if !self.cost.pricing().contains(model_id) {
            return Err(Error::UnknownModel(model_id.to_string()));
        }

        let user_turn = Turn::user(user_text, model_id);
        let persists_before = self.persists.load(Ordering::Acquire);
        let (thread_id, prior_len, context) = {
            let mut store = self.store.lock();
            let len = store.len();
            let thread = store.thread(thread_index).ok_or_else(|| {
                Error::InvalidState(format!(
                    "no thread at index {} ({} threads)",
                    thread_index, len
                ))
            })?;
            let id = thread.id();
            let prior_len = thread.turns.len();
            let context = context_window(&thread.turns, user_text, self.config.context_turns);
            store.commit_turn(thread_index, user_turn.clone())?;
            (id, prior_len, context)
        };
        self.emit(ChatEvent::SubmitStart {
            thread_index,
            user_turn,
        });

        let result = self
            .stream_and_commit(thread_id, user_text, model_id, context, cancel)
            .await;
        if result.is_err() {
            self.store.lock().truncate_turns(thread_id, prior_len);
            // A save made while streaming wrote the pending user turn
            if self.persists.load(Ordering::Acquire) != persists_before {
                if let Err(e) = self.persist().await {
                    tracing::warn!("Failed to save rolled-back conversations: {}", e);
                }
            }
        }
        result
    }

    async fn stream_and_commit(
        &self,
        thread_id: ThreadId,
        user_text: &str,
        model_id: &str,
        context: Vec<ChatMessage>,
        cancel: &CancellationToken,
    ) -> Result<SubmitOutcome> {
        let request = CompletionRequest::new(model_id, context).with_usage();
        tracing::debug!(model = model_id, messages = request.messages.len(), "submitting");

        let stream = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Aborted),
            opened = self.api.stream(&request) => opened.map_err(Error::Network)?,
        };

        self.streaming.lock().begin();
        self.set_phase(SessionPhase::Streaming);
        let (content, usage) = self.consume(stream, cancel).await?;

        self.set_phase(SessionPhase::Finalizing);
        let cost = match usage {
            Some(usage) => tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Aborted),
                cost = self.cost.compute_cost(
                    model_id,
                    usage.prompt_tokens,
                    usage.completion_tokens,
                ) => cost?,
            },
            None => {
                tracing::debug!("stream ended without usage; recording zero cost");
                0.0
            }
        };

        let turn = Turn::assistant(content, model_id, cost);
        let committed = {
            let mut store = self.store.lock();
            match store.index_of(thread_id) {
                Some(index) => store.commit_turn(index, turn.clone()).map(|_| Some(index)),
                None => Ok(None),
            }
        }?;
        let Some(thread_index) = committed else {
            tracing::warn!("Thread deleted while streaming; dropping the answer");
            self.emit(ChatEvent::Dropped);
            return Ok(SubmitOutcome::Dropped);
        };

        tracing::info!(thread_index, model = model_id, cost, "committed answer");
        self.set_phase(SessionPhase::Committed);
        self.emit(ChatEvent::TurnCommitted {
            thread_index,
            turn: turn.clone(),
        });

        self.maybe_retitle(thread_id, user_text, cancel).await;

        let persisted = match self.persist().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to save conversations: {}", e);
                self.emit(ChatEvent::Error {
                    message: format!("Failed to save conversations: {}", e),
                });
                false
            }
        };

        // Title synthesis may have run while threads were added or removed
        let thread_index = self
            .store
            .lock()
            .index_of(thread_id)
            .unwrap_or(thread_index);
        Ok(SubmitOutcome::Committed {
            thread_index,
            turn,
            persisted,
        })
    }

    /// Drain the stream into the streaming state
    async fn consume(
        &self,
        mut stream: ChunkStream,
        cancel: &CancellationToken,
    ) -> Result<(String, Option<TokenUsage>)> {
        let mut usage = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Aborted),
                next = tokio::time::timeout(self.config.stream_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Err(_) => {
                    return Err(Error::Network(tally_ai::Error::Timeout(format!(
                        "no data for {}s",
                        self.config.stream_timeout.as_secs_f32()
                    ))));
                }
                Ok(None) => break,
                Ok(Some(chunk)) => chunk.map_err(Error::Network)?,
            };

            let delta = chunk.delta_text();
            if !delta.is_empty() {
                let partial = {
                    let mut state = self.streaming.lock();
                    state.partial_content.push_str(delta);
                    state.partial_content.clone()
                };
                self.emit(ChatEvent::StreamDelta {
                    delta: delta.to_string(),
                    partial,
                });
            }

            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
        }

        let content = self.streaming.lock().partial_content.clone();
        Ok((content, usage))
    }

    /// Give a placeholder-titled thread a real title. Failures, timeouts and
    /// aborts keep the placeholder.
    async fn maybe_retitle(
        &self,
        thread_id: ThreadId,
        user_text: &str,
        cancel: &CancellationToken,
    ) {
        let untitled = {
            let store = self.store.lock();
            store
                .index_of(thread_id)
                .and_then(|i| store.thread(i))
                .is_some_and(Thread::is_untitled)
        };
        if !untitled {
            return;
        }

        let synthesized = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("title synthesis aborted");
                return;
            }
            synthesized = tokio::time::timeout(
                self.config.title_timeout,
                self.titles.synthesize(user_text),
            ) => synthesized,
        };
        let title = match synthesized {
            Ok(Ok(title)) => title,
            Ok(Err(e)) => {
                tracing::warn!("Title synthesis failed, keeping placeholder: {}", e);
                return;
            }
            Err(_) => {
                tracing::warn!(
                    "Title synthesis timed out after {}s, keeping placeholder",
                    self.config.title_timeout.as_secs_f32()
                );
                return;
            }
        };

        let renamed = {
            let mut store = self.store.lock();
            store
                .index_of(thread_id)
                .and_then(|i| store.set_title(i, title.clone()).ok().map(|_| i))
        };
        if let Some(thread_index) = renamed {
            tracing::info!(thread_index, %title, "titled thread");
            self.emit(ChatEvent::TitleChanged {
                thread_index,
                title,
            });
        }
    }
}

/// Context sent with a request: the last `max_prior` turns plus the new user message
pub fn context_window(turns: &[Turn], user_text: &str, max_prior: usize) -> Vec<ChatMessage> {
    let start = turns.len().saturating_sub(max_prior);
    turns[start..]
        .iter()
        .map(Turn::to_message)
        .chain(std::iter::once(ChatMessage::user(user_text)))
        .collect()
}

//! Scripted stand-ins for the remote services

use std::{collections::VecDeque, sync::Arc};

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use tally_ai::{
    ChunkStream, CompletionApi, CompletionChunk, CompletionRequest, CurrencyConverter,
};
use tokio::sync::Notify;

/// What the next `stream` call does
pub(crate) enum Script {
    /// Replay these items, then end
    Chunks(Vec<tally_ai::Result<CompletionChunk>>),
    /// Yield these chunks, then never end
    Hang(Vec<CompletionChunk>),
    /// Yield `before`, wait on `gate`, then yield `after`
    Gated {
        before: Vec<CompletionChunk>,
        gate: Arc<Notify>,
        after: Vec<tally_ai::Result<CompletionChunk>>,
    },
    /// Fail to open the stream
    OpenError(tally_ai::Error),
}

pub(crate) struct MockApi {
    scripts: Mutex<VecDeque<Script>>,
    title: Option<String>,
    /// `complete` never returns
    hang_title: bool,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockApi {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            title: None,
            hang_title: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_script(self, script: Script) -> Self {
        self.scripts.lock().push_back(script);
        self
    }

    pub(crate) fn with_stream(self, chunks: Vec<CompletionChunk>) -> Self {
        self.with_script(Script::Chunks(chunks.into_iter().map(Ok).collect()))
    }

    pub(crate) fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub(crate) fn with_hanging_title(mut self) -> Self {
        self.hang_title = true;
        self
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionApi for MockApi {
    async fn stream(&self, request: &CompletionRequest) -> tally_ai::Result<ChunkStream> {
        self.requests.lock().push(request.clone());
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or(Script::Chunks(Vec::new()));

        match script {
            Script::OpenError(e) => Err(e),
            Script::Chunks(items) => Ok(tally_ai::stream::replay(items)),
            Script::Hang(chunks) => Ok(Box::pin(stream! {
                for chunk in chunks {
                    yield Ok::<_, tally_ai::Error>(chunk);
                }
                std::future::pending::<()>().await;
            })),
            Script::Gated {
                before,
                gate,
                after,
            } => Ok(Box::pin(stream! {
                for chunk in before {
                    yield Ok::<_, tally_ai::Error>(chunk);
                }
                gate.notified().await;
                for item in after {
                    yield item;
                }
            })),
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> tally_ai::Result<String> {
        self.requests.lock().push(request.clone());
        if self.hang_title {
            std::future::pending::<()>().await;
        }
        self.title
            .clone()
            .ok_or_else(|| tally_ai::Error::api(503, "title service unavailable"))
    }
}

enum ConverterMode {
    Rate(f64),
    Fail,
    Hang,
}

pub(crate) struct MockConverter {
    mode: ConverterMode,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockConverter {
    fn with_mode(mode: ConverterMode) -> Self {
        Self {
            mode,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn rate(rate: f64) -> Self {
        Self::with_mode(ConverterMode::Rate(rate))
    }

    pub(crate) fn failing() -> Self {
        Self::with_mode(ConverterMode::Fail)
    }

    pub(crate) fn hanging() -> Self {
        Self::with_mode(ConverterMode::Hang)
    }

    /// Recorded `(from, to)` pairs
    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl CurrencyConverter for MockConverter {
    async fn convert(&self, amount: f64, from: &str, to: &str) -> tally_ai::Result<f64> {
        self.calls.lock().push((from.to_string(), to.to_string()));
        match self.mode {
            ConverterMode::Rate(rate) => Ok(amount * rate),
            ConverterMode::Fail => Err(tally_ai::Error::Currency("rate service down".into())),
            ConverterMode::Hang => std::future::pending().await,
        }
    }
}

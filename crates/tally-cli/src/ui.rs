//! TUI implementation for tally

use crossterm::event::{Event, EventStream, MouseEventKind};
use futures::StreamExt;
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    text::{Line, Span},
    widgets::Paragraph,
};
use std::time::{Duration, Instant};
use tally_chat::{
    ChatEvent, ChatSession, ConversationStore, Error as ChatError, SessionPhase, SubmitOutcome,
    Thread, ThreadId, format_amount, format_cost,
};
use tally_tui::{
    TerminalSession, Theme,
    input::{Action, event_to_action},
    widgets::{
        Composer, ConfirmPrompt, Selector, SelectorItem, SelectorState, Spinner, ThreadEntry,
        ThreadList, TurnList, TurnView, turn_list::max_scroll_back,
    },
};

use crate::commands::{CommandResult, ModelCommand, ThreadCommand, execute_command};
use crate::utils::{failure_message, preview};

const SIDEBAR_WIDTH: u16 = 26;
/// Narrower terminals hide the sidebar
const SIDEBAR_MIN_TERMINAL: u16 = 70;

const WELCOME: &str = "Type a message and press Enter. Alt+Enter adds a line.\n\n\
Ctrl+N new thread · Ctrl+D delete · Ctrl+↑/↓ switch\n\
Ctrl+K model · Esc cancel an answer · Ctrl+Q quit · /help";

/// The answer being streamed, as shown on screen
#[derive(Debug, Clone)]
struct StreamingView {
    thread: Option<ThreadId>,
    model: String,
    content: String,
}

/// What the event loop should do after an action
#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Submit { thread_index: usize, text: String },
    Quit,
}

/// Sidebar entries for every thread
fn thread_entries(store: &ConversationStore, currency: &str) -> Vec<ThreadEntry> {
    store
        .threads()
        .iter()
        .enumerate()
        .map(|(i, thread)| ThreadEntry {
            title: thread.title.clone(),
            total_label: (!thread.turns.is_empty())
                .then(|| format_amount(thread.total_cost(), currency)),
            is_active: store.active() == Some(i),
        })
        .collect()
}

/// Committed turns of `thread`, plus the in-progress answer if it belongs here
fn transcript(thread: &Thread, currency: &str, streaming: Option<&StreamingView>) -> Vec<TurnView> {
    let mut turns: Vec<TurnView> = thread
        .turns
        .iter()
        .map(|turn| {
            if turn.is_user() {
                TurnView::user(turn.content.as_str())
            } else {
                let view = TurnView::assistant(turn.content.as_str(), turn.model.as_str());
                // Free answers carry no cost line
                if turn.cost > 0.0 {
                    view.with_cost(format_cost(turn.cost, currency))
                } else {
                    view
                }
            }
        })
        .collect();

    if let Some(view) = streaming.filter(|v| v.thread == Some(thread.id())) {
        turns.push(TurnView::streaming(view.content.as_str(), view.model.as_str()));
    }
    turns
}

/// Index `delta` steps from `active`, if one exists
fn neighbor(active: Option<usize>, len: usize, delta: isize) -> Option<usize> {
    let target = active?.checked_add_signed(delta)?;
    (target < len).then_some(target)
}

fn phase_status(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Idle => "Ready",
        SessionPhase::Submitting => "Sending...",
        SessionPhase::Streaming => "Receiving...",
        SessionPhase::Finalizing => "Pricing the answer...",
        SessionPhase::Committed => "Saving...",
        SessionPhase::Failed => "Failed",
    }
}

/// TUI application state
struct TuiState {
    theme: Theme,
    composer: Composer,
    /// Rows scrolled up from the bottom of the transcript
    scroll_back: usize,
    /// Transcript viewport height at the last render
    page: usize,
    status: String,
    model: String,
    models: Vec<String>,
    /// Rate description per entry of `models`
    model_rates: Vec<String>,
    currency: String,
    model_selector: SelectorState,
    /// Thread waiting for a y/n before deletion
    confirm_delete: Option<usize>,
    /// Local messages shown under the transcript until the thread changes
    notices: Vec<TurnView>,
    streaming: Option<StreamingView>,
    is_processing: bool,
    spinner_start: Instant,
    /// Store changed outside a submit and must be written
    needs_persist: bool,
}

impl TuiState {
    fn new(model: String, session: &ChatSession) -> Self {
        let mut composer = Composer::new().with_placeholder("Type a message...");
        composer.set_focused(true);

        let pricing = session.pricing();
        let models: Vec<String> = pricing.model_ids().into_iter().map(str::to_string).collect();
        let model_rates = models
            .iter()
            .map(|id| {
                pricing
                    .get(id)
                    .map(|rates| ModelCommand::summary(id, rates))
                    .unwrap_or_default()
            })
            .collect();

        Self {
            theme: Theme::dark(),
            composer,
            scroll_back: 0,
            page: 10,
            status: "Ready".to_string(),
            model,
            models,
            model_rates,
            currency: session.display_currency().to_string(),
            model_selector: SelectorState::default(),
            confirm_delete: None,
            notices: Vec::new(),
            streaming: None,
            is_processing: false,
            spinner_start: Instant::now(),
            needs_persist: false,
        }
    }

    fn notice(&mut self, text: impl Into<String>) {
        self.notices.push(TurnView::notice(text));
        self.scroll_back = 0;
    }

    fn error(&mut self, text: impl Into<String>) {
        self.notices.push(TurnView::error(text));
        self.scroll_back = 0;
    }

    /// Mirror a session event
    fn on_chat_event(&mut self, event: ChatEvent, session: &ChatSession) {
        match event {
            ChatEvent::SubmitStart { thread_index, .. } => {
                let thread = session.store().lock().thread(thread_index).map(Thread::id);
                self.streaming = Some(StreamingView {
                    thread,
                    model: self.model.clone(),
                    content: String::new(),
                });
                self.scroll_back = 0;
            }
            ChatEvent::Phase { phase } => {
                self.status = phase_status(phase).to_string();
            }
            ChatEvent::StreamDelta { partial, .. } => {
                if let Some(view) = self.streaming.as_mut() {
                    view.content = partial;
                }
            }
            ChatEvent::TurnCommitted { .. } | ChatEvent::Dropped => {
                self.streaming = None;
            }
            ChatEvent::TitleChanged { title, .. } => {
                self.status = format!("Titled \"{}\"", title);
            }
            ChatEvent::SubmitEnd => {
                self.streaming = None;
                self.is_processing = false;
            }
            // Failures are reported from the submit result
            ChatEvent::Error { .. } | ChatEvent::Persisted => {}
        }
    }

    fn begin_submit(&mut self) {
        self.is_processing = true;
        self.spinner_start = Instant::now();
        self.status = "Sending...".to_string();
        self.scroll_back = 0;
    }

    /// Report how a submit ended; a failed message goes back into the composer
    fn finish_submit(&mut self, result: tally_chat::Result<SubmitOutcome>, text: String) {
        self.is_processing = false;
        self.streaming = None;
        match result {
            Ok(SubmitOutcome::Committed { turn, persisted, .. }) => {
                self.status = format!("Ready │ last answer {}", format_amount(turn.cost, &self.currency));
                if !persisted {
                    self.error("The answer could not be saved to disk; it will be written with the next change.");
                }
            }
            Ok(SubmitOutcome::Dropped) => {
                self.status = "Ready".to_string();
                self.notice("The thread was deleted before the answer arrived; it was discarded.");
            }
            Err(ChatError::Aborted) => {
                self.status = "Cancelled".to_string();
                self.restore_composer(text);
            }
            Err(e) => {
                self.status = "Failed".to_string();
                self.error(failure_message(&e));
                self.restore_composer(text);
            }
        }
    }

    fn restore_composer(&mut self, text: String) {
        if self.composer.is_empty() {
            self.composer.set_content(text);
        }
    }

    fn switch_to(&mut self, index: usize, session: &ChatSession) {
        match session.select_thread(index) {
            Ok(()) => {
                self.notices.clear();
                self.scroll_back = 0;
            }
            Err(e) => self.error(e.to_string()),
        }
    }

    fn new_thread(&mut self, session: &ChatSession) {
        session.store().lock().add_thread();
        self.notices.clear();
        self.scroll_back = 0;
        self.needs_persist = true;
    }

    fn ask_delete(&mut self, index: Option<usize>, session: &ChatSession) {
        let (active, len) = {
            let store = session.store();
            let store = store.lock();
            (store.active(), store.len())
        };
        match index.or(active) {
            Some(i) if i < len => self.confirm_delete = Some(i),
            Some(i) => self.error(format!("No thread {} ({} threads)", i + 1, len)),
            None => self.notice("No thread to delete."),
        }
    }

    fn delete_thread(&mut self, index: usize, session: &ChatSession) {
        let removed = session.store().lock().delete_thread(index);
        match removed {
            Ok(thread) => {
                self.notices.clear();
                self.status = format!("Deleted \"{}\"", thread.title);
                self.needs_persist = true;
            }
            Err(e) => self.error(e.to_string()),
        }
    }

    /// Write pending store changes
    async fn flush(&mut self, session: &ChatSession) {
        if !self.needs_persist {
            return;
        }
        self.needs_persist = false;
        if let Err(e) = session.persist().await {
            tracing::warn!("Persist failed: {}", e);
            self.error(format!("Could not save history: {}", e));
        }
    }

    fn run_command(&mut self, result: CommandResult, session: &ChatSession) -> Flow {
        match result {
            CommandResult::NewThread => self.new_thread(session),
            CommandResult::DeleteThread(index) => self.ask_delete(index, session),
            CommandResult::SwitchThread(index) => self.switch_to(index, session),
            CommandResult::ListThreads => {
                let text = ThreadCommand::list_text(&session.store().lock(), &self.currency);
                self.notice(text);
            }
            CommandResult::ChangeModel(model) => {
                self.status = format!("Switched to {}", model);
                self.model = model;
            }
            CommandResult::OpenModelSelector => self.open_model_selector(),
            CommandResult::ShowCost => {
                let text = ThreadCommand::cost_text(&session.store().lock(), &self.currency);
                self.notice(text);
            }
            CommandResult::Message(msg) => self.notice(msg),
            CommandResult::Exit => return Flow::Quit,
            CommandResult::Unknown(cmd) => self.error(format!(
                "Unknown command: /{}\nType /help for available commands.",
                cmd
            )),
        }
        Flow::Continue
    }

    fn open_model_selector(&mut self) {
        let current = self.models.iter().position(|m| *m == self.model).unwrap_or(0);
        self.model_selector.show(current);
    }

    /// Keys for an open popup; returns false when no popup is open
    fn handle_popup(&mut self, action: &Action, session: &ChatSession) -> bool {
        if let Some(index) = self.confirm_delete {
            match action {
                Action::Char('y' | 'Y') | Action::Submit => {
                    self.confirm_delete = None;
                    self.delete_thread(index, session);
                }
                Action::Char('n' | 'N') | Action::Escape => self.confirm_delete = None,
                _ => {}
            }
            return true;
        }

        if self.model_selector.visible {
            match action {
                Action::Up => self.model_selector.up(self.models.len()),
                Action::Down => self.model_selector.down(self.models.len()),
                Action::Submit => {
                    self.model_selector.hide();
                    if let Some(model) = self.models.get(self.model_selector.selected) {
                        self.status = format!("Switched to {}", model);
                        self.model = model.clone();
                    }
                }
                Action::Escape | Action::ModelSelect => self.model_selector.hide(),
                _ => {}
            }
            return true;
        }
        false
    }

    /// Keys that behave the same whether or not an answer is streaming
    fn handle_common(&mut self, action: Action, session: &ChatSession) {
        match action {
            Action::PageUp => self.scroll_back = self.scroll_back.saturating_add(self.page),
            Action::PageDown => self.scroll_back = self.scroll_back.saturating_sub(self.page),
            Action::NewThread => self.new_thread(session),
            Action::DeleteThread => self.ask_delete(None, session),
            Action::PrevThread | Action::NextThread => {
                let delta = if action == Action::PrevThread { -1 } else { 1 };
                let (active, len) = {
                    let store = session.store();
                    let store = store.lock();
                    (store.active(), store.len())
                };
                if let Some(index) = neighbor(active, len, delta) {
                    self.switch_to(index, session);
                }
            }
            Action::ModelSelect => self.open_model_selector(),
            other => {
                self.composer.handle_action(&other);
            }
        }
    }

    /// Handle a key while idle
    fn handle_action(&mut self, action: Action, session: &ChatSession) -> Flow {
        if self.handle_popup(&action, session) {
            return Flow::Continue;
        }

        match action {
            Action::Submit => {
                if self.composer.is_empty() {
                    return Flow::Continue;
                }
                let text = self.composer.take();
                let models: Vec<&str> = self.models.iter().map(String::as_str).collect();
                if let Some(result) = execute_command(&text, &models) {
                    return self.run_command(result, session);
                }

                let active = session.store().lock().active();
                let thread_index = match active {
                    Some(index) => index,
                    None => {
                        self.new_thread(session);
                        0
                    }
                };
                Flow::Submit {
                    thread_index,
                    text: text.trim_end().to_string(),
                }
            }
            Action::Quit | Action::Interrupt | Action::Escape => Flow::Quit,
            other => {
                self.handle_common(other, session);
                Flow::Continue
            }
        }
    }

    /// Handle a key while an answer streams
    fn handle_action_busy(&mut self, action: Action, session: &ChatSession) -> Flow {
        if self.handle_popup(&action, session) {
            return Flow::Continue;
        }

        match action {
            Action::Interrupt | Action::Escape => {
                session.handle().abort();
                self.status = "Cancelling...".to_string();
            }
            Action::Quit => return Flow::Quit,
            Action::Submit => {
                self.status = "Still answering (Esc cancels)".to_string();
            }
            other => self.handle_common(other, session),
        }
        Flow::Continue
    }

    fn on_mouse(&mut self, kind: MouseEventKind) {
        match kind {
            MouseEventKind::ScrollUp => self.scroll_back = self.scroll_back.saturating_add(3),
            MouseEventKind::ScrollDown => self.scroll_back = self.scroll_back.saturating_sub(3),
            _ => {}
        }
    }

    /// Render the UI
    fn render(&mut self, frame: &mut Frame, session: &ChatSession) {
        let area = frame.area();

        let (entries, turns, thread_title) = {
            let store = session.store();
            let store = store.lock();
            let entries = thread_entries(&store, &self.currency);
            let (turns, title) = match store.active_thread() {
                Some(thread) => (
                    transcript(thread, &self.currency, self.streaming.as_ref()),
                    thread.title.clone(),
                ),
                None => (Vec::new(), "New thread".to_string()),
            };
            (entries, turns, title)
        };
        let mut turns = turns;
        turns.extend(self.notices.iter().cloned());

        let main = if area.width >= SIDEBAR_MIN_TERMINAL {
            let [sidebar, main] =
                Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(1)])
                    .areas(area);
            frame.render_widget(ThreadList::new(&entries, &self.theme), sidebar);
            main
        } else {
            area
        };

        let composer_height = self.composer.desired_height(main.width);
        let [transcript_area, status_area, composer_area] = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(composer_height),
        ])
        .areas(main);

        let transcript_area = Rect {
            x: transcript_area.x + 1,
            width: transcript_area.width.saturating_sub(2),
            ..transcript_area
        };
        self.page = (transcript_area.height as usize).max(1);
        self.scroll_back = self.scroll_back.min(max_scroll_back(
            &turns,
            transcript_area.width as usize,
            transcript_area.height as usize,
        ));
        frame.render_widget(
            TurnList::new(&turns, &self.theme)
                .scroll_back(self.scroll_back)
                .empty_hint(WELCOME),
            transcript_area,
        );

        self.render_status(frame, status_area);

        let title = format!(" {} ", preview(&thread_title, 40));
        self.composer
            .render(composer_area, frame.buffer_mut(), &self.theme, &title);

        if self.model_selector.visible {
            self.render_model_selector(frame, area);
        }

        if let Some(index) = self.confirm_delete {
            let title = entries
                .get(index)
                .map(|e| e.title.as_str())
                .unwrap_or("this thread");
            let message = format!("Delete \"{}\"? This cannot be undone.", preview(title, 30));
            frame.render_widget(
                ConfirmPrompt::new("Delete thread", &message, &self.theme),
                area,
            );
        }
    }

    fn render_model_selector(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<SelectorItem> = self
            .models
            .iter()
            .zip(&self.model_rates)
            .map(|(id, rates)| {
                SelectorItem::new(id.as_str())
                    .description(rates.as_str())
                    .current(*id == self.model)
            })
            .collect();

        Selector::new("Select Model", &items, &self.theme)
            .with_selected(self.model_selector.selected)
            .render_centered(area, frame.buffer_mut());
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        if self.is_processing {
            let label = format!("{} │ {}", self.model, self.status);
            frame.render_widget(
                Spinner::new(&label, &self.theme, self.spinner_start),
                area,
            );
            return;
        }

        let left = format!("{} │ {} │ {}", self.model, self.currency, self.status);
        let right = "Ctrl+N new │ Ctrl+D delete │ Ctrl+K model │ Ctrl+Q quit";

        let left_width = left.chars().count();
        let right_width = right.chars().count();
        let available = area.width as usize;

        let line = if left_width + right_width + 2 <= available {
            Line::from(vec![
                Span::styled(left, self.theme.dim_style()),
                Span::raw(" ".repeat(available - left_width - right_width)),
                Span::styled(right, self.theme.border_style()),
            ])
        } else {
            Line::from(Span::styled(left, self.theme.dim_style()))
        };
        frame.render_widget(Paragraph::new(line), area);
    }
}

/// Run the TUI application
pub async fn run_tui(session: &ChatSession, model: String) -> anyhow::Result<()> {
    let mut terminal = TerminalSession::enter()?;
    let mut state = TuiState::new(model, session);
    let mut chat_rx = session.subscribe();
    let mut event_stream = EventStream::new();

    // Tick interval for animations (80ms for smooth spinner)
    let mut tick_interval = tokio::time::interval(Duration::from_millis(80));

    let mut pending: Option<(usize, String)> = None;

    let result = loop {
        if let Some((thread_index, text)) = pending.take() {
            state.begin_submit();
            let model = state.model.clone();
            let mut quitting = false;

            // Poll the submit alongside input so typing, scrolling and
            // cancelling keep working
            let outcome = {
                let mut submit = std::pin::pin!(session.submit(thread_index, &text, &model));
                loop {
                    terminal.draw(|frame| state.render(frame, session))?;

                    tokio::select! {
                        biased;

                        result = &mut submit => break result,

                        event = chat_rx.recv() => {
                            if let Ok(event) = event {
                                state.on_chat_event(event, session);
                            }
                        }

                        event = event_stream.next(), if !quitting => match event {
                            Some(Ok(Event::Mouse(mouse))) => state.on_mouse(mouse.kind),
                            Some(Ok(event)) => {
                                let flow = event_to_action(event)
                                    .map(|action| state.handle_action_busy(action, session));
                                if flow == Some(Flow::Quit) {
                                    session.handle().abort();
                                    quitting = true;
                                }
                            }
                            Some(Err(_)) | None => {
                                session.handle().abort();
                                quitting = true;
                            }
                        },

                        _ = tick_interval.tick() => {}
                    }
                }
            };

            while let Ok(event) = chat_rx.try_recv() {
                state.on_chat_event(event, session);
            }
            state.finish_submit(outcome, text);
            state.flush(session).await;

            if quitting {
                break Ok(());
            }
            continue;
        }

        terminal.draw(|frame| state.render(frame, session))?;

        tokio::select! {
            biased;

            event = chat_rx.recv() => {
                if let Ok(event) = event {
                    state.on_chat_event(event, session);
                }
            }

            event = event_stream.next() => match event {
                Some(Ok(Event::Mouse(mouse))) => state.on_mouse(mouse.kind),
                Some(Ok(Event::Resize(_, _))) => {}
                Some(Ok(event)) => {
                    if let Some(action) = event_to_action(event) {
                        match state.handle_action(action, session) {
                            Flow::Continue => {}
                            Flow::Submit { thread_index, text } => {
                                pending = Some((thread_index, text));
                            }
                            Flow::Quit => break Ok(()),
                        }
                    }
                }
                Some(Err(e)) => break Err(anyhow::anyhow!("Event error: {}", e)),
                None => break Ok(()),
            },

            _ = tick_interval.tick() => {}
        }

        state.flush(session).await;
    };

    state.flush(session).await;
    drop(terminal);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_chat::Turn;

    fn store() -> ConversationStore {
        let mut store = ConversationStore::new();
        store.add_thread();
        store.commit_turn(0, Turn::user("hi", "gpt-4o-mini")).unwrap();
        store
            .commit_turn(0, Turn::assistant("hello", "gpt-4o-mini", 0.5))
            .unwrap();
        store.add_thread();
        store
    }

    #[test]
    fn test_thread_entries() {
        let entries = thread_entries(&store(), "JPY");
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_active);
        assert_eq!(entries[0].total_label, None);
        assert_eq!(entries[1].total_label.as_deref(), Some("¥0.50"));
    }

    #[test]
    fn test_transcript_labels_costs() {
        let store = store();
        let thread = store.thread(1).unwrap();
        let turns = transcript(thread, "JPY", None);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].cost_label, None);
        assert_eq!(turns[1].cost_label.as_deref(), Some("[API cost: ¥0.50]"));
    }

    #[test]
    fn test_zero_cost_answer_has_no_cost_line() {
        let mut store = ConversationStore::new();
        store.add_thread();
        store.commit_turn(0, Turn::user("hi", "local")).unwrap();
        store
            .commit_turn(0, Turn::assistant("hello", "local", 0.0))
            .unwrap();

        let turns = transcript(store.thread(0).unwrap(), "JPY", None);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "hello");
        assert_eq!(turns[1].cost_label, None);
    }

    #[test]
    fn test_streaming_shown_only_on_its_thread() {
        let store = store();
        let view = StreamingView {
            thread: Some(store.thread(1).unwrap().id()),
            model: "gpt-4o".into(),
            content: "partial".into(),
        };
        let own = transcript(store.thread(1).unwrap(), "JPY", Some(&view));
        assert_eq!(own.len(), 3);
        assert!(own[2].is_streaming);
        assert_eq!(own[2].content, "partial");

        let other = transcript(store.thread(0).unwrap(), "JPY", Some(&view));
        assert!(other.is_empty());
    }

    #[test]
    fn test_neighbor() {
        assert_eq!(neighbor(Some(0), 3, -1), None);
        assert_eq!(neighbor(Some(0), 3, 1), Some(1));
        assert_eq!(neighbor(Some(2), 3, 1), None);
        assert_eq!(neighbor(None, 0, 1), None);
    }

    #[test]
    fn test_phase_status() {
        assert_eq!(phase_status(SessionPhase::Streaming), "Receiving...");
        assert_eq!(phase_status(SessionPhase::Idle), "Ready");
    }
}

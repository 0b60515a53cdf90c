//! Top-level window: the draw/input loop on the UI thread, with queries sent
//! from a worker thread so the screen keeps redrawing while they run.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::{backend::Backend, Terminal};
use tokio::sync::oneshot;

use crate::db::Connection;

use super::dispatch::{Dispatcher, UiHandle};
use super::panel::{Notifier, ResultPanel};
use super::view::{ResultView, StatusType, ViewAction};
use super::components;

pub const FRAME_TITLE: &str = "SQL Results";

const IDLE_POLL: Duration = Duration::from_millis(100);
const BUSY_POLL: Duration = Duration::from_millis(50);

/// Where input comes from.
pub trait EventSource {
    /// Wait up to `timeout` for the next event.
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Event>>;
}

/// Reads the real terminal.
#[derive(Debug, Default)]
pub struct TerminalEvents;

impl EventSource for TerminalEvents {
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        if event::poll(timeout)? {
            event::read().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Shows errors in the view's modal dialog and blocks until dismissed.
pub struct DialogNotifier {
    ui: UiHandle<ResultView>,
}

impl DialogNotifier {
    pub fn new(ui: UiHandle<ResultView>) -> Self {
        Self { ui }
    }
}

impl Notifier for DialogNotifier {
    fn notify_error(&self, title: &str, message: &str) {
        let (ack_tx, ack_rx) = oneshot::channel();
        let (owned_title, owned_message) = (title.to_string(), message.to_string());
        let shown = self.ui.invoke_and_wait(move |view: &mut ResultView| {
            view.show_dialog(&owned_title, &owned_message, Some(ack_tx));
        });
        match shown {
            // An Err here only means the view went away without an answer.
            Ok(()) => {
                let _ = ack_rx.blocking_recv();
            }
            Err(e) => tracing::error!("could not show \"{}\" ({}): {}", title, e, message),
        }
    }
}

pub struct ResultFrame {
    view: ResultView,
    dispatcher: Dispatcher<ResultView>,
    panel: ResultPanel,
}

impl ResultFrame {
    pub fn new(view: ResultView, connection: Option<Arc<dyn Connection>>) -> Self {
        let dispatcher = Dispatcher::new();
        let ui = dispatcher.handle();
        let notifier = Arc::new(DialogNotifier::new(ui.clone()));
        let mut panel = ResultPanel::new(ui, notifier);
        if let Some(connection) = connection {
            panel.set_connection(connection);
        }
        Self {
            view,
            dispatcher,
            panel,
        }
    }

    pub fn view(&self) -> &ResultView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ResultView {
        &mut self.view
    }

    pub fn panel(&self) -> &ResultPanel {
        &self.panel
    }

    /// Draw and handle input until the user quits. `initial_query` is sent
    /// before the first key is read.
    pub fn run<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        events: &mut impl EventSource,
        initial_query: Option<&str>,
    ) -> Result<()> {
        self.view.resize(terminal.size()?.height);

        if let Some(query) = initial_query {
            self.view.set_query_text(query);
            self.send(terminal, events)?;
        }

        loop {
            self.dispatcher.run_pending(&mut self.view);
            self.view.table.repack_if_stale();
            terminal.draw(|f| components::draw(f, &self.view))?;

            match events.next_event(IDLE_POLL)? {
                Some(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    match self.view.handle_key(key) {
                        ViewAction::Send => self.send(terminal, events)?,
                        ViewAction::Quit => return Ok(()),
                        ViewAction::None => {}
                    }
                }
                Some(Event::Resize(_, height)) => self.view.resize(height),
                _ => {}
            }
        }
    }

    /// Send the query box contents on a worker thread, keeping the screen
    /// and the error dialog alive until it finishes.
    fn send<B: Backend>(&mut self, terminal: &mut Terminal<B>, events: &mut impl EventSource) -> Result<()> {
        let query = self.view.query_text();
        if query.trim().is_empty() {
            self.view.set_status("Nothing to send", StatusType::Warning);
            return Ok(());
        }

        self.view.busy = true;
        self.panel.set_best_layout(self.view.best_layout);
        let Self {
            view,
            dispatcher,
            panel,
        } = self;

        let outcome = thread::scope(|scope| -> Result<_> {
            let worker = scope.spawn(|| panel.send(&query));
            let mut failure = None;
            while !worker.is_finished() {
                dispatcher.run_pending(view);
                if failure.is_some() {
                    // The terminal is gone: answer any dialog so the worker
                    // can finish before the error is returned.
                    view.dismiss_dialog();
                    thread::sleep(BUSY_POLL);
                    continue;
                }
                if let Err(err) = Self::busy_step(terminal, events, view) {
                    tracing::error!("terminal failed during a query: {:#}", err);
                    failure = Some(err);
                }
            }
            let outcome = worker.join().map_err(|_| anyhow!("query worker panicked"))?;
            match failure {
                Some(err) => Err(err),
                None => Ok(outcome),
            }
        });

        dispatcher.run_pending(view);
        view.busy = false;
        let outcome = outcome?;
        match outcome {
            Ok(()) => {
                let model = view.table.model();
                let summary = format!("{} rows, {} columns", model.row_count(), model.column_count());
                view.set_status(summary, StatusType::Success);
            }
            Err(err) => view.set_status(err.to_string(), StatusType::Error),
        }
        Ok(())
    }

    /// One redraw while a query runs. Only the dialog takes input; other
    /// input stays queued until the query finishes.
    fn busy_step<B: Backend>(
        terminal: &mut Terminal<B>,
        events: &mut impl EventSource,
        view: &mut ResultView,
    ) -> Result<()> {
        view.table.repack_if_stale();
        terminal.draw(|f| components::draw(f, view))?;

        if view.dialog().is_none() {
            thread::sleep(BUSY_POLL);
            return Ok(());
        }
        match events.next_event(BUSY_POLL)? {
            Some(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                view.handle_key(key);
            }
            Some(Event::Resize(_, height)) => view.resize(height),
            _ => {}
        }
        Ok(())
    }

    /// Release the open cursor and statement.
    pub fn dispose(&mut self) {
        self.panel.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DataAccessError, ErrorCategory, MemoryConnection, MemoryCursor};
    use crate::ui::PackedTable;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;
    use std::collections::VecDeque;

    /// Replays a fixed list of events, then idles.
    struct ScriptedEvents {
        steps: VecDeque<Event>,
    }

    impl ScriptedEvents {
        fn new(steps: impl IntoIterator<Item = Event>) -> Self {
            Self {
                steps: steps.into_iter().collect(),
            }
        }
    }

    impl EventSource for ScriptedEvents {
        fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
            let next = self.steps.pop_front();
            if next.is_none() {
                thread::sleep(timeout);
            }
            Ok(next)
        }
    }

    /// Input that has stopped working.
    struct BrokenEvents;

    impl EventSource for BrokenEvents {
        fn next_event(&mut self, _timeout: Duration) -> io::Result<Option<Event>> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal closed"))
        }
    }

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, modifiers))
    }

    fn quit() -> Event {
        key(KeyCode::Char('q'), KeyModifiers::CONTROL)
    }

    fn frame() -> ResultFrame {
        let connection = MemoryConnection::new()
            .with_result(
                "select id, name from users",
                MemoryCursor::from_names(
                    &["id", "name"],
                    vec![vec![1.into(), "alice".into()], vec![2.into(), "bob".into()]],
                ),
            )
            .with_result(
                "select 1 as one, 2 as two",
                MemoryCursor::from_names(&["one", "two"], vec![vec![1.into(), 2.into()]]),
            )
            .with_error(
                "selec 1",
                DataAccessError::with_category(ErrorCategory::Syntax, "syntax error at or near \"selec\""),
            );
        let view = ResultView::new(PackedTable::new(), true);
        ResultFrame::new(view, Some(Arc::new(connection)))
    }

    fn terminal() -> Terminal<TestBackend> {
        Terminal::new(TestBackend::new(100, 30)).unwrap()
    }

    #[test]
    fn test_initial_query_is_sent() {
        let mut frame = frame();
        let mut events = ScriptedEvents::new([quit()]);
        frame
            .run(&mut terminal(), &mut events, Some("select id, name from users"))
            .unwrap();

        let view = frame.view();
        assert_eq!(view.table.model().row_count(), 2);
        assert_eq!(view.query_text(), "select id, name from users");
        assert!(!view.busy);
        assert!(matches!(view.status, Some((_, StatusType::Success))));
        assert!(view.divider().is_some());
    }

    #[test]
    fn test_f5_sends_with_best_layout() {
        let mut frame = frame();
        frame.view_mut().set_query_text("select 1 as one, 2 as two");
        let mut events = ScriptedEvents::new([
            key(KeyCode::Char('p'), KeyModifiers::CONTROL),
            key(KeyCode::F(5), KeyModifiers::NONE),
            quit(),
        ]);
        frame.run(&mut terminal(), &mut events, None).unwrap();

        let model = frame.view().table.model();
        assert_eq!(model.column_name(0), "Column");
        assert_eq!(model.row_count(), 2);
    }

    #[test]
    fn test_failed_send_waits_for_dialog() {
        let mut frame = frame();
        frame.view_mut().set_query_text("selec 1");
        let mut events = ScriptedEvents::new([
            key(KeyCode::F(5), KeyModifiers::NONE),
            key(KeyCode::Enter, KeyModifiers::NONE),
            quit(),
        ]);
        frame.run(&mut terminal(), &mut events, None).unwrap();

        let view = frame.view();
        assert!(view.dialog().is_none());
        assert_eq!(view.table.model().column_count(), 0);
        assert!(matches!(view.status, Some((_, StatusType::Error))));
    }

    #[test]
    fn test_input_failure_during_error_dialog_returns() {
        let mut frame = frame();
        let result = frame.run(&mut terminal(), &mut BrokenEvents, Some("selec 1"));
        assert!(result.is_err());

        let view = frame.view();
        assert!(view.dialog().is_none());
        assert!(!view.busy);
        assert_eq!(view.table.model().column_count(), 0);
    }

    #[test]
    fn test_blank_query_is_not_sent() {
        let mut frame = frame();
        let mut events = ScriptedEvents::new([key(KeyCode::F(5), KeyModifiers::NONE), quit()]);
        frame.run(&mut terminal(), &mut events, None).unwrap();
        assert!(matches!(frame.view().status, Some((_, StatusType::Warning))));
        assert!(frame.panel().cursor().is_none());
    }

    #[test]
    fn test_dispose_closes_cursor() {
        let mut frame = frame();
        let mut events = ScriptedEvents::new([quit()]);
        frame
            .run(&mut terminal(), &mut events, Some("select id, name from users"))
            .unwrap();
        let cursor = frame.panel().cursor().cloned().unwrap();
        frame.dispose();
        assert!(cursor.is_closed());
    }

    #[test]
    fn test_dialog_notifier_blocks_until_dismissed() {
        let mut dispatcher: Dispatcher<ResultView> = Dispatcher::new();
        let notifier = DialogNotifier::new(dispatcher.handle());
        let mut view = ResultView::new(PackedTable::new(), true);
        dispatcher.run_pending(&mut view);

        let worker = thread::spawn(move || notifier.notify_error("Database Error", "boom"));
        while view.dialog().is_none() {
            dispatcher.run_pending(&mut view);
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!worker.is_finished());
        assert_eq!(view.dialog().map(|d| d.message.as_str()), Some("boom"));

        view.dismiss_dialog();
        worker.join().unwrap();
    }
}

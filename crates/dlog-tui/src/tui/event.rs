use std::time::Duration;

use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Terminal events
#[derive(Clone, Debug)]
pub enum Event {
    /// Periodic redraw
    Tick,
    Key(KeyEvent),
    Resize(u16, u16),
    Error(String),
}

/// Reads terminal input on a background task
pub struct EventHandler {
    receiver: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let mut reader = EventStream::new();
                let mut tick_interval = tokio::time::interval(tick_rate);

                loop {
                    let tick = tick_interval.tick();
                    let crossterm_event = reader.next().fuse();

                    tokio::select! {
                        _ = cancel.cancelled() => break,

                        _ = tick => {
                            let _ = sender.send(Event::Tick);
                        }

                        maybe_event = crossterm_event => match maybe_event {
                            Some(Ok(CrosstermEvent::Key(key))) => {
                                // Release events are reported on some platforms
                                if key.kind == KeyEventKind::Press {
                                    let _ = sender.send(Event::Key(key));
                                }
                            }
                            Some(Ok(CrosstermEvent::Resize(w, h))) => {
                                let _ = sender.send(Event::Resize(w, h));
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                let _ = sender.send(Event::Error(e.to_string()));
                            }
                            None => break,
                        }
                    }
                }
            })
        };

        Self {
            receiver,
            cancel,
            task,
        }
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Stop reading input and wait for the reader task
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("terminal event task failed: {}", e);
        }
    }
}

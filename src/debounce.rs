//! The presence loop: turns metadata lines into status updates and clears them after a quiet
//! period.
//!
//! Every line, and every expiry of the timer, publishes exactly once and pushes the timer out by a
//! full window. Once the first line has arrived the loop never goes quiet: without new input it
//! re-sends the last decision once per window.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, Sleep, sleep};
use tracing::{debug, info, warn};

use crate::mpris::MetadataSource;
use crate::presence::{CustomStatus, PresenceState};
use crate::publisher::Publisher;

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    SourceClosed,
}

enum Input {
    Line(String),
    Tick,
}

pub struct Debouncer<P> {
    publisher: P,
    age: Duration,
    emoji: String,
    current_metadata: Option<String>,
    /// `None` until the first line arrives.
    timer: Option<Pin<Box<Sleep>>>,
}

impl<P: Publisher> Debouncer<P> {
    pub fn new(publisher: P, age: Duration, emoji: impl Into<String>) -> Self {
        Self {
            publisher,
            age,
            emoji: emoji.into(),
            current_metadata: None,
            timer: None,
        }
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn current_metadata(&self) -> Option<&str> {
        self.current_metadata.as_deref()
    }

    /// Runs until `interrupt` resolves or the source runs dry.
    ///
    /// Either way the source is terminated before returning. On interrupt nothing else is
    /// published; lines still buffered in the channel are dropped.
    pub async fn run<F>(mut self, mut source: MetadataSource, interrupt: F) -> StopReason
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        loop {
            let input = tokio::select! {
                biased;
                () = &mut interrupt => {
                    info!("Interrupted, stopping metadata source");
                    source.terminate().await;
                    return StopReason::Interrupted;
                }
                line = source.next_line() => match line {
                    Some(line) => Input::Line(line),
                    None => {
                        warn!("Metadata source exited");
                        source.terminate().await;
                        return StopReason::SourceClosed;
                    }
                },
                () = expired(&mut self.timer) => Input::Tick,
            };

            self.handle(input).await;
        }
    }

    async fn handle(&mut self, input: Input) {
        match input {
            Input::Line(line) => {
                debug!(line = %line, "Metadata received");
                self.current_metadata = Some(line);
                if self.timer.is_none() {
                    self.timer = Some(Box::pin(sleep(self.age)));
                }
            }
            Input::Tick => debug!("Presence window elapsed"),
        }

        let Some(status) = self.decide() else {
            return;
        };
        self.rearm();

        if let Err(err) = self.publisher.publish(status.as_ref()).await {
            warn!("Failed to update custom status: {}", err);
        }
    }

    /// Presence for the stored line, or `None` if no line has been seen yet.
    fn decide(&self) -> Option<Option<CustomStatus>> {
        let line = self.current_metadata.as_deref()?;
        let state = PresenceState::from_line(line, Utc::now(), self.age);
        debug!(active = state.is_active(), "Presence decided");
        Some(state.into_status(&self.emoji))
    }

    fn rearm(&mut self) {
        if let Some(timer) = self.timer.as_mut() {
            timer.as_mut().reset(Instant::now() + self.age);
        }
    }
}

async fn expired(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::PublishError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Option<CustomStatus>>>>);

    #[async_trait]
    impl Publisher for Recorder {
        async fn publish(&self, status: Option<&CustomStatus>) -> Result<(), PublishError> {
            self.0.lock().unwrap().push(status.cloned());
            Ok(())
        }
    }

    impl Recorder {
        fn texts(&self) -> Vec<Option<String>> {
            self.0.lock().unwrap().iter().map(|s| s.as_ref().map(|s| s.text.clone())).collect()
        }
    }

    const AGE: Duration = Duration::from_secs(600);

    #[tokio::test(start_paused = true)]
    async fn first_line_arms_timer_and_publishes() {
        let recorder = Recorder::default();
        let mut debouncer = Debouncer::new(recorder.clone(), AGE, "🎵");
        assert!(!debouncer.timer_armed());

        debouncer.handle(Input::Line("Playing: A - B".into())).await;

        assert!(debouncer.timer_armed());
        assert_eq!(debouncer.current_metadata(), Some("Playing: A - B"));
        assert_eq!(recorder.texts(), vec![Some("Listening to A - B".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_reuses_last_line() {
        let recorder = Recorder::default();
        let mut debouncer = Debouncer::new(recorder.clone(), AGE, "🎵");

        debouncer.handle(Input::Line("Paused: A - B".into())).await;
        debouncer.handle(Input::Tick).await;

        assert_eq!(recorder.texts(), vec![None, None]);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_before_any_line_does_nothing() {
        let recorder = Recorder::default();
        let mut debouncer = Debouncer::new(recorder.clone(), AGE, "🎵");

        debouncer.handle(Input::Tick).await;

        assert!(recorder.texts().is_empty());
        assert!(!debouncer.timer_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn every_publish_pushes_the_deadline_out() {
        let mut debouncer = Debouncer::new(Recorder::default(), AGE, "🎵");
        debouncer.handle(Input::Line("Playing: A - B".into())).await;
        let first = debouncer.timer.as_ref().unwrap().deadline();

        tokio::time::advance(Duration::from_secs(120)).await;
        debouncer.handle(Input::Line("Playing: A - B".into())).await;
        let second = debouncer.timer.as_ref().unwrap().deadline();

        assert_eq!(second - first, Duration::from_secs(120));
        assert_eq!(second, Instant::now() + AGE);
    }
}

//! When to collect: after the visitor stops scrolling, or after a fallback
//! delay if they never start, and then only once the host is idle.

use crate::collector::{Transmitter, UsageCollector, send_report};
use crate::dom::Dom;
use crate::report::TransmissionEnvelope;
use async_trait::async_trait;
use derive_more::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::instrument;
use ucss_config::DetectorConfig;

/// A scroll of the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrollEvent;

/// Lets the host finish more important work before collection starts.
#[async_trait]
pub trait IdleFacility: Send + Sync {
    async fn until_idle(&self);
}

/// Yields to the runtime once.
#[derive(Clone, Copy, Debug, Default)]
pub struct YieldIdle;

#[async_trait]
impl IdleFacility for YieldIdle {
    async fn until_idle(&self) {
        tokio::task::yield_now().await;
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum SchedulerState {
    #[display("idle")]
    Idle,
    #[display("scheduled")]
    Scheduled,
    #[display("collecting")]
    Collecting,
    #[display("done")]
    Done,
}

/// Which timer ended the wait.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Trigger {
    /// The visitor stopped scrolling.
    #[display("quiet period")]
    QuietPeriod,
    /// The visitor never scrolled.
    #[display("fallback")]
    Fallback,
}

#[derive(Debug)]
pub struct Scheduler {
    quiet_period: Duration,
    fallback: Duration,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(quiet_period: Duration, fallback: Duration) -> Self {
        Self { quiet_period, fallback, state: SchedulerState::Idle }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.quiet_period(), config.fallback())
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Wait for the first timer to fire.
    ///
    /// The fallback timer runs from the start. The first scroll disarms it,
    /// and every scroll restarts the quiet timer, so continuous scrolling
    /// postpones collection. A closed channel just means no more scrolls.
    pub async fn wait(&mut self, scrolls: &mut mpsc::Receiver<ScrollEvent>) -> Trigger {
        self.state = SchedulerState::Scheduled;
        let fallback = sleep(self.fallback);
        tokio::pin!(fallback);
        let mut fallback_armed = true;
        let mut quiet_deadline: Option<Instant> = None;
        let mut listening = true;
        loop {
            let deadline = quiet_deadline;
            let quiet = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                event = scrolls.recv(), if listening => match event {
                    Some(ScrollEvent) => {
                        fallback_armed = false;
                        quiet_deadline = Some(Instant::now() + self.quiet_period);
                    },
                    None => listening = false,
                },
                () = quiet => return Trigger::QuietPeriod,
                () = &mut fallback, if fallback_armed => return Trigger::Fallback,
            }
        }
    }

    /// Wait, collect once the host is idle, then hand the report to
    /// `transmitter`. Returns the envelope that was sent.
    ///
    /// Scroll events stop being read as soon as a timer fires. A scheduler
    /// only ever runs once, and a collector that has already collected is
    /// left alone.
    #[instrument(skip_all)]
    pub async fn run<D: Dom>(
        &mut self,
        collector: &mut UsageCollector<'_, D>,
        mut scrolls: mpsc::Receiver<ScrollEvent>,
        idle: &dyn IdleFacility,
        transmitter: &dyn Transmitter,
    ) -> Option<TransmissionEnvelope> {
        if self.state != SchedulerState::Idle {
            tracing::debug!(state = %self.state, "scheduler already ran");
            return None;
        }
        let trigger = self.wait(&mut scrolls).await;
        drop(scrolls);
        tracing::debug!(%trigger, "collection scheduled");

        idle.until_idle().await;
        if collector.has_collected() {
            self.state = SchedulerState::Done;
            return None;
        }
        self.state = SchedulerState::Collecting;
        let envelope = collector.collect();
        if let Some(envelope) = &envelope {
            send_report(envelope, transmitter).await;
        }
        self.state = SchedulerState::Done;
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cssom::Stylesheet;
    use crate::dom::MockDom;
    use crate::error::Result;
    use crate::report::{UpdateCssRequest, UpdateCssResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ucss_config::Config;
    use url::Url;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl Transmitter for Counter {
        async fn transmit(&self, _request: UpdateCssRequest) -> Result<UpdateCssResponse> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(UpdateCssResponse::new(0.0))
        }
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(Duration::from_secs(1), Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_without_scrolling() {
        let (_tx, mut rx) = mpsc::channel(8);
        let start = Instant::now();
        assert_eq!(scheduler().wait(&mut rx).await, Trigger::Fallback);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_millis(5_100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_when_channel_closes_early() {
        let (tx, mut rx) = mpsc::channel::<ScrollEvent>(8);
        drop(tx);
        assert_eq!(scheduler().wait(&mut rx).await, Trigger::Fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_period_after_last_scroll() {
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for _ in 0..3 {
                tx.send(ScrollEvent).await.unwrap();
                sleep(Duration::from_millis(400)).await;
            }
        });
        let start = Instant::now();
        assert_eq!(scheduler().wait(&mut rx).await, Trigger::QuietPeriod);
        // Last scroll at 800ms, then one quiet second.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1_800) && elapsed < Duration::from_millis(1_900), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrolling_past_fallback_postpones_collection() {
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for _ in 0..15 {
                tx.send(ScrollEvent).await.unwrap();
                sleep(Duration::from_millis(500)).await;
            }
        });
        let start = Instant::now();
        assert_eq!(scheduler().wait(&mut rx).await, Trigger::QuietPeriod);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(8_000) && elapsed < Duration::from_millis(8_100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_collects_and_transmits_once() {
        let dom = MockDom::new("https://example.com/")
            .with_matches(".a", &[0])
            .with_stylesheet(
                Stylesheet::parse(".a { color: red; }", Some(Url::parse("https://example.com/a.css").unwrap()), false)
                    .unwrap(),
            );
        let config = Config { site_url: Url::parse("https://example.com/").unwrap(), ..Config::default() };
        let mut collector = UsageCollector::new(&dom, &config);
        let counter = Counter::default();
        let mut first = scheduler();

        let (_tx, rx) = mpsc::channel(8);
        let envelope = first.run(&mut collector, rx, &YieldIdle, &counter).await.unwrap();
        assert!(envelope.css.get("https://example.com/a.css").unwrap().contains(".a"));
        assert_eq!(first.state(), SchedulerState::Done);

        // Neither the same scheduler nor a fresh one collects again.
        let (_tx, rx) = mpsc::channel(8);
        assert!(first.run(&mut collector, rx, &YieldIdle, &counter).await.is_none());
        let mut second = scheduler();
        let (_tx, rx) = mpsc::channel(8);
        assert!(second.run(&mut collector, rx, &YieldIdle, &counter).await.is_none());
        assert_eq!(second.state(), SchedulerState::Done);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}

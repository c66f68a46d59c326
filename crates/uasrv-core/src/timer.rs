// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Owned timer handles.
//!
//! A [`TimerHandle`] owns one spawned task that delivers an event into an
//! mpsc channel, either once after a delay or periodically. The receiving
//! side is the engine loop, which keeps all state single-threaded; the timer
//! only produces ticks.
//!
//! Cancellation is synchronous: once [`TimerHandle::cancel`] returns the
//! task is aborted and will send nothing further. Ticks already sitting in the
//! channel are the receiver's business and must be ignored if they name an
//! entity that no longer exists. Dropping a handle cancels it.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Shortest period a periodic timer will run at.
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// A cancellable timer owning its task.
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
    period: Option<Duration>,
}

impl TimerHandle {
    /// Starts a periodic timer sending `event` every `period`.
    ///
    /// The first tick fires one period from now. Missed ticks are delayed,
    /// not bursted. The timer stops by itself when the receiver is gone.
    pub fn periodic<E>(period: Duration, sender: mpsc::Sender<E>, event: E) -> Self
    where
        E: Clone + Send + 'static,
    {
        let period = period.max(MIN_TIMER_PERIOD);
        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if sender.send(event.clone()).await.is_err() {
                    break;
                }
            }
        });

        Self {
            task: Some(task),
            period: Some(period),
        }
    }

    /// Starts a one-shot timer sending `event` after `delay`.
    pub fn once<E>(delay: Duration, sender: mpsc::Sender<E>, event: E) -> Self
    where
        E: Send + 'static,
    {
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = sender.send(event).await;
        });

        Self {
            task: Some(task),
            period: None,
        }
    }

    /// Creates a handle with no task behind it.
    pub fn inactive() -> Self {
        Self {
            task: None,
            period: None,
        }
    }

    /// Stops the timer. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Returns `true` while the timer task is alive.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Returns the period of a periodic timer.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::inactive()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("active", &self.is_active())
            .field("period", &self.period)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

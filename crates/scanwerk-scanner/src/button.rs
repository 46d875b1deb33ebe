// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Hardware button watcher.
//
// Polls the scanner's `scan` button at a fixed cadence and classifies each
// press by duration: shorter than the threshold fires the short-press
// callback, otherwise the long-press callback. Scanner errors while polling
// (the device is busy mid-scan) are treated as "not pressed" so the watcher
// keeps running across back-to-back scans.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::ScanController;

/// Classification of a completed button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressKind {
    Short,
    Long,
}

/// Classify a press held for `duration` against the long-press threshold.
pub fn classify_press(duration: Duration, long_press: Duration) -> PressKind {
    if duration >= long_press {
        PressKind::Long
    } else {
        PressKind::Short
    }
}

/// Shared callback type for press handlers.
pub type PressCallback = Arc<dyn Fn() + Send + Sync>;

/// Watches the scanner button and dispatches press callbacks.
pub struct ButtonWatcher {
    controller: Arc<ScanController>,
    poll_interval: Duration,
    long_press: Duration,
    beep_enabled: bool,
    on_short_press: PressCallback,
    on_long_press: PressCallback,

    // Poll state.
    pressed: bool,
    press_start: Option<Instant>,
    beeped: bool,
}

impl ButtonWatcher {
    pub fn new(
        controller: Arc<ScanController>,
        poll_interval: Duration,
        long_press: Duration,
        beep_enabled: bool,
        on_short_press: PressCallback,
        on_long_press: PressCallback,
    ) -> Self {
        let poll_interval = if poll_interval.is_zero() {
            Duration::from_millis(50)
        } else {
            poll_interval
        };
        let long_press = if long_press.is_zero() {
            Duration::from_secs(1)
        } else {
            long_press
        };

        Self {
            controller,
            poll_interval,
            long_press,
            beep_enabled,
            on_short_press,
            on_long_press,
            pressed: false,
            press_start: None,
            beeped: false,
        }
    }

    /// Poll the button until the token is cancelled.
    pub async fn run(mut self, token: CancellationToken) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            long_press_ms = self.long_press.as_millis() as u64,
            "button watcher started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("button watcher stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.poll(Instant::now());
                }
            }
        }
    }

    /// One poll step. Split out with an explicit clock reading so the state
    /// machine is testable.
    fn poll(&mut self, now: Instant) {
        // Errors mean the scanner is unavailable (e.g. mid-scan): treat as
        // released and keep polling.
        let pressed = match self.controller.button_state("scan") {
            Ok(pressed) => pressed,
            Err(_) => return,
        };

        if pressed && !self.pressed {
            self.press_start = Some(now);
            self.pressed = true;
            self.beeped = false;
            debug!("button pressed, measuring duration");
        } else if pressed && self.pressed {
            let held = self
                .press_start
                .map(|start| now.duration_since(start))
                .unwrap_or_default();
            if self.beep_enabled && !self.beeped && held >= self.long_press {
                tokio::spawn(play_beep());
                self.beeped = true;
                debug!("long press threshold reached");
            }
        } else if !pressed && self.pressed {
            self.pressed = false;
            let duration = self
                .press_start
                .take()
                .map(|start| now.duration_since(start))
                .unwrap_or_default();

            match classify_press(duration, self.long_press) {
                PressKind::Long => {
                    info!(duration_ms = duration.as_millis() as u64, "long press detected");
                    let callback = Arc::clone(&self.on_long_press);
                    tokio::spawn(async move { callback() });
                }
                PressKind::Short => {
                    info!(duration_ms = duration.as_millis() as u64, "short press detected");
                    let callback = Arc::clone(&self.on_short_press);
                    tokio::spawn(async move { callback() });
                }
            }
        }
    }
}

/// Emit an audible beep through the system `beep` utility. Best-effort.
async fn play_beep() {
    let _ = tokio::process::Command::new("beep")
        .args(["-f", "1000", "-l", "100"])
        .status()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StubBackend;
    use crate::backend::{OptionValue, ScanBackend};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn classification_boundary_is_the_threshold() {
        let threshold = Duration::from_millis(800);
        assert_eq!(
            classify_press(Duration::from_millis(799), threshold),
            PressKind::Short
        );
        assert_eq!(
            classify_press(Duration::from_millis(800), threshold),
            PressKind::Long
        );
        assert_eq!(
            classify_press(Duration::from_millis(5000), threshold),
            PressKind::Long
        );
        assert_eq!(classify_press(Duration::ZERO, threshold), PressKind::Short);
    }

    fn press_button(controller: &ScanController, pressed: bool) {
        // Drive the stub's "scan" option directly through set_options'
        // backend path: open state is shared, so a fresh set_option works.
        // The stub stores whatever the test writes.
        controller
            .backend_for_tests()
            .lock()
            .unwrap()
            .set_option("scan", OptionValue::Bool(pressed))
            .unwrap();
    }

    fn watcher_with_counters(
        controller: Arc<ScanController>,
        long_press: Duration,
    ) -> (ButtonWatcher, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let shorts = Arc::new(AtomicUsize::new(0));
        let longs = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&shorts);
        let l = Arc::clone(&longs);
        let watcher = ButtonWatcher::new(
            controller,
            Duration::from_millis(5),
            long_press,
            false,
            Arc::new(move || {
                s.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(move || {
                l.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (watcher, shorts, longs)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn short_press_fires_short_callback() {
        let controller = Arc::new(ScanController::new("", true, Box::new(StubBackend::new())));
        controller.init().unwrap();
        let (mut watcher, shorts, longs) =
            watcher_with_counters(Arc::clone(&controller), Duration::from_millis(100));

        let start = Instant::now();
        press_button(&controller, true);
        watcher.poll(start);
        press_button(&controller, false);
        watcher.poll(start + Duration::from_millis(30));

        settle().await;
        assert_eq!(shorts.load(Ordering::SeqCst), 1);
        assert_eq!(longs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn long_press_fires_long_callback() {
        let controller = Arc::new(ScanController::new("", true, Box::new(StubBackend::new())));
        controller.init().unwrap();
        let (mut watcher, shorts, longs) =
            watcher_with_counters(Arc::clone(&controller), Duration::from_millis(100));

        let start = Instant::now();
        press_button(&controller, true);
        watcher.poll(start);
        press_button(&controller, false);
        watcher.poll(start + Duration::from_millis(250));

        settle().await;
        assert_eq!(shorts.load(Ordering::SeqCst), 0);
        assert_eq!(longs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn held_press_without_release_fires_nothing() {
        let controller = Arc::new(ScanController::new("", true, Box::new(StubBackend::new())));
        controller.init().unwrap();
        let (mut watcher, shorts, longs) =
            watcher_with_counters(Arc::clone(&controller), Duration::from_millis(100));

        let start = Instant::now();
        press_button(&controller, true);
        watcher.poll(start);
        watcher.poll(start + Duration::from_millis(50));
        watcher.poll(start + Duration::from_millis(200));

        settle().await;
        assert_eq!(shorts.load(Ordering::SeqCst), 0);
        assert_eq!(longs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scanner_error_is_treated_as_released() {
        // Controller never opened: button_state errors with NotConnected.
        let controller = Arc::new(ScanController::new("", false, Box::new(StubBackend::new())));
        controller.init().unwrap();
        let (mut watcher, shorts, longs) =
            watcher_with_counters(Arc::clone(&controller), Duration::from_millis(100));

        watcher.poll(Instant::now());
        settle().await;
        assert_eq!(shorts.load(Ordering::SeqCst), 0);
        assert_eq!(longs.load(Ordering::SeqCst), 0);
    }
}

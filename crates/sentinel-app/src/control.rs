//! Operator commands and the control loop that doubles as the capture timer.
//!
//! The loop waits for the next command with a deadline equal to the next timer
//! tick, so pausing, resuming and rescheduling never race a separate timer
//! thread.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sentinel_capture::CaptureEngine;
use sentinel_core::CropRegion;
use sentinel_events::{EventKind, EventSink};
use sentinel_store::RetentionPolicy;
use tracing::{debug, info};

use crate::config::{CaptureInterval, RetentionCount};
use crate::controller::{CaptureController, CaptureOrigin};
use crate::{AgentError, RuntimeStatus, app_version};

/// Closed set of operator commands.
#[derive(Debug)]
pub enum Command {
    /// Capture immediately, even while paused.
    CaptureNow,
    /// Pause or resume the capture timer.
    TogglePause,
    /// Change the timer period; reschedules without capturing.
    SetInterval(CaptureInterval),
    /// Change how many images are kept, from the next retention pass on.
    SetRetention(RetentionCount),
    /// Replace the capture region; `None` captures the full display.
    SetCropRegion(Option<CropRegion>),
    /// Report the current status on the enclosed channel.
    Status(Sender<RuntimeStatus>),
    /// Stop the loop.
    Quit,
}

/// Timer and command dispatcher.
pub struct ControlLoop {
    controller: Arc<CaptureController>,
    engine: Arc<CaptureEngine>,
    retention: Arc<RetentionPolicy>,
    events: Arc<dyn EventSink>,
    interval: CaptureInterval,
    period: Duration,
    paused: bool,
    timer_enabled: bool,
    next_tick: Option<Instant>,
}

impl ControlLoop {
    /// Creates a loop that starts running (not paused).
    ///
    /// With `timer_enabled == false` the timer never fires, but explicit
    /// captures are still served.
    pub fn new(
        controller: Arc<CaptureController>,
        engine: Arc<CaptureEngine>,
        retention: Arc<RetentionPolicy>,
        events: Arc<dyn EventSink>,
        interval: CaptureInterval,
        timer_enabled: bool,
    ) -> Self {
        Self {
            controller,
            engine,
            retention,
            events,
            interval,
            period: interval.duration(),
            paused: false,
            timer_enabled,
            next_tick: None,
        }
    }

    /// Runs the loop on a named thread.
    ///
    /// Returns the command sender and the thread handle. The loop ends on
    /// [`Command::Quit`] or when every sender is dropped.
    ///
    /// # Errors
    /// Returns [`AgentError::Spawn`] when the thread cannot start.
    pub fn spawn(self) -> Result<(Sender<Command>, JoinHandle<()>), AgentError> {
        let (commands, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("sentinel-control".to_string())
            .spawn(move || self.run(receiver))
            .map_err(|source| AgentError::Spawn {
                name: "control loop",
                source,
            })?;
        Ok((commands, handle))
    }

    /// Processes commands and timer ticks until told to quit.
    pub fn run(mut self, commands: Receiver<Command>) {
        if self.timer_enabled {
            self.events.record(
                EventKind::System,
                "Monitoring started",
                &format!("Auto-capture every {}s", self.interval.secs()),
            );
            self.next_tick = Some(Instant::now());
        } else {
            self.events.record(
                EventKind::System,
                "Monitoring started",
                "Auto-capture disabled",
            );
            info!("capture timer disabled by configuration");
        }

        loop {
            let command = match self.next_tick {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.tick();
                        continue;
                    }
                    match commands.recv_timeout(deadline - now) {
                        Ok(command) => command,
                        Err(RecvTimeoutError::Timeout) => {
                            self.tick();
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match commands.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            if !self.handle(command) {
                break;
            }
        }
        info!("control loop stopped");
    }

    fn tick(&mut self) {
        self.controller.request_capture(CaptureOrigin::Timer);
        self.next_tick = Some(Instant::now() + self.period);
    }

    fn handle(&mut self, command: Command) -> bool {
        debug!(?command, "control command");
        match command {
            Command::CaptureNow => {
                self.controller.request_capture(CaptureOrigin::Manual);
            }
            Command::TogglePause => {
                if self.paused {
                    self.paused = false;
                    self.events
                        .record(EventKind::System, "Auto-capture resumed", "");
                    info!("auto-capture resumed");
                    if self.timer_enabled {
                        self.tick();
                    }
                } else {
                    self.paused = true;
                    self.next_tick = None;
                    self.events
                        .record(EventKind::System, "Auto-capture paused", "");
                    info!("auto-capture paused");
                }
            }
            Command::SetInterval(interval) => {
                self.interval = interval;
                self.period = interval.duration();
                if self.next_tick.is_some() {
                    self.next_tick = Some(Instant::now() + self.period);
                }
                info!(interval_secs = interval.secs(), "capture interval changed");
            }
            Command::SetRetention(count) => {
                self.retention.set_keep(count.get());
                info!(keep = count.get(), "retention count changed");
            }
            Command::SetCropRegion(region) => {
                self.engine.set_crop_region(region);
                let body = match self.engine.crop_region() {
                    Some(region) => region.to_string(),
                    None => "Full screen".to_string(),
                };
                self.events
                    .record(EventKind::System, "Capture region changed", &body);
                info!(region = %body, "capture region changed");
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Quit => return false,
        }
        true
    }

    fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            version: app_version(),
            paused: self.paused,
            timer_enabled: self.timer_enabled,
            interval_secs: self.interval.secs(),
            keep_images: self.retention.keep(),
            crop: self.engine.crop_region(),
            capturing: self.controller.is_capturing(),
            stats: self.controller.stats(),
        }
    }

    #[cfg(test)]
    fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for timer scheduling, pause and resume.

    use super::*;
    use crate::power::{NoopInhibitor, PowerGuard};
    use sentinel_capture::{JpegQuality, SyntheticCaptureBackend};
    use sentinel_events::EventLog;
    use sentinel_store::ImageStore;

    struct Rig {
        _dir: tempfile::TempDir,
        backend: Arc<SyntheticCaptureBackend>,
        controller: Arc<CaptureController>,
        events: Arc<EventLog>,
        commands: Sender<Command>,
        handle: JoinHandle<()>,
    }

    fn rig(period: Duration, timer_enabled: bool) -> Rig {
        rig_over(SyntheticCaptureBackend::new(), period, timer_enabled)
    }

    fn rig_over(backend: SyntheticCaptureBackend, period: Duration, timer_enabled: bool) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(backend);
        let engine = Arc::new(CaptureEngine::new(backend.clone(), JpegQuality::default()));
        let store = Arc::new(ImageStore::new(dir.path()));
        let retention = Arc::new(RetentionPolicy::new(50));
        let controller = Arc::new(
            CaptureController::new(
                Arc::clone(&engine),
                store,
                Arc::clone(&retention),
                PowerGuard::new(Arc::new(NoopInhibitor)),
            )
            .unwrap(),
        );
        let events = Arc::new(EventLog::new(50));
        let sink: Arc<dyn EventSink> = events.clone();
        let (commands, handle) = ControlLoop::new(
            Arc::clone(&controller),
            engine,
            retention,
            sink,
            CaptureInterval::default(),
            timer_enabled,
        )
        .with_period(period)
        .spawn()
        .unwrap();
        Rig {
            _dir: dir,
            backend,
            controller,
            events,
            commands,
            handle,
        }
    }

    fn settle() {
        thread::sleep(Duration::from_millis(60));
    }

    #[test]
    fn timer_captures_immediately_then_periodically() {
        let rig = rig(Duration::from_millis(100), true);
        thread::sleep(Duration::from_millis(350));
        let captures = rig.backend.captures();
        assert!((3..=5).contains(&captures), "captures={captures}");

        rig.commands.send(Command::Quit).unwrap();
        rig.handle.join().unwrap();
    }

    #[test]
    fn pause_stops_the_timer_and_resume_captures_at_once() {
        let rig = rig(Duration::from_millis(100), true);
        settle();
        rig.commands.send(Command::TogglePause).unwrap();
        settle();
        let before = rig.backend.captures();

        thread::sleep(Duration::from_millis(300));
        assert_eq!(rig.backend.captures(), before, "no capture while paused");

        rig.commands.send(Command::TogglePause).unwrap();
        settle();
        assert!(rig.backend.captures() > before, "resume captures immediately");

        let titles: Vec<String> = rig
            .events
            .snapshot()
            .into_iter()
            .map(|event| event.title)
            .collect();
        assert_eq!(
            titles,
            vec!["Auto-capture resumed", "Auto-capture paused", "Monitoring started"]
        );

        rig.commands.send(Command::Quit).unwrap();
        rig.handle.join().unwrap();
    }

    #[test]
    fn explicit_capture_runs_while_paused() {
        let rig = rig(Duration::from_millis(100), true);
        settle();
        rig.commands.send(Command::TogglePause).unwrap();
        settle();
        let before = rig.backend.captures();

        rig.commands.send(Command::CaptureNow).unwrap();
        settle();
        assert_eq!(rig.backend.captures(), before + 1);

        rig.commands.send(Command::Quit).unwrap();
        rig.handle.join().unwrap();
    }

    #[test]
    fn disabled_timer_never_fires() {
        let rig = rig(Duration::from_millis(50), false);
        thread::sleep(Duration::from_millis(250));
        assert_eq!(rig.backend.captures(), 0);

        rig.commands.send(Command::TogglePause).unwrap();
        rig.commands.send(Command::TogglePause).unwrap();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(rig.backend.captures(), 0);

        rig.commands.send(Command::Quit).unwrap();
        rig.handle.join().unwrap();
    }

    #[test]
    fn set_interval_reschedules_the_next_tick() {
        let rig = rig(Duration::from_secs(60), true);
        settle();
        assert_eq!(rig.backend.captures(), 1, "startup tick");

        let changed_at = Instant::now();
        rig.commands
            .send(Command::SetInterval(CaptureInterval::from_secs(2).unwrap()))
            .unwrap();
        thread::sleep(Duration::from_millis(1_000));
        assert_eq!(rig.backend.captures(), 1, "interval change does not capture");

        while rig.backend.captures() < 2 && changed_at.elapsed() < Duration::from_millis(2_500) {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(rig.backend.captures(), 2, "rescheduled tick fired");
        assert!(changed_at.elapsed() >= Duration::from_millis(1_900));

        rig.commands.send(Command::Quit).unwrap();
        rig.handle.join().unwrap();
    }

    #[test]
    fn set_interval_leaves_a_running_capture_alone() {
        let backend = SyntheticCaptureBackend::new().with_delay(Duration::from_millis(300));
        let rig = rig_over(backend, Duration::from_secs(60), true);
        thread::sleep(Duration::from_millis(30));
        assert!(rig.controller.is_capturing());

        rig.commands
            .send(Command::SetInterval(CaptureInterval::from_secs(2).unwrap()))
            .unwrap();
        for _ in 0..3 {
            rig.commands.send(Command::CaptureNow).unwrap();
        }
        rig.commands
            .send(Command::SetInterval(CaptureInterval::from_secs(3).unwrap()))
            .unwrap();

        thread::sleep(Duration::from_millis(500));
        assert!(!rig.controller.is_capturing());
        assert_eq!(rig.backend.captures(), 1);
        let stats = rig.controller.stats();
        assert_eq!((stats.captures, stats.failures), (1, 0));

        rig.commands.send(Command::Quit).unwrap();
        rig.handle.join().unwrap();
    }

    #[test]
    fn status_reflects_commands() {
        let rig = rig(Duration::from_secs(60), true);
        rig.commands
            .send(Command::SetInterval(CaptureInterval::from_secs(15).unwrap()))
            .unwrap();
        rig.commands
            .send(Command::SetRetention(RetentionCount::new(20).unwrap()))
            .unwrap();
        rig.commands
            .send(Command::SetCropRegion(Some(CropRegion::new(1, 2, 10, 8).unwrap())))
            .unwrap();

        let (reply, status) = mpsc::channel();
        rig.commands.send(Command::Status(reply)).unwrap();
        let status = status.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(status.interval_secs, 15);
        assert_eq!(status.keep_images, 20);
        assert_eq!(status.crop, Some(CropRegion::new(1, 2, 10, 8).unwrap()));
        assert!(!status.paused);

        rig.commands.send(Command::Quit).unwrap();
        rig.handle.join().unwrap();
    }
}

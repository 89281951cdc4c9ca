use scoreboard_common::config::GroupConfig;
use scoreboard_common::params::ProcessingParameters;
use scoreboard_vision::{FrameProcessor, TickOutput};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::observer::{CaptureObserver, LifecycleEvent, StopReason};
use crate::source::{Interrupt, SourceError, SourceGuard, SourceOpener};

const THREAD_NAME: &str = "capture-loop";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Running,
    Paused,
    /// Terminal.
    Stopped,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::Running => "running",
            CaptureState::Paused => "paused",
            CaptureState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture startup failed: {0}")]
    Startup(#[from] SourceError),
    #[error("operation not valid while {0}")]
    InvalidState(CaptureState),
    #[error("failed to spawn capture thread: {0}")]
    Thread(std::io::Error),
}

/// State shared between the control handle and the capture thread.
struct Shared {
    state: Mutex<CaptureState>,
    wake: Condvar,
    params: Mutex<Arc<ProcessingParameters>>,
    pending_groups: Mutex<Option<Vec<GroupConfig>>>,
    frame_delay: Mutex<Duration>,
    observers: RwLock<Vec<Arc<dyn CaptureObserver>>>,
    /// Unblocks the capture thread's pending read on kill.
    interrupt: Mutex<Option<Arc<dyn Interrupt>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn state(&self) -> CaptureState {
        *lock(&self.state)
    }

    fn observers(&self) -> Vec<Arc<dyn CaptureObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn emit(&self, event: &LifecycleEvent) {
        debug!(?event, "capture lifecycle");
        for observer in self.observers() {
            observer.on_lifecycle(event);
        }
    }

    fn notify(&self, output: &TickOutput) {
        for observer in self.observers() {
            observer.notify(&output.values, &output.previews);
        }
    }

    /// Move `from` to `to`; returns false if the loop was not in `from`.
    fn transition(&self, from: CaptureState, to: CaptureState) -> bool {
        let mut state = lock(&self.state);
        if *state != from {
            return false;
        }
        *state = to;
        drop(state);
        self.wake.notify_all();
        true
    }

    /// Park while paused. Returns false once stopped.
    fn wait_runnable(&self) -> bool {
        let state = lock(&self.state);
        let state = self
            .wake
            .wait_while(state, |s| *s == CaptureState::Paused)
            .unwrap_or_else(PoisonError::into_inner);
        *state != CaptureState::Stopped
    }

    /// Inter-frame delay, cut short by pause or kill.
    fn sleep(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let state = lock(&self.state);
        let _ = self
            .wake
            .wait_timeout_while(state, delay, |s| *s == CaptureState::Running)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Accept a live update unless the loop is already stopped.
    fn accepts_updates(&self, what: &str) -> bool {
        if self.state() == CaptureState::Stopped {
            debug!(update = what, "capture loop stopped, ignoring update");
            return false;
        }
        true
    }
}

/// Drives a video source through the frame processor on a dedicated thread.
///
/// All methods take `&self` so the loop can be shared behind an `Arc`
/// between the control API and the shutdown path.
pub struct CaptureLoop {
    shared: Arc<Shared>,
    opener: Arc<dyn SourceOpener>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureLoop {
    pub fn new(
        opener: Arc<dyn SourceOpener>,
        groups: Vec<GroupConfig>,
        params: ProcessingParameters,
        frame_delay: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CaptureState::Idle),
                wake: Condvar::new(),
                params: Mutex::new(Arc::new(params)),
                pending_groups: Mutex::new(Some(groups)),
                frame_delay: Mutex::new(frame_delay),
                observers: RwLock::new(Vec::new()),
                interrupt: Mutex::new(None),
            }),
            opener,
            worker: Mutex::new(None),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn CaptureObserver>) {
        debug!(observer = observer.name(), "registered capture observer");
        self.shared
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn state(&self) -> CaptureState {
        self.shared.state()
    }

    pub fn params(&self) -> ProcessingParameters {
        lock(&self.shared.params).as_ref().clone()
    }

    /// Open the source on the calling thread and hand it to the capture thread.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut worker = lock(&self.worker);
        let current = self.state();
        if current != CaptureState::Idle {
            return Err(CaptureError::InvalidState(current));
        }

        let source_name = self.opener.describe();
        let source = match self.opener.open() {
            Ok(source) => source,
            Err(e) => {
                error!(source = %source_name, error = %e, "failed to open video source");
                self.shared.emit(&LifecycleEvent::StartupFailed {
                    source: source_name,
                    error: e.to_string(),
                });
                return Err(CaptureError::Startup(e));
            }
        };
        let guard = SourceGuard::new(source);
        *lock(&self.shared.interrupt) = guard.interrupter();

        // A kill() that raced the open wins; the guard releases the source.
        if !self.shared.transition(CaptureState::Idle, CaptureState::Running) {
            return Err(CaptureError::InvalidState(self.state()));
        }

        let shared = Arc::clone(&self.shared);
        let thread_source = source_name.clone();
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || run(shared, guard, thread_source));
        match spawned {
            Ok(handle) => {
                info!(source = %source_name, "capture loop started");
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.transition(CaptureState::Running, CaptureState::Idle);
                error!(error = %e, "failed to spawn capture thread");
                self.shared.emit(&LifecycleEvent::StartupFailed {
                    source: source_name,
                    error: e.to_string(),
                });
                Err(CaptureError::Thread(e))
            }
        }
    }

    pub fn pause(&self) -> bool {
        let paused = self
            .shared
            .transition(CaptureState::Running, CaptureState::Paused);
        if paused {
            info!("capture paused");
            self.shared.emit(&LifecycleEvent::Paused);
        }
        paused
    }

    pub fn resume(&self) -> bool {
        let resumed = self
            .shared
            .transition(CaptureState::Paused, CaptureState::Running);
        if resumed {
            info!("capture resumed");
            self.shared.emit(&LifecycleEvent::Resumed);
        }
        resumed
    }

    pub fn toggle_pause(&self) -> bool {
        match self.state() {
            CaptureState::Running => self.pause(),
            CaptureState::Paused => self.resume(),
            _ => false,
        }
    }

    /// Stop the loop for good. Joins the capture thread unless called from it.
    pub fn kill(&self) {
        let previous = {
            let mut state = lock(&self.shared.state);
            std::mem::replace(&mut *state, CaptureState::Stopped)
        };
        self.shared.wake.notify_all();
        if let Some(interrupt) = lock(&self.shared.interrupt).take() {
            interrupt.interrupt();
        }

        let handle = lock(&self.worker).take();
        match handle {
            Some(handle) if handle.thread().id() == thread::current().id() => {
                debug!("kill requested from the capture thread");
            }
            Some(handle) => {
                if handle.join().is_err() {
                    error!("capture thread panicked");
                }
            }
            None if previous == CaptureState::Idle => {
                info!("capture loop stopped before start");
                self.shared.emit(&LifecycleEvent::Stopped {
                    reason: StopReason::Killed,
                });
            }
            None => {}
        }
    }

    pub fn update_params(&self, params: ProcessingParameters) {
        if self.shared.accepts_updates("params") {
            *lock(&self.shared.params) = Arc::new(params);
        }
    }

    /// Replace every digit group; tracking state restarts on the next tick.
    pub fn update_coordinates(&self, groups: Vec<GroupConfig>) {
        if self.shared.accepts_updates("coordinates") {
            *lock(&self.shared.pending_groups) = Some(groups);
        }
    }

    pub fn set_frame_delay(&self, delay: Duration) {
        if self.shared.accepts_updates("frame_delay") {
            *lock(&self.shared.frame_delay) = delay;
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if self.state() != CaptureState::Stopped || lock(&self.worker).is_some() {
            self.kill();
        }
    }
}

fn run(shared: Arc<Shared>, mut guard: SourceGuard, source: String) {
    shared.emit(&LifecycleEvent::Started { source });
    let mut processor = FrameProcessor::new(&[]);
    let mut ticks: u64 = 0;

    let reason = loop {
        if !shared.wait_runnable() {
            break StopReason::Killed;
        }

        if let Some(groups) = lock(&shared.pending_groups).take() {
            debug!(count = groups.len(), "applying digit groups");
            processor.replace_groups(&groups);
        }
        let params = Arc::clone(&lock(&shared.params));

        let read = guard.read_frame();
        match shared.state() {
            CaptureState::Stopped => break StopReason::Killed,
            CaptureState::Paused if matches!(read, Ok(Some(_))) => {
                debug!(ticks, "paused during read, dropping frame");
                continue;
            }
            _ => {}
        }
        let frame = match read {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(ticks, "video source reached end of stream");
                break StopReason::EndOfStream;
            }
            Err(e) => {
                warn!(error = %e, ticks, "frame read failed");
                break StopReason::ReadFailure(e.to_string());
            }
        };

        let output = processor.process(&frame, &params);
        drop(frame);
        match shared.state() {
            CaptureState::Stopped => break StopReason::Killed,
            CaptureState::Paused => {
                debug!(ticks, "paused during processing, dropping result");
                continue;
            }
            _ => {}
        }
        shared.notify(&output);
        ticks += 1;

        let delay = *lock(&shared.frame_delay);
        shared.sleep(delay);
    };

    *lock(&shared.state) = CaptureState::Stopped;
    shared.wake.notify_all();
    lock(&shared.interrupt).take();
    guard.release();
    info!(?reason, ticks, "capture loop stopped");
    shared.emit(&LifecycleEvent::Stopped { reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use scoreboard_common::config::GroupMode;
    use scoreboard_common::frame::{DecodedValues, FrameBuffer};
    use scoreboard_common::geometry::BoundingBox;
    use scoreboard_vision::PreviewFrames;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Instant;

    use crate::source::VideoSource;

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        releases: AtomicUsize,
    }

    struct MockOpener {
        counters: Arc<Counters>,
        frames: Option<usize>,
        fail: bool,
    }

    struct MockSource {
        counters: Arc<Counters>,
        remaining: Option<usize>,
        seq: u64,
    }

    impl SourceOpener for MockOpener {
        fn open(&self) -> Result<Box<dyn VideoSource>, SourceError> {
            if self.fail {
                return Err(SourceError::Open {
                    uri: "mock".into(),
                    reason: "no such device".into(),
                });
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockSource {
                counters: Arc::clone(&self.counters),
                remaining: self.frames,
                seq: 0,
            }))
        }

        fn describe(&self) -> String {
            "mock".into()
        }
    }

    impl VideoSource for MockSource {
        fn read_frame(&mut self) -> Result<Option<FrameBuffer>, SourceError> {
            if let Some(remaining) = self.remaining.as_mut() {
                if *remaining == 0 {
                    return Ok(None);
                }
                *remaining -= 1;
            }
            self.seq += 1;
            Ok(Some(FrameBuffer::from_rgb(RgbImage::new(40, 30), 0, self.seq)))
        }

        fn release(&mut self) {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        ticks: AtomicUsize,
        events: Mutex<Vec<LifecycleEvent>>,
        last: Mutex<Option<DecodedValues>>,
    }

    impl RecordingObserver {
        fn ticks(&self) -> usize {
            self.ticks.load(Ordering::SeqCst)
        }

        fn events(&self) -> Vec<LifecycleEvent> {
            self.events.lock().unwrap().clone()
        }

        fn stopped_count(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| matches!(e, LifecycleEvent::Stopped { .. }))
                .count()
        }
    }

    impl CaptureObserver for RecordingObserver {
        fn notify(&self, values: &DecodedValues, _previews: &PreviewFrames) {
            *self.last.lock().unwrap() = Some(values.clone());
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }

        fn on_lifecycle(&self, event: &LifecycleEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn spawn_loop(frames: Option<usize>, fail: bool) -> (CaptureLoop, Arc<Counters>, Arc<RecordingObserver>) {
        let counters = Arc::new(Counters::default());
        let opener = MockOpener {
            counters: Arc::clone(&counters),
            frames,
            fail,
        };
        let capture = CaptureLoop::new(
            Arc::new(opener),
            Vec::new(),
            ProcessingParameters::default(),
            Duration::from_millis(2),
        );
        let observer = Arc::new(RecordingObserver::default());
        capture.add_observer(observer.clone());
        (capture, counters, observer)
    }

    /// Source whose reads block until the test opens the gate. `true` lets a
    /// frame through, `false` (sent by the interrupter) ends the stream.
    struct GatedOpener {
        counters: Arc<Counters>,
        entered: Mutex<mpsc::Sender<()>>,
        gate: Mutex<Option<mpsc::Receiver<bool>>>,
        release_gate: mpsc::Sender<bool>,
        interrupts: Arc<AtomicUsize>,
    }

    struct GatedSource {
        counters: Arc<Counters>,
        entered: mpsc::Sender<()>,
        gate: mpsc::Receiver<bool>,
        interrupter: Arc<GateInterrupt>,
        seq: u64,
    }

    struct GateInterrupt {
        release_gate: Mutex<mpsc::Sender<bool>>,
        interrupts: Arc<AtomicUsize>,
    }

    impl Interrupt for GateInterrupt {
        fn interrupt(&self) {
            self.interrupts.fetch_add(1, Ordering::SeqCst);
            let _ = self.release_gate.lock().unwrap().send(false);
        }
    }

    impl SourceOpener for GatedOpener {
        fn open(&self) -> Result<Box<dyn VideoSource>, SourceError> {
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().unwrap().take().ok_or_else(|| SourceError::Open {
                uri: "gated".into(),
                reason: "already opened".into(),
            })?;
            Ok(Box::new(GatedSource {
                counters: Arc::clone(&self.counters),
                entered: self.entered.lock().unwrap().clone(),
                gate,
                interrupter: Arc::new(GateInterrupt {
                    release_gate: Mutex::new(self.release_gate.clone()),
                    interrupts: Arc::clone(&self.interrupts),
                }),
                seq: 0,
            }))
        }

        fn describe(&self) -> String {
            "gated".into()
        }
    }

    impl VideoSource for GatedSource {
        fn read_frame(&mut self) -> Result<Option<FrameBuffer>, SourceError> {
            let _ = self.entered.send(());
            match self.gate.recv_timeout(Duration::from_secs(10)) {
                Ok(true) => {
                    self.seq += 1;
                    Ok(Some(FrameBuffer::from_rgb(RgbImage::new(40, 30), 0, self.seq)))
                }
                _ => Ok(None),
            }
        }

        fn release(&mut self) {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn interrupter(&self) -> Option<Arc<dyn Interrupt>> {
            let interrupter: Arc<dyn Interrupt> = self.interrupter.clone();
            Some(interrupter)
        }
    }

    struct Gated {
        capture: CaptureLoop,
        counters: Arc<Counters>,
        observer: Arc<RecordingObserver>,
        entered: mpsc::Receiver<()>,
        gate: mpsc::Sender<bool>,
        interrupts: Arc<AtomicUsize>,
    }

    impl Gated {
        fn wait_for_read(&self) {
            self.entered
                .recv_timeout(Duration::from_secs(5))
                .expect("capture thread never reached the source");
        }

        fn let_frame_through(&self) {
            self.gate.send(true).unwrap();
        }
    }

    fn spawn_gated() -> Gated {
        let counters = Arc::new(Counters::default());
        let interrupts = Arc::new(AtomicUsize::new(0));
        let (entered_tx, entered) = mpsc::channel();
        let (gate, gate_rx) = mpsc::channel();
        let opener = GatedOpener {
            counters: Arc::clone(&counters),
            entered: Mutex::new(entered_tx),
            gate: Mutex::new(Some(gate_rx)),
            release_gate: gate.clone(),
            interrupts: Arc::clone(&interrupts),
        };
        let capture = CaptureLoop::new(
            Arc::new(opener),
            Vec::new(),
            ProcessingParameters::default(),
            Duration::from_millis(2),
        );
        let observer = Arc::new(RecordingObserver::default());
        capture.add_observer(observer.clone());
        Gated {
            capture,
            counters,
            observer,
            entered,
            gate,
            interrupts,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn startup_failure_stays_idle_and_reports_once() {
        let (capture, counters, observer) = spawn_loop(None, true);
        assert!(matches!(capture.start(), Err(CaptureError::Startup(_))));
        assert_eq!(capture.state(), CaptureState::Idle);

        let events = observer.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], LifecycleEvent::StartupFailed { .. }));
        assert_eq!(counters.releases.load(Ordering::SeqCst), 0);
        assert_eq!(observer.ticks(), 0);
    }

    #[test]
    fn double_kill_releases_once() {
        let (capture, counters, observer) = spawn_loop(None, false);
        capture.start().unwrap();
        wait_until(|| observer.ticks() >= 2);

        capture.kill();
        capture.kill();
        assert_eq!(capture.state(), CaptureState::Stopped);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
        assert_eq!(observer.stopped_count(), 1);
        assert_eq!(
            observer.events().last(),
            Some(&LifecycleEvent::Stopped {
                reason: StopReason::Killed
            })
        );

        let ticks = observer.ticks();
        let events = observer.events().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(observer.ticks(), ticks);
        assert_eq!(observer.events().len(), events);
    }

    #[test]
    fn pause_and_resume_keep_the_source_open() {
        let (capture, counters, observer) = spawn_loop(None, false);
        capture.start().unwrap();
        wait_until(|| observer.ticks() >= 1);

        assert!(capture.pause());
        assert!(!capture.pause());
        assert_eq!(capture.state(), CaptureState::Paused);
        thread::sleep(Duration::from_millis(20));
        let paused_ticks = observer.ticks();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(observer.ticks(), paused_ticks);

        assert!(capture.toggle_pause());
        assert_eq!(capture.state(), CaptureState::Running);
        wait_until(|| observer.ticks() > paused_ticks);

        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 0);
        assert!(observer.events().contains(&LifecycleEvent::Paused));
        assert!(observer.events().contains(&LifecycleEvent::Resumed));

        capture.kill();
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn kill_while_paused_wakes_the_thread() {
        let (capture, counters, observer) = spawn_loop(None, false);
        capture.start().unwrap();
        wait_until(|| observer.ticks() >= 1);
        capture.pause();
        capture.kill();
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
        assert_eq!(observer.stopped_count(), 1);
    }

    #[test]
    fn end_of_stream_stops_the_loop() {
        let (capture, counters, observer) = spawn_loop(Some(3), false);
        capture.start().unwrap();
        wait_until(|| capture.state() == CaptureState::Stopped && observer.stopped_count() == 1);

        assert_eq!(observer.ticks(), 3);
        assert!(observer.events().contains(&LifecycleEvent::Stopped {
            reason: StopReason::EndOfStream
        }));
        capture.kill();
        assert_eq!(observer.stopped_count(), 1);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn updates_after_stop_are_ignored() {
        let (capture, _counters, observer) = spawn_loop(None, false);
        capture.kill();
        assert_eq!(capture.state(), CaptureState::Stopped);
        assert_eq!(observer.stopped_count(), 1);

        let params = ProcessingParameters {
            threshold: 10,
            ..ProcessingParameters::default()
        };
        capture.update_params(params);
        assert_eq!(capture.params().threshold, 127);
        assert!(matches!(
            capture.start(),
            Err(CaptureError::InvalidState(CaptureState::Stopped))
        ));
    }

    #[test]
    fn coordinate_updates_apply_on_next_tick() {
        let (capture, _counters, observer) = spawn_loop(None, false);
        capture.start().unwrap();
        wait_until(|| observer.ticks() >= 1);

        capture.update_coordinates(vec![GroupConfig {
            name: "home".into(),
            mode: GroupMode::Fixed,
            rect: BoundingBox::new(0, 0, 10, 10),
        }]);
        wait_until(|| {
            observer
                .last
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|v| v.get("home").is_some())
        });
        capture.kill();
    }

    #[test]
    fn second_start_is_rejected() {
        let (capture, counters, observer) = spawn_loop(None, false);
        capture.start().unwrap();
        assert!(matches!(
            capture.start(),
            Err(CaptureError::InvalidState(CaptureState::Running))
        ));
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
        capture.kill();
        assert!(observer.events().contains(&LifecycleEvent::Started {
            source: "mock".into()
        }));
    }

    #[test]
    fn frame_read_across_a_pause_is_dropped() {
        let gated = spawn_gated();
        gated.capture.start().unwrap();

        gated.wait_for_read();
        gated.let_frame_through();
        gated.wait_for_read();
        assert_eq!(gated.observer.ticks(), 1);

        // The second read completes only after the pause request.
        assert!(gated.capture.pause());
        gated.let_frame_through();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(gated.observer.ticks(), 1);
        assert_eq!(gated.capture.state(), CaptureState::Paused);

        assert!(gated.capture.resume());
        gated.wait_for_read();
        gated.let_frame_through();
        wait_until(|| gated.observer.ticks() == 2);

        gated.capture.kill();
        assert_eq!(gated.counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn kill_interrupts_a_blocked_read() {
        let gated = spawn_gated();
        gated.capture.start().unwrap();
        gated.wait_for_read();
        gated.let_frame_through();
        gated.wait_for_read();

        let started = Instant::now();
        gated.capture.kill();
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(gated.interrupts.load(Ordering::SeqCst), 1);
        assert_eq!(gated.counters.releases.load(Ordering::SeqCst), 1);
        assert_eq!(gated.observer.ticks(), 1);
        assert_eq!(
            gated.observer.events().last(),
            Some(&LifecycleEvent::Stopped {
                reason: StopReason::Killed
            })
        );

        gated.capture.kill();
        assert_eq!(gated.interrupts.load(Ordering::SeqCst), 1);
        assert_eq!(gated.counters.releases.load(Ordering::SeqCst), 1);
    }
}

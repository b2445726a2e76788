//! Adapter facade — device lifecycle state machine and the worker threads
//! behind it.
//!
//! One [`GcAdapter`] owns everything: the scan thread that discovers the
//! device, the read/write threads that move frames, and the shared state the
//! caller-facing operations consume. Locking is scoped per resource so the
//! polling-rate paths (`input`, `output`) never stall behind a blocking
//! transfer.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::{ChannelDevice, ConfigSource, CoreRuntime, SubscriptionId};
use crate::device::{strerror, DeviceError, DeviceId, HotplugSink, Session, Transport};
use crate::pad::{
    decode_channel, frame_valid, rumble_command, ControllerType, PadStatus, RUMBLE_STOP,
};
use crate::protocol::{INPUT_PAYLOAD_SIZE, NUM_CHANNELS, SCAN_INTERVAL_MS};
use crate::sync::Event;

// ── Status ──

const RAW_NOT_DETECTED: i32 = 0;
const RAW_DETECTED: i32 = 1;

/// Detection state of the adapter, shared across threads as a single word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStatus {
    NotDetected,
    Detected,
    /// Persistent open/claim failure; carries the platform error code.
    Error(i32),
}

impl AdapterStatus {
    fn from_raw(raw: i32) -> Self {
        match raw {
            RAW_NOT_DETECTED => AdapterStatus::NotDetected,
            RAW_DETECTED => AdapterStatus::Detected,
            code => AdapterStatus::Error(code),
        }
    }

    fn raw(self) -> i32 {
        match self {
            AdapterStatus::NotDetected => RAW_NOT_DETECTED,
            AdapterStatus::Detected => RAW_DETECTED,
            AdapterStatus::Error(code) => code,
        }
    }
}

/// Token returned by [`GcAdapter::register_detect_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectToken(u64);

// ── Shared state ──

struct InputBuffer {
    frame: [u8; INPUT_PAYLOAD_SIZE],
    /// 0 (no data this cycle) or exactly the frame size.
    len: usize,
}

#[derive(Default)]
struct WorkerHandles {
    read: Option<JoinHandle<()>>,
    write: Option<JoinHandle<()>>,
}

/// Everything the workers and the facade operations share. Held in an `Arc`
/// so worker threads outlive any single facade call but never the adapter.
struct AdapterShared {
    transport: Arc<dyn Transport>,
    config: Arc<dyn ConfigSource>,
    runtime: Arc<dyn CoreRuntime>,

    status: AtomicI32,
    controller_type: [AtomicU8; NUM_CHANNELS],
    rumble: [AtomicU8; NUM_CHANNELS],

    // Config snapshot, refreshed by the subscription callback so the frame
    // poll never takes the config source's locks.
    port_is_adapter: [AtomicBool; NUM_CHANNELS],
    rumble_enabled: [AtomicBool; NUM_CHANNELS],

    input: Mutex<InputBuffer>,
    rumble_wake: Event,

    session: Mutex<Option<Arc<dyn Session>>>,
    workers: Mutex<WorkerHandles>,
    // Serializes setup against teardown. Hot paths take it with try_lock and
    // bail rather than stall behind a reset in progress.
    setup_reset: Mutex<()>,

    hotplug_sink: Arc<HotplugSink>,
    hotplug_enabled: AtomicBool,

    read_run: AtomicBool,
    write_run: AtomicBool,
    scan_run: AtomicBool,
    scan_wake: Event,
    // Set by the write worker on a fatal session error; the scan worker
    // performs the actual reset (a worker cannot join itself).
    pending_reset: AtomicBool,

    detect_callbacks: Mutex<Vec<(u64, Box<dyn Fn() + Send + Sync>)>>,
    next_token: AtomicU64,

    last_init: AtomicU64,
}

impl AdapterShared {
    fn new(
        transport: Arc<dyn Transport>,
        config: Arc<dyn ConfigSource>,
        runtime: Arc<dyn CoreRuntime>,
    ) -> Self {
        AdapterShared {
            transport,
            config,
            runtime,
            status: AtomicI32::new(RAW_NOT_DETECTED),
            controller_type: std::array::from_fn(|_| AtomicU8::new(ControllerType::None as u8)),
            rumble: std::array::from_fn(|_| AtomicU8::new(0)),
            port_is_adapter: std::array::from_fn(|_| AtomicBool::new(false)),
            rumble_enabled: std::array::from_fn(|_| AtomicBool::new(false)),
            input: Mutex::new(InputBuffer {
                frame: [0; INPUT_PAYLOAD_SIZE],
                len: 0,
            }),
            rumble_wake: Event::new(),
            session: Mutex::new(None),
            workers: Mutex::new(WorkerHandles::default()),
            setup_reset: Mutex::new(()),
            hotplug_sink: Arc::new(HotplugSink::new()),
            hotplug_enabled: AtomicBool::new(false),
            read_run: AtomicBool::new(false),
            write_run: AtomicBool::new(false),
            scan_run: AtomicBool::new(false),
            scan_wake: Event::new(),
            pending_reset: AtomicBool::new(false),
            detect_callbacks: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
            last_init: AtomicU64::new(0),
        }
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn status(&self) -> AdapterStatus {
        AdapterStatus::from_raw(self.status.load(Ordering::SeqCst))
    }

    /// Record a status transition; fires the detect callbacks only when the
    /// value actually changed.
    fn set_status(&self, status: AdapterStatus) {
        let old = self.status.swap(status.raw(), Ordering::SeqCst);
        if old != status.raw() {
            self.notify_detect();
        }
    }

    fn notify_detect(&self) {
        let callbacks = self.lock(&self.detect_callbacks);
        for (_, callback) in callbacks.iter() {
            callback();
        }
    }

    fn refresh_config(&self) {
        for chan in 0..NUM_CHANNELS {
            let uses_adapter = self.config.device_type(chan) == ChannelDevice::Adapter;
            self.port_is_adapter[chan].store(uses_adapter, Ordering::SeqCst);
            self.rumble_enabled[chan].store(self.config.rumble_enabled(chan), Ordering::SeqCst);
        }
    }

    /// Whether any channel is configured to use this adapter.
    fn use_adapter(&self) -> bool {
        self.port_is_adapter
            .iter()
            .any(|p| p.load(Ordering::SeqCst))
    }

    fn session_open(&self) -> bool {
        self.lock(&self.session).is_some()
    }

    fn current_session(&self) -> Option<Arc<dyn Session>> {
        self.lock(&self.session).clone()
    }

    fn clear_channel_state(&self) {
        for chan in 0..NUM_CHANNELS {
            self.controller_type[chan].store(ControllerType::None as u8, Ordering::SeqCst);
            self.rumble[chan].store(0, Ordering::SeqCst);
        }
    }

    /// Zero every motor and push the stop command. Caller holds `setup_reset`.
    fn zero_rumble_locked(&self) {
        for chan in 0..NUM_CHANNELS {
            self.rumble[chan].store(0, Ordering::SeqCst);
        }
        if let Some(session) = self.current_session() {
            if let Err(e) = session.write_frame(&RUMBLE_STOP) {
                log::warn!("rumble stop write failed: {e}");
            }
        }
    }

    /// Tear the session down if nobody else is mid-setup/reset; skipping is
    /// fine because the holder performs an equivalent teardown.
    fn try_reset(&self) {
        if let Ok(guard) = self.setup_reset.try_lock() {
            self.reset_locked(guard);
        }
    }

    /// Unconditional teardown; used by shutdown, which must not skip.
    fn force_reset(&self) {
        let guard = self.lock(&self.setup_reset);
        self.reset_locked(guard);
    }

    fn reset_locked(&self, _guard: MutexGuard<'_, ()>) {
        self.read_run.store(false, Ordering::SeqCst);
        self.write_run.store(false, Ordering::SeqCst);
        self.rumble_wake.set();

        let handles = {
            let mut workers = self.lock(&self.workers);
            mem::take(&mut *workers)
        };
        if let Some(handle) = handles.write {
            let _ = handle.join();
        }
        if let Some(handle) = handles.read {
            let _ = handle.join();
        }
        // The join wake may still be pending if the write worker exited
        // without consuming it; clear it so the next session's worker
        // starts parked.
        self.rumble_wake.reset();

        self.clear_channel_state();
        self.lock(&self.input).len = 0;

        // Last reference; dropping releases the claim and closes the handle.
        let session = self.lock(&self.session).take();
        let had_session = session.is_some();
        drop(session);

        if had_session {
            log::info!("GC adapter detached");
        }
        self.set_status(AdapterStatus::NotDetected);
    }

    /// React to a hotplug removal notification.
    fn handle_removal(&self, id: DeviceId) {
        let is_current = self
            .current_session()
            .map(|s| s.device_id() == id)
            .unwrap_or(false);
        if is_current {
            self.try_reset();
        } else if self.status.load(Ordering::SeqCst) < 0 {
            // The device we failed to open just went away; the recorded
            // error code is stale.
            self.set_status(AdapterStatus::NotDetected);
        }
    }
}

// ── Workers ──

/// Discover the adapter, open a session, and react to removal. Event-driven
/// when the transport supports hotplug, 500 ms polling otherwise.
fn scan_worker(shared: Arc<AdapterShared>) {
    log::info!("GC adapter scanning thread started");
    while shared.scan_run.load(Ordering::SeqCst) {
        if shared.pending_reset.swap(false, Ordering::SeqCst) {
            shared.try_reset();
        }
        if shared.hotplug_enabled.load(Ordering::SeqCst) {
            if let Some(removed) = shared.hotplug_sink.take_removed() {
                shared.handle_removal(removed);
            }
            if shared.hotplug_sink.take_arrived()
                && !shared.session_open()
                && shared.use_adapter()
            {
                setup(&shared);
            }
        } else if !shared.session_open() && shared.use_adapter() {
            setup(&shared);
        }
        shared
            .transport
            .wait_scan_trigger(&shared.scan_wake, Duration::from_millis(SCAN_INTERVAL_MS));
    }
    log::info!("GC adapter scanning thread stopped");
}

/// Open and claim the device, then start the data-plane workers.
fn setup(shared: &Arc<AdapterShared>) {
    let _guard = shared.lock(&shared.setup_reset);

    shared.clear_channel_state();
    shared.lock(&shared.input).len = 0;

    match shared.transport.open() {
        Ok(session) => {
            *shared.lock(&shared.session) = Some(Arc::clone(&session));
            shared.zero_rumble_locked();

            shared.read_run.store(true, Ordering::SeqCst);
            shared.write_run.store(true, Ordering::SeqCst);

            let read = {
                let shared = Arc::clone(shared);
                let session = Arc::clone(&session);
                std::thread::Builder::new()
                    .name("gcadapter read".into())
                    .spawn(move || read_worker(shared, session))
            };
            let write = {
                let shared = Arc::clone(shared);
                let session = Arc::clone(&session);
                std::thread::Builder::new()
                    .name("gcadapter write".into())
                    .spawn(move || write_worker(shared, session))
            };
            match (read, write) {
                (Ok(read), Ok(write)) => {
                    let mut workers = shared.lock(&shared.workers);
                    workers.read = Some(read);
                    workers.write = Some(write);
                    shared.set_status(AdapterStatus::Detected);
                }
                (read, write) => {
                    log::error!("failed to spawn adapter worker thread");
                    shared.read_run.store(false, Ordering::SeqCst);
                    shared.write_run.store(false, Ordering::SeqCst);
                    shared.rumble_wake.set();
                    if let Ok(handle) = read {
                        let _ = handle.join();
                    }
                    if let Ok(handle) = write {
                        let _ = handle.join();
                    }
                    shared.lock(&shared.session).take();
                    shared.set_status(AdapterStatus::NotDetected);
                }
            }
        }
        Err(DeviceError::NotFound) => {
            shared.set_status(AdapterStatus::NotDetected);
        }
        Err(e) => {
            log::error!("GC adapter setup failed: {e}");
            shared.set_status(AdapterStatus::Error(e.code().unwrap_or(-99)));
        }
    }
}

/// Pull frames into the shared buffer. One short blocking read per iteration
/// so the stop flag is re-checked promptly; transient errors are expected.
fn read_worker(shared: Arc<AdapterShared>, session: Arc<dyn Session>) {
    log::info!("GC adapter read thread started");
    let tagged = session.frames_tagged();
    let mut local = [0u8; INPUT_PAYLOAD_SIZE];
    while shared.read_run.load(Ordering::SeqCst) {
        match session.read_frame(&mut local) {
            Ok(len) => {
                if frame_valid(&local, len, tagged) {
                    // O(1) publish: swap the filled buffer in, take the
                    // previously exposed one back as scratch.
                    let mut input = shared.lock(&shared.input);
                    mem::swap(&mut input.frame, &mut local);
                    input.len = len;
                } else {
                    log::debug!("unexpected adapter frame: size {len}");
                    shared.lock(&shared.input).len = 0;
                }
            }
            Err(e) => {
                log::error!("adapter read failed: {e}");
                shared.lock(&shared.input).len = 0;
            }
        }
    }
    log::info!("GC adapter read thread stopped");
}

/// Push rumble commands when woken. Stays parked on the wake signal between
/// output changes; newer payloads overwrite the pending one rather than queue.
fn write_worker(shared: Arc<AdapterShared>, session: Arc<dyn Session>) {
    log::info!("GC adapter write thread started");
    while shared.write_run.load(Ordering::SeqCst) {
        shared.rumble_wake.wait();
        if !shared.write_run.load(Ordering::SeqCst) {
            break;
        }
        let levels: [u8; NUM_CHANNELS] =
            std::array::from_fn(|chan| shared.rumble[chan].load(Ordering::SeqCst));
        match session.write_frame(&rumble_command(&levels)) {
            Ok(_) => {}
            Err(e @ DeviceError::WriteSizeMismatch { .. }) => {
                log::error!("adapter session wedged: {e}");
                shared.pending_reset.store(true, Ordering::SeqCst);
                shared.scan_wake.set();
                break;
            }
            Err(e) => log::error!("rumble write failed: {e}"),
        }
    }
    log::info!("GC adapter write thread stopped");
}

// ── Facade ──

/// The adapter driver. One instance per process; create, `init`, use, then
/// `shutdown` (or drop, which shuts down).
pub struct GcAdapter {
    shared: Arc<AdapterShared>,
    scan_thread: Mutex<Option<JoinHandle<()>>>,
    config_subscription: Mutex<Option<SubscriptionId>>,
    initialized: AtomicBool,
}

impl GcAdapter {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<dyn ConfigSource>,
        runtime: Arc<dyn CoreRuntime>,
    ) -> Self {
        GcAdapter {
            shared: Arc::new(AdapterShared::new(transport, config, runtime)),
            scan_thread: Mutex::new(None),
            config_subscription: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Start the driver: snapshot configuration, subscribe to changes, and
    /// begin scanning if any port wants the adapter.
    ///
    /// Idempotent. While a core loop is running, re-initialization within one
    /// second of the previous attempt is suppressed so a misbehaving device
    /// is not hammered mid-session.
    pub fn init(&self) {
        if self.initialized.load(Ordering::SeqCst) {
            return;
        }
        if self.shared.runtime.is_running() {
            let now = self.shared.runtime.ticks();
            let last = self.shared.last_init.load(Ordering::SeqCst);
            if now.saturating_sub(last) < self.shared.runtime.ticks_per_second() {
                return;
            }
            self.shared.last_init.store(now, Ordering::SeqCst);
        }

        let weak = Arc::downgrade(&self.shared);
        let id = self.shared.config.subscribe(Box::new(move || {
            if let Some(shared) = Weak::upgrade(&weak) {
                shared.refresh_config();
            }
        }));
        *self.shared.lock(&self.config_subscription) = Some(id);
        self.shared.refresh_config();

        self.initialized.store(true, Ordering::SeqCst);

        if self.shared.use_adapter() {
            self.start_scanning();
        }
    }

    /// Stop everything in dependency order: scanning first, then the data
    /// plane, then the config subscription. Joins all worker threads.
    pub fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stop_scanning();
        self.shared.force_reset();
        if let Some(id) = self.shared.lock(&self.config_subscription).take() {
            self.shared.config.unsubscribe(id);
        }
    }

    /// Start the scan thread if it is not already running.
    pub fn start_scanning(&self) {
        let mut guard = self.shared.lock(&self.scan_thread);
        if guard.is_some() {
            return;
        }
        let hotplug = self.shared.transport.supports_hotplug()
            && self
                .shared
                .transport
                .register_hotplug(Arc::clone(&self.shared.hotplug_sink));
        self.shared.hotplug_enabled.store(hotplug, Ordering::SeqCst);

        self.shared.scan_run.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        match std::thread::Builder::new()
            .name("gcadapter scan".into())
            .spawn(move || scan_worker(shared))
        {
            Ok(handle) => *guard = Some(handle),
            Err(e) => {
                log::error!("failed to spawn scan thread: {e}");
                self.shared.scan_run.store(false, Ordering::SeqCst);
                self.shared.transport.unregister_hotplug();
            }
        }
    }

    /// Stop the scan thread and deregister hotplug. The open session, if any,
    /// stays up; use [`reset`](Self::reset) or [`shutdown`](Self::shutdown)
    /// to tear it down.
    pub fn stop_scanning(&self) {
        let handle = self.shared.lock(&self.scan_thread).take();
        if let Some(handle) = handle {
            self.shared.scan_run.store(false, Ordering::SeqCst);
            self.shared.scan_wake.set();
            let _ = handle.join();
        }
        self.shared.transport.unregister_hotplug();
        self.shared.hotplug_enabled.store(false, Ordering::SeqCst);
    }

    /// Tear down the current session (no-op when none is open). Safe to call
    /// concurrently from any thread.
    pub fn reset(&self) {
        self.shared.try_reset();
    }

    /// Latest decoded state for `chan`. Neutral/empty when `chan` is out of
    /// range, the adapter is not in use, not detected, or has produced no
    /// data this cycle.
    pub fn input(&self, chan: usize) -> PadStatus {
        if chan >= NUM_CHANNELS
            || !self.shared.use_adapter()
            || self.shared.status() != AdapterStatus::Detected
        {
            return PadStatus::default();
        }

        let (frame, len) = {
            let input = self.shared.lock(&self.shared.input);
            (input.frame, input.len)
        };
        if len != INPUT_PAYLOAD_SIZE {
            // No data this cycle; the read worker already logged why.
            return PadStatus::default();
        }

        let prev = ControllerType::from_raw(self.shared.controller_type[chan].load(Ordering::SeqCst));
        let strict = self.shared.runtime.wants_determinism();
        let decoded = decode_channel(&frame, chan, prev, strict);

        if prev == ControllerType::None && decoded.controller_type != ControllerType::None {
            log::info!(
                "new device connected to port {} of type {:?}",
                chan + 1,
                decoded.controller_type
            );
            self.reset_rumble();
        }
        self.shared.controller_type[chan].store(decoded.controller_type as u8, Ordering::SeqCst);

        decoded.pad
    }

    /// Command channel `chan`'s rumble motor. Fire-and-forget: redundant
    /// values are suppressed, and wireless controllers (no motor) are never
    /// commanded.
    pub fn output(&self, chan: usize, rumble: u8) {
        if chan >= NUM_CHANNELS
            || !self.shared.use_adapter()
            || self.shared.status() != AdapterStatus::Detected
            || !self.shared.rumble_enabled[chan].load(Ordering::SeqCst)
        {
            return;
        }
        let ty = ControllerType::from_raw(self.shared.controller_type[chan].load(Ordering::SeqCst));
        if ty == ControllerType::Wireless {
            return;
        }
        if self.shared.rumble[chan].swap(rumble, Ordering::SeqCst) != rumble {
            self.shared.rumble_wake.set();
        }
    }

    /// Zero all rumble state and push the stop command, unless a setup/reset
    /// is in flight (which zeroes rumble itself).
    pub fn reset_rumble(&self) {
        if let Ok(_guard) = self.shared.setup_reset.try_lock() {
            self.shared.zero_rumble_locked();
        }
    }

    /// Current classification of `chan`.
    pub fn controller_type(&self, chan: usize) -> ControllerType {
        if chan >= NUM_CHANNELS {
            return ControllerType::None;
        }
        ControllerType::from_raw(self.shared.controller_type[chan].load(Ordering::SeqCst))
    }

    /// Whether a controller has been classified on `chan`.
    pub fn device_connected(&self, chan: usize) -> bool {
        self.controller_type(chan) != ControllerType::None
    }

    /// Forget `chan`'s classification; the next decode re-classifies and
    /// requests origin recalibration.
    pub fn reset_device_type(&self, chan: usize) {
        if chan >= NUM_CHANNELS {
            return;
        }
        self.shared.controller_type[chan].store(ControllerType::None as u8, Ordering::SeqCst);
    }

    /// Whether any channel is configured to use this adapter.
    pub fn use_adapter(&self) -> bool {
        self.shared.use_adapter()
    }

    pub fn status(&self) -> AdapterStatus {
        self.shared.status()
    }

    /// Detection state plus a human-readable error description when the
    /// adapter was found but could not be used.
    pub fn is_detected(&self) -> (bool, Option<String>) {
        match self.shared.status() {
            AdapterStatus::Detected => (true, None),
            AdapterStatus::NotDetected => (false, None),
            AdapterStatus::Error(code) => (false, Some(strerror(code).to_string())),
        }
    }

    /// Register a callback fired on every detected/not-detected transition
    /// (including entering or leaving an error state), never on steady state.
    pub fn register_detect_callback(
        &self,
        callback: Box<dyn Fn() + Send + Sync>,
    ) -> DetectToken {
        let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
        self.shared
            .lock(&self.shared.detect_callbacks)
            .push((token, callback));
        DetectToken(token)
    }

    pub fn unregister_detect_callback(&self, token: DetectToken) {
        self.shared
            .lock(&self.shared.detect_callbacks)
            .retain(|(id, _)| *id != token.0);
    }
}

impl Drop for GcAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

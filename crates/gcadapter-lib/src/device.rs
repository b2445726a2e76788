//! Device transport — capability traits + USB-direct backend.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusb::UsbContext;

use crate::protocol::*;
use crate::sync::Event;

// ── Error type ──

/// Transport-level errors.
///
/// String payloads follow the convention **"context: details"** where *context*
/// identifies the operation or step (e.g. `"claim interface"`, `"read"`) and
/// *details* describes what went wrong. Variants that correspond to a
/// persistent device-access failure carry the platform error code so the
/// facade can surface it through `is_detected`.
#[derive(Debug)]
pub enum DeviceError {
    /// No adapter present on the bus.
    NotFound,
    /// The adapter was found but could not be opened.
    Open { code: i32, details: String },
    /// The adapter was opened but its data interface could not be claimed.
    Claim { code: i32, details: String },
    /// A single read/write failed. Transient; workers log and continue.
    Transfer(String),
    /// A write completed with the wrong size (bridged transport only).
    /// Fatal to the session.
    WriteSizeMismatch { expected: usize, written: usize },
}

impl DeviceError {
    /// Platform error code for persistent access failures, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            DeviceError::Open { code, .. } | DeviceError::Claim { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound => write!(f, "GC adapter not found"),
            DeviceError::Open { code, details } => {
                write!(f, "Failed to open adapter ({code}): {details}")
            }
            DeviceError::Claim { code, details } => {
                write!(f, "Failed to claim adapter interface ({code}): {details}")
            }
            DeviceError::Transfer(e) => write!(f, "Transfer failed: {e}"),
            DeviceError::WriteSizeMismatch { expected, written } => {
                write!(f, "Short write: sent {written} of {expected} bytes")
            }
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Platform error codes ──

/// Map a `rusb` error onto its stable libusb error code. These are the codes
/// recorded in the adapter status word and decoded by [`strerror`].
pub fn error_code(err: rusb::Error) -> i32 {
    match err {
        rusb::Error::Io => -1,
        rusb::Error::InvalidParam => -2,
        rusb::Error::Access => -3,
        rusb::Error::NoDevice => -4,
        rusb::Error::NotFound => -5,
        rusb::Error::Busy => -6,
        rusb::Error::Timeout => -7,
        rusb::Error::Overflow => -8,
        rusb::Error::Pipe => -9,
        rusb::Error::Interrupted => -10,
        rusb::Error::NoMem => -11,
        rusb::Error::NotSupported => -12,
        _ => -99,
    }
}

/// Human-readable description of a recorded platform error code, for the
/// UI-facing side of `is_detected`.
pub fn strerror(code: i32) -> &'static str {
    match code {
        -1 => "Input/Output error",
        -2 => "Invalid parameter",
        -3 => "Access denied (insufficient permissions)",
        -4 => "No such device (it may have been disconnected)",
        -5 => "Entity not found",
        -6 => "Resource busy",
        -7 => "Operation timed out",
        -8 => "Overflow",
        -9 => "Pipe error",
        -10 => "System call interrupted (perhaps due to signal)",
        -11 => "Insufficient memory",
        -12 => "Operation not supported or unimplemented on this platform",
        _ => "Other error",
    }
}

// ── Identity ──

/// Opaque identity of an attached device, used to match hotplug removal
/// notifications against the currently open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(pub u64);

impl DeviceId {
    pub fn usb(bus: u8, address: u8) -> Self {
        DeviceId(((bus as u64) << 8) | address as u64)
    }

    pub fn bridge(fd: i32) -> Self {
        DeviceId(fd as u32 as u64)
    }
}

// ── Capability traits ──

/// An open, claimed connection to the adapter. Read/write workers hold a
/// shared reference; only the opening transport may create one and only
/// dropping the last reference closes it.
pub trait Session: Send + Sync + std::fmt::Debug {
    /// One blocking read of an input frame with a short timeout.
    /// Returns the number of bytes read.
    fn read_frame(&self, frame: &mut [u8; INPUT_PAYLOAD_SIZE]) -> Result<usize>;

    /// One blocking write of an outbound payload with a short timeout.
    /// Returns the number of bytes written.
    fn write_frame(&self, payload: &[u8]) -> Result<usize>;

    fn device_id(&self) -> DeviceId;

    /// Whether input frames carry the HID tag byte in byte 0.
    /// Bridged transports deliver untagged frames.
    fn frames_tagged(&self) -> bool {
        true
    }
}

/// A way of reaching the adapter. Two production backends exist: USB-direct
/// ([`UsbTransport`]) and host-bridged ([`crate::bridge::BridgeTransport`]).
/// The facade and workers depend only on this interface.
pub trait Transport: Send + Sync {
    /// Locate, open, and claim the adapter. At most one session may exist at
    /// a time; enumeration stops at the first matching device.
    fn open(&self) -> Result<Arc<dyn Session>>;

    fn supports_hotplug(&self) -> bool {
        false
    }

    /// Register arrival/removal notification into `sink`. Returns `false`
    /// when registration failed or is unsupported; the scan worker then
    /// falls back to polling.
    fn register_hotplug(&self, sink: Arc<HotplugSink>) -> bool {
        let _ = sink;
        false
    }

    fn unregister_hotplug(&self) {}

    /// Block until the next scan trigger: a hotplug notification, a wake on
    /// `wake`, or `interval` elapsing — whichever the backend supports.
    fn wait_scan_trigger(&self, wake: &Event, interval: Duration);
}

/// Shared mailbox for hotplug notifications. The transport's callback fills
/// it; the scan worker drains it.
#[derive(Default)]
pub struct HotplugSink {
    arrived: AtomicBool,
    removed: Mutex<Option<DeviceId>>,
}

impl HotplugSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_arrived(&self) {
        self.arrived.store(true, Ordering::Release);
    }

    pub fn note_removed(&self, id: DeviceId) {
        *self.removed.lock().unwrap_or_else(|e| e.into_inner()) = Some(id);
    }

    pub fn take_arrived(&self) -> bool {
        self.arrived.swap(false, Ordering::AcqRel)
    }

    pub fn take_removed(&self) -> Option<DeviceId> {
        self.removed.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

// ── USB-direct backend ──

/// Transport backed by libusb, with event-driven hotplug where the platform
/// supports it.
pub struct UsbTransport {
    context: rusb::Context,
    registration: Mutex<Option<rusb::Registration<rusb::Context>>>,
}

impl UsbTransport {
    pub fn new() -> Result<Self> {
        let context = rusb::Context::new().map_err(|e| DeviceError::Open {
            code: error_code(e),
            details: format!("libusb init: {e}"),
        })?;
        Ok(UsbTransport {
            context,
            registration: Mutex::new(None),
        })
    }

    /// The open/claim sequence for a matched device. Any failure after the
    /// open closes the handle (on drop) and reports the platform error code.
    fn claim(
        &self,
        device: &rusb::Device<rusb::Context>,
    ) -> Result<UsbSession> {
        let bus = device.bus_number();
        let address = device.address();

        let handle = match device.open() {
            Ok(handle) => handle,
            Err(rusb::Error::Access) => {
                log::error!(
                    "no access to adapter: bus {bus:03} device {address:03}: \
                     ID {ADAPTER_VID:04x}:{ADAPTER_PID:04x}"
                );
                return Err(DeviceError::Open {
                    code: error_code(rusb::Error::Access),
                    details: "open: access denied".into(),
                });
            }
            Err(e) => {
                log::error!("failed to open adapter: {e}");
                return Err(DeviceError::Open {
                    code: error_code(e),
                    details: format!("open: {e}"),
                });
            }
        };

        // macOS cannot detach without root or an entitlement; assume the
        // user runs a codeless kext or similar and skip.
        #[cfg(not(target_os = "macos"))]
        if handle.kernel_driver_active(ADAPTER_INTERFACE) == Ok(true) {
            match handle.detach_kernel_driver(ADAPTER_INTERFACE) {
                Ok(()) | Err(rusb::Error::NotFound) | Err(rusb::Error::NotSupported) => {}
                Err(e) => {
                    log::error!("detach kernel driver failed: {e}");
                    return Err(DeviceError::Claim {
                        code: error_code(e),
                        details: format!("detach kernel driver: {e}"),
                    });
                }
            }
        }

        // Makes Nyko-brand (and perhaps other) adapters start streaming.
        // Returns a pipe error on Mayflash adapters; non-fatal either way.
        if let Err(e) = handle.write_control(
            CTRL_REQUEST_TYPE,
            CTRL_REQUEST,
            CTRL_VALUE,
            0,
            &[],
            Duration::from_millis(CTRL_TIMEOUT_MS),
        ) {
            log::warn!("streaming kick control transfer failed: {e}");
        }

        if let Err(e) = handle.claim_interface(ADAPTER_INTERFACE) {
            log::error!("claim interface failed: {e}");
            return Err(DeviceError::Claim {
                code: error_code(e),
                details: format!("claim interface: {e}"),
            });
        }

        let (endpoint_in, endpoint_out) = Self::find_endpoints(device)?;

        let session = UsbSession {
            handle,
            endpoint_in,
            endpoint_out,
            id: DeviceId::usb(bus, address),
        };

        // Tell the adapter to begin streaming input frames.
        if let Err(e) = session.write_frame(&[CMD_INIT]) {
            log::warn!("init payload write failed: {e}");
        }

        Ok(session)
    }

    /// Walk the configuration for the IN and OUT interrupt endpoints.
    fn find_endpoints(device: &rusb::Device<rusb::Context>) -> Result<(u8, u8)> {
        let config = device.config_descriptor(0).map_err(|e| DeviceError::Claim {
            code: error_code(e),
            details: format!("config descriptor: {e}"),
        })?;

        let mut endpoint_in = None;
        let mut endpoint_out = None;
        for interface in config.interfaces() {
            for descriptor in interface.descriptors() {
                for endpoint in descriptor.endpoint_descriptors() {
                    match endpoint.direction() {
                        rusb::Direction::In => endpoint_in = Some(endpoint.address()),
                        rusb::Direction::Out => endpoint_out = Some(endpoint.address()),
                    }
                }
            }
        }

        match (endpoint_in, endpoint_out) {
            (Some(ep_in), Some(ep_out)) => Ok((ep_in, ep_out)),
            _ => Err(DeviceError::Claim {
                code: error_code(rusb::Error::NotFound),
                details: "endpoints: no IN/OUT endpoint pair".into(),
            }),
        }
    }
}

impl Transport for UsbTransport {
    fn open(&self) -> Result<Arc<dyn Session>> {
        let devices = self.context.devices().map_err(|e| DeviceError::Open {
            code: error_code(e),
            details: format!("enumerate: {e}"),
        })?;

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    // Cannot identify it, no point in trying to use it.
                    log::error!("device descriptor read failed: {e}");
                    continue;
                }
            };
            if descriptor.vendor_id() != ADAPTER_VID || descriptor.product_id() != ADAPTER_PID {
                continue;
            }

            log::info!(
                "found GC adapter: vendor {:04x} product {:04x} bus {:03} device {:03}",
                descriptor.vendor_id(),
                descriptor.product_id(),
                device.bus_number(),
                device.address()
            );

            // Only connect to a single adapter in case the user has several.
            return self.claim(&device).map(|s| Arc::new(s) as Arc<dyn Session>);
        }

        Err(DeviceError::NotFound)
    }

    fn supports_hotplug(&self) -> bool {
        rusb::has_hotplug()
    }

    fn register_hotplug(&self, sink: Arc<HotplugSink>) -> bool {
        if !rusb::has_hotplug() {
            return false;
        }
        let result = rusb::HotplugBuilder::new()
            .vendor_id(ADAPTER_VID)
            .product_id(ADAPTER_PID)
            .enumerate(true)
            .register(self.context.clone(), Box::new(HotplugHandler { sink }));
        match result {
            Ok(registration) => {
                *self.registration.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(registration);
                log::info!("using libusb hotplug detection");
                true
            }
            Err(e) => {
                log::warn!("hotplug registration failed, falling back to polling: {e}");
                false
            }
        }
    }

    fn unregister_hotplug(&self) {
        // Dropping the registration deregisters the callback.
        self.registration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    fn wait_scan_trigger(&self, wake: &Event, interval: Duration) {
        let registered = self
            .registration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some();
        if registered {
            // Hotplug callbacks fire from inside handle_events. Bounded so
            // the scan worker re-checks its stop flag promptly.
            if let Err(e) = self.context.handle_events(Some(interval)) {
                log::warn!("libusb event handling failed: {e}");
                wake.wait_timeout(interval);
            }
        } else {
            wake.wait_timeout(interval);
        }
    }
}

struct HotplugHandler {
    sink: Arc<HotplugSink>,
}

impl rusb::Hotplug<rusb::Context> for HotplugHandler {
    fn device_arrived(&mut self, _device: rusb::Device<rusb::Context>) {
        self.sink.note_arrived();
    }

    fn device_left(&mut self, device: rusb::Device<rusb::Context>) {
        self.sink
            .note_removed(DeviceId::usb(device.bus_number(), device.address()));
    }
}

/// An open libusb handle plus the adapter's two interrupt endpoints.
pub struct UsbSession {
    handle: rusb::DeviceHandle<rusb::Context>,
    endpoint_in: u8,
    endpoint_out: u8,
    id: DeviceId,
}

impl std::fmt::Debug for UsbSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbSession")
            .field("endpoint_in", &self.endpoint_in)
            .field("endpoint_out", &self.endpoint_out)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Session for UsbSession {
    fn read_frame(&self, frame: &mut [u8; INPUT_PAYLOAD_SIZE]) -> Result<usize> {
        self.handle
            .read_interrupt(
                self.endpoint_in,
                frame,
                Duration::from_millis(TRANSFER_TIMEOUT_MS),
            )
            .map_err(|e| DeviceError::Transfer(format!("read: {e}")))
    }

    fn write_frame(&self, payload: &[u8]) -> Result<usize> {
        self.handle
            .write_interrupt(
                self.endpoint_out,
                payload,
                Duration::from_millis(TRANSFER_TIMEOUT_MS),
            )
            .map_err(|e| DeviceError::Transfer(format!("write: {e}")))
    }

    fn device_id(&self) -> DeviceId {
        self.id
    }
}

impl Drop for UsbSession {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(ADAPTER_INTERFACE);
    }
}

// ── Mock transport for testing ──

/// In-memory transport for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicUsize};

    /// Scripted device state shared between a [`MockTransport`] and the test
    /// driving it.
    pub struct MockShared {
        /// Whether `open()` succeeds.
        pub connected: AtomicBool,
        /// When not connected: 0 reports `NotFound`, anything else reports
        /// `Open` with that code.
        pub open_error_code: AtomicI32,
        /// Frame returned by every `read_frame` until replaced. `None`
        /// makes reads time out.
        pub current_frame: Mutex<Option<[u8; INPUT_PAYLOAD_SIZE]>>,
        /// Every payload passed to `write_frame`, in order.
        pub writes: Mutex<Vec<Vec<u8>>>,
        /// Number of bytes the device accepts per write. `None` echoes the
        /// payload length (the well-behaved case); a short non-zero value
        /// surfaces as `WriteSizeMismatch`, like the bridged transport.
        pub forced_write_size: Mutex<Option<usize>>,
        /// Whether frames carry the HID tag byte.
        pub tagged: AtomicBool,
        /// Whether this transport claims hotplug support.
        pub hotplug: AtomicBool,
        /// How long `wait_scan_trigger` waits. Short, so tests stay fast.
        pub scan_wait: Mutex<Duration>,
        pub sessions_opened: AtomicUsize,
        sink: Mutex<Option<Arc<HotplugSink>>>,
        next_id: AtomicUsize,
    }

    impl Default for MockShared {
        fn default() -> Self {
            MockShared {
                connected: AtomicBool::new(false),
                open_error_code: AtomicI32::new(0),
                current_frame: Mutex::new(None),
                writes: Mutex::new(Vec::new()),
                forced_write_size: Mutex::new(None),
                tagged: AtomicBool::new(true),
                hotplug: AtomicBool::new(false),
                scan_wait: Mutex::new(Duration::from_millis(2)),
                sessions_opened: AtomicUsize::new(0),
                sink: Mutex::new(None),
                next_id: AtomicUsize::new(1),
            }
        }
    }

    impl MockShared {
        /// Simulate plugging the device in: subsequent opens succeed and a
        /// hotplug arrival fires if a sink is registered.
        pub fn plug(&self) {
            self.connected.store(true, Ordering::SeqCst);
            if let Some(sink) = self.sink.lock().unwrap().as_ref() {
                sink.note_arrived();
            }
        }

        /// Simulate unplugging the device with identity `id`.
        pub fn unplug(&self, id: DeviceId) {
            self.connected.store(false, Ordering::SeqCst);
            *self.current_frame.lock().unwrap() = None;
            if let Some(sink) = self.sink.lock().unwrap().as_ref() {
                sink.note_removed(id);
            }
        }

        /// Expose `frame` as the device's steady input state.
        pub fn set_frame(&self, frame: [u8; INPUT_PAYLOAD_SIZE]) {
            *self.current_frame.lock().unwrap() = Some(frame);
        }

        pub fn recorded_writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }
    }

    pub struct MockTransport {
        pub shared: Arc<MockShared>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            MockTransport {
                shared: Arc::new(MockShared::default()),
            }
        }

        pub fn shared(&self) -> Arc<MockShared> {
            Arc::clone(&self.shared)
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Transport for MockTransport {
        fn open(&self) -> Result<Arc<dyn Session>> {
            if !self.shared.connected.load(Ordering::SeqCst) {
                let code = self.shared.open_error_code.load(Ordering::SeqCst);
                if code == 0 {
                    return Err(DeviceError::NotFound);
                }
                return Err(DeviceError::Open {
                    code,
                    details: "mock: open failure injected".into(),
                });
            }
            self.shared.sessions_opened.fetch_add(1, Ordering::SeqCst);
            let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockSession {
                shared: Arc::clone(&self.shared),
                id: DeviceId(id as u64),
            }))
        }

        fn supports_hotplug(&self) -> bool {
            self.shared.hotplug.load(Ordering::SeqCst)
        }

        fn register_hotplug(&self, sink: Arc<HotplugSink>) -> bool {
            if !self.supports_hotplug() {
                return false;
            }
            *self.shared.sink.lock().unwrap() = Some(sink);
            true
        }

        fn unregister_hotplug(&self) {
            self.shared.sink.lock().unwrap().take();
        }

        fn wait_scan_trigger(&self, wake: &Event, _interval: Duration) {
            let wait = *self.shared.scan_wait.lock().unwrap();
            wake.wait_timeout(wait);
        }
    }

    pub struct MockSession {
        shared: Arc<MockShared>,
        id: DeviceId,
    }

    impl std::fmt::Debug for MockSession {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockSession")
                .field("id", &self.id)
                .finish_non_exhaustive()
        }
    }

    impl Session for MockSession {
        fn read_frame(&self, frame: &mut [u8; INPUT_PAYLOAD_SIZE]) -> Result<usize> {
            // Pace the read worker roughly like a real interrupt pipe.
            std::thread::sleep(Duration::from_millis(1));
            match *self.shared.current_frame.lock().unwrap() {
                Some(current) => {
                    frame.copy_from_slice(&current);
                    Ok(INPUT_PAYLOAD_SIZE)
                }
                None => Err(DeviceError::Transfer("read: timed out".into())),
            }
        }

        fn write_frame(&self, payload: &[u8]) -> Result<usize> {
            self.shared.writes.lock().unwrap().push(payload.to_vec());
            let size = self
                .shared
                .forced_write_size
                .lock()
                .unwrap()
                .unwrap_or(payload.len());
            if size != payload.len() && size != 0 {
                return Err(DeviceError::WriteSizeMismatch {
                    expected: payload.len(),
                    written: size,
                });
            }
            Ok(size)
        }

        fn device_id(&self) -> DeviceId {
            self.id
        }

        fn frames_tagged(&self) -> bool {
            self.shared.tagged.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    // ── Error display ──

    #[test]
    fn display_not_found() {
        assert_eq!(DeviceError::NotFound.to_string(), "GC adapter not found");
    }

    #[test]
    fn display_open_carries_code_and_details() {
        let e = DeviceError::Open {
            code: -3,
            details: "open: access denied".into(),
        };
        let s = e.to_string();
        assert!(s.contains("-3"), "missing code: {s}");
        assert!(s.contains("access denied"), "missing details: {s}");
    }

    #[test]
    fn display_write_size_mismatch() {
        let e = DeviceError::WriteSizeMismatch {
            expected: 5,
            written: 2,
        };
        assert_eq!(e.to_string(), "Short write: sent 2 of 5 bytes");
    }

    #[test]
    fn code_only_on_access_failures() {
        assert_eq!(
            DeviceError::Open {
                code: -3,
                details: String::new()
            }
            .code(),
            Some(-3)
        );
        assert_eq!(
            DeviceError::Claim {
                code: -6,
                details: String::new()
            }
            .code(),
            Some(-6)
        );
        assert_eq!(DeviceError::NotFound.code(), None);
        assert_eq!(DeviceError::Transfer("read: x".into()).code(), None);
    }

    // ── Error code mapping ──

    #[test]
    fn rusb_errors_map_to_stable_codes() {
        assert_eq!(error_code(rusb::Error::Access), -3);
        assert_eq!(error_code(rusb::Error::NoDevice), -4);
        assert_eq!(error_code(rusb::Error::Timeout), -7);
        assert_eq!(error_code(rusb::Error::NotSupported), -12);
    }

    #[test]
    fn strerror_covers_mapped_codes() {
        for code in [-1, -3, -4, -7, -12] {
            assert_ne!(strerror(code), "Other error", "code {code} unmapped");
        }
        assert_eq!(strerror(-1234), "Other error");
    }

    // ── DeviceId ──

    #[test]
    fn usb_ids_distinguish_bus_and_address() {
        assert_ne!(DeviceId::usb(1, 2), DeviceId::usb(2, 1));
        assert_eq!(DeviceId::usb(1, 2), DeviceId::usb(1, 2));
    }

    // ── HotplugSink ──

    #[test]
    fn sink_arrival_is_one_shot() {
        let sink = HotplugSink::new();
        assert!(!sink.take_arrived());
        sink.note_arrived();
        assert!(sink.take_arrived());
        assert!(!sink.take_arrived());
    }

    #[test]
    fn sink_removal_carries_identity() {
        let sink = HotplugSink::new();
        assert_eq!(sink.take_removed(), None);
        sink.note_removed(DeviceId::usb(3, 9));
        assert_eq!(sink.take_removed(), Some(DeviceId::usb(3, 9)));
        assert_eq!(sink.take_removed(), None);
    }

    // ── Mock transport ──

    #[test]
    fn mock_open_not_found_when_disconnected() {
        let transport = MockTransport::new();
        assert!(matches!(transport.open(), Err(DeviceError::NotFound)));
    }

    #[test]
    fn mock_open_reports_injected_error_code() {
        let transport = MockTransport::new();
        transport.shared.open_error_code.store(-3, Ordering::SeqCst);
        match transport.open() {
            Err(DeviceError::Open { code, .. }) => assert_eq!(code, -3),
            other => panic!("expected Open error, got {other:?}"),
        }
    }

    #[test]
    fn mock_session_serves_current_frame() {
        let transport = MockTransport::new();
        transport.shared.plug();
        let session = transport.open().expect("open mock");

        let mut frame = [0u8; INPUT_PAYLOAD_SIZE];
        assert!(matches!(
            session.read_frame(&mut frame),
            Err(DeviceError::Transfer(_))
        ));

        let mut scripted = [0u8; INPUT_PAYLOAD_SIZE];
        scripted[0] = INPUT_FRAME_TAG;
        scripted[1] = 0x10;
        transport.shared.set_frame(scripted);
        assert_eq!(session.read_frame(&mut frame).unwrap(), INPUT_PAYLOAD_SIZE);
        assert_eq!(frame, scripted);
    }

    #[test]
    fn mock_records_writes() {
        let transport = MockTransport::new();
        transport.shared.plug();
        let session = transport.open().expect("open mock");
        session.write_frame(&[0x13]).unwrap();
        session.write_frame(&[0x11, 1, 0, 0, 0]).unwrap();
        let writes = transport.shared.recorded_writes();
        assert_eq!(writes, vec![vec![0x13], vec![0x11, 1, 0, 0, 0]]);
    }

    #[test]
    fn mock_short_write_surfaces_mismatch() {
        let transport = MockTransport::new();
        transport.shared.plug();
        let session = transport.open().expect("open mock");
        *transport.shared.forced_write_size.lock().unwrap() = Some(2);
        match session.write_frame(&[0x11, 0, 0, 0, 0]) {
            Err(DeviceError::WriteSizeMismatch { expected, written }) => {
                assert_eq!(expected, 5);
                assert_eq!(written, 2);
            }
            other => panic!("expected WriteSizeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn mock_sessions_get_distinct_ids() {
        let transport = MockTransport::new();
        transport.shared.plug();
        let a = transport.open().expect("open a");
        let b = transport.open().expect("open b");
        assert_ne!(a.device_id(), b.device_id());
    }
}

//! Host-bridged transport for platforms where libusb cannot claim the device
//! directly and the host environment hands us an opened file descriptor
//! instead (e.g. Android's UsbManager).

use std::sync::Arc;
use std::time::Duration;

use crate::device::{DeviceError, DeviceId, Result, Session, Transport};
use crate::protocol::INPUT_PAYLOAD_SIZE;
use crate::sync::Event;

/// Host-side USB plumbing the bridged transport delegates to. The host owns
/// enumeration, permission prompts, and the raw endpoint I/O; this crate only
/// sequences the calls.
pub trait HostBridge: Send + Sync {
    /// Whether an adapter is currently attached and permitted.
    fn adapter_attached(&self) -> bool;

    /// Open the attached adapter and return its file descriptor.
    fn open(&self) -> Result<i32>;

    /// One input read into `buf`, returning the number of bytes read.
    fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize>;

    /// One output write, returning the number of bytes written.
    fn write(&self, fd: i32, payload: &[u8]) -> Result<usize>;

    fn close(&self, fd: i32);
}

/// Transport over a [`HostBridge`]. No hotplug; the scan worker polls.
/// Frames arrive without the HID tag byte, so validation skips it.
pub struct BridgeTransport {
    bridge: Arc<dyn HostBridge>,
}

impl BridgeTransport {
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        BridgeTransport { bridge }
    }
}

impl Transport for BridgeTransport {
    fn open(&self) -> Result<Arc<dyn Session>> {
        if !self.bridge.adapter_attached() {
            return Err(DeviceError::NotFound);
        }
        let fd = self.bridge.open()?;
        log::info!("opened bridged GC adapter (fd {fd})");
        Ok(Arc::new(BridgeSession {
            bridge: Arc::clone(&self.bridge),
            fd,
        }))
    }

    fn wait_scan_trigger(&self, wake: &Event, interval: Duration) {
        wake.wait_timeout(interval);
    }
}

struct BridgeSession {
    bridge: Arc<dyn HostBridge>,
    fd: i32,
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSession")
            .field("fd", &self.fd)
            .finish_non_exhaustive()
    }
}

impl Session for BridgeSession {
    fn read_frame(&self, frame: &mut [u8; INPUT_PAYLOAD_SIZE]) -> Result<usize> {
        self.bridge.read(self.fd, frame)
    }

    fn write_frame(&self, payload: &[u8]) -> Result<usize> {
        let written = self.bridge.write(self.fd, payload)?;
        // Some hosts substitute a zero-length write while another peer owns
        // the device (netplay). That is benign; any other short write means
        // the session is wedged and must be torn down.
        if written != payload.len() && written != 0 {
            return Err(DeviceError::WriteSizeMismatch {
                expected: payload.len(),
                written,
            });
        }
        Ok(written)
    }

    fn device_id(&self) -> DeviceId {
        DeviceId::bridge(self.fd)
    }

    fn frames_tagged(&self) -> bool {
        false
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        self.bridge.close(self.fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBridge {
        attached: AtomicBool,
        next_fd: AtomicI32,
        write_result: AtomicUsize,
        echo_write_len: AtomicBool,
        closed: Mutex<Vec<i32>>,
        writes: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeBridge {
        fn attached() -> Self {
            FakeBridge {
                attached: AtomicBool::new(true),
                next_fd: AtomicI32::new(7),
                echo_write_len: AtomicBool::new(true),
                ..FakeBridge::default()
            }
        }
    }

    impl HostBridge for FakeBridge {
        fn adapter_attached(&self) -> bool {
            self.attached.load(Ordering::SeqCst)
        }

        fn open(&self) -> Result<i32> {
            Ok(self.next_fd.fetch_add(1, Ordering::SeqCst))
        }

        fn read(&self, _fd: i32, buf: &mut [u8]) -> Result<usize> {
            buf.fill(0);
            Ok(buf.len())
        }

        fn write(&self, _fd: i32, payload: &[u8]) -> Result<usize> {
            self.writes.lock().unwrap().push(payload.to_vec());
            if self.echo_write_len.load(Ordering::SeqCst) {
                Ok(payload.len())
            } else {
                Ok(self.write_result.load(Ordering::SeqCst))
            }
        }

        fn close(&self, fd: i32) {
            self.closed.lock().unwrap().push(fd);
        }
    }

    #[test]
    fn open_requires_attachment() {
        let transport = BridgeTransport::new(Arc::new(FakeBridge::default()));
        assert!(matches!(transport.open(), Err(DeviceError::NotFound)));
    }

    #[test]
    fn bridged_frames_are_untagged() {
        let transport = BridgeTransport::new(Arc::new(FakeBridge::attached()));
        let session = transport.open().expect("open");
        assert!(!session.frames_tagged());
    }

    #[test]
    fn full_write_passes_through() {
        let bridge = Arc::new(FakeBridge::attached());
        let transport = BridgeTransport::new(Arc::clone(&bridge) as Arc<dyn HostBridge>);
        let session = transport.open().expect("open");
        assert_eq!(session.write_frame(&[0x11, 0, 0, 0, 0]).unwrap(), 5);
        assert_eq!(bridge.writes.lock().unwrap().len(), 1);
    }

    #[test]
    fn zero_write_is_tolerated() {
        let bridge = Arc::new(FakeBridge::attached());
        bridge.echo_write_len.store(false, Ordering::SeqCst);
        bridge.write_result.store(0, Ordering::SeqCst);
        let transport = BridgeTransport::new(Arc::clone(&bridge) as Arc<dyn HostBridge>);
        let session = transport.open().expect("open");
        assert_eq!(session.write_frame(&[0x11, 0, 0, 0, 0]).unwrap(), 0);
    }

    #[test]
    fn short_write_is_fatal() {
        let bridge = Arc::new(FakeBridge::attached());
        bridge.echo_write_len.store(false, Ordering::SeqCst);
        bridge.write_result.store(3, Ordering::SeqCst);
        let transport = BridgeTransport::new(Arc::clone(&bridge) as Arc<dyn HostBridge>);
        let session = transport.open().expect("open");
        match session.write_frame(&[0x11, 0, 0, 0, 0]) {
            Err(DeviceError::WriteSizeMismatch { expected, written }) => {
                assert_eq!(expected, 5);
                assert_eq!(written, 3);
            }
            other => panic!("expected WriteSizeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn dropping_session_closes_fd() {
        let bridge = Arc::new(FakeBridge::attached());
        let transport = BridgeTransport::new(Arc::clone(&bridge) as Arc<dyn HostBridge>);
        let session = transport.open().expect("open");
        let fd = session.device_id().0 as i32;
        drop(session);
        assert_eq!(bridge.closed.lock().unwrap().as_slice(), &[fd]);
    }
}

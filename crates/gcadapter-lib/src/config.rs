//! Driver configuration — per-port device selection and rumble enable,
//! TOML-based with platform-aware paths, plus the runtime interfaces the
//! adapter consumes instead of reaching into any host application.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::protocol::NUM_CHANNELS;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# gcadapter configuration — changes made while the driver runs may be overwritten.\n\n";

// ── Per-port device selection ──

/// What a controller port is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelDevice {
    /// Nothing plugged into this port.
    None,
    /// A non-adapter controller source; the driver leaves the port alone.
    Standard,
    /// This port is fed by the USB adapter.
    Adapter,
}

// ── Settings file ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Device bound to each of the four ports.
    #[serde(default = "default_ports")]
    pub ports: [ChannelDevice; NUM_CHANNELS],

    /// Per-port rumble enable.
    #[serde(default = "default_rumble")]
    pub rumble: [bool; NUM_CHANNELS],
}

fn default_ports() -> [ChannelDevice; NUM_CHANNELS] {
    [ChannelDevice::Adapter; NUM_CHANNELS]
}

fn default_rumble() -> [bool; NUM_CHANNELS] {
    [true; NUM_CHANNELS]
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ports: default_ports(),
            rumble: default_rumble(),
        }
    }
}

impl Settings {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            dirs::config_dir().map(|p| p.join("GCAdapter"))
        }
        #[cfg(not(windows))]
        {
            dirs::config_dir().map(|p| p.join("gcadapter"))
        }
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load settings from an arbitrary path, returning the settings and any
    /// parse warnings. Missing file is not a warning; defaults apply.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => (settings, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load settings from the default platform path, logging parse warnings.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        let (settings, warnings) = Self::load_from(&path);
        for w in &warnings {
            log::warn!("{w}");
        }
        settings
    }

    /// Save settings to an arbitrary path atomically (write to temp file,
    /// then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Save settings to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }
}

// ── Change-notified configuration source ──

/// Token returned by [`ConfigSource::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Where the driver reads its per-port configuration from. The adapter caches
/// a snapshot and refreshes it from the change callback, so implementations
/// may be arbitrarily slow.
pub trait ConfigSource: Send + Sync {
    fn device_type(&self, chan: usize) -> ChannelDevice;

    fn rumble_enabled(&self, chan: usize) -> bool;

    /// Register a change callback. It fires after any mutation and may be
    /// invoked from the mutating thread.
    fn subscribe(&self, callback: Box<dyn Fn() + Send + Sync>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Callback registry shared by the [`ConfigSource`] implementations.
#[derive(Default)]
struct Callbacks {
    entries: Mutex<Vec<(u64, Box<dyn Fn() + Send + Sync>)>>,
    next: AtomicU64,
}

impl Callbacks {
    fn add(&self, callback: Box<dyn Fn() + Send + Sync>) -> SubscriptionId {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, callback));
        SubscriptionId(id)
    }

    fn remove(&self, id: SubscriptionId) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(entry_id, _)| *entry_id != id.0);
    }

    fn fire(&self) {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for (_, callback) in entries.iter() {
            callback();
        }
    }
}

/// In-memory configuration source. The CLI uses it for one-shot commands;
/// tests mutate it to drive the snapshot-refresh path.
pub struct StaticConfig {
    ports: Mutex<[ChannelDevice; NUM_CHANNELS]>,
    rumble: Mutex<[bool; NUM_CHANNELS]>,
    callbacks: Callbacks,
}

impl StaticConfig {
    pub fn new(ports: [ChannelDevice; NUM_CHANNELS], rumble: [bool; NUM_CHANNELS]) -> Self {
        StaticConfig {
            ports: Mutex::new(ports),
            rumble: Mutex::new(rumble),
            callbacks: Callbacks::default(),
        }
    }

    /// Every port bound to the adapter, rumble enabled.
    pub fn all_adapter() -> Self {
        Self::new(default_ports(), default_rumble())
    }

    pub fn set_device_type(&self, chan: usize, device: ChannelDevice) {
        self.ports.lock().unwrap_or_else(|e| e.into_inner())[chan] = device;
        self.callbacks.fire();
    }

    pub fn set_rumble(&self, chan: usize, enabled: bool) {
        self.rumble.lock().unwrap_or_else(|e| e.into_inner())[chan] = enabled;
        self.callbacks.fire();
    }
}

impl ConfigSource for StaticConfig {
    fn device_type(&self, chan: usize) -> ChannelDevice {
        self.ports.lock().unwrap_or_else(|e| e.into_inner())[chan]
    }

    fn rumble_enabled(&self, chan: usize) -> bool {
        self.rumble.lock().unwrap_or_else(|e| e.into_inner())[chan]
    }

    fn subscribe(&self, callback: Box<dyn Fn() + Send + Sync>) -> SubscriptionId {
        self.callbacks.add(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.callbacks.remove(id);
    }
}

/// TOML-file-backed configuration source. Mutations persist to disk and fire
/// the change callbacks.
pub struct FileConfig {
    settings: Mutex<Settings>,
    path: Option<PathBuf>,
    callbacks: Callbacks,
}

impl FileConfig {
    /// Load from the default platform path (missing file means defaults).
    pub fn load_default() -> Self {
        FileConfig {
            settings: Mutex::new(Settings::load()),
            path: Settings::path(),
            callbacks: Callbacks::default(),
        }
    }

    /// Load from an explicit path.
    pub fn open(path: PathBuf) -> Self {
        let (settings, warnings) = Settings::load_from(&path);
        for w in &warnings {
            log::warn!("{w}");
        }
        FileConfig {
            settings: Mutex::new(settings),
            path: Some(path),
            callbacks: Callbacks::default(),
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Mutate the settings, persist, and notify subscribers.
    pub fn update(&self, mutate: impl FnOnce(&mut Settings)) -> std::io::Result<()> {
        let saved = {
            let mut settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
            mutate(&mut settings);
            settings.clone()
        };
        if let Some(path) = &self.path {
            saved.save_to(path)?;
        }
        self.callbacks.fire();
        Ok(())
    }
}

impl ConfigSource for FileConfig {
    fn device_type(&self, chan: usize) -> ChannelDevice {
        self.settings.lock().unwrap_or_else(|e| e.into_inner()).ports[chan]
    }

    fn rumble_enabled(&self, chan: usize) -> bool {
        self.settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rumble[chan]
    }

    fn subscribe(&self, callback: Box<dyn Fn() + Send + Sync>) -> SubscriptionId {
        self.callbacks.add(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.callbacks.remove(id);
    }
}

// ── Runtime interface ──

/// What the adapter needs to know about the runtime hosting it: a tick clock
/// for the re-init rate limit, and the running/determinism flags that gate
/// error-status synthesis.
pub trait CoreRuntime: Send + Sync {
    fn ticks(&self) -> u64;

    fn ticks_per_second(&self) -> u64;

    /// Whether a core loop is actively consuming input. When false, re-init
    /// is never rate-limited.
    fn is_running(&self) -> bool;

    /// Deterministic-replay mode: disconnected ports must decode to a
    /// plain neutral state with no error-status bit.
    fn wants_determinism(&self) -> bool;
}

/// Wall-clock [`CoreRuntime`] for standalone use (the CLI). Never reports a
/// running core, so init is never rate-limited and decode is non-strict.
pub struct SystemRuntime {
    start: Instant,
}

impl SystemRuntime {
    pub fn new() -> Self {
        SystemRuntime {
            start: Instant::now(),
        }
    }
}

impl Default for SystemRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreRuntime for SystemRuntime {
    fn ticks(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn ticks_per_second(&self) -> u64 {
        1000
    }

    fn is_running(&self) -> bool {
        false
    }

    fn wants_determinism(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    // ── Settings defaults & serde ──

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.ports, [ChannelDevice::Adapter; NUM_CHANNELS]);
        assert_eq!(s.rumble, [true; NUM_CHANNELS]);
    }

    #[test]
    fn serialize_roundtrip() {
        let s = Settings {
            ports: [
                ChannelDevice::Adapter,
                ChannelDevice::None,
                ChannelDevice::Standard,
                ChannelDevice::Adapter,
            ],
            rumble: [true, false, false, true],
        };
        let toml_str = toml::to_string_pretty(&s).unwrap();
        let s2: Settings = toml::from_str(&toml_str).unwrap();
        assert_eq!(s2.ports, s.ports);
        assert_eq!(s2.rumble, s.rumble);
    }

    #[test]
    fn channel_device_serializes_lowercase() {
        let s = Settings {
            ports: [
                ChannelDevice::Adapter,
                ChannelDevice::None,
                ChannelDevice::Standard,
                ChannelDevice::Adapter,
            ],
            ..Settings::default()
        };
        let toml_str = toml::to_string_pretty(&s).unwrap();
        assert!(toml_str.contains("\"adapter\""), "got: {toml_str}");
        assert!(toml_str.contains("\"none\""), "got: {toml_str}");
        assert!(toml_str.contains("\"standard\""), "got: {toml_str}");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let s: Settings = toml::from_str("rumble = [false, false, false, false]").unwrap();
        assert_eq!(s.ports, [ChannelDevice::Adapter; NUM_CHANNELS]);
        assert_eq!(s.rumble, [false; NUM_CHANNELS]);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let s: Settings = toml::from_str("").unwrap();
        assert_eq!(s.ports, [ChannelDevice::Adapter; NUM_CHANNELS]);
    }

    #[test]
    fn config_path_ends_with_toml() {
        let path = Settings::path().unwrap();
        assert_eq!(path.file_name().unwrap(), "config.toml");
    }

    // ── save_to / load_from ──

    #[test]
    fn save_to_load_from_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let s = Settings {
            ports: [
                ChannelDevice::None,
                ChannelDevice::Adapter,
                ChannelDevice::Adapter,
                ChannelDevice::Standard,
            ],
            rumble: [false, true, false, true],
        };
        s.save_to(&path).unwrap();

        let (loaded, warnings) = Settings::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(loaded.ports, s.ports);
        assert_eq!(loaded.rumble, s.rumble);
    }

    #[test]
    fn save_to_includes_header_comment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Settings::default().save_to(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(
            contents.starts_with("# gcadapter configuration"),
            "saved file should start with header comment"
        );
    }

    #[test]
    fn save_to_cleans_up_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Settings::default().save_to(&path).unwrap();
        assert!(!dir.path().join("config.toml.tmp").exists());
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (s, warnings) = Settings::load_from(&dir.path().join("nonexistent.toml"));
        assert!(warnings.is_empty());
        assert_eq!(s.ports, [ChannelDevice::Adapter; NUM_CHANNELS]);
    }

    #[test]
    fn load_from_invalid_toml_returns_defaults_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is { not valid toml").unwrap();

        let (s, warnings) = Settings::load_from(&path);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config parse error"));
        assert_eq!(s.ports, [ChannelDevice::Adapter; NUM_CHANNELS]);
    }

    // ── StaticConfig ──

    #[test]
    fn static_config_reads_back_mutations() {
        let config = StaticConfig::all_adapter();
        assert_eq!(config.device_type(2), ChannelDevice::Adapter);
        config.set_device_type(2, ChannelDevice::None);
        assert_eq!(config.device_type(2), ChannelDevice::None);

        assert!(config.rumble_enabled(0));
        config.set_rumble(0, false);
        assert!(!config.rumble_enabled(0));
    }

    #[test]
    fn subscription_fires_on_every_mutation() {
        let config = StaticConfig::all_adapter();
        let fired = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&fired);
        config.subscribe(Box::new(move || {
            observer.fetch_add(1, Ordering::SeqCst);
        }));

        config.set_device_type(0, ChannelDevice::None);
        config.set_rumble(1, false);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let config = StaticConfig::all_adapter();
        let fired = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&fired);
        let id = config.subscribe(Box::new(move || {
            observer.fetch_add(1, Ordering::SeqCst);
        }));

        config.set_rumble(0, false);
        config.unsubscribe(id);
        config.set_rumble(0, true);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_only_the_given_token() {
        let config = StaticConfig::all_adapter();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let a = {
            let counter = Arc::clone(&first);
            config.subscribe(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
        };
        {
            let counter = Arc::clone(&second);
            config.subscribe(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        config.unsubscribe(a);
        config.set_rumble(0, false);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    // ── FileConfig ──

    #[test]
    fn file_config_persists_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = FileConfig::open(path.clone());
        config
            .update(|s| s.ports[3] = ChannelDevice::None)
            .unwrap();

        let (reloaded, _) = Settings::load_from(&path);
        assert_eq!(reloaded.ports[3], ChannelDevice::None);
    }

    #[test]
    fn file_config_update_notifies_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig::open(dir.path().join("config.toml"));

        let fired = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&fired);
        config.subscribe(Box::new(move || {
            observer.fetch_add(1, Ordering::SeqCst);
        }));

        config.update(|s| s.rumble[0] = false).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!config.rumble_enabled(0));
    }

    // ── SystemRuntime ──

    #[test]
    fn system_runtime_ticks_advance() {
        let runtime = SystemRuntime::new();
        let before = runtime.ticks();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(runtime.ticks() >= before + 5);
    }

    #[test]
    fn system_runtime_never_reports_running() {
        let runtime = SystemRuntime::new();
        assert!(!runtime.is_running());
        assert!(!runtime.wants_determinism());
        assert_eq!(runtime.ticks_per_second(), 1000);
    }
}

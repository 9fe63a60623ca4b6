use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::media::MediaPlane;
use crate::resource::{ChannelDirectory, PortPool};
use crate::scheduler::{CancelToken, Job};
use crate::streamer::StreamContext;

/// Shared across every test in the process so parallel tests never try to
/// bind the same loopback port.
static NEXT_TEST_PORT: AtomicU16 = AtomicU16::new(47000);

pub fn localhost() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// Poll `condition` every 5ms until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub struct TestPortPool {
    exhausted: bool,
    restores: Mutex<HashMap<u16, usize>>,
}

impl TestPortPool {
    pub fn new() -> Self {
        Self {
            exhausted: false,
            restores: Mutex::new(HashMap::new()),
        }
    }

    pub fn exhausted() -> Self {
        Self {
            exhausted: true,
            ..Self::new()
        }
    }

    pub fn restore_count(&self, port: u16) -> usize {
        self.restores.lock().get(&port).copied().unwrap_or(0)
    }

    pub fn total_restores(&self) -> usize {
        self.restores.lock().values().sum()
    }
}

impl PortPool for TestPortPool {
    fn acquire(&self) -> Result<u16> {
        if self.exhausted {
            return Err(RtspError::PortPoolExhausted);
        }
        Ok(NEXT_TEST_PORT.fetch_add(1, Ordering::SeqCst))
    }

    fn restore(&self, port: u16) {
        *self.restores.lock().entry(port).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    Start(String),
    Stop(String),
    Release(String),
}

pub struct RecordingMediaPlane {
    fail_start: bool,
    events: Mutex<Vec<MediaEvent>>,
}

impl RecordingMediaPlane {
    pub fn new() -> Self {
        Self {
            fail_start: false,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    pub fn events(&self) -> Vec<MediaEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &MediaEvent) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }
}

impl MediaPlane for RecordingMediaPlane {
    fn start(&self, context: &StreamContext) -> Result<()> {
        if self.fail_start {
            return Err(RtspError::Io(std::io::Error::other("media plane unavailable")));
        }
        self.events.lock().push(MediaEvent::Start(context.key.clone()));
        Ok(())
    }

    fn stop(&self, key: &str) {
        self.events.lock().push(MediaEvent::Stop(key.to_string()));
    }

    fn release(&self, key: &str) {
        self.events.lock().push(MediaEvent::Release(key.to_string()));
    }
}

pub struct RecordingChannels {
    fail: bool,
    deregistered: Mutex<Vec<String>>,
}

impl RecordingChannels {
    pub fn new() -> Self {
        Self {
            fail: false,
            deregistered: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn deregistered(&self) -> Vec<String> {
        self.deregistered.lock().clone()
    }
}

impl ChannelDirectory for RecordingChannels {
    fn deregister_channel(&self, key: &str) -> Result<()> {
        self.deregistered.lock().push(key.to_string());
        if self.fail {
            return Err(RtspError::Io(std::io::Error::other("channel table unavailable")));
        }
        Ok(())
    }
}

/// Appends its key to a shared log when run.
pub struct RecordingJob {
    key: String,
    priority: u8,
    log: Arc<Mutex<Vec<String>>>,
    cancelled: AtomicBool,
}

impl RecordingJob {
    pub fn new(key: &str, priority: u8) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Self::with_log(key, priority, &log), log)
    }

    pub fn with_log(key: &str, priority: u8, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            priority,
            log: log.clone(),
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Job for RecordingJob {
    fn key(&self) -> &str {
        &self.key
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn run(&self, _cancel: &CancelToken) {
        self.log.lock().push(self.key.clone());
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Occupies a worker until opened or cancelled.
pub struct GateJob {
    key: String,
    open: AtomicBool,
    started: AtomicBool,
    finished: AtomicBool,
    cancelled: AtomicBool,
}

impl GateJob {
    pub fn new(key: &str) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            open: AtomicBool::new(false),
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Job for GateJob {
    fn key(&self) -> &str {
        &self.key
    }

    fn run(&self, cancel: &CancelToken) {
        self.started.store(true, Ordering::SeqCst);
        while !self.open.load(Ordering::SeqCst) && !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(2));
        }
        self.finished.store(true, Ordering::SeqCst);
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

pub struct PanicJob;

impl Job for PanicJob {
    fn key(&self) -> &str {
        "panic"
    }

    fn run(&self, _cancel: &CancelToken) {
        panic!("job failure");
    }
}

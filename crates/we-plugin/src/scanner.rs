//! Plug-in scan coordinator
//!
//! Third-party plug-ins may crash the process that touches them, so probing
//! happens in a worker subprocess (this executable relaunched with
//! `--waveedit-plugin-scanner`). The coordinator feeds the worker one
//! plug-in at a time, heartbeats it, and classifies each outcome. Worker
//! loss marks the current plug-in `Crashed` and the scan resumes with a
//! fresh worker; deadline expiry is resolved by a UI-supplied policy.
//!
//! The worker transport is a trait so the crash/timeout handling is
//! testable with scripted workers.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};

use crate::blacklist::Blacklist;
use crate::cache::PluginCache;
use crate::protocol::{self, CoordinatorMessage, WorkerMessage};
use crate::{PluginDescriptor, PluginError, PluginFormatKind, PluginResult, SCANNER_WORKER_FLAG};

/// Per-plugin scan deadline.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Heartbeat send interval while waiting on the worker.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Grace period after a cancellation before the worker is killed.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// How long to wait for a fresh worker's `Ready`.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome classification for one plug-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Pending,
    Success,
    Failed,
    Crashed,
    Timeout,
    Skipped,
    Blacklisted,
    Cached,
}

/// Result record for one plug-in file.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub path: PathBuf,
    pub name: String,
    pub status: ScanStatus,
    pub error: Option<String>,
    pub descriptors: Vec<PluginDescriptor>,
    pub mtime: i64,
    pub size: u64,
}

impl ScanResult {
    fn new(path: &Path) -> Self {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();
        Self {
            path: path.to_path_buf(),
            name,
            status: ScanStatus::Pending,
            error: None,
            descriptors: Vec::new(),
            mtime: 0,
            size: 0,
        }
    }
}

/// Whole-scan result set.
#[derive(Debug, Default)]
pub struct ScanSummary {
    pub results: Vec<ScanResult>,
}

impl ScanSummary {
    pub fn count(&self, status: ScanStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Every descriptor from successful and cached scans.
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ScanStatus::Success | ScanStatus::Cached))
            .flat_map(|r| r.descriptors.iter().cloned())
            .collect()
    }
}

/// One file to scan.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub path: PathBuf,
    pub format: PluginFormatKind,
}

/// User decision when a plug-in exceeds its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutDecision {
    WaitLonger,
    Skip,
    Blacklist,
}

/// Interactive decisions, supplied by the UI. The core never assumes a
/// toolkit; a headless scan uses [`DefaultScanPolicy`].
pub trait ScanPolicy: Send {
    /// Called when a plug-in has been scanning past the deadline.
    fn on_timeout(&mut self, path: &Path) -> TimeoutDecision {
        let _ = path;
        TimeoutDecision::Skip
    }

    /// Whether a worker crash should blacklist the plug-in automatically.
    fn blacklist_on_crash(&self) -> bool {
        false
    }
}

/// Headless policy: skip on timeout, optionally auto-blacklist crashers.
#[derive(Debug, Default)]
pub struct DefaultScanPolicy {
    pub blacklist_crashed: bool,
}

impl ScanPolicy for DefaultScanPolicy {
    fn blacklist_on_crash(&self) -> bool {
        self.blacklist_crashed
    }
}

/// Transport to one worker process.
pub trait WorkerLink: Send {
    fn send(&mut self, msg: &CoordinatorMessage) -> PluginResult<()>;

    /// Next message, or `None` when `timeout` elapses without one.
    fn recv(&mut self, timeout: Duration) -> PluginResult<Option<WorkerMessage>>;

    fn is_alive(&mut self) -> bool;

    fn kill(&mut self);
}

/// Spawns fresh workers; called again after a crash.
pub type WorkerFactory = Box<dyn FnMut() -> PluginResult<Box<dyn WorkerLink>> + Send>;

// ───────────────────────────────────────────────────────────────────────────
// Process-backed worker link
// ───────────────────────────────────────────────────────────────────────────

struct ProcessWorkerLink {
    child: Child,
    stdin: std::process::ChildStdin,
    incoming: Receiver<WorkerMessage>,
    alive: bool,
}

impl ProcessWorkerLink {
    fn spawn() -> PluginResult<Self> {
        let exe = std::env::current_exe()?;
        let mut child = Command::new(exe)
            .arg(SCANNER_WORKER_FLAG)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PluginError::InstantiationFailed(format!("spawn scan worker: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PluginError::InstantiationFailed("worker stdin missing".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PluginError::InstantiationFailed("worker stdout missing".to_string()))?;

        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match protocol::decode::<WorkerMessage>(&line) {
                    Ok(msg) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(err) => log::warn!("scan worker sent garbage: {err}"),
                }
            }
            // Pipe closed; the channel disconnects when tx drops.
        });

        Ok(Self {
            child,
            stdin,
            incoming: rx,
            alive: true,
        })
    }
}

impl WorkerLink for ProcessWorkerLink {
    fn send(&mut self, msg: &CoordinatorMessage) -> PluginResult<()> {
        let line = protocol::encode(msg)?;
        writeln!(self.stdin, "{line}")?;
        self.stdin.flush()?;
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> PluginResult<Option<WorkerMessage>> {
        match self.incoming.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.alive = false;
                Ok(None)
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            _ => {
                self.alive = false;
                false
            }
        }
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.alive = false;
    }
}

impl Drop for ProcessWorkerLink {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = self.send(&CoordinatorMessage::Shutdown);
            let _ = self.child.wait();
        }
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Coordinator
// ───────────────────────────────────────────────────────────────────────────

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Drives a scan over a list of plug-in files.
pub struct ScannerCoordinator {
    factory: WorkerFactory,
    policy: Box<dyn ScanPolicy>,
    cache: PluginCache,
    blacklist: Blacklist,
    cancel: Arc<AtomicBool>,
    worker: Option<Box<dyn WorkerLink>>,
}

impl ScannerCoordinator {
    pub fn new(factory: WorkerFactory, policy: Box<dyn ScanPolicy>) -> Self {
        Self {
            factory,
            policy,
            cache: PluginCache::new(),
            blacklist: Blacklist::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Coordinator backed by real worker subprocesses.
    pub fn with_subprocess_workers(policy: Box<dyn ScanPolicy>) -> Self {
        Self::new(
            Box::new(|| {
                ProcessWorkerLink::spawn().map(|w| Box::new(w) as Box<dyn WorkerLink>)
            }),
            policy,
        )
    }

    pub fn set_cache(&mut self, cache: PluginCache) {
        self.cache = cache;
    }

    pub fn cache(&self) -> &PluginCache {
        &self.cache
    }

    pub fn set_blacklist(&mut self, blacklist: Blacklist) {
        self.blacklist = blacklist;
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    pub fn blacklist_mut(&mut self) -> &mut Blacklist {
        &mut self.blacklist
    }

    /// Flag to cancel a scan from another thread.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel_scan(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    fn ensure_worker(&mut self) -> PluginResult<&mut Box<dyn WorkerLink>> {
        let needs_spawn = match self.worker.as_mut() {
            Some(worker) => !worker.is_alive(),
            None => true,
        };
        if needs_spawn {
            self.worker = None;
            let mut worker = (self.factory)()?;
            // Wait for the hello before handing out work.
            let deadline = Instant::now() + READY_TIMEOUT;
            loop {
                match worker.recv(Duration::from_millis(200))? {
                    Some(WorkerMessage::Ready { pid }) => {
                        log::debug!("scan worker ready (pid {pid})");
                        break;
                    }
                    Some(other) => log::debug!("pre-ready worker message: {other:?}"),
                    None => {
                        if !worker.is_alive() || Instant::now() >= deadline {
                            worker.kill();
                            return Err(PluginError::InstantiationFailed(
                                "scan worker failed to start".to_string(),
                            ));
                        }
                    }
                }
            }
            self.worker = Some(worker);
        }
        self.worker.as_mut().ok_or_else(|| {
            PluginError::InstantiationFailed("scan worker unavailable".to_string())
        })
    }

    fn drop_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.kill();
        }
    }

    /// Run the scan. Returns a summary with one record per job; the scan
    /// always runs to completion unless cancelled.
    pub fn scan(&mut self, jobs: &[ScanJob]) -> ScanSummary {
        self.cancel.store(false, Ordering::Release);
        let mut summary = ScanSummary::default();

        for (index, job) in jobs.iter().enumerate() {
            if self.cancel.load(Ordering::Acquire) {
                let mut result = ScanResult::new(&job.path);
                result.status = ScanStatus::Skipped;
                result.error = Some("scan cancelled".to_string());
                summary.results.push(result);
                continue;
            }

            let result = self.scan_one(job);
            log::info!(
                "scanned {} ({}/{}): {:?}",
                job.path.display(),
                index + 1,
                jobs.len(),
                result.status
            );
            summary.results.push(result);
        }

        self.shutdown_worker();
        summary
    }

    fn shutdown_worker(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            let _ = worker.send(&CoordinatorMessage::Shutdown);
        }
        self.worker = None;
    }

    fn scan_one(&mut self, job: &ScanJob) -> ScanResult {
        let mut result = ScanResult::new(&job.path);
        let path_str = job.path.display().to_string();

        if self.blacklist.contains(&path_str) {
            result.status = ScanStatus::Blacklisted;
            return result;
        }

        match std::fs::metadata(&job.path) {
            Ok(meta) => {
                result.size = meta.len();
                result.mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
            }
            Err(err) => {
                result.status = ScanStatus::Failed;
                result.error = Some(format!("unreadable: {err}"));
                return result;
            }
        }

        if let Some(descriptors) = self.cache.lookup_fresh(&job.path, result.mtime, result.size) {
            result.status = ScanStatus::Cached;
            result.descriptors = descriptors.to_vec();
            return result;
        }

        let worker = match self.ensure_worker() {
            Ok(worker) => worker,
            Err(err) => {
                result.status = ScanStatus::Failed;
                result.error = Some(err.to_string());
                return result;
            }
        };

        if worker
            .send(&CoordinatorMessage::ScanPlugin {
                path: path_str.clone(),
                format: job.format.as_str().to_string(),
            })
            .is_err()
        {
            // Pipe already gone: same as losing the worker mid-scan.
            self.mark_crashed(&mut result, &path_str);
            return result;
        }

        let mut deadline = Instant::now() + SCAN_TIMEOUT;
        let mut last_heartbeat = Instant::now();

        loop {
            if self.cancel.load(Ordering::Acquire) {
                self.cancel_in_flight(&mut result);
                return result;
            }

            let Some(worker) = self.worker.as_mut() else {
                self.mark_crashed(&mut result, &path_str);
                return result;
            };
            match worker.recv(Duration::from_millis(200)) {
                Ok(Some(WorkerMessage::ScanComplete { path, descriptors })) if path == path_str => {
                    result.status = ScanStatus::Success;
                    result.descriptors = descriptors.clone();
                    self.cache
                        .update(&job.path, result.mtime, result.size, descriptors);
                    return result;
                }
                Ok(Some(WorkerMessage::ScanFailed { path, error })) if path == path_str => {
                    result.status = ScanStatus::Failed;
                    result.error = Some(error);
                    return result;
                }
                Ok(Some(WorkerMessage::ScanStarted { .. }))
                | Ok(Some(WorkerMessage::HeartbeatAck { .. }))
                | Ok(Some(WorkerMessage::Ready { .. })) => {}
                Ok(Some(WorkerMessage::Error { message })) => {
                    log::warn!("scan worker error: {message}");
                }
                Ok(Some(other)) => {
                    log::debug!("stale worker message: {other:?}");
                }
                Ok(None) => {
                    let alive = worker.is_alive();
                    if !alive {
                        self.mark_crashed(&mut result, &path_str);
                        return result;
                    }
                    if last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
                        let _ = worker.send(&CoordinatorMessage::Heartbeat { time: now_millis() });
                        last_heartbeat = Instant::now();
                    }
                    if Instant::now() >= deadline {
                        match self.policy.on_timeout(&job.path) {
                            TimeoutDecision::WaitLonger => {
                                deadline = Instant::now() + SCAN_TIMEOUT;
                            }
                            TimeoutDecision::Skip => {
                                result.status = ScanStatus::Timeout;
                                result.error = Some("scan deadline exceeded".to_string());
                                self.drop_worker();
                                return result;
                            }
                            TimeoutDecision::Blacklist => {
                                result.status = ScanStatus::Blacklisted;
                                result.error = Some("scan deadline exceeded".to_string());
                                self.blacklist.add(&path_str);
                                self.drop_worker();
                                return result;
                            }
                        }
                    }
                }
                Err(err) => {
                    log::warn!("worker transport fault: {err}");
                    self.mark_crashed(&mut result, &path_str);
                    return result;
                }
            }
        }
    }

    fn mark_crashed(&mut self, result: &mut ScanResult, path_str: &str) {
        result.status = ScanStatus::Crashed;
        result.error = Some("worker process lost while scanning".to_string());
        if self.policy.blacklist_on_crash() {
            self.blacklist.add(path_str);
        }
        // A fresh worker is spawned for the next plug-in.
        self.drop_worker();
    }

    /// Cancellation with an in-flight scan: give the worker a grace period
    /// to finish, then terminate it.
    fn cancel_in_flight(&mut self, result: &mut ScanResult) {
        result.status = ScanStatus::Skipped;
        result.error = Some("scan cancelled".to_string());

        if let Some(worker) = self.worker.as_mut() {
            let deadline = Instant::now() + CANCEL_GRACE;
            while Instant::now() < deadline {
                match worker.recv(Duration::from_millis(100)) {
                    Ok(Some(WorkerMessage::ScanComplete { .. }))
                    | Ok(Some(WorkerMessage::ScanFailed { .. })) => break,
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        if !worker.is_alive() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
        self.drop_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted worker behaviour per received `ScanPlugin`.
    #[derive(Debug, Clone)]
    enum Script {
        /// Reply ScanStarted then ScanComplete with one descriptor.
        Succeed,
        /// Reply ScanStarted then drop dead.
        CrashAfterStart,
        /// Reply ScanStarted then go silent (never completes).
        Hang,
    }

    struct ScriptedWorker {
        scripts: Arc<Mutex<VecDeque<Script>>>,
        outbox: VecDeque<WorkerMessage>,
        alive: bool,
    }

    impl ScriptedWorker {
        fn new(scripts: Arc<Mutex<VecDeque<Script>>>) -> Self {
            let mut outbox = VecDeque::new();
            outbox.push_back(WorkerMessage::Ready { pid: 1 });
            Self {
                scripts,
                outbox,
                alive: true,
            }
        }
    }

    impl WorkerLink for ScriptedWorker {
        fn send(&mut self, msg: &CoordinatorMessage) -> PluginResult<()> {
            if !self.alive {
                return Err(PluginError::StateError("pipe closed".to_string()));
            }
            match msg {
                CoordinatorMessage::Heartbeat { time } => {
                    self.outbox.push_back(WorkerMessage::HeartbeatAck { time: *time });
                }
                CoordinatorMessage::Shutdown => {
                    self.alive = false;
                }
                CoordinatorMessage::ScanPlugin { path, .. } => {
                    let script = self
                        .scripts
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or(Script::Succeed);
                    self.outbox.push_back(WorkerMessage::ScanStarted {
                        path: path.clone(),
                        time: 0,
                    });
                    match script {
                        Script::Succeed => {
                            self.outbox.push_back(WorkerMessage::ScanComplete {
                                path: path.clone(),
                                descriptors: vec![PluginDescriptor {
                                    identifier: format!("vst3.{path}"),
                                    name: path.clone(),
                                    vendor: String::new(),
                                    version: "1.0".to_string(),
                                    format: PluginFormatKind::Vst3,
                                    path: path.into(),
                                    audio_inputs: 2,
                                    audio_outputs: 2,
                                    latency_samples: 0,
                                }],
                            });
                        }
                        Script::CrashAfterStart => {
                            self.alive = false;
                        }
                        Script::Hang => {}
                    }
                }
            }
            Ok(())
        }

        fn recv(&mut self, _timeout: Duration) -> PluginResult<Option<WorkerMessage>> {
            Ok(self.outbox.pop_front())
        }

        fn is_alive(&mut self) -> bool {
            self.alive
        }

        fn kill(&mut self) {
            self.alive = false;
        }
    }

    fn scripted_coordinator(
        scripts: Vec<Script>,
        policy: Box<dyn ScanPolicy>,
    ) -> ScannerCoordinator {
        let scripts = Arc::new(Mutex::new(VecDeque::from(scripts)));
        ScannerCoordinator::new(
            Box::new(move || {
                Ok(Box::new(ScriptedWorker::new(Arc::clone(&scripts))) as Box<dyn WorkerLink>)
            }),
            policy,
        )
    }

    fn jobs(paths: &[&str], dir: &Path) -> Vec<ScanJob> {
        paths
            .iter()
            .map(|name| {
                let path = dir.join(format!("{name}.vst3"));
                std::fs::write(&path, name.as_bytes()).unwrap();
                ScanJob {
                    path,
                    format: PluginFormatKind::Vst3,
                }
            })
            .collect()
    }

    #[test]
    fn test_scan_survives_crashing_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(&["good1", "crash", "good2"], dir.path());

        let mut coordinator = scripted_coordinator(
            vec![Script::Succeed, Script::CrashAfterStart, Script::Succeed],
            Box::new(DefaultScanPolicy {
                blacklist_crashed: true,
            }),
        );
        let summary = coordinator.scan(&jobs);

        assert_eq!(summary.count(ScanStatus::Success), 2);
        assert_eq!(summary.count(ScanStatus::Crashed), 1);
        assert_eq!(summary.results[1].status, ScanStatus::Crashed);

        // Policy enabled: only the crasher is blacklisted.
        assert_eq!(coordinator.blacklist().len(), 1);
        let crashed = jobs[1].path.display().to_string();
        assert!(coordinator.blacklist().contains(&crashed));
    }

    #[test]
    fn test_crash_without_blacklist_policy() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(&["a", "b"], dir.path());

        let mut coordinator = scripted_coordinator(
            vec![Script::CrashAfterStart, Script::Succeed],
            Box::new(DefaultScanPolicy::default()),
        );
        let summary = coordinator.scan(&jobs);

        assert_eq!(summary.count(ScanStatus::Crashed), 1);
        assert_eq!(summary.count(ScanStatus::Success), 1);
        assert!(coordinator.blacklist().is_empty());
    }

    #[test]
    fn test_blacklisted_plugin_not_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(&["banned", "fine"], dir.path());

        let mut coordinator =
            scripted_coordinator(vec![Script::Succeed], Box::new(DefaultScanPolicy::default()));
        coordinator
            .blacklist_mut()
            .add(&jobs[0].path.display().to_string());

        let summary = coordinator.scan(&jobs);
        assert_eq!(summary.results[0].status, ScanStatus::Blacklisted);
        assert_eq!(summary.results[1].status, ScanStatus::Success);
    }

    #[test]
    fn test_cache_hit_skips_worker() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(&["cached"], dir.path());

        let mut coordinator =
            scripted_coordinator(Vec::new(), Box::new(DefaultScanPolicy::default()));

        // Prime the cache with the file's real mtime/size.
        let meta = std::fs::metadata(&jobs[0].path).unwrap();
        let mtime = meta
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let mut cache = PluginCache::new();
        cache.update(
            &jobs[0].path,
            mtime,
            meta.len(),
            vec![PluginDescriptor::internal("cached.id", "Cached")],
        );
        coordinator.set_cache(cache);

        let summary = coordinator.scan(&jobs);
        assert_eq!(summary.results[0].status, ScanStatus::Cached);
        assert_eq!(summary.results[0].descriptors.len(), 1);
    }

    #[test]
    fn test_missing_file_fails_without_worker() {
        let mut coordinator =
            scripted_coordinator(Vec::new(), Box::new(DefaultScanPolicy::default()));
        let summary = coordinator.scan(&[ScanJob {
            path: PathBuf::from("/nonexistent/Verb.vst3"),
            format: PluginFormatKind::Vst3,
        }]);
        assert_eq!(summary.results[0].status, ScanStatus::Failed);
    }

    #[test]
    fn test_summary_descriptor_collection() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(&["one", "two"], dir.path());

        let mut coordinator = scripted_coordinator(
            vec![Script::Succeed, Script::Succeed],
            Box::new(DefaultScanPolicy::default()),
        );
        let summary = coordinator.scan(&jobs);
        assert_eq!(summary.descriptors().len(), 2);
    }

    #[test]
    fn test_cancel_marks_remaining_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(&["a", "b", "c"], dir.path());

        // The factory flips the cancel flag as soon as the first worker
        // spawns, simulating a cancel arriving while job one is in flight.
        let flag_slot: Arc<Mutex<Option<Arc<AtomicBool>>>> = Arc::new(Mutex::new(None));
        let scripts = Arc::new(Mutex::new(VecDeque::from(vec![Script::Hang])));
        let slot = Arc::clone(&flag_slot);
        let mut coordinator = ScannerCoordinator::new(
            Box::new(move || {
                if let Some(flag) = slot.lock().unwrap().as_ref() {
                    flag.store(true, Ordering::Release);
                }
                Ok(Box::new(ScriptedWorker::new(Arc::clone(&scripts))) as Box<dyn WorkerLink>)
            }),
            Box::new(DefaultScanPolicy::default()),
        );
        *flag_slot.lock().unwrap() = Some(coordinator.cancel_flag());

        let summary = coordinator.scan(&jobs);
        assert_eq!(summary.count(ScanStatus::Skipped), 3);
        assert!(summary.results.iter().all(|r| r.error.is_some()));
    }

    #[test]
    fn test_hang_script_keeps_worker_alive() {
        // A hanging worker stays alive and silent; the wall-clock deadline
        // is SCAN_TIMEOUT so the full prompt path is not unit-testable, but
        // the transport must report liveness correctly for it.
        let scripts = Arc::new(Mutex::new(VecDeque::from(vec![Script::Hang])));
        let mut worker = ScriptedWorker::new(Arc::clone(&scripts));
        assert!(matches!(
            worker.recv(Duration::from_millis(1)).unwrap(),
            Some(WorkerMessage::Ready { .. })
        ));
        worker
            .send(&CoordinatorMessage::ScanPlugin {
                path: "p.vst3".to_string(),
                format: "vst3".to_string(),
            })
            .unwrap();
        assert!(matches!(
            worker.recv(Duration::from_millis(1)).unwrap(),
            Some(WorkerMessage::ScanStarted { .. })
        ));
        assert!(worker.recv(Duration::from_millis(1)).unwrap().is_none());
        assert!(worker.is_alive());
    }
}

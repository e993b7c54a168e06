use anyhow::{Result, anyhow, bail};
use chrono::NaiveDateTime;
use crossbeam_channel::{Receiver, unbounded};
use photobatch::collection::{CaptureDateSource, parse_exif_datetime};
use photobatch::engine::file_name_lossy;
use photobatch::pipeline::{execute_with_timeout, panic_to_error};
use photobatch::stages::{Stage, StageList};
use photobatch::{
    ConvertError, ImageFile, MessageKind, Process, ProcessState, ProgressMessage, Settings,
    StageError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Capture dates by file name.
struct DateMap(HashMap<String, NaiveDateTime>);

impl CaptureDateSource for DateMap {
    fn capture_time(&self, path: &Path) -> Result<NaiveDateTime> {
        self.0
            .get(&file_name_lossy(path))
            .copied()
            .ok_or_else(|| anyhow!("no date for {}", path.display()))
    }
}

/// What a scripted stage does for a given file.
#[derive(Clone, Copy)]
enum Action {
    Ok,
    Fail,
    Sleep(u64),
    PanicStr,
    PanicError,
    OutOfBounds,
    PanicOther,
}

/// Stage whose behavior is scripted per file name; records every file it ran on.
struct ScriptedStage {
    name: String,
    default: Action,
    per_file: HashMap<String, Action>,
    seen: Mutex<Vec<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl ScriptedStage {
    fn new(name: &str, default: Action) -> Self {
        Self {
            name: name.to_string(),
            default,
            per_file: HashMap::new(),
            seen: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    fn on(mut self, file: &str, action: Action) -> Self {
        self.per_file.insert(file.to_string(), action);
        self
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, img: &ImageFile) -> Result<()> {
        let name = img.display_name();
        self.seen.lock().unwrap().push(name.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let action = self.per_file.get(&name).copied().unwrap_or(self.default);
        let result = match action {
            Action::Ok => Ok(()),
            Action::Fail => Err(anyhow!("cannot decode {}", name)),
            Action::Sleep(ms) => {
                thread::sleep(Duration::from_millis(ms));
                Ok(())
            }
            Action::PanicStr => panic!("boom on {}", name),
            Action::PanicError => std::panic::panic_any(anyhow!("bad header in {}", name)),
            Action::OutOfBounds => {
                let pixels: Vec<u8> = Vec::new();
                let idx = std::hint::black_box(name.len());
                Err(anyhow!("pixel {}", pixels[idx]))
            }
            Action::PanicOther => std::panic::panic_any(42_u32),
        };
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

struct Fixture {
    _tmp: TempDir,
    settings: Settings,
    dates: DateMap,
    publish: PathBuf,
}

/// `count` files named `img00.jpg`..., dated 2020-01-01 onward, one day apart.
fn fixture(count: usize) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("in");
    std::fs::create_dir(&src).unwrap();
    let mut dates = HashMap::new();
    for i in 0..count {
        let name = format!("img{:02}.jpg", i);
        std::fs::write(src.join(&name), b"x").unwrap();
        let date = format!("2020:01:{:02} 12:00:00", (i % 28) + 1);
        dates.insert(name, parse_exif_datetime(&date).unwrap());
    }
    let publish = tmp.path().join("pub");
    let mut settings = Settings::new("trip", &src);
    settings.publish_dir = publish.clone();
    settings.timeout_ms = 5_000;
    Fixture {
        _tmp: tmp,
        settings,
        dates: DateMap(dates),
        publish,
    }
}

/// Trip fixture: a.jpg, b.jpg, c.jpg dated 2020-01-01, 05, 10.
fn trip_fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("in");
    std::fs::create_dir(&src).unwrap();
    let mut dates = HashMap::new();
    for (name, date) in [
        ("a.jpg", "2020:01:01 10:00:00"),
        ("b.jpg", "2020:01:05 10:00:00"),
        ("c.jpg", "2020:01:10 10:00:00"),
    ] {
        std::fs::write(src.join(name), b"x").unwrap();
        dates.insert(name.to_string(), parse_exif_datetime(date).unwrap());
    }
    let publish = tmp.path().join("pub");
    let mut settings = Settings::new("trip", &src);
    settings.publish_dir = publish.clone();
    Fixture {
        _tmp: tmp,
        settings,
        dates: DateMap(dates),
        publish,
    }
}

fn start(
    fx: &Fixture,
    stages: StageList,
) -> (Process, Receiver<ProgressMessage>, photobatch::collection::CollectionFileSystem) {
    let (tx, rx) = unbounded();
    let (process, cfs) =
        Process::start_with("p1", &fx.settings, tx, &fx.dates, move |_| Ok(stages)).unwrap();
    (process, rx, cfs)
}

/// Every message up to and including `end`.
fn collect_until_end(rx: &Receiver<ProgressMessage>) -> Vec<ProgressMessage> {
    let mut msgs = Vec::new();
    loop {
        let msg = rx
            .recv_timeout(Duration::from_secs(20))
            .expect("end message not received");
        let end = msg.is_end();
        msgs.push(msg);
        if end {
            return msgs;
        }
    }
}

fn count_kind(msgs: &[ProgressMessage], kind: MessageKind) -> usize {
    msgs.iter().filter(|m| m.kind == kind).count()
}

fn as_stage(s: &Arc<ScriptedStage>) -> Arc<dyn Stage> {
    Arc::clone(s) as Arc<dyn Stage>
}

// --- successful runs ---

#[test]
fn test_two_noop_stages_three_files() {
    let fx = trip_fixture();
    let first = Arc::new(ScriptedStage::new("first", Action::Ok));
    let second = Arc::new(ScriptedStage::new("second", Action::Ok));
    let (process, rx, cfs) = start(&fx, vec![as_stage(&first), as_stage(&second)]);

    assert_eq!(
        cfs.publish_folder().unwrap(),
        fx.publish.join("20200101_20200110_trip").as_path()
    );

    let msgs = collect_until_end(&rx);
    assert_eq!(msgs.len(), 7);
    assert_eq!(count_kind(&msgs, MessageKind::Stdout), 6);
    let end = msgs.last().unwrap();
    assert_eq!(end.kind, MessageKind::End);
    assert_eq!(end.body, "");
    assert!(msgs.iter().all(|m| m.id == "p1"));
    assert!(
        msgs.iter()
            .any(|m| m.body == "first for image b.jpg correctly executed\n")
    );

    process.wait().unwrap();
    assert_eq!(process.state(), ProcessState::Ended);
    assert!(rx.try_recv().is_err(), "nothing after end");

    let mut seen = second.seen();
    seen.sort();
    assert_eq!(seen, vec!["a.jpg", "b.jpg", "c.jpg"]);
}

#[test]
fn test_stage_order_per_item_with_many_workers() {
    let mut fx = fixture(24);
    fx.settings.conversion.workers = 4;
    let first = Arc::new(ScriptedStage::new("first", Action::Sleep(10)));
    let second = Arc::new(ScriptedStage::new("second", Action::Sleep(5)));
    let third = Arc::new(ScriptedStage::new("third", Action::Ok));
    let (process, rx, _) = start(
        &fx,
        vec![as_stage(&first), as_stage(&second), as_stage(&third)],
    );

    let msgs = collect_until_end(&rx);
    process.wait().unwrap();
    assert_eq!(count_kind(&msgs, MessageKind::Stdout), 72);
    assert_eq!(msgs.last().unwrap().body, "");

    // For every file, stage i's message comes before stage i+1's.
    for i in 0..24 {
        let name = format!("img{:02}.jpg", i);
        let pos = |stage: &str| {
            msgs.iter()
                .position(|m| m.body == format!("{stage} for image {name} correctly executed\n"))
                .unwrap()
        };
        assert!(pos("first") < pos("second"));
        assert!(pos("second") < pos("third"));
    }
    assert!(first.max_running.load(Ordering::SeqCst) <= 4);
}

#[test]
fn test_single_worker_runs_one_at_a_time() {
    let fx = fixture(6);
    let only = Arc::new(ScriptedStage::new("only", Action::Sleep(5)));
    let (process, rx, _) = start(&fx, vec![as_stage(&only)]);
    collect_until_end(&rx);
    process.wait().unwrap();
    assert_eq!(only.max_running.load(Ordering::SeqCst), 1);
    assert_eq!(
        only.seen(),
        (0..6).map(|i| format!("img{:02}.jpg", i)).collect::<Vec<_>>()
    );
}

// --- per-item failures ---

#[test]
fn test_failing_item_is_dropped_from_later_stages() {
    let fx = trip_fixture();
    let first = Arc::new(ScriptedStage::new("first", Action::Ok).on("b.jpg", Action::Fail));
    let second = Arc::new(ScriptedStage::new("second", Action::Ok));
    let (process, rx, _) = start(&fx, vec![as_stage(&first), as_stage(&second)]);

    let msgs = collect_until_end(&rx);
    assert_eq!(count_kind(&msgs, MessageKind::Stdout), 4);
    let errs: Vec<&ProgressMessage> = msgs
        .iter()
        .filter(|m| m.kind == MessageKind::Stderr)
        .collect();
    assert_eq!(errs.len(), 1);
    assert!(
        errs[0]
            .body
            .starts_with("first for image b.jpg failed to process due to error ")
    );
    assert!(errs[0].body.contains("cannot decode b.jpg"));
    assert_eq!(msgs.last().unwrap().body, "");

    process.wait().unwrap();
    let mut seen = second.seen();
    seen.sort();
    assert_eq!(seen, vec!["a.jpg", "c.jpg"]);
}

#[test]
fn test_timeout_reports_and_continues() {
    let mut fx = trip_fixture();
    fx.settings.timeout_ms = 100;
    let slow = Arc::new(ScriptedStage::new("slow", Action::Ok).on("a.jpg", Action::Sleep(2_000)));
    let (process, rx, _) = start(&fx, vec![as_stage(&slow)]);

    let started = Instant::now();
    let msgs = collect_until_end(&rx);
    assert!(started.elapsed() < Duration::from_millis(1_500));
    let err = msgs
        .iter()
        .find(|m| m.kind == MessageKind::Stderr)
        .unwrap();
    assert!(err.body.contains("a.jpg"));
    assert!(err.body.contains("timed out after 100 milliseconds"));
    assert_eq!(count_kind(&msgs, MessageKind::Stdout), 2);
    process.wait().unwrap();
}

#[test]
fn test_panic_with_message_is_critical() {
    let fx = trip_fixture();
    let stage = Arc::new(ScriptedStage::new("s", Action::Ok).on("c.jpg", Action::PanicStr));
    let (process, rx, _) = start(&fx, vec![as_stage(&stage)]);

    let msgs = collect_until_end(&rx);
    let err = msgs
        .iter()
        .find(|m| m.kind == MessageKind::Stderr)
        .unwrap();
    assert!(err.body.contains("critical error: boom on c.jpg"));
    assert_eq!(count_kind(&msgs, MessageKind::Stdout), 2);
    assert_eq!(msgs.last().unwrap().body, "");
    process.wait().unwrap();
}

#[test]
fn test_panic_with_error_value_keeps_text() {
    let fx = trip_fixture();
    let stage = Arc::new(ScriptedStage::new("s", Action::Ok).on("b.jpg", Action::PanicError));
    let (process, rx, _) = start(&fx, vec![as_stage(&stage)]);

    let msgs = collect_until_end(&rx);
    let err = msgs
        .iter()
        .find(|m| m.kind == MessageKind::Stderr)
        .unwrap();
    assert_eq!(
        err.body,
        "s for image b.jpg failed to process due to error bad header in b.jpg\n"
    );
    process.wait().unwrap();
}

#[test]
fn test_out_of_bounds_is_critical_with_panic_site_trace() {
    let img = Arc::new(ImageFile {
        path: PathBuf::from("/in/oob.jpg"),
        timestamp: 0,
        sort_key: "20200101".to_string(),
        target_ext: ".jpg".to_string(),
    });
    let stage: Arc<dyn Stage> = Arc::new(ScriptedStage::new("oob", Action::OutOfBounds));
    let err = execute_with_timeout(&stage, Duration::from_secs(5), &img).unwrap_err();
    assert!(err.is_critical());
    let text = err.to_string();
    assert!(text.starts_with("critical error: index out of bounds"));
    // Captured while the panicking frames were still on the stack.
    assert!(text.contains("panic_bounds_check"));
}

#[test]
fn test_panic_with_other_value_is_critical() {
    let fx = trip_fixture();
    let stage = Arc::new(ScriptedStage::new("s", Action::Ok).on("a.jpg", Action::PanicOther));
    let (process, rx, _) = start(&fx, vec![as_stage(&stage)]);

    let msgs = collect_until_end(&rx);
    let err = msgs
        .iter()
        .find(|m| m.kind == MessageKind::Stderr)
        .unwrap();
    assert!(err.body.contains("critical error"));
    assert_eq!(msgs.last().unwrap().body, "");
    process.wait().unwrap();
}

#[test]
fn test_execute_with_timeout_direct() {
    let img = Arc::new(ImageFile {
        path: PathBuf::from("/in/x.jpg"),
        timestamp: 0,
        sort_key: "20200101".to_string(),
        target_ext: ".jpg".to_string(),
    });
    let ok: Arc<dyn Stage> = Arc::new(ScriptedStage::new("ok", Action::Ok));
    assert!(execute_with_timeout(&ok, Duration::from_secs(1), &img).is_ok());

    let slow: Arc<dyn Stage> = Arc::new(ScriptedStage::new("slow", Action::Sleep(1_000)));
    let err = execute_with_timeout(&slow, Duration::from_millis(50), &img).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(
        err.to_string(),
        "file /in/x.jpg timed out after 50 milliseconds"
    );

    let failing: Arc<dyn Stage> = Arc::new(ScriptedStage::new("bad", Action::Fail));
    let err = execute_with_timeout(&failing, Duration::from_secs(1), &img).unwrap_err();
    assert!(matches!(err, StageError::Failed(ref s) if s == "cannot decode x.jpg"));
}

#[test]
fn test_panic_to_error_payloads() {
    let e = panic_to_error(Box::new("plain"), Some("frame 0".to_string()));
    assert!(e.is_critical());
    assert_eq!(e.to_string(), "critical error: plain\nframe 0");
    let e = panic_to_error(Box::new(String::from("owned")), Some("frame 0".to_string()));
    assert!(matches!(e, StageError::Critical { ref trace } if trace.starts_with("owned\n")));
    let e = panic_to_error(Box::new(anyhow!("wrapped")), None);
    assert!(matches!(e, StageError::Panicked(ref s) if s == "wrapped"));
    let e = panic_to_error(Box::new(std::io::Error::other("io")), None);
    assert!(matches!(e, StageError::Panicked(ref s) if s == "io"));
    let boxed: Box<dyn std::error::Error + Send + Sync> = "boxed".into();
    let e = panic_to_error(Box::new(boxed), None);
    assert!(matches!(e, StageError::Panicked(ref s) if s == "boxed"));
    let e = panic_to_error(Box::new(StageError::Failed("inner".to_string())), None);
    assert!(matches!(e, StageError::Failed(ref s) if s == "inner"));
    let e = panic_to_error(Box::new(7_i64), None);
    assert!(e.is_critical());
    assert!(e.to_string().starts_with("critical error: stage panicked with a non-error value"));
}

// --- kill ---

#[test]
fn test_kill_ends_run_once() {
    let fx = fixture(10);
    let slow = Arc::new(ScriptedStage::new("slow", Action::Sleep(200)));
    let (process, rx, _) = start(&fx, vec![as_stage(&slow)]);

    process.kill();
    assert_eq!(process.state(), ProcessState::Ended);
    let msgs = collect_until_end(&rx);
    let end = msgs.last().unwrap();
    assert_eq!(end.kind, MessageKind::End);
    assert_eq!(end.body, ConvertError::Killed.to_string());
    assert_eq!(count_kind(&msgs, MessageKind::End), 1);
    assert!(slow.seen().len() < 10);

    // Second kill is a no-op and does not block.
    let again = Instant::now();
    process.kill();
    assert!(again.elapsed() < Duration::from_secs(1));
    assert!(rx.try_recv().is_err(), "only one end message");

    let err = process.wait().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConvertError>(),
        Some(ConvertError::Killed)
    ));
}

#[test]
fn test_kill_from_another_thread_while_waiting() {
    let fx = fixture(8);
    let slow = Arc::new(ScriptedStage::new("slow", Action::Sleep(300)));
    let (process, rx, _) = start(&fx, vec![as_stage(&slow)]);

    let killer = process.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        killer.kill();
    });
    assert!(process.wait().is_err());
    handle.join().unwrap();
    assert!(collect_until_end(&rx).last().unwrap().is_end());
}

#[test]
fn test_kill_after_completion_is_noop() {
    let fx = trip_fixture();
    let stage = Arc::new(ScriptedStage::new("s", Action::Ok));
    let (process, rx, _) = start(&fx, vec![as_stage(&stage)]);
    collect_until_end(&rx);
    process.wait().unwrap();
    process.kill();
    process.wait().unwrap();
    assert!(rx.try_recv().is_err());
}

// --- setup failures ---

#[test]
fn test_empty_collection_sends_end_with_error() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
    let settings = Settings::new("trip", tmp.path());
    let (tx, rx) = unbounded();
    let dates = DateMap(HashMap::new());

    let stage = Arc::new(ScriptedStage::new("s", Action::Ok));
    let factory_stage = as_stage(&stage);
    let err = Process::start_with("p2", &settings, tx, &dates, move |_| Ok(vec![factory_stage]))
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<ConvertError>(),
        Some(ConvertError::EmptyCollection(_))
    ));
    let end = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(end.is_end());
    assert_eq!(end.id, "p2");
    assert!(end.body.contains("no image files"));
    assert!(stage.seen().is_empty());
}

struct FailingPreflight;

impl Stage for FailingPreflight {
    fn name(&self) -> &str {
        "preflight"
    }

    fn run(&self, _img: &ImageFile) -> Result<()> {
        Ok(())
    }

    fn preflight(&self) -> Result<()> {
        bail!("tool missing")
    }
}

#[test]
fn test_preflight_failure_stops_before_workers() {
    let fx = trip_fixture();
    let (tx, rx) = unbounded();
    let err = Process::start_with("p3", &fx.settings, tx, &fx.dates, |_| {
        Ok(vec![Arc::new(FailingPreflight) as Arc<dyn Stage>])
    })
    .err()
    .unwrap();
    assert!(format!("{:#}", err).contains("tool missing"));
    let end = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(end.is_end());
    assert!(end.body.contains("tool missing"));
    assert!(!fx.publish.exists());
}

#[test]
fn test_empty_stage_list_sends_end_with_error() {
    let fx = trip_fixture();
    let (tx, rx) = unbounded();
    let err = Process::start_with("p4", &fx.settings, tx, &fx.dates, |_| Ok(StageList::new()))
        .err()
        .unwrap();
    assert!(format!("{:#}", err).contains("at least one stage"));
    let end = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(end.is_end());
    assert_eq!(end.id, "p4");
    assert!(end.body.contains("at least one stage"));
    assert!(rx.try_recv().is_err(), "exactly one end");
}

#[test]
fn test_zero_workers_runs_with_one() {
    let mut fx = trip_fixture();
    fx.settings.conversion.workers = 0;
    let stage = Arc::new(ScriptedStage::new("s", Action::Ok));
    let (process, rx, cfs) = start(&fx, vec![as_stage(&stage)]);
    assert_eq!(cfs.workers, 1);
    let msgs = collect_until_end(&rx);
    assert_eq!(count_kind(&msgs, MessageKind::Stdout), 3);
    process.wait().unwrap();
    assert_eq!(stage.max_running.load(Ordering::SeqCst), 1);
}

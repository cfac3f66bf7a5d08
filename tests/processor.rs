//! End-to-end scenarios driving real bash through the local executor.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tempfile::tempdir;

use tern::{
    channel, Cache, CacheEntry, DirCache, ErrorStrategy, Executor, InParam, InPort, LocalExecutor,
    Message, NoCache, OutParam, ProcessDef, ProcessId, Session, Submission, TaskError,
    TaskProcessor, Value,
};

fn init_logs() {
    simple_logging::log_to_stderr(log::LevelFilter::Debug);
}

fn proc(name: &str, command: &str) -> ProcessDef {
    ProcessDef::new(ProcessId::from(0usize), name, command)
}

/// Read values off an output channel until the poison arrives.
fn drain(rx: &InPort) -> Vec<Value> {
    let mut out = Vec::new();
    loop {
        match rx.recv() {
            Message::Value(v) => out.push(v),
            Message::Poison => break,
        }
    }
    out
}

fn strings(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .map(|v| match v {
            Value::Str(s) => s.clone(),
            other => other.render(),
        })
        .collect()
}

/// Count task work dirs under the executor work root (two-level layout).
fn count_work_dirs(work_root: &Path) -> usize {
    let mut count = 0;
    for bucket in std::fs::read_dir(work_root).unwrap() {
        let bucket = bucket.unwrap().path();
        if bucket.is_dir() {
            count += std::fs::read_dir(&bucket).unwrap().count();
        }
    }
    count
}

#[test]
fn test_basic_pipeline_stdout_output() -> Result<()> {
    init_logs();
    let root = tempdir()?;
    let session = Arc::new(Session::new()?);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let mut p = proc("greet", "echo hello ${who}");
    p.add_input(InParam::value("who"));
    p.add_output(OutParam::stdout("out"));

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();

    let mut runner = TaskProcessor::new(session.clone(), p, executor, Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;

    in_tx.send(Value::from("world"));
    in_tx.poison();

    let values = drain(&out_rx);
    handle.join()?;

    assert_eq!(values.len(), 1);
    let Value::Path(out_path) = &values[0] else {
        panic!("stdout output should bind a path");
    };
    assert_eq!(std::fs::read_to_string(out_path)?, "hello world\n");
    Ok(())
}

#[test]
fn test_s1_cache_hit_skips_submission() -> Result<()> {
    let root = tempdir()?;
    let first = Arc::new(Session::new()?);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let make_proc = || {
        let mut p = proc("emit", "echo ${a} > out.txt");
        p.add_input(InParam::value("a"));
        p.add_output(OutParam::path("result", "out.txt"));
        p
    };

    // first run executes for real:
    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(first.clone(), make_proc(), executor.clone(), Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;
    in_tx.send(Value::Int(1));
    in_tx.poison();
    let first_values = drain(&out_rx);
    handle.join()?;

    assert_eq!(first_values.len(), 1);
    assert_eq!(count_work_dirs(executor.work_root()), 1);

    // resumed session with the same id finds the entry and does not
    // submit again:
    let resumed = Arc::new(Session::new()?.with_id(first.id()).with_resume(true));
    let cache = Arc::new(DirCache::new(executor.work_root()));

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(resumed, make_proc(), executor.clone(), cache);
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;
    in_tx.send(Value::Int(1));
    in_tx.poison();
    let second_values = drain(&out_rx);
    handle.join()?;

    assert_eq!(second_values, first_values);
    // no new work dir appeared:
    assert_eq!(count_work_dirs(executor.work_root()), 1);
    Ok(())
}

/// Fails the first `n` submissions with a retryable error, then delegates
/// to the real local executor.
struct FlakyExecutor {
    inner: LocalExecutor,
    remaining_failures: AtomicUsize,
}

impl Executor for FlakyExecutor {
    fn name(&self) -> &str {
        "flaky"
    }
    fn work_root(&self) -> &Path {
        self.inner.work_root()
    }
    fn stage_dir(&self) -> &Path {
        self.inner.stage_dir()
    }
    fn is_foreign(&self, path: &Path) -> bool {
        self.inner.is_foreign(path)
    }
    fn submit(&self, sub: &Submission) -> Result<i32> {
        if self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TaskError::Retryable("instance reclaimed".into()).into());
        }
        self.inner.submit(sub)
    }
}

#[test]
fn test_s2_retry_on_transient_uses_fresh_work_dir() -> Result<()> {
    let root = tempdir()?;
    let session = Arc::new(Session::new()?);
    let executor = Arc::new(FlakyExecutor {
        inner: LocalExecutor::new(root.path())?,
        remaining_failures: AtomicUsize::new(1),
    });

    let mut p = proc("flaky", "echo ok");
    p.add_input(InParam::value("a"));
    p.add_output(OutParam::stdout("out"));
    p.strategy = ErrorStrategy::Retry;
    p.max_retries = 2;

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(session, p, executor.clone(), Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;
    in_tx.send(Value::Int(1));
    in_tx.poison();
    let values = drain(&out_rx);
    let stats = handle.stats().clone();
    handle.join()?;

    assert_eq!(values.len(), 1);
    // the failed attempt claimed one dir, the retry a distinct one:
    assert_eq!(count_work_dirs(executor.work_root()), 2);
    assert_eq!(stats.submitted(), 1);
    assert_eq!(stats.completed(), 1);
    Ok(())
}

fn ordering_proc(fair: bool) -> ProcessDef {
    let mut p = proc("order", "sleep ${x}");
    p.add_input(InParam::value("x"));
    p.add_output(OutParam::value("tag", "${x}"));
    p.fair = fair;
    p.max_forks = 3;
    p
}

fn run_ordering(fair: bool) -> Result<Vec<String>> {
    let root = tempdir()?;
    // the three tuples must actually run in parallel for completion
    // order to differ from tuple order:
    let mut session = Session::new()?;
    session.pool_size = session.pool_size.max(3);
    let session = Arc::new(session);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(session, ordering_proc(fair), executor, Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;

    // tuple 1 sleeps 0.8s, tuple 2 1.2s, tuple 3 0.2s: completion order
    // is 3, 1, 2
    for x in ["0.8", "1.2", "0.2"] {
        in_tx.send(Value::from(x));
    }
    in_tx.poison();
    let values = drain(&out_rx);
    handle.join()?;
    Ok(strings(&values))
}

#[test]
fn test_s3_fair_emission_in_tuple_order() -> Result<()> {
    assert_eq!(run_ordering(true)?, vec!["0.8", "1.2", "0.2"]);
    Ok(())
}

#[test]
fn test_s3_unfair_emission_in_completion_order() -> Result<()> {
    assert_eq!(run_ordering(false)?, vec!["0.2", "0.8", "1.2"]);
    Ok(())
}

#[test]
fn test_s4_each_expansion() -> Result<()> {
    let root = tempdir()?;
    let session = Arc::new(Session::new()?);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let mut p = proc("pairs", "true");
    p.add_input(InParam::value("x"));
    p.add_input(InParam::each("y"));
    p.add_output(OutParam::value("pair", "${x}-${y}"));
    p.fair = true;

    let (x_tx, x_rx) = channel();
    let (y_tx, y_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(session, p, executor, Arc::new(NoCache));
    runner.add_input(x_rx);
    runner.add_input(y_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;

    y_tx.send(Value::List(vec![Value::Int(10), Value::Int(20)]));
    for x in ["a", "b", "c"] {
        x_tx.send(Value::from(x));
    }
    x_tx.poison();

    let values = drain(&out_rx);
    let stats = handle.stats().clone();
    handle.join()?;

    assert_eq!(
        strings(&values),
        vec!["a-10", "a-20", "b-10", "b-20", "c-10", "c-20"]
    );
    assert_eq!(stats.submitted(), 6);
    Ok(())
}

#[test]
fn test_s5_staged_name_collision_fails_before_submit() -> Result<()> {
    let root = tempdir()?;
    let session = Arc::new(Session::new()?);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let data = root.path().join("inputs");
    std::fs::create_dir_all(&data)?;
    std::fs::write(data.join("one.txt"), "1")?;
    std::fs::write(data.join("two.txt"), "2")?;

    let mut p = proc("clash", "cat data.txt");
    p.add_input(InParam::path("a").with_stage_pattern("data.txt"));
    p.add_input(InParam::path("b").with_stage_pattern("data.txt"));
    p.add_output(OutParam::stdout("out"));

    let (a_tx, a_rx) = channel();
    let (b_tx, b_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(session.clone(), p, executor.clone(), Arc::new(NoCache));
    runner.add_input(a_rx);
    runner.add_input(b_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;

    a_tx.send(Value::Path(data.join("one.txt")));
    b_tx.send(Value::Path(data.join("two.txt")));
    a_tx.poison();

    let values = drain(&out_rx);
    handle.join()?;

    assert!(values.is_empty(), "collision must suppress emission");
    assert!(session.aborted(), "unrecoverable errors abort the session");
    assert_eq!(count_work_dirs(executor.work_root()), 0);
    Ok(())
}

#[test]
fn test_s6_wildcard_staging_round_trip() -> Result<()> {
    let root = tempdir()?;
    let session = Arc::new(Session::new()?);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let data = root.path().join("inputs");
    std::fs::create_dir_all(&data)?;
    let mut inputs = Vec::new();
    for i in 0..12 {
        let path = data.join(format!("chunk{i}.dat"));
        std::fs::write(&path, format!("{i}"))?;
        inputs.push(Value::Path(path));
    }

    let mut p = proc("stage12", "true");
    p.add_input(InParam::path("files").with_stage_pattern("file_?.txt"));
    let mut out = OutParam::path("staged", "file_*.txt");
    out.include_inputs = true;
    p.add_output(out);

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(session, p, executor, Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;

    in_tx.send(Value::List(inputs));
    in_tx.poison();
    let values = drain(&out_rx);
    handle.join()?;

    assert_eq!(values.len(), 1);
    let Value::List(files) = &values[0] else {
        panic!("expected the full staged list");
    };
    let names: Vec<String> = files
        .iter()
        .map(|v| match v {
            Value::Path(p) => p.file_name().unwrap().to_str().unwrap().to_owned(),
            other => panic!("unexpected value {other:?}"),
        })
        .collect();
    let expected: Vec<String> = (1..=12).map(|n| format!("file_{n:02}.txt")).collect();
    assert_eq!(names, expected);
    Ok(())
}

#[test]
fn test_max_forks_bounds_in_flight() -> Result<()> {
    let root = tempdir()?;
    let session = Arc::new(Session::new()?);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let mut p = proc("bounded", "sleep 0.15");
    p.add_input(InParam::value("x"));
    p.add_output(OutParam::default_marker("done"));
    p.max_forks = 2;

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(session, p, executor, Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;
    let stats = handle.stats().clone();

    let sampler = std::thread::spawn(move || {
        let mut max_seen = 0;
        for _ in 0..100 {
            let in_flight = stats.in_flight();
            max_seen = max_seen.max(in_flight);
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        max_seen
    });

    for i in 0..6 {
        in_tx.send(Value::Int(i));
    }
    in_tx.poison();
    let values = drain(&out_rx);
    handle.join()?;
    let max_seen = sampler.join().unwrap();

    assert_eq!(values.len(), 6);
    assert!(max_seen <= 2, "in-flight exceeded max_forks: {max_seen}");
    Ok(())
}

#[test]
fn test_when_guard_skips_without_submission() -> Result<()> {
    let root = tempdir()?;
    let session = Arc::new(Session::new()?);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let mut p = proc("guarded", "echo ran");
    p.add_input(InParam::value("run"));
    p.add_output(OutParam::stdout("out"));
    p.when = Some(tern::Tmpl::new("${run}"));

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(session, p, executor.clone(), Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;

    in_tx.send(Value::Bool(true));
    in_tx.send(Value::Bool(false));
    in_tx.poison();
    let values = drain(&out_rx);
    let stats = handle.stats().clone();
    handle.join()?;

    // only the guarded-in tuple emitted, but both completed:
    assert_eq!(values.len(), 1);
    assert_eq!(stats.completed(), 2);
    assert_eq!(count_work_dirs(executor.work_root()), 1);
    Ok(())
}

#[test]
fn test_ignore_strategy_drops_failed_outputs() -> Result<()> {
    let root = tempdir()?;
    let session = Arc::new(Session::new()?);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let mut p = proc("partial", "exit ${code}");
    p.add_input(InParam::value("code"));
    p.add_output(OutParam::default_marker("done"));
    p.strategy = ErrorStrategy::Ignore;

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(session.clone(), p, executor, Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;

    in_tx.send(Value::Int(0));
    in_tx.send(Value::Int(1));
    in_tx.poison();
    let values = drain(&out_rx);
    let stats = handle.stats().clone();
    handle.join()?;

    assert_eq!(values.len(), 1);
    assert_eq!(stats.completed(), 2);
    assert!(!session.aborted());
    Ok(())
}

#[test]
fn test_env_and_cmd_eval_outputs() -> Result<()> {
    let root = tempdir()?;
    let session = Arc::new(Session::new()?);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let mut p = proc("captures", "export GREETING='hello world'");
    p.add_input(InParam::value("x"));
    p.add_output(OutParam::env("GREETING"));
    p.add_output(OutParam::cmd_eval("ANSWER", "echo 42"));

    let (in_tx, in_rx) = channel();
    let (greeting_tx, greeting_rx) = channel();
    let (answer_tx, answer_rx) = channel();
    let mut runner = TaskProcessor::new(session, p, executor, Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(greeting_tx);
    runner.add_output(answer_tx);
    let handle = runner.ignite()?;

    in_tx.send(Value::Int(1));
    in_tx.poison();
    let greetings = drain(&greeting_rx);
    let answers = drain(&answer_rx);
    handle.join()?;

    assert_eq!(strings(&greetings), vec!["hello world"]);
    assert_eq!(strings(&answers), vec!["42"]);
    Ok(())
}

#[test]
fn test_store_dir_skips_run_entirely() -> Result<()> {
    let root = tempdir()?;
    let session = Arc::new(Session::new()?);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let store = root.path().join("store");
    std::fs::create_dir_all(&store)?;
    std::fs::write(store.join("out.txt"), "persisted")?;

    // the command would fail loudly if it ever ran:
    let mut p = proc("stored", "exit 99");
    p.add_input(InParam::value("x"));
    p.add_output(OutParam::path("result", "out.txt"));
    p.store_dir = Some(store.clone());

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(session.clone(), p, executor.clone(), Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;

    in_tx.send(Value::Int(1));
    in_tx.poison();
    let values = drain(&out_rx);
    handle.join()?;

    assert_eq!(values.len(), 1);
    let Value::Path(path) = &values[0] else {
        panic!("expected a path");
    };
    assert!(path.starts_with(&store));
    assert!(!session.aborted());
    assert_eq!(count_work_dirs(executor.work_root()), 0);
    Ok(())
}

/// Marks one directory as foreign so staging routes it through the porter.
struct RemoteMarkingExecutor {
    inner: LocalExecutor,
    remote_root: PathBuf,
}

impl Executor for RemoteMarkingExecutor {
    fn name(&self) -> &str {
        "remote-marking"
    }
    fn work_root(&self) -> &Path {
        self.inner.work_root()
    }
    fn stage_dir(&self) -> &Path {
        self.inner.stage_dir()
    }
    fn is_foreign(&self, path: &Path) -> bool {
        path.starts_with(&self.remote_root)
    }
    fn submit(&self, sub: &Submission) -> Result<i32> {
        self.inner.submit(sub)
    }
}

#[test]
fn test_foreign_file_prefetched_through_porter() -> Result<()> {
    let root = tempdir()?;
    let session = Arc::new(Session::new()?);

    let remote_root = root.path().join("remote");
    std::fs::create_dir_all(&remote_root)?;
    std::fs::write(remote_root.join("payload.txt"), "fetched")?;

    let executor = Arc::new(RemoteMarkingExecutor {
        inner: LocalExecutor::new(root.path())?,
        remote_root: remote_root.clone(),
    });

    let mut p = proc("fetch", "cat payload.txt");
    p.add_input(InParam::path("data"));
    p.add_output(OutParam::stdout("out"));

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(session, p, executor.clone(), Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;

    in_tx.send(Value::Path(remote_root.join("payload.txt")));
    in_tx.poison();
    let values = drain(&out_rx);
    handle.join()?;

    assert_eq!(values.len(), 1);
    let Value::Path(out) = &values[0] else {
        panic!("expected stdout path");
    };
    assert_eq!(std::fs::read_to_string(out)?, "fetched");
    // the porter parked a copy under the stage dir:
    assert!(std::fs::read_dir(executor.stage_dir())?.count() > 0);
    Ok(())
}

/// Records array batch sizes while delegating to the local executor.
struct BatchRecordingExecutor {
    inner: LocalExecutor,
    batches: Mutex<Vec<usize>>,
}

impl Executor for BatchRecordingExecutor {
    fn name(&self) -> &str {
        "batch-recording"
    }
    fn work_root(&self) -> &Path {
        self.inner.work_root()
    }
    fn stage_dir(&self) -> &Path {
        self.inner.stage_dir()
    }
    fn is_foreign(&self, path: &Path) -> bool {
        self.inner.is_foreign(path)
    }
    fn submit(&self, sub: &Submission) -> Result<i32> {
        self.inner.submit(sub)
    }
    fn submit_array(&self, subs: &[Submission]) -> Result<Vec<i32>> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(subs.len());
        subs.iter().map(|s| self.inner.submit(s)).collect()
    }
}

#[test]
fn test_array_collector_batches_submissions() -> Result<()> {
    let root = tempdir()?;
    // a full batch needs both workers parked at once:
    let mut session = Session::new()?;
    session.pool_size = session.pool_size.max(2);
    let session = Arc::new(session);
    let executor = Arc::new(BatchRecordingExecutor {
        inner: LocalExecutor::new(root.path())?,
        batches: Mutex::new(Vec::new()),
    });

    let mut p = proc("arrayed", "true");
    p.add_input(InParam::value("x"));
    p.add_output(OutParam::default_marker("done"));
    p.array = 2;
    p.max_forks = 2;

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(session, p, executor.clone(), Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;

    for i in 0..4 {
        in_tx.send(Value::Int(i));
    }
    in_tx.poison();
    let values = drain(&out_rx);
    handle.join()?;

    assert_eq!(values.len(), 4);
    let batches = executor.batches.lock().unwrap().clone();
    assert_eq!(batches, vec![2, 2]);
    Ok(())
}

/// A cache whose entries carry a stored context, for lazy value outputs.
struct ContextCache {
    work_root: PathBuf,
    context: tern::TaskContext,
}

impl Cache for ContextCache {
    fn lookup(&self, fp: &tern::Fingerprint, proc: &ProcessDef) -> Option<CacheEntry> {
        let mut entry = DirCache::new(&self.work_root).lookup(fp, proc)?;
        entry.context = Some(self.context.clone());
        Some(entry)
    }
}

#[test]
fn test_cached_value_output_resolves_from_stored_context() -> Result<()> {
    let root = tempdir()?;
    let first = Arc::new(Session::new()?);
    let executor = Arc::new(LocalExecutor::new(root.path())?);

    let make_proc = || {
        let mut p = proc("lazy", "true");
        p.add_input(InParam::value("a"));
        p.add_output(OutParam::value("tag", "${a}-tagged"));
        p
    };

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner =
        TaskProcessor::new(first.clone(), make_proc(), executor.clone(), Arc::new(NoCache));
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;
    in_tx.send(Value::from("v1"));
    in_tx.poison();
    let first_values = drain(&out_rx);
    handle.join()?;
    assert_eq!(strings(&first_values), vec!["v1-tagged"]);

    // resume with a cache that replays the stored context:
    let mut stored = tern::TaskContext::default();
    stored.set("a", Value::from("v1"));
    let cache = Arc::new(ContextCache {
        work_root: executor.work_root().to_path_buf(),
        context: stored,
    });
    let resumed = Arc::new(Session::new()?.with_id(first.id()).with_resume(true));

    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    let mut runner = TaskProcessor::new(resumed, make_proc(), executor.clone(), cache);
    runner.add_input(in_rx);
    runner.add_output(out_tx);
    let handle = runner.ignite()?;
    in_tx.send(Value::from("v1"));
    in_tx.poison();
    let second_values = drain(&out_rx);
    handle.join()?;

    assert_eq!(strings(&second_values), vec!["v1-tagged"]);
    assert_eq!(count_work_dirs(executor.work_root()), 1);
    Ok(())
}

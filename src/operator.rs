//! The per-process dataflow operator: reads one message per input port,
//! assembles tuples, fans each-params out over their elements, and drives
//! the per-tuple pipeline (materialize → stage → fingerprint →
//! cache/submit → collect → emit) on a bounded worker group.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use colored::Colorize;

use process::{
    ErrorAction, InKind, InParamId, InPort, Message, OutKind, OutPort, ProcessDef, Task,
    TaskStart, Value,
};

use crate::array::ArrayCollector;
use crate::cache::{self, Cache};
use crate::collect;
use crate::diag::{self, TaskFault, TipProvider};
use crate::error::{classify, Severity, TaskError};
use crate::exec::{self, Executor, Submission};
use crate::fingerprint;
use crate::fs::script::EnvCapture;
use crate::fs::{script, Fs};
use crate::materialize;
use crate::porter::{CopyPorter, FilePorter};
use crate::sequencer::{Emission, Emitter, Sequencer};
use crate::session::Session;
use crate::staging;
use crate::state::{self, AgentHandle, ProcStats, StateAgent};
use crate::strategy;
use crate::submit::{self, Claim};

/// Builder for one process's operator. Wire up ports, then `ignite`.
pub struct TaskProcessor {
    session: Arc<Session>,
    proc: ProcessDef,
    executor: Arc<dyn Executor>,
    cache: Arc<dyn Cache>,
    porter: Arc<dyn FilePorter>,
    tip: Option<Arc<dyn TipProvider>>,
    in_ports: Vec<InPort>,
    out_ports: Vec<OutPort>,
}

impl TaskProcessor {
    pub fn new(
        session: Arc<Session>,
        proc: ProcessDef,
        executor: Arc<dyn Executor>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            session,
            proc,
            executor,
            cache,
            porter: Arc::new(CopyPorter),
            tip: None,
            in_ports: Vec::new(),
            out_ports: Vec::new(),
        }
    }

    pub fn with_porter(mut self, porter: Arc<dyn FilePorter>) -> Self {
        self.porter = porter;
        self
    }

    pub fn with_tip(mut self, tip: Arc<dyn TipProvider>) -> Self {
        self.tip = Some(tip);
        self
    }

    /// Attach the channel feeding the next declared input param.
    pub fn add_input(&mut self, port: InPort) {
        self.in_ports.push(port);
    }

    /// Attach the channel fed by the next declared output param.
    pub fn add_output(&mut self, port: OutPort) {
        self.out_ports.push(port);
    }

    /// Start the operator: spawns the state agent, the worker group, and
    /// the intake thread. The process runs until its inputs close and its
    /// in-flight count drains, then poisons its outputs and deregisters.
    pub fn ignite(self) -> Result<ProcessHandle> {
        let Self {
            session,
            proc,
            executor,
            cache,
            porter,
            tip,
            in_ports,
            out_ports,
        } = self;

        if in_ports.len() != proc.inputs.len() {
            return Err(anyhow!(
                "process `{}` declares {} inputs but {} ports are attached",
                proc.name,
                proc.inputs.len(),
                in_ports.len()
            ));
        }
        if out_ports.len() != proc.outputs.len() {
            return Err(anyhow!(
                "process `{}` declares {} outputs but {} ports are attached",
                proc.name,
                proc.outputs.len(),
                out_ports.len()
            ));
        }
        let workers_n = match proc.max_forks {
            0 => session.pool_size,
            m => m.min(session.pool_size),
        }
        .max(1);
        if proc.array > workers_n {
            // a batch that can never fill would park its workers forever
            return Err(TaskError::ArrayExceedsForks {
                array: proc.array,
                max_forks: workers_n,
            }
            .into());
        }

        let name = proc.name.clone();
        let n_ports = proc.inputs.len();
        session.register();

        let stats = Arc::new(ProcStats::default());
        let emitter = Arc::new(Mutex::new(Emitter::new(out_ports)));
        let terminal_session = session.clone();
        let (agent, agent_handle) = state::spawn(n_ports, stats.clone(), emitter.clone(), {
            let name = name.clone();
            move || {
                log::debug!("process `{name}` terminated");
                terminal_session.deregister();
            }
        });

        let mut fs = Fs::new();
        fs.allow(executor.work_root());
        fs.allow(executor.stage_dir());
        fs.allow(session.staging_dir());

        let gate = Gate::new(proc.max_forks);
        let array = (proc.array > 0)
            .then(|| ArrayCollector::new(proc.array, executor.clone(), stats.clone()));
        let sequencer = Sequencer::new(proc.fair);

        let shared = Arc::new(Shared {
            session,
            proc,
            executor,
            cache,
            porter,
            tip,
            fs,
            agent,
            emitter,
            sequencer,
            array,
            gate,
            proc_errors: AtomicU32::new(0),
        });

        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut workers = Vec::with_capacity(workers_n);
        for i in 0..workers_n {
            let sh = shared.clone();
            let rx = job_rx.clone();
            let worker = thread::Builder::new()
                .name(format!("{name}-worker-{i}"))
                .spawn(move || worker_loop(sh, rx))
                .context("spawning worker thread")?;
            workers.push(worker);
        }

        let intake = thread::Builder::new()
            .name(format!("{name}-intake"))
            .spawn(move || intake_loop(shared, in_ports, job_tx))
            .context("spawning intake thread")?;

        Ok(ProcessHandle {
            intake,
            workers,
            agent: agent_handle,
            stats,
        })
    }
}

/// Running operator; join to wait for clean termination.
pub struct ProcessHandle {
    intake: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    agent: AgentHandle,
    stats: Arc<ProcStats>,
}

impl ProcessHandle {
    pub fn stats(&self) -> &Arc<ProcStats> {
        &self.stats
    }

    pub fn join(self) -> Result<()> {
        self.intake
            .join()
            .map_err(|_| anyhow!("intake thread panicked"))?;
        for worker in self.workers {
            worker.join().map_err(|_| anyhow!("worker thread panicked"))?;
        }
        self.agent.join();
        Ok(())
    }
}

struct Shared {
    session: Arc<Session>,
    proc: ProcessDef,
    executor: Arc<dyn Executor>,
    cache: Arc<dyn Cache>,
    porter: Arc<dyn FilePorter>,
    tip: Option<Arc<dyn TipProvider>>,
    fs: Fs,
    agent: StateAgent,
    emitter: Arc<Mutex<Emitter>>,
    sequencer: Sequencer,
    array: Option<ArrayCollector>,
    gate: Gate,
    proc_errors: AtomicU32,
}

struct Job {
    start: TaskStart,
    bindings: Vec<(InParamId, Value)>,
}

// INTAKE ///////////////////////////////

/// Tuple intake runs on a single thread so tuple-index assignment is
/// serialized: indexes are allocated strictly in arrival order.
fn intake_loop(sh: Arc<Shared>, ports: Vec<InPort>, job_tx: Sender<Job>) {
    let n_ports = ports.len();
    let mut latched: Vec<Option<Value>> = (0..n_ports).map(|_| None).collect();
    let has_queue = sh.proc.inputs.iter().any(|p| !p.singleton);
    let mut next_tuple: u64 = 0;

    'intake: loop {
        if sh.session.aborted() || sh.session.finishing() {
            break;
        }

        // one message per open port, singletons latched on first read:
        let mut bindings = Vec::with_capacity(n_ports);
        for (i, (pid, param)) in sh.proc.inputs.iter_with_ids().enumerate() {
            let value = if param.singleton {
                match &latched[i] {
                    Some(v) => v.clone(),
                    None => match ports[i].recv() {
                        Message::Value(v) => {
                            latched[i] = Some(v.clone());
                            v
                        }
                        Message::Poison => {
                            sh.agent.poison(i);
                            break 'intake;
                        }
                    },
                }
            } else {
                match ports[i].recv() {
                    Message::Value(v) => v,
                    Message::Poison => {
                        sh.agent.poison(i);
                        break 'intake;
                    }
                }
            };
            bindings.push((pid, value));
        }

        for combo in each_combinations(&sh.proc, bindings) {
            // the gate is what keeps submitted - completed <= max_forks:
            sh.gate.acquire();
            if sh.session.aborted() || sh.session.finishing() {
                sh.gate.release();
                break 'intake;
            }
            let start = sh.session.next_task(next_tuple);
            next_tuple += 1;
            sh.agent.inc_submitted();
            if job_tx.send(Job { start, bindings: combo }).is_err() {
                break 'intake;
            }
        }

        if !has_queue {
            // every port is a singleton: exactly one tuple, then done
            break;
        }
    }

    // no more submissions from here on:
    sh.agent.close();
    if let Some(array) = &sh.array {
        array.close();
    }
    // dropping the sender lets the workers drain and exit
}

/// Expand each-params into the cartesian product of their elements,
/// later params iterating fastest.
fn each_combinations(
    proc: &ProcessDef,
    bindings: Vec<(InParamId, Value)>,
) -> Vec<Vec<(InParamId, Value)>> {
    let each_positions: Vec<usize> = bindings
        .iter()
        .enumerate()
        .filter(|(_, (pid, _))| proc.inputs.get(*pid).kind == InKind::Each)
        .map(|(pos, _)| pos)
        .collect();
    if each_positions.is_empty() {
        return vec![bindings];
    }

    let mut combos = vec![bindings];
    for pos in each_positions {
        let mut expanded = Vec::with_capacity(combos.len() * 2);
        for combo in combos {
            for element in combo[pos].1.elements().to_vec() {
                let mut next = combo.clone();
                next[pos].1 = element;
                expanded.push(next);
            }
        }
        combos = expanded;
    }
    combos
}

// WORKERS //////////////////////////////

fn worker_loop(sh: Arc<Shared>, rx: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let rx = rx.lock().unwrap_or_else(|e| e.into_inner());
            rx.recv()
        };
        match job {
            Ok(job) => run_tuple(&sh, job),
            Err(_) => break, // channel closed, intake is done
        }
    }
}

/// The full per-tuple pipeline, including the failure/retry loop. Always
/// finalizes: emits (or advances) the sequencer slot, increments the
/// completion count, and releases the fork gate.
fn run_tuple(sh: &Shared, job: Job) {
    let mut task = Task::new(job.start, sh.proc.id, job.bindings);
    let mut use_cache = sh.session.resume && sh.proc.cache;
    let mut submit_retries: u32 = 0;

    let emission: Option<Emission> = loop {
        if sh.session.aborted() {
            break None;
        }
        match run_attempt(sh, &mut task, use_cache) {
            Ok(true) => break Some(task.outputs.clone()),
            Ok(false) => {
                // guard said no: bind default markers only
                let emission = sh
                    .proc
                    .outputs
                    .iter_with_ids()
                    .map(|(pid, p)| (pid, (p.kind == OutKind::Default).then(|| Value::Bool(true))))
                    .collect();
                break Some(emission);
            }
            Err(e) => {
                let severity = classify(&e);
                if severity == Severity::SubmitTimeout {
                    submit_retries += 1;
                }
                let action = strategy::resolve_action(
                    &sh.proc,
                    &task,
                    severity,
                    sh.proc_errors.load(Ordering::SeqCst),
                    submit_retries,
                );
                if severity == Severity::ProcessFail {
                    sh.proc_errors.fetch_add(1, Ordering::SeqCst);
                }
                task.error_action = Some(action);

                match action {
                    ErrorAction::Retry => {
                        log::info!(
                            "[{}] task {} failed ({e:#}); retrying as attempt {}",
                            sh.proc.name,
                            task.id,
                            task.attempt + 1
                        );
                        task = if severity == Severity::SubmitTimeout {
                            task.resubmit_clone()
                        } else {
                            task.retry_clone()
                        };
                        // retries never reuse prior results:
                        use_cache = false;
                        continue;
                    }
                    ErrorAction::Ignore => {
                        log::warn!(
                            "[{}] task {} failed ({e:#}); ignored by error strategy",
                            sh.proc.name,
                            task.id
                        );
                        break None;
                    }
                    ErrorAction::Terminate | ErrorAction::Finish => {
                        let fault = TaskFault::build(&sh.proc, &task, &e);
                        diag::report(&sh.session, &fault, sh.tip.as_deref());
                        if action == ErrorAction::Terminate {
                            sh.session.abort();
                        } else {
                            sh.session.request_finish();
                        }
                        break None;
                    }
                }
            }
        }
    };

    if let Err(e) = sh
        .sequencer
        .emit(&sh.emitter, task.tuple_index, emission)
    {
        log::error!(
            "[{}] emission failed for tuple {}: {e:#}",
            sh.proc.name,
            task.tuple_index
        );
    }
    sh.agent.inc_completed();
    if let Some(array) = &sh.array {
        array.maybe_flush();
    }
    sh.gate.release();
}

/// One attempt at one task. Ok(false) means the guard skipped it;
/// Ok(true) means outputs are collected (fresh run, cache hit, or store
/// hit); errors go to the strategy engine.
fn run_attempt(sh: &Shared, task: &mut Task, use_cache: bool) -> Result<bool> {
    if !materialize::prepare(&sh.proc, task)? {
        log::debug!("[{}] task {} skipped by when guard", sh.proc.name, task.id);
        return Ok(false);
    }

    staging::stage_files(
        &sh.proc,
        task,
        sh.executor.as_ref(),
        sh.porter.as_ref(),
        &sh.fs,
        sh.session.staging_dir(),
    )?;
    task.command = materialize::resolve_command(&sh.proc, task, sh.session.stub_run)?;

    if cache::check_stored(&sh.proc, task)? {
        return Ok(true);
    }

    let base = fingerprint::task_fingerprint(
        sh.session.id(),
        &sh.proc,
        task,
        sh.executor.bin_dir(),
        sh.session.stub_run,
    )?;
    task.fingerprint = Some(base);

    let claim = submit::claim(
        &sh.proc,
        task,
        sh.executor.as_ref(),
        sh.cache.as_ref(),
        sh.session.locks(),
        &sh.fs,
        use_cache,
    )?;
    let fp = task
        .fingerprint
        .ok_or_else(|| anyhow!("claim left the task without a fingerprint"))?;
    if claim == Claim::Cached {
        eprintln!(
            "{} [{}] {} ({})",
            "CACHED".cyan(),
            fp.short(),
            sh.proc.name,
            task.id
        );
        return Ok(true);
    }

    let sub = build_submission(sh, task)?;
    eprintln!(
        "{} [{}] {} ({})",
        "SUBMIT".green(),
        fp.short(),
        sh.proc.name,
        task.id
    );

    let exit = match (&sh.array, task.attempt) {
        // retries bypass the array collector and submit directly:
        (Some(array), 1) => array
            .push(sub)
            .recv()
            .map_err(|_| anyhow!("array batch flusher disappeared"))??,
        _ => sh.executor.submit(&sub)?,
    };
    task.exit = Some(exit);

    if exit != 0 {
        task.failed = true;
        return Err(TaskError::Failed(exit).into());
    }

    let work_dir = task
        .work_dir
        .clone()
        .ok_or_else(|| anyhow!("task ran without a work dir"))?;
    collect::collect_outputs(&sh.proc, task, &work_dir)?;
    Ok(true)
}

fn build_submission(sh: &Shared, task: &Task) -> Result<Submission> {
    let env = exec::assemble_env(&sh.proc, task, sh.executor.bin_dir());

    let mut captures = Vec::new();
    for param in sh.proc.outputs.iter() {
        match param.kind {
            OutKind::Env => captures.push(EnvCapture {
                name: param.name.clone(),
                command: None,
            }),
            OutKind::CmdEval => {
                let command = param
                    .expr
                    .as_ref()
                    .ok_or_else(|| TaskError::MissingValue(param.name.clone()))?
                    .resolve(&task.context)?;
                captures.push(EnvCapture {
                    name: param.name.clone(),
                    command: Some(command),
                });
            }
            _ => {}
        }
    }

    let work_dir = task
        .work_dir
        .clone()
        .ok_or_else(|| anyhow!("submission built without a work dir"))?;
    Ok(Submission {
        label: format!("{} ({})", sh.proc.name, task.id),
        work_dir,
        script: script::assemble(&task.command, &sh.proc.shell, &env, &captures),
        shell: sh.proc.shell.clone(),
        stdin: task.stdin.clone(),
        staged: task.staged.clone(),
    })
}

// FORK GATE ////////////////////////////

/// Counting gate bounding in-flight tasks; capacity 0 means unlimited.
struct Gate {
    cap: usize,
    count: Mutex<usize>,
    freed: Condvar,
}

impl Gate {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            count: Mutex::new(0),
            freed: Condvar::new(),
        }
    }

    fn acquire(&self) {
        if self.cap == 0 {
            return;
        }
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        while *count >= self.cap {
            count = self.freed.wait(count).unwrap_or_else(|e| e.into_inner());
        }
        *count += 1;
    }

    fn release(&self) {
        if self.cap == 0 {
            return;
        }
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count -= 1;
        self.freed.notify_one();
    }
}

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use process::{
    FileHolder, FileSource, Fingerprint, HashMode, InKind, ProcessDef, Task, Value,
};

/// Incremental fingerprint over an ordered key list.
///
/// The top-level key order is significant; values declared as bags go
/// through [`push_bag`], which sorts member digests so permutations of the
/// same set produce the same fingerprint. Stable across runs on the same
/// machine for a given `HashMode`.
pub struct FingerprintBuilder {
    sha: Sha256,
    mode: HashMode,
}

impl FingerprintBuilder {
    pub fn new(mode: HashMode) -> Self {
        Self { sha: Sha256::new(), mode }
    }

    pub fn push_str(&mut self, s: &str) {
        // length-prefix so ("ab","c") and ("a","bc") differ:
        self.sha.update((s.len() as u64).to_le_bytes());
        self.sha.update(s.as_bytes());
    }

    pub fn push_u64(&mut self, v: u64) {
        self.sha.update(v.to_le_bytes());
    }

    /// A path key. The mode decides how much of the file's identity
    /// contributes: Standard = name + size + mtime, Deep = content,
    /// Lenient = name + size.
    pub fn push_path(&mut self, path: &Path) -> Result<()> {
        match self.mode {
            HashMode::Deep => {
                let bytes = fs::read(path)
                    .with_context(|| format!("while hashing content of {}", path.display()))?;
                self.sha.update((bytes.len() as u64).to_le_bytes());
                self.sha.update(&bytes);
            }
            HashMode::Standard | HashMode::Lenient => {
                self.push_str(&path.display().to_string());
                let meta = fs::metadata(path)
                    .with_context(|| format!("while hashing metadata of {}", path.display()))?;
                self.push_u64(meta.len());
                if self.mode == HashMode::Standard {
                    let mtime = meta
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                        .map(|d| d.as_secs())
                        .unwrap_or(0);
                    self.push_u64(mtime);
                }
            }
        }
        Ok(())
    }

    /// A tagged value key; dispatches on the variant.
    pub fn push_value(&mut self, value: &Value) -> Result<()> {
        self.push_str(value.type_name());
        match value {
            Value::Path(p) => self.push_path(p)?,
            Value::Str(s) => self.push_str(s),
            Value::Int(i) => self.push_u64(*i as u64),
            Value::Float(f) => self.push_u64(f.to_bits()),
            Value::Bool(b) => self.push_u64(*b as u64),
            Value::List(items) => {
                self.push_u64(items.len() as u64);
                for item in items {
                    self.push_value(item)?;
                }
            }
            Value::Map(pairs) => {
                self.push_u64(pairs.len() as u64);
                for (k, v) in pairs {
                    self.push_str(k);
                    self.push_value(v)?;
                }
            }
            Value::File(h) => self.push_holder(h)?,
        }
        Ok(())
    }

    /// One staged file: the name it stages under plus its source identity.
    /// Synthetic holders hash their literal content, never the random temp
    /// path they were written to.
    pub fn push_holder(&mut self, holder: &FileHolder) -> Result<()> {
        self.push_str(&holder.stage_name);
        match &holder.source {
            FileSource::Local(p) | FileSource::Foreign { remote: p, .. } => self.push_path(p)?,
            FileSource::Synthetic { literal, .. } => self.push_str(literal),
        }
        Ok(())
    }

    /// An unordered file set: member digests are computed independently,
    /// sorted, then folded in, so the fingerprint is stable across
    /// permutations of the same members.
    pub fn push_bag(&mut self, holders: &[FileHolder]) -> Result<()> {
        let mut digests = Vec::with_capacity(holders.len());
        for holder in holders {
            let mut member = FingerprintBuilder::new(self.mode);
            member.push_holder(holder)?;
            digests.push(member.finish().0);
        }
        digests.sort_unstable();
        self.push_u64(digests.len() as u64);
        for d in digests {
            self.sha.update(d);
        }
        Ok(())
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(self.sha.finalize().into())
    }
}

/// Fold an attempt counter into an existing fingerprint so every retry
/// lands in its own work directory.
pub fn rehash(fp: &Fingerprint, attempt: u32) -> Fingerprint {
    let mut sha = Sha256::new();
    sha.update(fp.0);
    sha.update((attempt as u64).to_le_bytes());
    Fingerprint(sha.finalize().into())
}

/// The base fingerprint of a task: session, process identity, command
/// source, every input binding, referenced globals, `bin/` scripts the
/// command invokes by name, and environment labels.
pub fn task_fingerprint(
    session_id: &str,
    proc: &ProcessDef,
    task: &Task,
    bin_dir: Option<&Path>,
    stub_run: bool,
) -> Result<Fingerprint> {
    let mut fp = FingerprintBuilder::new(proc.hash_mode);
    fp.push_str(session_id);
    fp.push_str(&proc.name);

    let command_src = match (&proc.stub, stub_run) {
        (Some(stub), true) => stub.raw(),
        _ => proc.command.raw(),
    };
    fp.push_str(command_src);
    if stub_run {
        fp.push_str("stub-run");
    }

    // input bindings, in declaration order; file params hash as bags of
    // their staged holders:
    let mut input_names = Vec::with_capacity(task.inputs.len());
    for (pid, value) in &task.inputs {
        let param = proc.inputs.get(*pid);
        input_names.push(param.name.as_str());
        fp.push_str(&param.name);
        match param.kind {
            InKind::Path | InKind::Stdin => {
                let holders: Vec<FileHolder> = match task.context.get(&param.name) {
                    Some(Value::File(h)) => vec![h.clone()],
                    Some(Value::List(items)) => items
                        .iter()
                        .filter_map(|v| match v {
                            Value::File(h) => Some(h.clone()),
                            _ => None,
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                fp.push_bag(&holders)?;
            }
            _ => fp.push_value(value)?,
        }
    }

    // globals the command references beyond its inputs:
    for var in proc.command.vars() {
        if input_names.contains(&var) {
            continue;
        }
        if let Some(val) = task.context.get(var) {
            fp.push_str(var);
            fp.push_value(val)?;
        }
    }

    // project scripts invoked by name:
    if let Some(bin) = bin_dir {
        if bin.is_dir() {
            let mut scripts: Vec<_> = fs::read_dir(bin)
                .with_context(|| format!("while listing bin dir {}", bin.display()))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .collect();
            scripts.sort();
            for script in scripts {
                if let Some(name) = script.file_name().and_then(|n| n.to_str()) {
                    if command_src.contains(name) {
                        fp.push_path(&script)?;
                    }
                }
            }
        }
    }

    if let Some(container) = &proc.container {
        fp.push_str(container);
    }
    for label in &proc.env_labels {
        fp.push_str(label);
    }

    Ok(fp.finish())
}

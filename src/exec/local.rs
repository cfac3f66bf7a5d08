use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{anyhow, Context, Result};

use crate::fs::{paths, Fs};

use super::{Executor, Submission};

/// Runs tasks as child processes on the local machine.
///
/// Stages inputs into the work dir by symlink, writes `.command.sh`, runs
/// it under the submission's shell with stdout/stderr teed into
/// `.command.out`/`.command.err`, and records the exit status in
/// `.exitcode` so a later resume can trust the directory.
pub struct LocalExecutor {
    work_root: PathBuf,
    stage_dir: PathBuf,
    bin_dir: Option<PathBuf>,
    fs: Fs,
}

impl LocalExecutor {
    pub fn new(root: &Path) -> Result<Self> {
        let work_root = root.join("work");
        let stage_dir = root.join("stage");
        let mut fs = Fs::new();
        fs.allow(root);
        fs.create_dir(&work_root).context("creating work root")?;
        fs.create_dir(&stage_dir).context("creating stage dir")?;
        Ok(Self { work_root, stage_dir, bin_dir: None, fs })
    }

    pub fn with_bin_dir(mut self, bin_dir: &Path) -> Self {
        self.bin_dir = Some(bin_dir.to_path_buf());
        self
    }

    fn stage_inputs(&self, sub: &Submission) -> Result<()> {
        for holder in &sub.staged {
            let target = sub.work_dir.join(&holder.stage_name);
            if self.fs.exists(&target) {
                continue;
            }
            if let Some(parent) = target.parent() {
                self.fs.create_dir(parent)?;
            }
            // symlink to an absolute source so the link survives the cwd
            // change into the work dir:
            let source = holder.local_path();
            let source = source
                .canonicalize()
                .unwrap_or_else(|_| source.to_path_buf());
            self.fs
                .symlink(&source, &target)
                .with_context(|| format!("while staging input `{}`", holder.stage_name))?;
        }
        Ok(())
    }
}

impl Executor for LocalExecutor {
    fn name(&self) -> &str {
        "local"
    }

    fn work_root(&self) -> &Path {
        &self.work_root
    }

    fn stage_dir(&self) -> &Path {
        &self.stage_dir
    }

    fn bin_dir(&self) -> Option<&Path> {
        self.bin_dir.as_deref()
    }

    fn is_foreign(&self, _path: &Path) -> bool {
        // everything reachable from this machine is local by definition:
        false
    }

    fn submit(&self, sub: &Submission) -> Result<i32> {
        let dir = &sub.work_dir;
        self.stage_inputs(sub)?;
        self.fs
            .write_file(paths::command_sh(dir), &sub.script)
            .context("while writing the task script")?;

        let mut log_file = self
            .fs
            .create_file(paths::command_log(dir))
            .context("while creating the wrapper log")?;
        writeln!(log_file, "[{}] launching {}", self.name(), sub.label)?;

        let stdin = match &sub.stdin {
            Some(name) => Stdio::from(
                File::open(dir.join(name))
                    .with_context(|| format!("while opening stdin input `{name}`"))?,
            ),
            None => Stdio::null(),
        };

        let mut child = Command::new("/usr/bin/env")
            .arg(&sub.shell)
            .arg(paths::COMMAND_SH)
            .current_dir(dir)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("while spawning {}", sub.label))?;

        let child_out = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("cannot attach to child stdout"))?;
        let child_err = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("cannot attach to child stderr"))?;
        let out_file = self.fs.create_file(paths::command_out(dir))?;
        let err_file = self.fs.create_file(paths::command_err(dir))?;

        let thread_out = thread::spawn(move || tee(child_out, out_file));
        let thread_err = thread::spawn(move || tee(child_err, err_file));
        thread_out
            .join()
            .map_err(|_| anyhow!("stdout tee thread panicked"))??;
        thread_err
            .join()
            .map_err(|_| anyhow!("stderr tee thread panicked"))??;

        let status = child.wait().context("while waiting on the task process")?;
        let exit = status.code().unwrap_or(-1);

        self.fs
            .write_file(paths::exitcode(dir), &format!("{exit}\n"))
            .context("while writing the exitcode file")?;
        writeln!(log_file, "[{}] {} finished with status {exit}", self.name(), sub.label)?;

        Ok(exit)
    }
}

fn tee<R: io::Read>(mut stream: R, mut file: File) -> io::Result<()> {
    io::copy(&mut stream, &mut file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn submission(dir: &Path, script: &str) -> Submission {
        Submission {
            label: "test (1)".to_owned(),
            work_dir: dir.to_path_buf(),
            script: script.to_owned(),
            shell: "bash".to_owned(),
            stdin: None,
            staged: Vec::new(),
        }
    }

    #[test]
    fn test_submit_writes_control_files() -> Result<()> {
        let root = tempdir()?;
        let exec = LocalExecutor::new(root.path())?;
        let work_dir = exec.work_root().join("aa").join("test");
        exec.fs.create_dir(&work_dir)?;

        let exit = exec.submit(&submission(
            &work_dir,
            "#!/usr/bin/env bash\necho to-out\necho to-err >&2\n",
        ))?;

        assert_eq!(exit, 0);
        assert_eq!(paths::read_exitcode(&work_dir), Some(0));
        assert_eq!(
            std::fs::read_to_string(paths::command_out(&work_dir))?,
            "to-out\n"
        );
        assert_eq!(
            std::fs::read_to_string(paths::command_err(&work_dir))?,
            "to-err\n"
        );
        Ok(())
    }

    #[test]
    fn test_submit_reports_failure_status() -> Result<()> {
        let root = tempdir()?;
        let exec = LocalExecutor::new(root.path())?;
        let work_dir = exec.work_root().join("aa").join("fail");
        exec.fs.create_dir(&work_dir)?;

        let exit = exec.submit(&submission(&work_dir, "#!/usr/bin/env bash\nexit 3\n"))?;
        assert_eq!(exit, 3);
        assert_eq!(paths::read_exitcode(&work_dir), Some(3));
        Ok(())
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;
use process::{ProcessDef, Task};

use crate::fs::paths;
use crate::session::Session;

/// How many trailing lines of stdout/stderr make it into the report.
const TAIL_LINES: usize = 50;

/// Everything needed to print the multi-line failure block for one task.
#[derive(Debug)]
pub struct TaskFault {
    pub process: String,
    pub cause: String,
    pub command: String,
    pub exit: Option<i32>,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
    /// Wrapper log tail, shown when stderr is empty but the task failed.
    pub log_tail: Vec<String>,
    pub work_dir: Option<PathBuf>,
    pub container: Option<String>,
}

/// Hook for attaching a trailing `Tip:` line to failure reports.
pub trait TipProvider: Send + Sync {
    fn tip(&self, fault: &TaskFault) -> Option<String>;
}

impl TaskFault {
    pub fn build(proc: &ProcessDef, task: &Task, err: &anyhow::Error) -> Self {
        let (stdout_tail, stderr_tail, log_tail) = match &task.work_dir {
            Some(dir) => {
                let err_tail = tail_lines(&paths::command_err(dir), TAIL_LINES);
                // the wrapper log is only interesting when stderr has nothing:
                let log_tail = if err_tail.is_empty() && task.exit.map_or(true, |e| e != 0) {
                    tail_lines(&paths::command_log(dir), TAIL_LINES)
                } else {
                    Vec::new()
                };
                (
                    tail_lines(&paths::command_out(dir), TAIL_LINES),
                    err_tail,
                    log_tail,
                )
            }
            None => (Vec::new(), Vec::new(), Vec::new()),
        };

        Self {
            process: proc.name.clone(),
            cause: format!("{:#}", err),
            command: task.command.clone(),
            exit: task.exit,
            stdout_tail,
            stderr_tail,
            log_tail,
            work_dir: task.work_dir.clone(),
            container: proc.container.clone(),
        }
    }

    /// The full multi-line diagnostic block.
    pub fn render(&self, tip: Option<&str>) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str(&format!(
            "{} '{}'\n\n",
            "Error executing process >".red().bold(),
            self.process.red().bold()
        ));
        out.push_str(&format!("{}\n  {}\n\n", "Caused by:".bold(), self.cause));

        if !self.command.is_empty() {
            out.push_str(&format!("{}\n\n", "Command executed:".bold()));
            for line in self.command.lines() {
                out.push_str(&format!("  {}\n", line));
            }
            out.push('\n');
        }

        let exit = match self.exit {
            Some(e) => e.to_string(),
            None => "-".to_owned(),
        };
        out.push_str(&format!("{} {}\n\n", "Command exit status:".bold(), exit));

        push_section(&mut out, "Command output:", &self.stdout_tail);
        push_section(&mut out, "Command error:", &self.stderr_tail);
        push_section(&mut out, "Command wrapper:", &self.log_tail);

        if let Some(dir) = &self.work_dir {
            out.push_str(&format!("{} {}\n", "Work dir:".bold(), dir.display()));
        }
        if let Some(container) = &self.container {
            out.push_str(&format!("{} {}\n", "Container:".bold(), container));
        }
        if let Some(tip) = tip {
            out.push_str(&format!("\n{} {}\n", "Tip:".cyan(), tip));
        }
        out
    }
}

fn push_section(out: &mut String, header: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    out.push_str(&format!("{}\n\n", header.bold()));
    for line in lines {
        out.push_str(&format!("  {}\n", line));
    }
    out.push('\n');
}

/// Print a fault for the user. The first one across the session gets the
/// full block; later ones get a single suppressed line so a wide failure
/// doesn't flood the log.
pub fn report(session: &Session, fault: &TaskFault, tip: Option<&dyn TipProvider>) {
    if session.first_error() {
        let tip_line = tip.and_then(|t| t.tip(fault));
        eprintln!("{}", fault.render(tip_line.as_deref()));
    } else {
        eprintln!(
            "{} '{}' {}",
            "Error executing process >".red(),
            fault.process,
            "(details suppressed, see first error)".dimmed()
        );
    }
}

/// Last `n` lines of a file, or nothing if it can't be read.
fn tail_lines(path: &Path, n: usize) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let lines: Vec<&str> = text.lines().collect();
            let start = lines.len().saturating_sub(n);
            lines[start..].iter().map(|s| (*s).to_owned()).collect()
        }
        Err(_) => Vec::new(),
    }
}

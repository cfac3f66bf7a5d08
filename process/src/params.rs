use crate::Tmpl;

/// Inclusive bounds on how many files an input or output may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: u32,
    pub max: u32,
}

impl Arity {
    pub fn exactly(n: u32) -> Self {
        Self { min: n, max: n }
    }

    pub fn at_least(n: u32) -> Self {
        Self { min: n, max: u32::MAX }
    }

    pub fn any() -> Self {
        Self { min: 0, max: u32::MAX }
    }

    /// Both bounds are inclusive.
    pub fn contains(&self, n: usize) -> bool {
        n >= self.min as usize && n <= self.max as usize
    }
}

impl Default for Arity {
    fn default() -> Self {
        Self::any()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InKind {
    /// Plain value, bound into the context under the param name.
    Val,
    /// One or more files, staged into the work dir.
    Path,
    /// Exported into the task environment.
    Env,
    /// Staged like a file, then fed to the command on stdin.
    Stdin,
    /// Iterates a collection: one task per element per tuple.
    Each,
}

/// A declared process input. Index is its dense 0-based position in the
/// declaration list.
#[derive(Debug, Clone)]
pub struct InParam {
    pub name: String,
    pub kind: InKind,
    pub arity: Arity,
    /// Staging name template for file params; may reference context vars
    /// bound earlier, so it resolves lazily. None stages under the
    /// source file's own name.
    pub stage_pattern: Option<Tmpl>,
    /// True for params fed by a single-value channel: the first message is
    /// latched and reused for every subsequent tuple.
    pub singleton: bool,
}

impl InParam {
    pub fn value(name: impl Into<String>) -> Self {
        Self::new(name, InKind::Val)
    }

    pub fn path(name: impl Into<String>) -> Self {
        Self::new(name, InKind::Path)
    }

    pub fn env(name: impl Into<String>) -> Self {
        Self::new(name, InKind::Env)
    }

    pub fn stdin(name: impl Into<String>) -> Self {
        Self::new(name, InKind::Stdin)
    }

    pub fn each(name: impl Into<String>) -> Self {
        let mut p = Self::new(name, InKind::Each);
        // an each list arrives once and is iterated for every tuple:
        p.singleton = true;
        p
    }

    fn new(name: impl Into<String>, kind: InKind) -> Self {
        Self {
            name: name.into(),
            kind,
            arity: Arity::any(),
            stage_pattern: None,
            singleton: false,
        }
    }

    pub fn with_stage_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.stage_pattern = Some(Tmpl::new(pattern));
        self
    }

    pub fn with_arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }

    pub fn as_singleton(mut self) -> Self {
        self.singleton = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutKind {
    /// The task's captured stdout.
    Stdout,
    /// Work-dir files matched by the declared patterns.
    Path,
    /// A lazy expression resolved against the task context.
    Val,
    /// An environment variable captured from `.command.env`.
    Env,
    /// A command run after the task whose output is captured; a non-zero
    /// capture exit fails the task.
    CmdEval,
    /// Bound to `true` on completion; used by processes with no declared
    /// outputs so downstream can still sequence on them.
    Default,
}

/// What a file output pattern is allowed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    File,
    Dir,
    Any,
}

/// A declared process output. Index is its dense 0-based position, and is
/// also the output port it emits on.
#[derive(Debug, Clone)]
pub struct OutParam {
    pub name: String,
    pub kind: OutKind,
    /// Glob patterns or literal relative paths for `Path` outputs.
    pub patterns: Vec<Tmpl>,
    /// Lazy expression for `Val` outputs; the capture command for `CmdEval`.
    pub expr: Option<Tmpl>,
    /// Missing matches bind a suppressed slot instead of failing the task.
    pub optional: bool,
    /// When false, matches that are really staged inputs are dropped.
    pub include_inputs: bool,
    /// Explicit match type; None infers `File` for `**` patterns, else `Any`.
    pub path_type: Option<PathType>,
    pub hidden: bool,
    pub follow_links: bool,
    pub max_depth: Option<usize>,
    pub arity: Arity,
}

impl OutParam {
    pub fn stdout(name: impl Into<String>) -> Self {
        Self::new(name, OutKind::Stdout)
    }

    pub fn path(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        let mut p = Self::new(name, OutKind::Path);
        p.patterns.push(Tmpl::new(pattern));
        p
    }

    pub fn value(name: impl Into<String>, expr: impl Into<String>) -> Self {
        let mut p = Self::new(name, OutKind::Val);
        p.expr = Some(Tmpl::new(expr));
        p
    }

    pub fn env(name: impl Into<String>) -> Self {
        Self::new(name, OutKind::Env)
    }

    pub fn cmd_eval(name: impl Into<String>, command: impl Into<String>) -> Self {
        let mut p = Self::new(name, OutKind::CmdEval);
        p.expr = Some(Tmpl::new(command));
        p
    }

    pub fn default_marker(name: impl Into<String>) -> Self {
        Self::new(name, OutKind::Default)
    }

    fn new(name: impl Into<String>, kind: OutKind) -> Self {
        Self {
            name: name.into(),
            kind,
            patterns: Vec::new(),
            expr: None,
            optional: false,
            include_inputs: false,
            path_type: None,
            hidden: false,
            follow_links: false,
            max_depth: None,
            arity: Arity::any(),
        }
    }

    pub fn as_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }
}

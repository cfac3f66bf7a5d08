/// Typed ids for processor collections
mod ids;
pub use ids::{InParamId, OutParamId, ProcessId, TaskId};

/// Tagged runtime values flowing through channels
mod value;
pub use value::{FileHolder, FileSource, Value};

/// Text templates with `${var}` placeholders and syntactic capture
mod tmpl;
pub use tmpl::{Error as TmplError, Tmpl};

/// Mutable evaluation context for one task
mod context;
pub use context::TaskContext;

/// Input and output parameter declarations
mod params;
pub use params::{Arity, InKind, InParam, OutKind, OutParam, PathType};

/// Immutable per-process configuration
mod descriptor;
pub use descriptor::{ErrorStrategy, HashMode, ProcessDef};

/// A single materialized run of a process
mod task;
pub use task::{ErrorAction, Fingerprint, Task, TaskStart};

/// Messages and ports connecting processes
mod channel;
pub use channel::{channel, InPort, Message, OutPort};

use std::path::{Path, PathBuf};

/// A runtime value bound to a task input or output.
///
/// Input messages arrive as one of these; normalization code dispatches on
/// the tag instead of downcasting.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Path(PathBuf),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
    /// A staged input file; commands see its stage name.
    File(FileHolder),
}

impl Value {
    /// The form a command template or environment variable sees.
    /// Staged files render as their stage name so scripts address them
    /// relative to the work dir.
    pub fn render(&self) -> String {
        match self {
            Self::Path(p) => p.display().to_string(),
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::render).collect();
                parts.join(" ")
            }
            Self::Map(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k, v.render()))
                    .collect();
                parts.join(" ")
            }
            Self::File(h) => h.stage_name.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Path(_) => "path",
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::File(_) => "file",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Str(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// View this value as a collection: a list yields its elements,
    /// anything else is a one-element collection of itself.
    pub fn elements(&self) -> &[Value] {
        match self {
            Self::List(items) => items,
            _ => std::slice::from_ref(self),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

/// Where a staged file came from.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// A path the executor can read directly.
    Local(PathBuf),
    /// A path on a filesystem the executor cannot reach; `local` is the
    /// target the file porter downloads it to.
    Foreign { remote: PathBuf, local: PathBuf },
    /// A non-path input written out to a temp file; the literal text is
    /// kept so fingerprints see content, not the random temp path.
    Synthetic { literal: String, local: PathBuf },
}

/// A file input after staging: the original source plus the name it is
/// materialized under inside the task work dir.
///
/// Sets of holders have bag semantics: fingerprinting sorts member digests
/// so permutations of the same set hash identically.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHolder {
    pub source: FileSource,
    pub stage_name: String,
}

impl FileHolder {
    /// The path the executor reads the content from when materializing the
    /// work dir (the porter target for foreign files).
    pub fn local_path(&self) -> &Path {
        match &self.source {
            FileSource::Local(p) => p,
            FileSource::Foreign { local, .. } => local,
            FileSource::Synthetic { local, .. } => local,
        }
    }

    /// The base name staging falls back to when a param declares no
    /// staging pattern.
    pub fn source_name(&self) -> String {
        match &self.source {
            FileSource::Local(p) | FileSource::Foreign { remote: p, .. } => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            FileSource::Synthetic { local, .. } => local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(Value::Int(3).render(), "3");
        assert_eq!(Value::Bool(true).render(), "true");
        assert_eq!(
            Value::List(vec![Value::from("a"), Value::Int(1)]).render(),
            "a 1"
        );
    }

    #[test]
    fn test_elements_lifts_scalars() {
        let v = Value::Int(7);
        assert_eq!(v.elements().len(), 1);
        let l = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(l.elements().len(), 2);
    }
}

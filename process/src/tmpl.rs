use crate::TaskContext;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No variable named \"{0}\" is bound in the task context")]
    UnboundVar(String),
    #[error("Unterminated ${{...}} placeholder in template")]
    Unterminated,
}

/// A text template with `${name}` placeholders.
///
/// Placeholders resolve against the task context; a bare `$NAME` without
/// braces passes through untouched, so shell variables in command bodies
/// are left for the shell. The variables a template references can be
/// enumerated without resolving it, which is how referenced context values
/// make it into the task fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Tmpl {
    raw: String,
}

impl Tmpl {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Names of all placeholders, in first-appearance order, deduped.
    pub fn vars(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        let mut rest = self.raw.as_str();
        while let Some(start) = rest.find("${") {
            rest = &rest[start + 2..];
            if let Some(end) = rest.find('}') {
                let name = &rest[..end];
                if !seen.contains(&name) {
                    seen.push(name);
                }
                rest = &rest[end + 1..];
            } else {
                break;
            }
        }
        seen
    }

    /// Substitute every placeholder with its context binding.
    pub fn resolve(&self, ctx: &TaskContext) -> Result<String, Error> {
        let mut out = String::with_capacity(self.raw.len());
        let mut rest = self.raw.as_str();
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            rest = &rest[start + 2..];
            let end = rest.find('}').ok_or(Error::Unterminated)?;
            let name = &rest[..end];
            let val = ctx
                .get(name)
                .ok_or_else(|| Error::UnboundVar(name.to_owned()))?;
            out.push_str(&val.render());
            rest = &rest[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl From<&str> for Tmpl {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

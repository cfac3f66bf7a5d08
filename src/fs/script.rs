//! Builds the contents of the `.command.sh` file: shebang, environment
//! exports, the resolved command body, and the capture epilogue that
//! writes `.command.env`.

use super::paths::COMMAND_ENV;

/// One declared environment capture appended after the command body.
#[derive(Debug, Clone)]
pub struct EnvCapture {
    pub name: String,
    /// None captures a variable exported by the script; Some runs the
    /// command and captures its output together with its exit status.
    pub command: Option<String>,
}

/// Utility for building a task script.
/// Note that it modifies a String reference held internally; read that
/// String to get the script's contents.
pub struct ScriptBuilder<'a> {
    strbuf: &'a mut String,
}

impl<'a> ScriptBuilder<'a> {
    pub fn new(strbuf: &'a mut String) -> Self {
        strbuf.clear();
        Self { strbuf }
    }
}

impl ScriptBuilder<'_> {
    /// Generated shebang: `#!/usr/bin/env <shell>`, or `#!<shell>` when
    /// the shell is an absolute path.
    pub fn write_generated_shebang(&mut self, shell: &str) {
        if shell.starts_with('/') {
            self.strbuf.push_str("#!");
        } else {
            self.strbuf.push_str("#!/usr/bin/env ");
        }
        self.strbuf.push_str(shell);
        self.strbuf.push('\n');
    }

    /// A shebang line the user script already carried.
    pub fn write_user_shebang(&mut self, line: &str) {
        self.strbuf.push_str(line);
        self.strbuf.push('\n');
    }

    /// A single exported variable. The value is double-quoted but left
    /// unescaped so `$PATH`-style references expand in the shell.
    pub fn write_export_line(&mut self, name: &str, value: &str) {
        self.strbuf.push_str("export ");
        self.strbuf.push_str(name);
        self.strbuf.push_str("=\"");
        self.strbuf.push_str(value);
        self.strbuf.push_str("\"\n");
    }

    /// The command body, with a guaranteed trailing newline.
    pub fn write_body(&mut self, body: &str) {
        self.strbuf.push_str(body);
        self.strbuf.push('\n');
    }

    /// Capture block writing `.command.env` in the same shell, so the
    /// script's exported variables are visible to the captures.
    pub fn write_captures(&mut self, captures: &[EnvCapture]) {
        if captures.is_empty() {
            return;
        }
        self.strbuf.push_str("\n# capture declared environment outputs:\n{\n");
        for cap in captures {
            match &cap.command {
                None => {
                    self.strbuf.push_str(&format!(
                        "echo \"{name}=${{{name}:-}}\"\necho \"/{name}/\"\n",
                        name = cap.name
                    ));
                }
                Some(cmd) => {
                    self.strbuf.push_str(&format!(
                        "__cap_out=$({cmd}); __cap_status=$?\n\
                         echo \"{name}=$__cap_out\"\necho \"/{name}/=exit:$__cap_status\"\n",
                        name = cap.name
                    ));
                }
            }
        }
        self.strbuf.push_str(&format!("}} > {}\n", COMMAND_ENV));
    }
}

/// Assemble a complete task script. The body is trimmed of surrounding
/// whitespace; whatever shebang it carried stays on the first line, with
/// environment exports placed after it. Bodies without a `#!` in the
/// first two bytes get one generated from the shell name.
pub fn assemble(
    body: &str,
    shell: &str,
    env: &[(String, String)],
    captures: &[EnvCapture],
) -> String {
    let trimmed = body.trim();
    let (user_shebang, rest) = if trimmed.starts_with("#!") {
        match trimmed.split_once('\n') {
            Some((first, tail)) => (Some(first), tail),
            None => (Some(trimmed), ""),
        }
    } else {
        (None, trimmed)
    };

    let mut buf = String::with_capacity(body.len() + 256);
    let mut script = ScriptBuilder::new(&mut buf);
    match user_shebang {
        Some(line) => script.write_user_shebang(line),
        None => script.write_generated_shebang(shell),
    }
    for (name, value) in env {
        script.write_export_line(name, value);
    }
    script.write_body(rest);
    script.write_captures(captures);
    buf
}

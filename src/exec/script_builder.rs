/// Utility for building the contents of a shell or PBS script.
/// Note that it modifies a String reference held internally;
/// read that String to get the script's contents.
#[derive(Debug)]
pub struct ScriptBuilder<'a> {
    strbuf: &'a mut String,
}

impl<'a> ScriptBuilder<'a> {
    pub fn new(strbuf: &'a mut String) -> Self {
        Self { strbuf }
    }
}

impl ScriptBuilder<'_> {
    /// shebang line
    pub fn write_prefix(&mut self) {
        self.strbuf.clear();
        self.strbuf.push_str("#!/usr/bin/env bash\n");
    }

    /// a `#PBS` directive line
    pub fn write_directive(&mut self, directive: &str) {
        self.strbuf.push_str("#PBS ");
        self.strbuf.push_str(directive);
        self.strbuf.push('\n');
    }

    pub fn write_line(&mut self, line: &str) {
        self.strbuf.push_str(line);
        self.strbuf.push('\n');
    }

    pub fn write_lines<S: AsRef<str>>(&mut self, lines: &[S]) {
        for line in lines {
            self.write_line(line.as_ref());
        }
    }

    /// cd into a literal directory; the path is quoted if needed
    pub fn write_cd(&mut self, dir: &str) {
        self.strbuf.push_str("cd ");
        push_quoted(self.strbuf, dir);
        self.strbuf.push('\n');
    }

    /// cd into a directory named by a shell variable, e.g. `PBS_O_WORKDIR`
    pub fn write_cd_var(&mut self, var: &str) {
        self.strbuf.push_str("cd \"${");
        self.strbuf.push_str(var);
        self.strbuf.push_str("}\"\n");
    }

    /// run another script in the background
    pub fn write_background(&mut self, shell: &str, script: &str) {
        self.strbuf.push_str(shell);
        self.strbuf.push(' ');
        push_quoted(self.strbuf, script);
        self.strbuf.push_str(" &\n");
    }

    pub fn write_wait(&mut self) {
        self.strbuf.push_str("wait\n");
    }
}

/// Append `word` to `buf`, single-quoted unless it is made only of
/// characters the shell leaves alone.
fn push_quoted(buf: &mut String, word: &str) {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%,=".contains(c));
    if plain {
        buf.push_str(word);
        return;
    }
    buf.push('\'');
    for c in word.chars() {
        if c == '\'' {
            buf.push_str("'\\''");
        } else {
            buf.push(c);
        }
    }
    buf.push('\'');
}

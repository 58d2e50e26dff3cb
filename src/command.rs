//! Command construction for sandboxed execution.
//!
//! Every block runs as `timeout <secs> <interpreter> <path>`. The
//! `timeout` wrapper is the only thing that kills a runaway program;
//! the session layer never races it with a timer of its own.

/// Exit status GNU `timeout` reports when it had to kill the child.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Marker appended to a block's output when it hit the timeout.
pub const TIMEOUT_MSG: &str = "Timeout";

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_POWERSHELL: &str = "pwsh";

const SHELL_FAMILY: &[&str] = &["bash", "shell", "sh"];
const POWERSHELL_FAMILY: &[&str] = &["pwsh", "powershell", "ps1"];

#[derive(Debug, Clone)]
pub struct CommandBuilder {
    timeout_secs: u64,
    powershell: String,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS, DEFAULT_POWERSHELL)
    }
}

impl CommandBuilder {
    pub fn new(timeout_secs: u64, powershell: &str) -> Self {
        Self {
            timeout_secs,
            powershell: powershell.to_string(),
        }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Interpreter binary for a normalized language, if there is one.
    ///
    /// Markup languages (`html`, `css`) have none even when enabled.
    pub fn interpreter(&self, language: &str) -> Option<&str> {
        match language {
            "python" => Some("python"),
            "bash" => Some("bash"),
            "sh" | "shell" => Some("sh"),
            "pwsh" | "powershell" | "ps1" => Some(&self.powershell),
            "javascript" => Some("node"),
            _ => None,
        }
    }

    /// Builds `["timeout", secs, interpreter, path]`.
    pub fn build(&self, language: &str, path: &str) -> Option<Vec<String>> {
        let interpreter = self.interpreter(language)?;
        Some(vec![
            "timeout".to_string(),
            self.timeout_secs.to_string(),
            interpreter.to_string(),
            path.to_string(),
        ])
    }

    /// Same as [`build`](Self::build), joined into one shell-safe string.
    pub fn build_shell(&self, language: &str, path: &str) -> Option<String> {
        self.build(language, path).map(|argv| to_shell_string(&argv))
    }
}

/// Quotes each argument so the remote shell sees exactly `argv`.
pub fn to_shell_string(argv: &[String]) -> String {
    shell_words::join(argv)
}

/// Adds `-qqq` to `pip install` lines so installer chatter does not
/// drown the program's own output.
///
/// Python snippets use the notebook form (`!pip install`, `! pip install`),
/// shell snippets the plain one. Other languages are returned unchanged.
pub fn silence_pip(code: &str, language: &str) -> String {
    let prefixes: &[&str] = if language == "python" {
        &["!pip install", "! pip install"]
    } else if SHELL_FAMILY.contains(&language) || POWERSHELL_FAMILY.contains(&language) {
        &["pip install"]
    } else {
        return code.to_string();
    };

    code.split('\n')
        .map(|line| {
            match prefixes.iter().find(|p| line.starts_with(*p)) {
                Some(prefix) if !line.contains("-qqq") => {
                    format!("{prefix} -qqq{}", &line[prefix.len()..])
                }
                _ => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

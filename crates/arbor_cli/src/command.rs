//! Console command syntax.
//!
//! A command is a letter, optionally written with a leading dash (`s` or
//! `-s`), optionally followed by `x` to exit once it has run (`sx`,
//! `-sx`). Arguments are separated by whitespace; the XML argument of `s`
//! is the rest of the line.

use std::fmt;

/// What a console line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `s <path> <xml>`
    SendXml {
        /// Destination path
        path: String,
        /// Node as XML text
        xml: String,
    },
    /// `f <path> <file>`: XML file
    SendFile {
        /// Destination path
        path: String,
        /// File to read
        file: String,
    },
    /// `b <path> <file>`: binary node file
    SendBinary {
        /// Destination path
        path: String,
        /// File to read
        file: String,
    },
    /// `m`: toggle saving received updates as XML
    ToggleXml,
    /// `n`: toggle saving received updates as binary
    ToggleBinary,
    /// `e <file>`: run every line of a file
    Execute(String),
    /// `q`
    Quit,
    /// `h`
    Help,
}

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// What to do
    pub action: Action,
    /// Leave the console afterwards
    pub exit_after: bool,
}

/// Console syntax errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The command letter is not known
    #[error("unknown command '{0}', type h for help")]
    Unknown(String),

    /// A required argument is absent
    #[error("'{command}' needs {argument}")]
    MissingArgument {
        /// Command as typed
        command: String,
        /// Name of the missing argument
        argument: &'static str,
    },
}

/// Help text printed by `h`
pub const HELP: &str = "\
commands (prefix with '-' optionally, append 'x' to exit afterwards):
  s <path> <xml>    send a node given as XML text
  f <path> <file>   send a node read from an XML file
  b <path> <file>   send a node read from a binary file
  m                 toggle saving received updates as XML
  n                 toggle saving received updates as binary
  e <file>          execute commands from a file
  q                 quit
  h                 this help";

/// Parse one line. Blank lines and `#` comments yield `None`.
///
/// # Errors
///
/// Returns `Unknown` for an unrecognised command and `MissingArgument`
/// when an argument is absent
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = split_word(line);
    let name = word.strip_prefix('-').unwrap_or(word);
    let (letter, exit_after) = match name.len() {
        1 => (name, false),
        2 if name.ends_with('x') => (&name[..1], true),
        _ => return Err(CommandError::Unknown(word.to_string())),
    };

    let missing = |argument| CommandError::MissingArgument {
        command: word.to_string(),
        argument,
    };
    let action = match letter {
        "s" => {
            let (path, xml) = split_word(rest);
            if path.is_empty() {
                return Err(missing("a path"));
            }
            if xml.is_empty() {
                return Err(missing("XML text"));
            }
            Action::SendXml {
                path: path.to_string(),
                xml: xml.to_string(),
            }
        }
        "f" | "b" => {
            let (path, rest) = split_word(rest);
            let (file, _) = split_word(rest);
            if path.is_empty() {
                return Err(missing("a path"));
            }
            if file.is_empty() {
                return Err(missing("a file name"));
            }
            let (path, file) = (path.to_string(), file.to_string());
            if letter == "f" {
                Action::SendFile { path, file }
            } else {
                Action::SendBinary { path, file }
            }
        }
        "e" => {
            let (file, _) = split_word(rest);
            if file.is_empty() {
                return Err(missing("a file name"));
            }
            Action::Execute(file.to_string())
        }
        "m" => Action::ToggleXml,
        "n" => Action::ToggleBinary,
        "q" => Action::Quit,
        "h" => Action::Help,
        _ => return Err(CommandError::Unknown(word.to_string())),
    };

    Ok(Some(Command { action, exit_after }))
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], text[end..].trim()),
        None => (text, ""),
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SendXml { path, .. } => write!(f, "send {}", path),
            Action::SendFile { path, file } => write!(f, "send {} from {}", path, file),
            Action::SendBinary { path, file } => write!(f, "send {} from binary {}", path, file),
            Action::ToggleXml => f.write_str("toggle xml saving"),
            Action::ToggleBinary => f.write_str("toggle binary saving"),
            Action::Execute(file) => write!(f, "execute {}", file),
            Action::Quit => f.write_str("quit"),
            Action::Help => f.write_str("help"),
        }
    }
}

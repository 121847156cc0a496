//! Parsing of REPL input lines.

/// One parsed line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text to send to the current session.
    Send(String),
    /// Create (or switch to) a session; a fresh id is generated when omitted.
    New(Option<String>),
    /// Switch to an existing session.
    Open(String),
    /// Print the session list, newest first.
    List,
    /// Delete a session; defaults to the current one.
    Delete(Option<String>),
    /// Empty the current session's message list.
    Clear,
    /// Print the model catalog, optionally filtered.
    Models(Option<String>),
    /// Select a model for subsequent sends.
    Model(String),
    /// Replace the API credential.
    Key(String),
    /// Validate and persist the current credential pairing.
    Save,
    /// Print the current session and credential state.
    Status,
    Help,
    Quit,
    /// A known command used with the wrong arguments.
    Usage(&'static str),
    /// A slash command that does not exist.
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  /new [id]         start a new session (or switch to an existing id)
  /open <id>        switch to an existing session
  /list             list sessions, newest first
  /delete [id]      delete a session (default: current)
  /clear            remove all messages from the current session
  /models [query]   list available models
  /model <id>       select a model
  /key <credential> set the API key
  /save             validate and persist key + model
  /status           show current session and credential state
  /help             show this help
  /quit             exit
Anything else is sent to the current session.";

/// Parses one input line. Returns `None` for blank input.
pub fn parse_command(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('/') {
        return Some(Command::Send(trimmed.to_string()));
    }

    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (trimmed, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    let command = match name {
        "/new" => Command::New(arg),
        "/open" => match arg {
            Some(id) => Command::Open(id),
            None => Command::Usage("Usage: /open <id>"),
        },
        "/list" => Command::List,
        "/delete" => Command::Delete(arg),
        "/clear" => Command::Clear,
        "/models" => Command::Models(arg),
        "/model" => match arg {
            Some(id) => Command::Model(id),
            None => Command::Usage("Usage: /model <id>"),
        },
        "/key" => match arg {
            Some(key) if !key.chars().any(char::is_whitespace) => Command::Key(key),
            Some(_) => Command::Usage("API key must not contain whitespace"),
            None => Command::Usage("Usage: /key <credential>"),
        },
        "/save" => Command::Save,
        "/status" => Command::Status,
        "/help" | "/?" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("   \t"), None);
    }

    #[test]
    fn plain_text_is_sent_trimmed() {
        assert_eq!(
            parse_command("  hello there  "),
            Some(Command::Send("hello there".to_string()))
        );
    }

    #[test]
    fn optional_arguments() {
        assert_eq!(parse_command("/new"), Some(Command::New(None)));
        assert_eq!(
            parse_command("/new  work "),
            Some(Command::New(Some("work".to_string())))
        );
        assert_eq!(parse_command("/delete"), Some(Command::Delete(None)));
        assert_eq!(
            parse_command("/models gpt 4"),
            Some(Command::Models(Some("gpt 4".to_string())))
        );
    }

    #[test]
    fn required_arguments_report_usage() {
        assert_eq!(
            parse_command("/open"),
            Some(Command::Usage("Usage: /open <id>"))
        );
        assert_eq!(
            parse_command("/model"),
            Some(Command::Usage("Usage: /model <id>"))
        );
        assert_eq!(
            parse_command("/key"),
            Some(Command::Usage("Usage: /key <credential>"))
        );
        assert_eq!(
            parse_command("/model openai/gpt-4o"),
            Some(Command::Model("openai/gpt-4o".to_string()))
        );
    }

    #[test]
    fn key_rejects_embedded_whitespace() {
        assert_eq!(
            parse_command("/key sk abc"),
            Some(Command::Usage("API key must not contain whitespace"))
        );
        assert_eq!(
            parse_command("/key sk-or-1"),
            Some(Command::Key("sk-or-1".to_string()))
        );
    }

    #[test]
    fn aliases_and_unknown_commands() {
        assert_eq!(parse_command("/exit"), Some(Command::Quit));
        assert_eq!(parse_command("/?"), Some(Command::Help));
        assert_eq!(
            parse_command("/frobnicate now"),
            Some(Command::Unknown("/frobnicate".to_string()))
        );
    }
}

//! Chat command parsing and dispatch context

use crate::models::{format_timestamp, ChatMessage};

/// Chat-command configuration for one client.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Prefix that marks a chat message as a command, e.g. `"!"`.
    pub prefix: String,
}

impl CommandOptions {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

/// Timestamp of the triggering chat message, raw and human-readable.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTime {
    pub raw: i64,
    pub formatted: String,
}

/// Everything a command handler needs about its invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandContext {
    pub sender_steam_id: u64,
    pub sender_name: String,
    pub time: CommandTime,
    /// The matched command name, without the prefix.
    pub command: String,
    /// Remaining whitespace-tokenized, quote-aware arguments.
    pub args: Vec<String>,
}

impl CommandContext {
    /// Build a context from the chat message that carried the command.
    pub fn from_message(message: &ChatMessage, command: String, args: Vec<String>) -> Self {
        Self {
            sender_steam_id: message.steam_id,
            sender_name: message.name.clone(),
            time: CommandTime {
                raw: message.time,
                formatted: format_timestamp(message.time),
            },
            command,
            args,
        }
    }
}

/// Shell-style tokenization: whitespace-separated words with single- and
/// double-quote grouping and backslash escapes outside single quotes.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            Some('"') => match c {
                '"' => quote = None,
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                _ => current.push(c),
            },
            Some(_) => unreachable!("quote is only ever set to ' or \""),
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                        in_word = true;
                    }
                }
                c if c.is_whitespace() => {
                    if in_word {
                        tokens.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if in_word {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_plain_words() {
        assert_eq!(tokenize("!time"), vec!["!time"]);
        assert_eq!(tokenize("!time now"), vec!["!time", "now"]);
        assert_eq!(tokenize("  spaced   out  "), vec!["spaced", "out"]);
    }

    #[test]
    fn test_tokenize_quoted_groups() {
        assert_eq!(
            tokenize(r#"!say "hello world" done"#),
            vec!["!say", "hello world", "done"]
        );
        assert_eq!(tokenize("!say 'a b'"), vec!["!say", "a b"]);
        assert_eq!(tokenize(r#"!say "it's fine""#), vec!["!say", "it's fine"]);
    }

    #[test]
    fn test_tokenize_escapes() {
        assert_eq!(tokenize(r"!say hello\ world"), vec!["!say", "hello world"]);
        assert_eq!(tokenize(r#"!say "quote \" inside""#), vec!["!say", "quote \" inside"]);
    }

    #[test]
    fn test_tokenize_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_context_from_message() {
        let message = ChatMessage {
            steam_id: 76561197960287930,
            name: "survivor".to_string(),
            message: "!time now".to_string(),
            color: "#ffffff".to_string(),
            time: 0,
        };

        let ctx = CommandContext::from_message(&message, "time".to_string(), vec!["now".to_string()]);
        assert_eq!(ctx.sender_name, "survivor");
        assert_eq!(ctx.command, "time");
        assert_eq!(ctx.args, vec!["now"]);
        assert_eq!(ctx.time.formatted, "1970-01-01 00:00:00");
    }
}

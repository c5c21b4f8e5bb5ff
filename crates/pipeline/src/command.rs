//! Command classification for inbound message text.

use bixbot_config::CommandConfig;

/// Parsed intent of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    GenerateImage {
        prompt: String,
        is_random_request: bool,
    },
    Chat {
        prompt: String,
    },
    /// A known command without its required argument.
    Empty,
    /// Not our command language at all. Silent, not an error.
    Unrecognized,
}

/// Classify raw message text. Deterministic; rules apply in priority order.
#[must_use]
pub fn parse(text: &str, commands: &CommandConfig) -> Command {
    // exact help command, or the bare image command
    if text == commands.help || text == commands.image {
        return Command::Help;
    }

    if let Some(remainder) = strip_prefix_word(text, &commands.image) {
        if remainder.is_empty() {
            return Command::Empty;
        }
        let lowered = remainder.to_lowercase();
        let is_random_request = commands
            .random_aliases
            .iter()
            .any(|alias| alias.to_lowercase() == lowered);
        return Command::GenerateImage {
            prompt: remainder.to_string(),
            is_random_request,
        };
    }

    if let Some(remainder) = strip_prefix_word(text, &commands.chat) {
        if remainder.is_empty() {
            return Command::Empty;
        }
        return Command::Chat {
            prompt: remainder.to_string(),
        };
    }

    Command::Unrecognized
}

/// Strip `prefix` only when it is a whole word: followed by whitespace or
/// the end of the text. `/generate x` must not match `/gen`.
fn strip_prefix_word<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}

//! Rename command grammar.
//!
//! ```text
//! command  := "/rename" ["@" botname] (ws args)?
//! caption  := "rename:" args
//! args     := (flag | word)*
//! flag     := "--thumb" | "--as-video"
//! ```
//!
//! Keywords are case-sensitive. Words are joined with single spaces to form
//! the target file name.

use std::sync::OnceLock;

use regex::Regex;

use crate::{errors::ParseError, formatting::escape_html};

pub const RENAME_COMMAND: &str = "rename";
pub const CAPTION_PREFIX: &str = "rename:";
pub const FLAG_THUMB: &str = "--thumb";
pub const FLAG_AS_VIDEO: &str = "--as-video";

/// Max file name length accepted by common filesystems.
pub const MAX_NAME_BYTES: usize = 255;

/// Telegram HTML.
pub const USAGE: &str = "Usage: <code>/rename new_name.ext [--thumb] [--as-video]</code> (reply to the file)\n\
Or send a file with caption: <code>rename: new_name.ext [--thumb] [--as-video]</code>";

/// A `/command` as typed by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotCommand {
    pub name: String,
    pub mention: Option<String>,
    pub args: String,
}

/// Split `/cmd@botname args...`. Returns `None` for non-command text.
pub fn parse_command(text: &str) -> Option<BotCommand> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?s)^/([A-Za-z0-9_]+)(?:@([A-Za-z0-9_]+))?(?:\s+(.*))?$")
            .expect("valid regex")
    });

    let caps = re.captures(text.trim())?;
    Some(BotCommand {
        name: caps.get(1)?.as_str().to_string(),
        mention: caps.get(2).map(|m| m.as_str().to_string()),
        args: caps
            .get(3)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
    })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenameFlags {
    pub keep_thumb: bool,
    pub as_video: bool,
}

/// How the rename was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// `/rename` sent as a reply to a message with a file.
    ReplyCommand,
    /// A file uploaded with a `rename:` caption.
    Caption,
}

/// The parsed intent of one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameSpec {
    pub file_name: String,
    pub flags: RenameFlags,
    pub trigger: Trigger,
    /// Caption text left after removing the directive (caption trigger only).
    pub remaining_caption: Option<String>,
}

/// Parse the arguments of a `/rename` command.
pub fn parse_rename_args(args: &str) -> Result<RenameSpec, ParseError> {
    let (file_name, flags) = parse_args(args)?;
    Ok(RenameSpec {
        file_name,
        flags,
        trigger: Trigger::ReplyCommand,
        remaining_caption: None,
    })
}

pub fn is_rename_caption(caption: &str) -> bool {
    caption.trim_start().starts_with(CAPTION_PREFIX)
}

/// Caption to put on a renamed file. Leading `rename:` directive lines are
/// dropped so the sent file cannot start another rename.
pub fn carried_caption(caption: Option<&str>) -> Option<String> {
    let mut rest = caption?.trim();
    while is_rename_caption(rest) {
        rest = rest.split_once('\n').map(|(_, tail)| tail.trim())?;
    }
    Some(rest).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Parse a `rename: ...` caption. The directive occupies the first line; any
/// following lines are kept as the new caption.
pub fn parse_caption(caption: &str) -> Result<RenameSpec, ParseError> {
    let trimmed = caption.trim_start();
    let Some(rest) = trimmed.strip_prefix(CAPTION_PREFIX) else {
        return Err(ParseError::NotACommand);
    };

    let (directive, remaining) = match rest.split_once('\n') {
        Some((line, tail)) => (line, Some(tail.trim()).filter(|s| !s.is_empty())),
        None => (rest, None),
    };

    let (file_name, flags) = parse_args(directive)?;
    Ok(RenameSpec {
        file_name,
        flags,
        trigger: Trigger::Caption,
        remaining_caption: remaining.map(str::to_string),
    })
}

fn parse_args(args: &str) -> Result<(String, RenameFlags), ParseError> {
    let mut flags = RenameFlags::default();
    let mut words: Vec<&str> = Vec::new();

    for token in args.split_whitespace() {
        match token {
            FLAG_THUMB => flags.keep_thumb = true,
            FLAG_AS_VIDEO => flags.as_video = true,
            t if t.starts_with("--") => return Err(ParseError::UnknownFlag(t.to_string())),
            t => words.push(t),
        }
    }

    let file_name = validate_file_name(&words.join(" "))?;
    Ok((file_name, flags))
}

/// Validate a target name and neutralize path separators.
pub fn validate_file_name(raw: &str) -> Result<String, ParseError> {
    let name = sanitize_file_name(raw.trim());
    if name.is_empty() {
        return Err(ParseError::MissingName);
    }
    if name.chars().any(char::is_control) {
        return Err(ParseError::InvalidName(name.escape_debug().to_string()));
    }
    if name == "." || name == ".." {
        return Err(ParseError::InvalidName(name));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(ParseError::NameTooLong(name.len()));
    }

    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Ok(name),
        _ => Err(ParseError::MissingExtension(name)),
    }
}

/// Replace `/` and `\` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

/// Reply text (HTML) for a parse failure.
pub fn usage_hint(err: &ParseError) -> String {
    format!("{}\n\n{USAGE}", escape_html(&err.to_string()))
}

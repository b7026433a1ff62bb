//! Redaction of sensitive values in command lines.
//!
//! Command lines for the analysis tool are logged at debug level. Users can
//! pass credentials through extra arguments (`--api-key abc`, `--token=xyz`),
//! so every logged command goes through [`format_command_for_log`].
//!
//! Option names are matched against `lintel_types::SENSITIVE_OPTION_NAMES`
//! case-insensitively. Both the `--flag value` and `--flag=value` forms are
//! masked. Arguments after the `--` separator are positional and never treated
//! as flags.

use std::borrow::Cow;

use lintel_types::{REDACTION_MASK, SENSITIVE_OPTION_NAMES};

const SEPARATOR: &str = "--";

fn is_sensitive_option(flag: &str) -> bool {
    let name = flag.trim_start_matches('-');
    if name.is_empty() || name.len() == flag.len() {
        return false;
    }
    let normalized = name.to_ascii_lowercase().replace('_', "-");
    SENSITIVE_OPTION_NAMES.contains(&normalized.as_str())
}

fn quote_for_log(arg: &str) -> Cow<'_, str> {
    if arg.is_empty() || arg.chars().any(char::is_whitespace) {
        Cow::Owned(format!("\"{}\"", arg.replace('"', "\\\"")))
    } else {
        Cow::Borrowed(arg)
    }
}

/// Render `args` as a single space-separated string with secrets masked.
#[must_use]
pub fn redact_args<S: AsRef<str>>(args: &[S]) -> String {
    let mut rendered: Vec<Cow<'_, str>> = Vec::with_capacity(args.len());
    let mut mask_next = false;
    let mut positional = false;

    for arg in args {
        let arg = arg.as_ref();

        if positional {
            rendered.push(quote_for_log(arg));
            continue;
        }
        if arg == SEPARATOR {
            positional = true;
            mask_next = false;
            rendered.push(Cow::Borrowed(arg));
            continue;
        }
        // A long option after a sensitive flag means the flag had no value.
        if mask_next && !arg.starts_with(SEPARATOR) {
            rendered.push(Cow::Borrowed(REDACTION_MASK));
            mask_next = false;
            continue;
        }
        mask_next = false;

        if arg.starts_with('-') {
            if let Some((flag, _value)) = arg.split_once('=') {
                if is_sensitive_option(flag) {
                    rendered.push(Cow::Owned(format!("{flag}={REDACTION_MASK}")));
                    continue;
                }
            } else if is_sensitive_option(arg) {
                mask_next = true;
            }
        }
        rendered.push(quote_for_log(arg));
    }

    rendered.join(" ")
}

/// Render `program` followed by its redacted arguments.
#[must_use]
pub fn format_command_for_log<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    if args.is_empty() {
        return quote_for_log(program).into_owned();
    }
    format!("{} {}", quote_for_log(program), redact_args(args))
}

use std::env;

use crate::errors::{Error, Result};

/// Expands `$NAME` references using the process environment.
pub fn expand(s: &str) -> Result<String> {
    expand_with(s, |name| env::var(name).ok())
}

/// Expands every `$NAME` reference in `s`, where a name is a maximal run of
/// `[A-Za-z0-9_]`. Unknown names are kept literally, as is a `$` that is not
/// followed by a name character.
pub fn expand_with<F>(s: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut expanded = String::new();
    expanded
        .try_reserve(s.len())
        .map_err(|_| Error::expansion(s))?;

    let mut rest = s;
    while let Some(dollar) = rest.find('$') {
        push_str(&mut expanded, &rest[..dollar], s)?;
        let after = &rest[dollar + 1..];
        let name_len = after
            .find(|c: char| !is_name_char(c))
            .unwrap_or_else(|| after.len());
        let name = &after[..name_len];

        let value = if name.is_empty() { None } else { lookup(name) };
        match value {
            Some(ref value) => push_str(&mut expanded, value, s)?,
            None => {
                push_str(&mut expanded, "$", s)?;
                push_str(&mut expanded, name, s)?;
            }
        }
        rest = &after[name_len..];
    }
    push_str(&mut expanded, rest, s)?;

    Ok(expanded)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn push_str(buffer: &mut String, s: &str, word: &str) -> Result<()> {
    buffer
        .try_reserve(s.len())
        .map_err(|_| Error::expansion(word))?;
    buffer.push_str(s);
    Ok(())
}

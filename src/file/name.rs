//! Name validation and collision-free name generation.

use std::collections::HashSet;

use crate::{HoardError, Result};

use super::MAX_NAME_LENGTH;

const FORBIDDEN_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Validate a directory or file name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(HoardError::Validation("name must not be empty".to_string()));
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(HoardError::Validation(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }

    if name == "." || name == ".." {
        return Err(HoardError::Validation(format!("'{name}' is a reserved name")));
    }

    if let Some(c) = name
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(HoardError::Validation(format!(
            "name contains a forbidden character: {c:?}"
        )));
    }

    Ok(())
}

/// Split a name into stem and extension (including the dot).
///
/// A leading dot does not start an extension: `.bashrc` has no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Strip a trailing ` (n)` copy counter from a stem.
fn strip_counter(stem: &str) -> &str {
    let Some(open) = stem.rfind(" (") else {
        return stem;
    };
    let Some(inner) = stem[open + 2..].strip_suffix(')') else {
        return stem;
    };
    if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
        &stem[..open]
    } else {
        stem
    }
}

/// Pick the name a copy should get given the names already taken.
///
/// The original name is kept when free. Otherwise ` (n)` is inserted before
/// the extension with the smallest free `n`, replacing any existing counter:
/// `report.txt` becomes `report (1).txt`, and copying `report (1).txt` again
/// yields `report (2).txt`.
///
/// The stem is shortened when the counter would push the name past
/// `MAX_NAME_LENGTH`.
pub fn available_copy_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }

    let (stem, extension) = split_extension(name);
    let base = strip_counter(stem);

    (1u64..)
        .map(|n| numbered_name(base, extension, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn numbered_name(base: &str, extension: &str, n: u64) -> String {
    let counter = format!(" ({n})");
    let reserved = counter.chars().count() + extension.chars().count();

    if reserved >= MAX_NAME_LENGTH {
        // No room for the stem; fold the extension into it instead.
        let keep = MAX_NAME_LENGTH.saturating_sub(counter.chars().count());
        let whole: String = base.chars().chain(extension.chars()).take(keep).collect();
        return format!("{whole}{counter}");
    }

    let stem: String = base.chars().take(MAX_NAME_LENGTH - reserved).collect();
    format!("{stem}{counter}{extension}")
}

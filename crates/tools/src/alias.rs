//! Collision-free tool aliases.
//!
//! An alias is `<provider>__<tool>_<index>`, sanitized to `[A-Za-z0-9_-]`
//! and capped at [`MAX_ALIAS_LEN`] characters. The `_<index>` suffix is
//! appended after truncation, so two indices never collapse to one alias.

/// Longest alias any of the supported protocols accepts.
pub const MAX_ALIAS_LEN: usize = 64;

pub fn to_tool_alias(provider_id: &str, remote_name: &str, index: usize) -> String {
    let provider = sanitize(provider_id);
    let name = sanitize(remote_name);
    let base = match (provider.is_empty(), name.is_empty()) {
        (true, true) => "tool".to_string(),
        (true, false) => name,
        (false, true) => provider,
        (false, false) => format!("{provider}__{name}"),
    };

    let suffix = format!("_{index}");
    let budget = MAX_ALIAS_LEN.saturating_sub(suffix.len());
    // Sanitized text is ASCII, so byte and char lengths agree.
    let mut head = base[..base.len().min(budget)].trim_end_matches('_').to_string();
    if head.is_empty() {
        head.push_str("tool");
    }
    head.push_str(&suffix);
    head
}

fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;
    for c in raw.trim().chars() {
        let mapped = if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' };
        if mapped == '_' {
            if last_underscore {
                continue;
            }
            last_underscore = true;
        } else {
            last_underscore = false;
        }
        out.push(mapped);
    }
    out.trim_matches('_').to_string()
}

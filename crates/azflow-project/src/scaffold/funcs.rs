//! Name helpers for generated infrastructure

/// Max length used for container app names; the platform allows 32
const CONTAINER_APP_NAME_MAX_LEN: usize = 30;

/// camelCase identifier usable as a bicep variable or parameter name
///
/// `-` and `_` separate words, other non-alphanumeric characters are dropped and
/// all-uppercase input is lower-cased (`REDIS_HOST` → `redisHost`).
pub fn bicep_name(name: &str) -> String {
    let all_upper = !name.bytes().any(|b| b.is_ascii_lowercase());
    let mut out = String::with_capacity(name.len());
    let mut separator_start: Option<usize> = None;

    for (i, b) in name.bytes().enumerate() {
        match b {
            b'-' | b'_' => {
                separator_start.get_or_insert(i);
            }
            _ if !b.is_ascii_alphanumeric() => {}
            _ => {
                let c = match separator_start.take() {
                    _ if i == 0 => b.to_ascii_lowercase(),
                    Some(0) => b.to_ascii_lowercase(),
                    Some(_) => b.to_ascii_uppercase(),
                    None if all_upper => b.to_ascii_lowercase(),
                    None => b,
                };
                out.push(c as char);
            }
        }
    }
    out
}

/// [`bicep_name`] with the first character upper-cased, for use inside another name
pub fn bicep_name_infix(name: &str) -> String {
    let name = bicep_name(name);
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// UPPER_SNAKE_CASE with runs of `-`, `_` and `.` collapsed to one underscore
pub fn alpha_snake_upper(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut separator_start: Option<usize> = None;

    for (i, b) in name.bytes().enumerate() {
        match b {
            b'-' | b'_' | b'.' => {
                separator_start.get_or_insert(i);
            }
            _ if !b.is_ascii_alphanumeric() => {}
            _ => {
                if let Some(start) = separator_start.take()
                    && start != 0
                {
                    out.push('_');
                }
                out.push(b.to_ascii_uppercase() as char);
            }
        }
    }
    out
}

/// Lower-case alphanumerics and single inner dashes, truncated to the container app limit
pub fn container_app_name(name: &str) -> String {
    let truncated: String = name.chars().take(CONTAINER_APP_NAME_MAX_LEN).collect();
    let mut out = String::with_capacity(truncated.len());
    let mut pending_dash = false;

    for c in truncated.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else if c == '-' || c == '_' {
            pending_dash = true;
        }
    }
    out
}

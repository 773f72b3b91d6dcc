//! Filename sanitizer (§4.6.5). Every derived filename, whether an uploaded
//! file's name, a logo's extension, or a task's artifact basename, passes
//! through `sanitize` before it is joined onto a server directory.

/// Strips path separators, control characters and any character outside
/// `[A-Za-z0-9._-]`, collapsing the rest into `_`. Idempotent:
/// `sanitize(sanitize(s)) == sanitize(s)`.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => out.push(c),
            _ => out.push('_'),
        }
    }

    // Strip leading dots so the result can never resolve to `.` or `..`.
    let trimmed = out.trim_start_matches('.');
    let result = if trimmed.is_empty() { "_" } else { trimmed };
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_traversal_and_separators() {
        assert_eq!(sanitize("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize("a/b\\c"), "a_b_c");
    }

    #[test]
    fn is_idempotent() {
        for input in ["../foo.mp4", "clip name (1).mkv", "normal_file.srt", ""] {
            let once = sanitize(input);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn retains_portable_characters() {
        assert_eq!(sanitize("clip-01_v2.mp4"), "clip-01_v2.mp4");
    }

    #[test]
    fn empty_and_dot_only_inputs_are_safe() {
        assert_eq!(sanitize(""), "_");
        assert_eq!(sanitize("..."), "_");
    }
}

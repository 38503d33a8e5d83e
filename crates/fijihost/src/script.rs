//! Script text and editor title helpers.

/// Extension the host editor uses to pick the Groovy language.
const GROOVY_EXTENSION: &str = ".groovy";

/// Strip a Markdown code fence wrapped around script text.
///
/// Agents often send ```` ```groovy\n...\n``` ````. An opening fence line
/// (with any language tag) followed by a newline is removed, along with a
/// closing fence. Anything else is returned untouched.
pub fn strip_code_fence(code: &str) -> &str {
    let Some(rest) = code.strip_prefix("```") else {
        return code;
    };
    let Some(newline) = rest.find('\n') else {
        return code;
    };

    let body = &rest[newline + 1..];
    body.trim_end().strip_suffix("```").unwrap_or(body)
}

/// Key under which the editor stores a script title.
pub fn title_key(title: &str) -> &str {
    title.strip_suffix(GROOVY_EXTENSION).unwrap_or(title)
}

/// Whether two editor titles name the same script buffer.
pub fn same_script_title(a: &str, b: &str) -> bool {
    title_key(a) == title_key(b)
}

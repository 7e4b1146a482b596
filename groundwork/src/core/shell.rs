//! POSIX shell quoting for command lines shown to users and written to scripts.

/// Quote `input` for `sh` unless it only contains safe characters.
pub fn shell_escape(input: &str) -> String {
    if !input.is_empty()
        && input.chars().all(|ch| {
            ch.is_ascii_alphanumeric()
                || matches!(ch, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ',')
        })
    {
        return input.to_string();
    }
    let mut escaped = String::from("'");
    for ch in input.chars() {
        if ch == '\'' {
            escaped.push_str("'\"'\"'");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}

/// Render `program args...` as a single shell-safe line.
pub fn render_command<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    std::iter::once(shell_escape(program))
        .chain(args.iter().map(|arg| shell_escape(arg.as_ref())))
        .collect::<Vec<_>>()
        .join(" ")
}

//! Static detection of LIVE statements in a query batch.
//!
//! The batch is split on top-level `;`. Separators inside string literals,
//! backtick or bracket identifiers, comments and `{}`/`()`/`[]` blocks do
//! not split. Statements that contain nothing but whitespace and comments
//! are not counted, matching the engine, which returns no result for them.

/// Split a batch into statements with comments blanked out.
///
/// Returned statements are trimmed and never empty.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                current.push(c);
                let mut escaped = false;
                for inner in chars.by_ref() {
                    current.push(inner);
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' {
                        escaped = true;
                    } else if inner == c {
                        break;
                    }
                }
            },
            '⟨' => {
                current.push(c);
                for inner in chars.by_ref() {
                    current.push(inner);
                    if inner == '⟩' {
                        break;
                    }
                }
            },
            '-' if chars.peek() == Some(&'-') => skip_line(&mut chars, &mut current),
            '/' if chars.peek() == Some(&'/') => skip_line(&mut chars, &mut current),
            '#' => skip_line(&mut chars, &mut current),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for inner in chars.by_ref() {
                    if previous == '*' && inner == '/' {
                        break;
                    }
                    previous = inner;
                }
                current.push(' ');
            },
            '{' | '(' | '[' => {
                depth += 1;
                current.push(c);
            },
            '}' | ')' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            },
            ';' if depth == 0 => flush(&mut current, &mut statements),
            _ => current.push(c),
        }
    }

    flush(&mut current, &mut statements);
    statements
}

/// Indices of the statements whose first keyword is `LIVE`.
///
/// Indices refer to positions in the engine's per-statement result list.
pub fn live_statement_indices(text: &str) -> Vec<usize> {
    split_statements(text)
        .iter()
        .enumerate()
        .filter(|(_, statement)| is_live_statement(statement))
        .map(|(index, _)| index)
        .collect()
}

fn is_live_statement(statement: &str) -> bool {
    let keyword: String = statement
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    keyword.eq_ignore_ascii_case("live")
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, current: &mut String) {
    for inner in chars.by_ref() {
        if inner == '\n' {
            break;
        }
    }
    current.push('\n');
}

fn flush(current: &mut String, statements: &mut Vec<String>) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

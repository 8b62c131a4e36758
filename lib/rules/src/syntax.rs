//! Top-level scanning helpers shared by the boolean and result evaluators.
//!
//! "Top level" means outside quoted strings and outside any `(...)` or
//! `[...]` group.

/// Finds the byte index of the first top-level occurrence of `operator`.
pub(crate) fn find_top_level_operator(expression: &str, operator: &str) -> Option<usize> {
    scan_top_level(expression, |index| expression[index..].starts_with(operator))
}

/// Splits on a top-level operator; `None` when it does not occur.
pub(crate) fn split_expression<'a>(expression: &'a str, operator: &str) -> Option<Vec<&'a str>> {
    let parts = split_top_level(expression, operator);
    if parts.len() > 1 { Some(parts) } else { None }
}

/// Splits on every top-level occurrence of `operator`, keeping empty parts.
pub(crate) fn split_top_level<'a>(expression: &'a str, operator: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0usize;

    while let Some(relative_index) = find_top_level_operator(&expression[start..], operator) {
        let absolute_index = start + relative_index;
        parts.push(expression[start..absolute_index].trim());
        start = absolute_index + operator.len();
    }
    parts.push(expression[start..].trim());
    parts
}

/// Finds a top-level single `=` that is not part of a comparison operator.
pub(crate) fn find_assignment(expression: &str) -> Option<usize> {
    let bytes = expression.as_bytes();
    scan_top_level(expression, |index| {
        if bytes[index] != b'=' {
            return false;
        }
        let before = index.checked_sub(1).map(|i| bytes[i]);
        let after = bytes.get(index + 1).copied();
        !matches!(before, Some(b'=' | b'!' | b'<' | b'>')) && after != Some(b'=')
    })
}

/// Counts and strips leading `!` operators, leaving `!=` alone.
pub(crate) fn strip_leading_negations(expression: &str) -> (usize, &str) {
    let mut count = 0usize;
    let mut remainder = expression.trim_start();
    while let Some(stripped) = remainder.strip_prefix('!') {
        if stripped.starts_with('=') {
            break;
        }
        count += 1;
        remainder = stripped.trim_start();
    }
    (count, remainder)
}

/// Removes parentheses that wrap the whole expression.
pub(crate) fn strip_outer_parens(expression: &str) -> &str {
    let mut current = expression.trim();
    while current.starts_with('(') && closing_index(current) == Some(current.len() - 1) {
        current = current[1..current.len() - 1].trim();
    }
    current
}

fn closing_index(expression: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (index, character) in expression.char_indices() {
        match (quote, character) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(character),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

fn scan_top_level(expression: &str, mut matches_at: impl FnMut(usize) -> bool) -> Option<usize> {
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut depth = 0i32;

    for (index, character) in expression.char_indices() {
        match character {
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                continue;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                continue;
            }
            '(' | '[' if !in_single_quote && !in_double_quote => {
                depth += 1;
                continue;
            }
            ')' | ']' if !in_single_quote && !in_double_quote => {
                if depth > 0 {
                    depth -= 1;
                }
                continue;
            }
            _ => {}
        }

        if !in_single_quote && !in_double_quote && depth == 0 && matches_at(index) {
            return Some(index);
        }
    }

    None
}

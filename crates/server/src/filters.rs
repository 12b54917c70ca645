use crate::errors::ServerError;

/// Translates an `ordering` query parameter into an ORDER BY clause.
///
/// `allowed` maps exposed field names to SQL columns; only whitelisted
/// names ever reach the SQL text. A leading `-` flips to descending, and
/// comma-separated fields compose left to right. `None` or an empty value
/// falls back to `default_clause`.
pub fn ordering_clause(
    raw: Option<&str>,
    allowed: &[(&str, &str)],
    default_clause: &str,
) -> Result<String, ServerError> {
    let raw = match raw {
        Some(raw) => raw,
        None => return Ok(default_clause.to_string()),
    };

    let mut clauses = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (field, direction) = match part.strip_prefix('-') {
            Some(rest) => (rest, "DESC"),
            None => (part, "ASC"),
        };
        let column = allowed
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, column)| *column)
            .ok_or_else(|| ServerError::bad_request(format!("invalid ordering field: {field}")))?;
        clauses.push(format!("{column} {direction}"));
    }

    if clauses.is_empty() {
        return Ok(default_clause.to_string());
    }
    Ok(clauses.join(", "))
}

/// Builds a `LIKE` pattern matching values that start with `term`,
/// escaping the wildcard characters. Pair with `ESCAPE '\'`.
pub fn prefix_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 1);
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Teacher-style page clamping: default 50 rows, hard cap 200.
pub fn page_window(limit: Option<u32>, offset: Option<u32>) -> (i64, i64) {
    let limit = limit.unwrap_or(50).min(200) as i64;
    let offset = offset.unwrap_or(0) as i64;
    (limit, offset)
}

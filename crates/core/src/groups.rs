use std::collections::{BTreeMap, BTreeSet};

use crate::mesh::Mesh;

pub fn build_group_mask(
    groups: &BTreeMap<String, Vec<bool>>,
    expr: &str,
    len: usize,
) -> Option<Vec<bool>> {
    let tokens = parse_name_tokens(expr);
    if tokens.is_empty() {
        return None;
    }

    let has_positive = tokens.iter().any(|(include, _)| *include);
    let mut selected: BTreeSet<&String> = if has_positive {
        BTreeSet::new()
    } else {
        groups.keys().collect()
    };

    for (include, pattern) in &tokens {
        for name in groups.keys() {
            if glob_match(pattern, name) {
                if *include {
                    selected.insert(name);
                } else {
                    selected.remove(name);
                }
            }
        }
    }

    let mut mask = vec![false; len];
    for name in selected {
        if let Some(values) = groups.get(name) {
            if values.len() != len {
                continue;
            }
            for (idx, value) in values.iter().enumerate() {
                if *value {
                    mask[idx] = true;
                }
            }
        }
    }

    Some(mask)
}

/// `None` selects every point.
pub fn point_group_mask(mesh: &Mesh, expr: &str) -> Option<Vec<bool>> {
    let expr = expr.trim();
    if expr.is_empty() {
        return None;
    }
    build_group_mask(&mesh.groups, expr, mesh.point_count())
}

/// Applies a name list such as `"N v* ^vel"` to a single name; later tokens win.
pub fn name_matches(expr: &str, name: &str) -> bool {
    let tokens = parse_name_tokens(expr);
    let has_positive = tokens.iter().any(|(include, _)| *include);
    let mut selected = !has_positive && !tokens.is_empty();
    for (include, pattern) in &tokens {
        if glob_match(pattern, name) {
            selected = *include;
        }
    }
    selected
}

fn parse_name_tokens(expr: &str) -> Vec<(bool, String)> {
    let mut tokens = Vec::new();
    let normalized = expr.replace(',', " ");
    for token in normalized.split_whitespace() {
        let (include, name) = match token.chars().next() {
            Some('^') | Some('!') => (false, &token[1..]),
            _ => (true, token),
        };
        if !name.is_empty() {
            tokens.push((include, name.to_string()));
        }
    }
    tokens
}

fn glob_match(pattern: &str, value: &str) -> bool {
    glob_match_inner(pattern.as_bytes(), value.as_bytes())
}

fn glob_match_inner(pattern: &[u8], value: &[u8]) -> bool {
    let Some((first, rest)) = pattern.split_first() else {
        return value.is_empty();
    };
    match first {
        b'*' => (0..=value.len()).any(|idx| glob_match_inner(rest, &value[idx..])),
        b'?' => !value.is_empty() && glob_match_inner(rest, &value[1..]),
        ch => value.first() == Some(ch) && glob_match_inner(rest, &value[1..]),
    }
}

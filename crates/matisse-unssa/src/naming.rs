// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Final C identifiers for allocation groups.

use std::cmp::Reverse;
use std::collections::HashSet;

use indexmap::IndexSet;
use matisse_ssa::{is_global_derived, is_temporary, source_name};

/// C keywords and names the generated code already uses.
const RESERVED: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else", "enum",
    "extern", "float", "for", "goto", "if", "inline", "int", "long", "register", "restrict", "return",
    "short", "signed", "sizeof", "static", "struct", "switch", "typedef", "union", "unsigned", "void",
    "volatile", "while", "bool", "true", "false", "main", "NULL",
];

/// Temporaries lose to names derived from globals, which lose to names the
/// user wrote.
pub(crate) fn strength(ssa: &str) -> u8 {
    if is_temporary(ssa) {
        0
    } else if is_global_derived(ssa) {
        1
    } else {
        2
    }
}

/// Identifier an SSA name asks for: its source variable, or `_semantic`
/// for a temporary `$semantic$N`.
pub(crate) fn preferred_name(ssa: &str) -> String {
    let base = match source_name(ssa) {
        Some(source) => source.to_string(),
        None => {
            let semantic = ssa.trim_start_matches('$').split('$').next().unwrap_or_default();
            format!("_{}", semantic)
        }
    };
    let mut cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned == "_" {
        cleaned = "_tmp".to_string();
    }
    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        cleaned.insert(0, '_');
    }
    cleaned
}

/// One identifier per group. Each group asks for the name of its strongest
/// member (the first discovered among equals); a name already taken gets the
/// first free `_1`, `_2`, ... suffix, groups served in order.
pub(crate) fn name_groups(names: &IndexSet<String>, groups: &[Vec<usize>], reserved: &HashSet<String>) -> Vec<String> {
    let mut taken: HashSet<String> = RESERVED.iter().map(|s| s.to_string()).collect();
    taken.extend(reserved.iter().cloned());

    let mut result = Vec::with_capacity(groups.len());
    for group in groups {
        let Some(representative) = group
            .iter()
            .copied()
            .min_by_key(|&m| (Reverse(strength(&names[m])), m))
        else {
            continue;
        };
        let base = preferred_name(&names[representative]);
        let mut name = base.clone();
        let mut suffix = 1;
        while taken.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        taken.insert(name.clone());
        result.push(name);
    }
    result
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Symbol and resource name helpers

/// Separator between namespace segments in a symbol name
pub const NAMESPACE_DELIMITER: char = '.';

/// Separator between an enclosing symbol and its nested members
pub const NESTING_DELIMITER: char = '$';

/// Map a symbol name to the resource holding its definition.
///
/// `a.b.C$D` with suffix `.sym` becomes `a/b/C$D.sym`. Names given in
/// resource form (`a/b/C`) are accepted as well.
pub fn resource_name(symbol: &str, suffix: &str) -> String {
    let mut name = symbol.replace(NAMESPACE_DELIMITER, "/");
    name.push_str(suffix);
    name
}

/// Normalize a name given in resource form (`a/b/C`) to dotted form
pub fn symbol_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Namespace of a symbol, if it has one
pub fn namespace_of(symbol: &str) -> Option<&str> {
    match symbol.rfind(NAMESPACE_DELIMITER) {
        Some(pos) if pos > 0 => Some(&symbol[..pos]),
        _ => None,
    }
}

/// Strictly-enclosing names of a nested symbol, innermost first.
///
/// `A$B$C` yields `A$B` then `A`. A leading delimiter never produces an
/// empty prefix.
pub fn enclosing_names(symbol: &str) -> impl Iterator<Item = &str> {
    let mut end = symbol.len();
    std::iter::from_fn(move || {
        let pos = symbol[..end].rfind(NESTING_DELIMITER)?;
        if pos == 0 {
            return None;
        }
        end = pos;
        Some(&symbol[..pos])
    })
}

use std::collections::HashSet;

/// Pick a name for a node that does not collide with any of its future siblings.
///
/// Returns `desired` when it is free, otherwise the first free `desired(n)` for n = 1, 2, ...
pub fn resolve_sibling_name<'a, I>(desired: &str, sibling_names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: HashSet<&str> = sibling_names.into_iter().collect();

    if !taken.contains(desired) {
        return desired.to_owned();
    }

    // At most taken.len() candidates can be occupied, so this terminates.
    let mut n: usize = 1;
    loop {
        let candidate = format!("{}({})", desired, n);
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

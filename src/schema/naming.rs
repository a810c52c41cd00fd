//! Name conversion between source identifiers and table/column names

/// Converts a mixed-case identifier to lower-case with underscore separators
///
/// An underscore is inserted before every upper-case character that follows a
/// non-upper-case character, then the whole string is lower-cased. Runs of
/// capitals therefore stay together (`IDOther` becomes `idother`), and names
/// that are already snake_case pass through unchanged.
///
/// # Example
///
/// ```
/// use sumi_harvest::schema::camel_to_snake;
///
/// assert_eq!(camel_to_snake("BlogEntry"), "blog_entry");
/// assert_eq!(camel_to_snake("SVal"), "sval");
/// assert_eq!(camel_to_snake("fetched_at"), "fetched_at");
/// ```
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;

    for c in name.chars() {
        if c.is_uppercase() {
            if let Some(p) = prev {
                if !p.is_uppercase() {
                    out.push('_');
                }
            }
        }
        out.extend(c.to_lowercase());
        prev = Some(c);
    }

    out
}

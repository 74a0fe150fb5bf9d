//! Name normalisation and SKU code derivation.

const OPTION_CODE_LEN: usize = 6;

/// Canonical form used to compare category names: trimmed, spaces become
/// underscores, anything outside `[A-Za-z0-9_-]` is dropped, lower case.
pub fn format_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c.to_ascii_lowercase()),
            _ => None,
        })
        .collect()
}

/// Short code for a category or product name.
///
/// Several words give their initials. A single camel-case word gives its
/// capitals (at most four). Other single words are kept when short, shortened
/// by two characters below six characters, and clipped to four otherwise.
pub fn word_code(name: &str) -> String {
    let cleaned = name.trim().replace('-', "");
    let words: Vec<&str> = cleaned.split_whitespace().collect();

    match words.as_slice() {
        [] => String::new(),
        [word] => single_word_code(word),
        many => many
            .iter()
            .filter_map(|word| word.chars().next())
            .collect::<String>()
            .to_uppercase(),
    }
}

fn single_word_code(word: &str) -> String {
    let mut chars = word.chars();
    let first = chars.next().map(|c| c.to_uppercase().to_string()).unwrap_or_default();
    let capitals: String = chars.filter(|c| c.is_uppercase()).collect();

    if !capitals.is_empty() {
        return format!("{}{}", first, capitals).chars().take(4).collect();
    }

    let len = word.chars().count();
    let code: String = match len {
        0..=3 => word.to_string(),
        4..=5 => word.chars().take(len - 2).collect(),
        _ => word.chars().take(4).collect(),
    };
    code.to_uppercase()
}

/// Code for an option value: spaces and dashes removed, clipped, upper case
pub fn option_code(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .take(OPTION_CODE_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// `CATEGORY-PRODUCT-OPT1-OPT2…`, option values in the order given
/// (callers pass them sorted by variation name).
pub fn derive_sku<'a, I>(category_name: &str, product_name: &str, option_values: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut parts = vec![word_code(category_name), word_code(product_name)];
    parts.extend(option_values.into_iter().map(option_code));
    parts.retain(|part| !part.is_empty());
    parts.join("-")
}

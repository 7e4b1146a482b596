//! Name normalization for application and resource names.

/// Split a human or code name into lowercase words.
///
/// Word boundaries are any non-alphanumeric character and lower-to-upper case
/// transitions (`MyApp` -> `my`, `app`).
fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower_or_digit = false;
    for ch in name.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower_or_digit = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower_or_digit && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower_or_digit = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// `"My Cool App"` -> `"my-cool-app"`.
pub fn dasherize(name: &str) -> String {
    words(name).join("-")
}

/// `"My Cool App"` -> `"my_cool_app"`.
pub fn underscore(name: &str) -> String {
    words(name).join("_")
}

/// `"my_cool_app"` -> `"My cool app"`.
pub fn humanize(name: &str) -> String {
    let joined = words(name).join(" ");
    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `"my-cool-app"` -> `"MyCoolApp"`.
pub fn camelize(name: &str) -> String {
    words(name)
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

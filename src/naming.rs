use std::collections::HashSet;

pub const DSL_EXTENSION: &str = "yaml";

const FALLBACK_NAME: &str = "app";
const RESERVED_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

pub fn sanitize(display_name: &str) -> String {
    let sanitized: String = display_name
        .chars()
        .filter(|ch| !RESERVED_CHARS.contains(ch))
        .map(|ch| if ch.is_whitespace() { '_' } else { ch })
        .collect();

    if sanitized.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitized
    }
}

pub fn deduplicate<F>(stem: &str, extension: &str, reserved: &HashSet<String>, is_taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let mut candidate = with_extension(stem, extension);
    let mut counter = 1u32;
    while reserved.contains(&candidate) || is_taken(&candidate) {
        tracing::debug!(candidate = %candidate, counter, "filename already claimed, adding suffix");
        candidate = with_extension(&format!("{stem}_{counter}"), extension);
        counter += 1;
    }
    candidate
}

pub fn allocate<F>(display_name: &str, reserved: &mut HashSet<String>, is_taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let stem = sanitize(display_name);
    let filename = deduplicate(&stem, DSL_EXTENSION, reserved, is_taken);
    reserved.insert(filename.clone());
    filename
}

fn with_extension(stem: &str, extension: &str) -> String {
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    }
}

#[cfg(test)]
#[path = "naming_tests_ext.rs"]
mod tests;

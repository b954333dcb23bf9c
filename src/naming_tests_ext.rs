use std::collections::HashSet;

use super::{allocate, deduplicate, sanitize, DSL_EXTENSION};

#[test]
fn sanitize_replaces_whitespace_and_drops_reserved_characters() {
    assert_eq!(sanitize("My App"), "My_App");
    assert_eq!(sanitize("a/b\\c:d*e?f\"g<h>i|j"), "abcdefghij");
    assert_eq!(sanitize("tab\there"), "tab_here");
    assert_eq!(sanitize("three   spaces"), "three___spaces");
    assert_eq!(sanitize("ideographic\u{3000}space"), "ideographic_space");
}

#[test]
fn sanitize_preserves_non_latin_scripts() {
    assert_eq!(sanitize("日本語アプリ"), "日本語アプリ");
    assert_eq!(sanitize("変更された 日本語アプリ"), "変更された_日本語アプリ");
    assert_eq!(sanitize("Ünïcødé-app.v2"), "Ünïcødé-app.v2");
}

#[test]
fn sanitize_falls_back_when_nothing_survives() {
    assert_eq!(sanitize(""), "app");
    assert_eq!(sanitize("/:*?"), "app");
    assert_eq!(sanitize(" "), "_");
}

#[test]
fn sanitize_output_never_contains_reserved_characters() {
    let inputs = [
        "plain",
        "with/slash",
        "C:\\Windows\\path",
        "\"quoted\" <tag> | pipe?",
        "  leading and trailing  ",
        "混合 mixed/スクリプト*",
    ];
    for input in inputs {
        let output = sanitize(input);
        assert!(
            !output
                .chars()
                .any(|ch| super::RESERVED_CHARS.contains(&ch)),
            "{input:?} -> {output:?}"
        );
        assert!(!output.chars().any(char::is_whitespace), "{input:?} -> {output:?}");
    }
}

#[test]
fn deduplicate_returns_base_name_when_free() {
    let reserved = HashSet::new();
    let name = deduplicate("Flow", DSL_EXTENSION, &reserved, |_| false);
    assert_eq!(name, "Flow.yaml");
}

#[test]
fn deduplicate_skips_reserved_and_taken_names() {
    let reserved: HashSet<String> = ["Flow.yaml".to_string()].into_iter().collect();
    let name = deduplicate("Flow", DSL_EXTENSION, &reserved, |candidate| {
        candidate == "Flow_1.yaml"
    });
    assert_eq!(name, "Flow_2.yaml");
}

#[test]
fn allocate_assigns_distinct_names_for_identical_display_names() {
    let mut reserved = HashSet::new();
    let on_disk = ["Duplicate_App.yaml".to_string()];
    let is_taken = |candidate: &str| on_disk.iter().any(|existing| existing == candidate);

    let first = allocate("Duplicate App", &mut reserved, is_taken);
    let second = allocate("Duplicate App", &mut reserved, is_taken);

    assert_eq!(first, "Duplicate_App_1.yaml");
    assert_eq!(second, "Duplicate_App_2.yaml");
    assert!(reserved.contains(&first));
    assert!(reserved.contains(&second));
}

#[test]
fn allocate_is_deterministic_for_the_same_input_order() {
    let names = ["Flow", "Flow", "Other", "Flow"];
    let run = || {
        let mut reserved = HashSet::new();
        names
            .iter()
            .map(|name| allocate(name, &mut reserved, |_| false))
            .collect::<Vec<_>>()
    };

    let first = run();
    assert_eq!(
        first,
        vec!["Flow.yaml", "Flow_1.yaml", "Other.yaml", "Flow_2.yaml"]
    );
    assert_eq!(first, run());
}

use std::fs;

use evp_core::config::{AppConfig, RedactionConfig};
use evp_core::redact::{apply_text_redactions, RedactionLog, REDACTION_GLYPH};
use pretty_assertions::assert_eq;

#[test]
fn file_patterns_and_request_patterns_redact_together() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = AppConfig::default().rooted(tmp.path());
    fs::create_dir_all(cfg.redaction_config.parent().unwrap()).unwrap();
    fs::write(
        &cfg.redaction_config,
        "mode: overlay\npatterns:\n  - 'ACME'\n  - 'P-\\d+'\nregions:\n  - {page: 1, x: 0, y: 0, w: 10, h: 10}\n  - {page: 2}\n",
    )
    .unwrap();

    let red = RedactionConfig::load(&cfg.redaction_config);
    assert_eq!(red.mode.as_deref(), Some("overlay"));
    assert_eq!(red.regions.len(), 2);

    let patterns = red.merged_patterns(&[r"P-\d+".to_string(), r"\bS/N \w+".to_string()]);
    assert_eq!(patterns, vec!["ACME".to_string(), r"P-\d+".to_string(), r"\bS/N \w+".to_string()]);

    let out = apply_text_redactions("ACME part P-778 S/N X91 and P-779", &patterns);
    assert_eq!(
        out.text,
        format!("{g} part {g} {g} and {g}", g = REDACTION_GLYPH)
    );

    let log = RedactionLog::from_outcome("spec.txt", 3, &out, red.regions.len());
    let counts: Vec<(&str, usize)> = log.matches.iter().map(|m| (m.pattern.as_str(), m.count)).collect();
    assert_eq!(counts, vec![("ACME", 1), (r"P-\d+", 2), (r"\bS/N \w+", 1)]);
    assert_eq!(log.regions_count, 2);
    assert_eq!(log.page, 3);
}

#[test]
fn missing_redaction_file_means_no_default_patterns() {
    let tmp = tempfile::tempdir().unwrap();
    let red = RedactionConfig::load(&tmp.path().join("absent.yaml"));
    assert_eq!(red, RedactionConfig::default());
    assert_eq!(red.merged_patterns(&[]), Vec::<String>::new());
}

#[test]
fn empty_yaml_file_is_empty_config() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("redaction.yaml");
    fs::write(&p, "").unwrap();
    assert_eq!(RedactionConfig::load(&p), RedactionConfig::default());
}

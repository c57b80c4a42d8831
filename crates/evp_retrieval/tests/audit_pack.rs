use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use evp_core::config::AppConfig;
use evp_core::hashing::{sha256_file_hex, sha256_hex};
use evp_retrieval::context::AuditContext;
use evp_retrieval::ingest::ingest_text_file;
use evp_retrieval::pack::custody::ChainOfCustody;
use evp_retrieval::pack::manifest::Manifest;
use evp_retrieval::pack::{
    archive_path, build_audit_pack, fetch_manifest, verify_pack, PackRequest, RedactionRequest,
};
use pretty_assertions::assert_eq;

fn context(root: &Path) -> AuditContext {
    let mut cfg = AppConfig::default().rooted(root);
    cfg.embedding_dim = 64;
    AuditContext::open(cfg).expect("context")
}

fn ingest(ctx: &AuditContext, name: &str, body: &str) {
    let uploads = &ctx.config.source_dirs[0];
    fs::create_dir_all(uploads).unwrap();
    let path = uploads.join(name);
    fs::write(&path, body).unwrap();
    ingest_text_file(ctx, &path).expect("ingest");
}

fn part_request() -> PackRequest {
    PackRequest {
        created_by: "qa".to_string(),
        query: Some("Part".to_string()),
        max_items: Some(5),
        redaction: RedactionRequest {
            mode: None,
            patterns: vec![r"P-\d+".to_string()],
        },
        ..PackRequest::default()
    }
}

fn zip_entries(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut out = BTreeMap::new();
    let mut order = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).unwrap();
        order.push(entry.name().to_string());
        out.insert(entry.name().to_string(), buf);
    }
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted, "archive entries must be in sorted order");
    out
}

#[test]
fn end_to_end_pack_is_redacted_hashed_and_finalized() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    ingest(&ctx, "spec.txt", "Tolerance ±0.002 Part P-12345\n");

    let res = build_audit_pack(&ctx, &part_request()).expect("build pack");
    assert_eq!(res.counts.items, 1);
    assert_eq!(res.counts.redacted_items, 1);
    assert_eq!(res.counts.fallback_hashed_items, 0);
    assert!(res.archive_path.is_file());
    assert_eq!(res.archive_path, ctx.config.packs_dir.join(format!("{}.zip", res.pack_id)));

    // Evidence file is redacted and matches its manifest row.
    let manifest: Manifest = serde_json::from_slice(&fs::read(&res.manifest_path).unwrap()).unwrap();
    assert_eq!(manifest.rows.len(), 1);
    let row = &manifest.rows[0];
    assert_eq!(row.path, "evidence/001_spec.txt.txt");
    let evidence = fs::read_to_string(res.build_dir.join(&row.path)).unwrap();
    assert_eq!(evidence, "Tolerance ±0.002 Part ████");
    assert_eq!(row.sha256, sha256_hex(evidence.as_bytes()));
    assert_eq!(row.bytes, evidence.len() as u64);
    assert!(row.redaction_applied);
    assert_eq!(row.citation, "spec.txt p1 l1-1");

    let hashes: BTreeMap<String, String> =
        serde_json::from_slice(&fs::read(res.build_dir.join("hashes.json")).unwrap()).unwrap();
    assert_eq!(hashes.len(), 1);
    assert_eq!(hashes[&row.evidence_id], row.sha256);

    let log: serde_json::Value = serde_json::from_slice(
        &fs::read(res.build_dir.join("redactions").join("001_spec.txt.redaction.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(log["matches"][0]["pattern"], r"P-\d+");
    assert_eq!(log["matches"][0]["count"], 1);

    let csv_text = fs::read_to_string(res.build_dir.join("manifest.csv")).unwrap();
    assert!(csv_text.starts_with("evidence_id,filename,page"));
    assert_eq!(csv_text.lines().count(), 2);

    let html = fs::read_to_string(&res.index_path).unwrap();
    assert!(html.contains(&res.pack_id));
    assert!(!html.contains("P-12345"));

    // Finalized custody record carries the archive hash.
    let custody: ChainOfCustody = serde_json::from_slice(&fs::read(&res.custody_path).unwrap()).unwrap();
    assert_eq!(custody.pack_id, res.pack_id);
    assert!(custody.is_finalized());
    let (zip_sha, _) = sha256_file_hex(&res.archive_path).unwrap();
    assert_eq!(custody.archive_sha256.as_deref(), Some(zip_sha.as_str()));
    assert_eq!(res.archive_sha256, zip_sha);
    assert_eq!(custody.evidence_ids, vec![row.evidence_id.clone()]);
    assert_eq!(custody.redaction_mode, "overlay");
    assert_eq!(custody.query_or_case_id, "Part");
    assert_eq!(custody.created_by, "qa");

    // The archive holds the same evidence bytes and the drafted custody record.
    let entries = zip_entries(&res.archive_path);
    assert_eq!(sha256_hex(&entries["evidence/001_spec.txt.txt"]), hashes[&row.evidence_id]);
    let drafted: ChainOfCustody = serde_json::from_slice(&entries["chain_of_custody.json"]).unwrap();
    assert_eq!(drafted.archive_sha256, None);
    assert_eq!(drafted.pack_id, res.pack_id);
    for name in ["manifest.json", "manifest.csv", "hashes.json", "index.html"] {
        assert!(entries.contains_key(name), "missing {name}");
    }

    let verified = verify_pack(&ctx.config.packs_dir, &res.pack_id).unwrap();
    assert!(verified.ok, "{verified:?}");
    assert_eq!(verified.rows_checked, 1);
}

#[test]
fn missing_query_and_case_is_a_validation_error() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let req = PackRequest {
        query: Some("   ".to_string()),
        ..PackRequest::default()
    };
    let err = build_audit_pack(&ctx, &req).unwrap_err();
    assert_eq!(err.code, "PACK_REQUEST_INVALID");
    assert!(!ctx.config.packs_dir.exists());
}

#[test]
fn boundary_lookups_validate_and_report_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let packs = tmp.path().join("packs");
    let unknown = "0b6a5c1e-9f0a-4d5e-8c2b-6f1d2e3a4b5c";

    assert_eq!(fetch_manifest(&packs, "not-a-uuid").unwrap_err().code, "PACK_ID_INVALID");
    assert_eq!(fetch_manifest(&packs, unknown).unwrap_err().code, "PACK_NOT_FOUND");
    assert_eq!(archive_path(&packs, unknown).unwrap_err().code, "PACK_ARCHIVE_NOT_FOUND");
    assert_eq!(verify_pack(&packs, "../etc").unwrap_err().code, "PACK_ID_INVALID");
}

#[test]
fn boundary_lookups_find_a_built_pack() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    ingest(&ctx, "spec.txt", "Part A\n");
    let res = build_audit_pack(&ctx, &part_request()).unwrap();

    let manifest = fetch_manifest(&ctx.config.packs_dir, &res.pack_id.to_uppercase()).unwrap();
    assert_eq!(manifest.rows.len(), 1);
    assert_eq!(archive_path(&ctx.config.packs_dir, &res.pack_id).unwrap(), res.archive_path);
}

#[test]
fn verify_detects_tampered_evidence_and_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    ingest(&ctx, "spec.txt", "Tolerance ±0.002 Part P-12345\n");
    let res = build_audit_pack(&ctx, &part_request()).unwrap();

    let evidence = res.build_dir.join("evidence").join("001_spec.txt.txt");
    fs::write(&evidence, "Tolerance ±0.002 Part P-12345").unwrap();
    let v = verify_pack(&ctx.config.packs_dir, &res.pack_id).unwrap();
    assert!(!v.ok);
    assert_eq!(v.mismatches.len(), 1);
    assert_eq!(v.mismatches[0].subject, "evidence/001_spec.txt.txt");

    let mut bytes = fs::read(&res.archive_path).unwrap();
    bytes.extend_from_slice(b"trailing junk");
    fs::write(&res.archive_path, bytes).unwrap();
    let v = verify_pack(&ctx.config.packs_dir, &res.pack_id).unwrap();
    assert!(v.mismatches.iter().any(|m| m.subject == "archive"));
}

#[test]
fn config_patterns_merge_and_invalid_patterns_are_logged_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let cfg_dir = ctx.config.redaction_config.parent().unwrap().to_path_buf();
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(
        &ctx.config.redaction_config,
        "mode: mask\npatterns:\n  - 'Tolerance'\n  - '([unclosed'\nregions:\n  - {page: 1}\n",
    )
    .unwrap();
    ingest(&ctx, "spec.txt", "Tolerance ±0.002 Part P-12345\n");

    let res = build_audit_pack(&ctx, &part_request()).unwrap();
    assert_eq!(res.counts.invalid_patterns, 1);

    let evidence = fs::read_to_string(res.build_dir.join("evidence").join("001_spec.txt.txt")).unwrap();
    assert_eq!(evidence, "████ ±0.002 Part ████");

    let log: serde_json::Value = serde_json::from_slice(
        &fs::read(res.build_dir.join("redactions").join("001_spec.txt.redaction.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(log["invalid_patterns"][0], "([unclosed");
    assert_eq!(log["regions_count"], 1);
    assert_eq!(log["matches"].as_array().unwrap().len(), 2);

    let custody: ChainOfCustody = serde_json::from_slice(&fs::read(&res.custody_path).unwrap()).unwrap();
    assert_eq!(custody.redaction_mode, "mask");
}

#[test]
fn case_only_pack_uses_draft_provenance() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    fs::create_dir_all(&ctx.config.drafts_dir).unwrap();
    fs::write(
        ctx.config.drafts_dir.join("draft.json"),
        r#"{"case_id":"CAR-1","bundle":{"provenance":{"dims.od":[{"filename":"drawing <rev B>.txt","page":3,"line":12,"excerpt":"OD 12.00 <b>"}]}}}"#,
    )
    .unwrap();

    let req = PackRequest {
        case_id: Some("CAR-1".to_string()),
        ..PackRequest::default()
    };
    let res = build_audit_pack(&ctx, &req).unwrap();
    assert_eq!(res.counts.items, 1);
    assert_eq!(res.counts.fallback_hashed_items, 1);
    assert_eq!(res.counts.redacted_items, 0);

    let manifest = fetch_manifest(&ctx.config.packs_dir, &res.pack_id).unwrap();
    assert_eq!(manifest.rows[0].path, "evidence/001_drawing__rev_B_.txt.txt");
    assert_eq!(manifest.rows[0].citation, "drawing <rev B>.txt p3 l12-12");

    let html = fs::read_to_string(&res.index_path).unwrap();
    assert!(html.contains("OD 12.00 &lt;b&gt;"));

    let custody: ChainOfCustody = serde_json::from_slice(&fs::read(&res.custody_path).unwrap()).unwrap();
    assert_eq!(custody.query_or_case_id, "CAR-1");
}

#[test]
fn archived_index_page_carries_only_redacted_excerpts() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    ingest(&ctx, "spec.txt", "Tolerance ±0.002 Part P-12345\n");
    let res = build_audit_pack(&ctx, &part_request()).unwrap();

    let entries = zip_entries(&res.archive_path);
    let archived_html = String::from_utf8(entries["index.html"].clone()).unwrap();
    assert!(!archived_html.contains("P-12345"));
    assert!(archived_html.contains("Tolerance ±0.002 Part ████"));

    let built_html = fs::read_to_string(&res.index_path).unwrap();
    assert_eq!(built_html, archived_html);
}

#[test]
fn invalid_config_pattern_is_counted_even_for_an_empty_pack() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    fs::create_dir_all(ctx.config.redaction_config.parent().unwrap()).unwrap();
    fs::write(&ctx.config.redaction_config, "patterns:\n  - '([unclosed'\n").unwrap();

    let res = build_audit_pack(&ctx, &part_request()).unwrap();
    assert_eq!(res.counts.items, 0);
    assert_eq!(res.counts.invalid_patterns, 1);
    assert_eq!(fetch_manifest(&ctx.config.packs_dir, &res.pack_id).unwrap().rows.len(), 0);
}

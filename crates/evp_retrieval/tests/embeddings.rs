use evp_retrieval::embeddings::{embed, embed_batch, Embedder, HashEmbedder};

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
}

#[test]
fn embedding_is_deterministic_and_unit_length() {
    let a = embed("Tolerance ±0.002 Part P-12345", 384);
    let b = embed("Tolerance ±0.002 Part P-12345", 384);
    assert_eq!(a.len(), 384);
    assert_eq!(a, b);
    assert!((norm(&a) - 1.0).abs() < 1e-4);
}

#[test]
fn different_text_gives_different_vectors() {
    let a = embed("Part", 64);
    let b = embed("part", 64);
    assert_ne!(a, b);
}

#[test]
fn zero_dimension_is_empty() {
    assert!(embed("anything", 0).is_empty());
}

#[test]
fn odd_dimension_is_filled_exactly() {
    let v = embed("x", 13);
    assert_eq!(v.len(), 13);
    assert!((norm(&v) - 1.0).abs() < 1e-4);
}

#[test]
fn hash_embedder_matches_free_function() {
    let e = HashEmbedder::new(16);
    assert_eq!(e.dim(), 16);
    let texts = vec!["one".to_string(), "two".to_string()];
    let batch = embed_batch(&e, &texts).expect("embed batch");
    assert_eq!(batch, vec![embed("one", 16), embed("two", 16)]);
}

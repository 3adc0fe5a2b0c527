use super::*;

fn temp_index() -> (CacheIndex, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let idx = CacheIndex::new(dir.path()).unwrap();
    (idx, dir)
}

#[test]
fn lookup_missing_pointer_is_absent() {
    let (idx, _dir) = temp_index();
    let l = idx.lookup("https://example.com/sub", Duration::from_secs(3600));
    assert!(!l.present);
    assert!(!l.fresh);
    assert!(l.content_hash.is_none());
}

#[test]
fn store_then_point_then_lookup_is_fresh() {
    let (idx, _dir) = temp_index();
    let bytes = b"proxies: []\n";
    let hash = CacheIndex::content_hash_of(bytes);
    idx.store_bytes(&hash, bytes).unwrap();
    idx.point("https://example.com/sub", &hash);

    let l = idx.lookup("https://example.com/sub", Duration::from_secs(3600));
    assert!(l.present);
    assert!(l.fresh);
    assert_eq!(l.content_hash.as_deref(), Some(hash.as_str()));
    assert_eq!(std::fs::read(&l.path).unwrap(), bytes);
}

#[test]
fn stale_content_is_not_fresh() {
    let (idx, _dir) = temp_index();
    let bytes = b"proxies: []\n";
    let hash = CacheIndex::content_hash_of(bytes);
    idx.store_bytes(&hash, bytes).unwrap();
    idx.point("https://example.com/sub", &hash);

    // max_age of zero means "now - mtime" (>= 0) is never < 0, so immediately stale.
    let l = idx.lookup("https://example.com/sub", Duration::from_secs(0));
    assert!(l.present);
    assert!(!l.fresh);
}

#[test]
fn atomic_write_leaves_no_tmp_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.yaml");
    atomic_write(&path, b"hello").unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    assert!(!path.with_extension("yaml.tmp").exists());
}

#[test]
fn identical_content_shares_hash() {
    let bytes_a = b"same content";
    let bytes_b = b"same content";
    assert_eq!(
        CacheIndex::content_hash_of(bytes_a),
        CacheIndex::content_hash_of(bytes_b)
    );
}

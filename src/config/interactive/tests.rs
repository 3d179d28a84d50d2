use super::load_existing_config as load_existing_config_impl;
use tempfile::TempDir;

#[test]
fn load_existing_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = load_existing_config_impl(temp_dir.path());
    assert!(!config.embedding.base_url.is_empty());
    assert!(!config.embedding.model.is_empty());
    assert!(config.search.batch_size > 0);
    assert_eq!(config.get_base_dir(), temp_dir.path());
}

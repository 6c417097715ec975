use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn defaults_are_valid() {
    let config = Config::default();
    config.validate().expect("default config should validate");
    assert_eq!(config.provider.dimension, 768);
    assert_eq!(config.provider.batch_size, 20);
    assert_eq!(config.fusion.semantic_weight, 0.6);
    assert_eq!(config.fusion.keyword_weight, 0.4);
    assert_eq!(config.context.max_context_tokens, 3000);
    assert_eq!(config.chunking.target_chunk_chars, 6000);
}

#[test]
fn load_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().expect("temp dir");
    let config = Config::load(temp_dir.path()).expect("load should succeed");
    assert_eq!(config, Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    });
}

#[test]
fn save_and_reload_roundtrip() {
    let temp_dir = TempDir::new().expect("temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.provider.model = "custom-embed".to_string();
    config.fusion.semantic_weight = 0.7;
    config.fusion.keyword_weight = 0.3;
    config.save().expect("save should succeed");

    let reloaded = Config::load(temp_dir.path()).expect("reload should succeed");
    assert_eq!(reloaded, config);
}

#[test]
fn rejects_unnormalized_fusion_weights() {
    let mut config = Config::default();
    config.fusion.semantic_weight = 0.9;
    config.fusion.keyword_weight = 0.4;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::FusionWeightsNotNormalized(_))
    ));
}

#[test]
fn rejects_out_of_range_weight() {
    let mut config = Config::default();
    config.fusion.semantic_weight = 1.5;
    config.fusion.keyword_weight = -0.5;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidFusionWeight(_))
    ));
}

#[test]
fn rejects_bad_provider_settings() {
    let mut config = Config::default();
    config.provider.base_url = "not a url".to_string();
    assert!(matches!(
        config.provider.validate(),
        Err(ConfigError::InvalidUrl(_))
    ));

    let mut config = Config::default();
    config.provider.model = "  ".to_string();
    assert!(matches!(
        config.provider.validate(),
        Err(ConfigError::InvalidModel(_))
    ));

    let mut config = Config::default();
    config.provider.dimension = 32;
    assert!(matches!(
        config.provider.validate(),
        Err(ConfigError::InvalidEmbeddingDimension(32))
    ));

    let mut config = Config::default();
    config.provider.batch_size = 0;
    assert!(matches!(
        config.provider.validate(),
        Err(ConfigError::InvalidBatchSize(0))
    ));
}

#[test]
fn rejects_tiny_chunk_budget() {
    let mut config = Config::default();
    config.chunking.target_chunk_chars = 10;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidTargetChunkChars(10))
    ));
}

#[test]
#[serial]
fn api_key_env_overrides_config() {
    let config = ProviderConfig {
        api_key: Some("from-config".to_string()),
        ..ProviderConfig::default()
    };

    unsafe {
        std::env::remove_var(API_KEY_ENV);
    }
    assert_eq!(config.resolve_api_key().as_deref(), Some("from-config"));

    unsafe {
        std::env::set_var(API_KEY_ENV, "from-env");
    }
    assert_eq!(config.resolve_api_key().as_deref(), Some("from-env"));

    unsafe {
        std::env::remove_var(API_KEY_ENV);
    }
}

#[test]
#[serial]
fn missing_api_key_resolves_to_none() {
    unsafe {
        std::env::remove_var(API_KEY_ENV);
    }
    let config = ProviderConfig::default();
    assert_eq!(config.resolve_api_key(), None);
}

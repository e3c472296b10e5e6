use catalog_core::config::{Config, EmptyExportPolicy, PipelineConfig, ProviderKind, SinkMode};
use catalog_core::transform::{embedding_text, normalize_tags, transform};
use catalog_core::types::SourceRecord;
use catalog_core::Error;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;

fn record(tags: &str) -> SourceRecord {
    SourceRecord {
        sku: "SKU-1".to_string(),
        handle: "linen-shirt".to_string(),
        title: "Linen Shirt".to_string(),
        description: "Breathable summer shirt".to_string(),
        vendor: "Acme".to_string(),
        price: 49.5,
        currency: "USD".to_string(),
        image_url: "https://cdn.example.com/shirt.jpg".to_string(),
        product_url: "https://shop.example.com/products/linen-shirt".to_string(),
        tags: tags.to_string(),
        search_content: "linen shirt summer casual".to_string(),
    }
}

#[test]
fn json_array_tags_are_kept_in_order() {
    assert_eq!(normalize_tags(r#"["a", "b"]"#), vec!["a", "b"]);
}

#[test]
fn comma_tags_are_trimmed_and_empties_dropped() {
    assert_eq!(normalize_tags("a, b ,"), vec!["a", "b"]);
}

#[test]
fn malformed_json_falls_back_to_comma_split() {
    assert_eq!(normalize_tags(r#"["summer", "linen""#), vec![r#"["summer""#, r#""linen""#]);
    assert_eq!(normalize_tags("  summer ,  ,linen   wear  "), vec!["summer", "linen wear"]);
}

#[test]
fn non_array_json_is_wrapped() {
    assert_eq!(normalize_tags(r#""sale""#), vec!["sale"]);
    assert_eq!(normalize_tags("42"), vec!["42"]);
    assert!(normalize_tags("null").is_empty());
    assert!(normalize_tags("   ").is_empty());
}

#[test]
fn normalized_tags_have_no_empty_or_padded_elements() {
    for raw in [r#"["  a  ", "", "b   c", null]"#, "x,,y , ", r#"{"broken": "#, "a, b ,"] {
        for tag in normalize_tags(raw) {
            assert!(!tag.is_empty(), "empty tag from {raw:?}");
            assert_eq!(tag, tag.trim(), "untrimmed tag from {raw:?}");
            assert!(!tag.contains("  "), "double space in tag from {raw:?}");
        }
    }
}

#[test]
fn transform_is_deterministic_and_idempotent() {
    for tags in [r#"["a", "b"]"#, r#"["a", "b""#, "a, b ,"] {
        let src = record(tags);
        let first = transform(&src);
        let second = transform(&src);
        assert_eq!(first, second);
        assert_eq!(first.embedding_text, embedding_text(&src, &first.tags));
        assert!(first.embedding.is_none());
    }
}

#[test]
fn embedding_text_layout() {
    let enriched = transform(&record("summer, linen"));
    assert_eq!(
        enriched.embedding_text,
        "Linen Shirt Breathable summer shirt from Acme. Price: 49.50 USD. Tags: summer, linen. linen shirt summer casual"
    );
}

#[test]
fn embedding_text_skips_empty_parts() {
    let mut src = record("");
    src.description.clear();
    src.search_content = "   ".to_string();
    let enriched = transform(&src);
    assert_eq!(enriched.embedding_text, "Linen Shirt from Acme. Price: 49.50 USD");
    assert!(enriched.tags.is_empty());
}

#[test]
fn embedding_text_present_with_vendor_only() {
    let mut src = record("");
    src.title.clear();
    src.description.clear();
    let enriched = transform(&src);
    assert!(enriched.embedding_text.starts_with("from Acme"));
}

fn config_from(toml: &str) -> PipelineConfig {
    let figment = Figment::from(Serialized::defaults(PipelineConfig::default())).merge(Toml::string(toml));
    Config::from_figment(figment).extract().expect("extract config")
}

#[test]
fn config_defaults_match_documented_values() {
    let cfg = PipelineConfig::default();
    assert_eq!(cfg.mode, SinkMode::Store);
    assert_eq!(cfg.retry.max_attempts, 3);
    assert_eq!(cfg.retry.base_delay_ms, 1_000);
    assert_eq!(cfg.retry.max_delay_ms, 30_000);
    assert_eq!(cfg.batch.size, 50);
    assert_eq!(cfg.batch.concurrency, 1);
    assert!(cfg.store.purge);
    assert_eq!(cfg.file.empty_policy, EmptyExportPolicy::Skip);
}

#[test]
fn config_layers_toml_over_defaults() {
    let cfg = config_from(
        r#"
        mode = "file"
        [source]
        path = "products.db"
        [embedding]
        provider = "hashing"
        [batch]
        size = 25
        delay_ms = 1500
        [file]
        output_path = "out/products.json"
        empty_policy = "write_empty"
        "#,
    );
    assert_eq!(cfg.mode, SinkMode::File);
    assert_eq!(cfg.embedding.provider, ProviderKind::Hashing);
    assert_eq!(cfg.batch.size, 25);
    assert_eq!(cfg.batch.delay_ms, 1500);
    assert_eq!(cfg.batch.progress_every, 10);
    assert_eq!(cfg.source.table, "products");
    assert_eq!(cfg.file.empty_policy, EmptyExportPolicy::WriteEmpty);
    cfg.validate().expect("valid file-mode config without api key");
}

#[test]
fn missing_credential_fails_validation() {
    let cfg = config_from(
        r#"
        [source]
        path = "products.db"
        "#,
    );
    match cfg.validate() {
        Err(Error::InvalidConfig(msg)) => assert!(msg.contains("embedding.api_key")),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn missing_source_fails_validation() {
    let cfg = config_from(
        r#"
        [embedding]
        api_key = "secret"
        "#,
    );
    assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(msg)) if msg.contains("source.path")));
}

#[test]
fn inconsistent_backoff_fails_validation() {
    let cfg = config_from(
        r#"
        [source]
        path = "products.db"
        [embedding]
        api_key = "secret"
        [retry]
        base_delay_ms = 60000
        max_delay_ms = 1000
        "#,
    );
    assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn config_get_reads_nested_keys() {
    let figment = Figment::from(Serialized::defaults(PipelineConfig::default()));
    let config = Config::from_figment(figment);
    let size: usize = config.get("batch.size").expect("batch.size");
    assert_eq!(size, 50);
    assert!(config.get::<usize>("batch.nope").is_err());
}

#[test]
fn explicit_config_file_must_exist() {
    let tmp = tempfile::tempdir().expect("tmp");
    let missing = tmp.path().join("confg.toml");
    match Config::load_with(Some(&missing)) {
        Err(Error::InvalidConfig(msg)) => assert!(msg.contains("confg.toml")),
        Err(other) => panic!("expected InvalidConfig, got {other:?}"),
        Ok(_) => panic!("missing config file was accepted"),
    }
}

#[test]
fn explicit_config_file_is_layered_over_defaults() {
    let tmp = tempfile::tempdir().expect("tmp");
    let path = tmp.path().join("catalog.toml");
    std::fs::write(&path, "[batch]\nprogress_every = 7\n").expect("write config");
    let cfg: PipelineConfig = Config::load_with(Some(&path)).and_then(|c| c.extract()).expect("load");
    assert_eq!(cfg.batch.progress_every, 7);
    assert_eq!(cfg.source.table, "products");
}

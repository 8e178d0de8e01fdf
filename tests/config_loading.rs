// tests/config_loading.rs
use sector_digest::config::{PipelineConfig, ENV_API_KEY, ENV_CONFIG_PATH};
use sector_digest::sectors::SectorCatalog;
use sector_digest::trust::TrustLists;
use std::{env, fs};

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // isolate CWD so the repo's own config/ is not picked up
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_CONFIG_PATH);

    // 1) nothing → defaults
    let c = PipelineConfig::load_default().unwrap();
    assert_eq!(c, PipelineConfig::default());

    // 2) fallback JSON in ./config/
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("pipeline.json"), r#"{"topics_per_run": 4}"#).unwrap();
    assert_eq!(PipelineConfig::load_default().unwrap().topics_per_run, 4);

    // 3) TOML wins over JSON
    fs::write(cfg_dir.join("pipeline.toml"), "topics_per_run = 2\n").unwrap();
    assert_eq!(PipelineConfig::load_default().unwrap().topics_per_run, 2);

    // 4) env var wins over both
    let p_env = tmp.path().join("custom.toml");
    fs::write(&p_env, "articles_per_topic = 7\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    let c = PipelineConfig::load_default().unwrap();
    assert_eq!(c.articles_per_topic, 7);
    assert_eq!(c.topics_per_run, 3);

    // 5) env var pointing nowhere is an error, not a silent fallback
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(PipelineConfig::load_default().is_err());

    env::remove_var(ENV_CONFIG_PATH);
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn api_key_env_placeholder_resolves_from_environment() {
    let cfg = PipelineConfig::default();
    assert_eq!(cfg.api_key, "ENV");

    env::remove_var(ENV_API_KEY);
    assert!(cfg.resolve_api_key().is_err());

    env::set_var(ENV_API_KEY, "pplx-test");
    assert_eq!(cfg.resolve_api_key().unwrap(), "pplx-test");
    env::remove_var(ENV_API_KEY);
}

#[test]
fn catalog_and_trust_overrides_load_from_files() {
    let dir = tempfile::tempdir().unwrap();

    let sectors = dir.path().join("sectors.toml");
    fs::write(
        &sectors,
        r#"
[[sectors]]
name = "Energy"
tags = ["grid", "solar"]

[[sectors]]
name = "Retail"
tags = ["e-commerce"]
enabled = false
"#,
    )
    .unwrap();
    let catalog = SectorCatalog::load_or_seed(Some(sectors.as_path())).unwrap();
    assert_eq!(catalog.enabled_sectors(), vec!["Energy".to_string()]);
    assert_eq!(catalog.tags("Energy").to_vec(), vec!["grid".to_string(), "solar".to_string()]);

    let trust = dir.path().join("trust.json");
    fs::write(&trust, r#"{"allow": ["ft.com"], "deny": ["spam.example"]}"#).unwrap();
    let lists = TrustLists::load_from_file(&trust).unwrap();
    assert_eq!(lists.allow, vec!["ft.com".to_string()]);
    assert_eq!(lists.deny, vec!["spam.example".to_string()]);
}

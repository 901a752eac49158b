//! The sample configuration shipped in `configs/` must stay valid.

use std::path::Path;

use herald::{
    config::{AppConfig, ConfigLoader},
    models::NotificationsSettings,
    settings::EngineConfigBuilder,
    store::{FileResourceStore, ResourceStore},
};

fn config_dir() -> String {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("configs").display().to_string()
}

#[test]
fn test_sample_settings_build() {
    let config = AppConfig::new(Some(&config_dir())).unwrap();
    assert!(config.skip_unrefreshed_operations);

    let settings: NotificationsSettings =
        ConfigLoader::new(config.notifications_config_path.clone()).load().unwrap();
    let engine_config = EngineConfigBuilder::new()
        .annotation_prefix(&config.annotation_prefix)
        .build(&settings)
        .unwrap();

    assert!(engine_config.triggers.contains("on-sync-failed"));
    assert_eq!(engine_config.services.service_type("github"), Some("webhook"));
    assert_eq!(engine_config.default_triggers, vec!["on-sync-failed", "on-deployed"]);
    assert_eq!(engine_config.context["argocdUrl"], "https://argocd.example.com");
}

#[tokio::test]
async fn test_sample_resources_load() {
    let config = AppConfig::new(Some(&config_dir())).unwrap();
    let store = FileResourceStore::new(config.resources_dir);

    let keys = store.list_keys().await.unwrap();
    assert_eq!(keys, vec!["argocd/guestbook".to_string()]);
}

//! Integration tests for tenantry-config

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tenantry_config::*;

#[test]
fn test_env_loader_strips_prefix() {
    let loader = EnvLoader::new(Some("TENANTRY_IT".to_string()));

    unsafe {
        env::set_var("TENANTRY_IT_MAX_CONNECTIONS", "7");
    }

    let vars = loader.load();
    assert_eq!(vars.get("max_connections"), Some(&"7".to_string()));
    assert_eq!(loader.load_var("max_connections").unwrap(), "7");

    unsafe {
        env::remove_var("TENANTRY_IT_MAX_CONNECTIONS");
    }
}

#[test]
fn test_env_values_override_defaults() {
    let vars: HashMap<String, String> = [
        ("database_url", "postgres://db/school"),
        ("max_connections", "25"),
        ("acquire_timeout", "5"),
        ("subdomain_fallback", "off"),
        ("init_default_tenant", "true"),
        ("default_tenant_schema", "school_beta"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let mut config = TenancyConfig::default();
    config.apply_vars(&vars).unwrap();

    assert_eq!(config.database.database_url, "postgres://db/school");
    assert_eq!(config.database.max_connections, 25);
    assert_eq!(config.database.acquire_timeout, Duration::from_secs(5));
    assert!(!config.resolution.subdomain_fallback);
    assert!(config.default_tenant.enabled);
    assert_eq!(config.default_tenant.namespace_name, "school_beta");
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_toml_file() {
    let path = env::temp_dir().join(format!("tenantry-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
[database]
database_url = "postgres://localhost/school"
max_connections = 12
acquire_timeout = 3

[resolution]
tenant_header = "X-School"
global_marker = "admin"

[default_tenant]
enabled = true
public_identifier = "alpha"
"#,
    )
    .unwrap();

    let config = TenancyConfig::from_file(path.to_str().unwrap()).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.database.max_connections, 12);
    assert_eq!(config.database.acquire_timeout, Duration::from_secs(3));
    assert_eq!(config.database.min_connections, 1);
    assert_eq!(config.resolution.tenant_header, "X-School");
    assert_eq!(config.resolution.global_marker, "admin");
    assert!(config.resolution.subdomain_fallback);
    assert_eq!(config.default_tenant.public_identifier, "alpha");
    assert_eq!(config.default_tenant.namespace_name, "school_alpha");
}

#[test]
fn test_unknown_extension() {
    assert!(matches!(ConfigLoader::auto("settings.ini"), Err(ConfigError::LoadError(_))));
    assert!(matches!(ConfigLoader::auto("settings"), Err(ConfigError::LoadError(_))));
}

#[test]
fn test_invalid_values_are_rejected() {
    let mut config = TenancyConfig::default();
    let vars = HashMap::from([("max_connections".to_string(), "many".to_string())]);

    let err = config.apply_vars(&vars).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "max_connections"));

    let toml = r#"
[database]
max_connections = 2
min_connections = 5
"#;
    assert!(matches!(
        TenancyConfig::from_toml_str(toml),
        Err(ConfigError::ValidationError(_))
    ));
}

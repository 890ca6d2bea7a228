//! Configuration layering: defaults, TOML file, environment

use heatpump_bridge::client::FieldKind;
use heatpump_bridge::BridgeConfig;
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::time::Duration;

const CONFIG_TOML: &str = r#"
poll_interval = "5m"

[portal]
app_url = "https://portal.example.com"
identity_url = "https://id.example.com"
device_id = "dev-7"
timeout = "10s"

[portal.endpoints]
telemetry_path = "/api/v2/devices/{device}/telemetry"

[credentials]
username = "owner@example.com"

[logging]
level = "debug"
json_format = true

[[form_fields]]
name = "_FIELD_A"
kind = "numeric"

[[form_fields]]
name = "_MODE"
kind = "select"
"#;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

const NO_ENV: [(&str, Option<&str>); 9] = [
    ("HEATPUMP_APP_URL", None),
    ("HEATPUMP_IDENTITY_URL", None),
    ("HEATPUMP_DEVICE_ID", None),
    ("HEATPUMP_USERNAME", None),
    ("HEATPUMP_PASSWORD", None),
    ("HEATPUMP_CLIENT_ID", None),
    ("HEATPUMP_TIMEOUT", None),
    ("HEATPUMP__PORTAL__DEVICE_ID", None),
    ("RUST_LOG", None),
];

#[test]
#[serial]
fn test_load_from_file() {
    let (_dir, path) = write_config(CONFIG_TOML);

    temp_env::with_vars(NO_ENV, || {
        let config = BridgeConfig::load(Some(&path)).unwrap();

        assert_eq!(config.portal.app_url.as_str(), "https://portal.example.com/");
        assert_eq!(config.portal.identity_url.as_str(), "https://id.example.com/");
        assert_eq!(config.portal.device_id, "dev-7");
        assert_eq!(config.portal.timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert_eq!(config.credentials.username, "owner@example.com");
        assert!(!config.credentials.has_password());
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);

        // Unset endpoint paths keep their defaults
        assert_eq!(
            config.portal.telemetry_url().unwrap().as_str(),
            "https://portal.example.com/api/v2/devices/dev-7/telemetry"
        );
        assert_eq!(config.portal.endpoints.login_path, "/Account/Login");

        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("_MODE").unwrap().kind, FieldKind::Select);

        assert!(config.validate().is_ok());
    });
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let (_dir, path) = write_config(CONFIG_TOML);

    temp_env::with_vars(NO_ENV, || {
        temp_env::with_vars(
            [
                ("HEATPUMP__PORTAL__DEVICE_ID", Some("dev-8")),
                ("HEATPUMP_PASSWORD", Some("from-env")),
                ("HEATPUMP_TIMEOUT", Some("45")),
            ],
            || {
                let config = BridgeConfig::load(Some(&path)).unwrap();
                assert_eq!(config.portal.device_id, "dev-8");
                assert_eq!(config.credentials.password, "from-env");
                assert_eq!(config.portal.timeout, Duration::from_secs(45));
            },
        );
    });
}

#[test]
#[serial]
fn test_from_env_flat_variables() {
    temp_env::with_vars(
        [
            ("HEATPUMP_APP_URL", Some("https://portal.example.com")),
            ("HEATPUMP_IDENTITY_URL", Some("https://id.example.com")),
            ("HEATPUMP_DEVICE_ID", Some("dev-9")),
            ("HEATPUMP_USERNAME", Some("owner@example.com")),
            ("HEATPUMP_PASSWORD", Some("pw")),
            ("HEATPUMP_CLIENT_ID", Some("custom-client")),
            ("HEATPUMP_TIMEOUT", Some("1m")),
        ],
        || {
            let config = BridgeConfig::from_env().unwrap();
            assert_eq!(config.portal.device_id, "dev-9");
            assert_eq!(config.portal.client_id, "custom-client");
            assert_eq!(config.portal.timeout, Duration::from_secs(60));
            assert_eq!(config.credentials.password, "pw");
            // Defaults for everything else
            assert_eq!(config.poll_interval, Duration::from_secs(60));
            assert_eq!(config.catalog().unwrap().len(), 15);
            assert!(config.validate().is_ok());
        },
    );
}

#[test]
#[serial]
fn test_invalid_env_values_are_config_errors() {
    temp_env::with_vars(
        [
            ("HEATPUMP_APP_URL", Some("not a url")),
            ("HEATPUMP_TIMEOUT", None),
        ],
        || {
            let err = BridgeConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("HEATPUMP_APP_URL"));
        },
    );

    temp_env::with_vars(
        [("HEATPUMP_APP_URL", None), ("HEATPUMP_TIMEOUT", Some("soon"))],
        || {
            let err = BridgeConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("HEATPUMP_TIMEOUT"));
        },
    );
}

#[test]
#[serial]
fn test_explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    temp_env::with_vars(NO_ENV, || {
        assert!(BridgeConfig::load(Some(&missing)).is_err());
    });
}

#[test]
#[serial]
fn test_duplicate_form_fields_fail_validation() {
    let (_dir, path) = write_config(
        r#"
[portal]
device_id = "dev-1"

[credentials]
username = "owner"

[[form_fields]]
name = "_A"
kind = "numeric"

[[form_fields]]
name = "_A"
kind = "text"
"#,
    );

    temp_env::with_vars(NO_ENV, || {
        let config = BridgeConfig::load(Some(&path)).unwrap();
        assert!(config.validate().is_err());
    });
}

//! Settings file parsing and conversion into driver configs.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use dbmeta::config::{Settings, SettingsError};

const SAMPLE: &str = r#"
[connections.default]
drivername = "sqlite"
url = "jdbc:sqlite:./data/hr.db"

[connections.warehouse]
libpath = "/opt/drivers/dbmeta-mysql-worker"
drivername = "com.mysql.jdbc.Driver"
url = "jdbc:mysql://${DBMETA_IT_HOST}:3306/test"
user = "root"
password = "${DBMETA_IT_PASSWORD}"

[worker]
timeout_secs = 5
"#;

#[test]
fn test_parse_connections() {
    let settings: Settings = toml::from_str(SAMPLE).unwrap();

    assert_eq!(settings.connections.len(), 2);
    assert_eq!(settings.worker.timeout(), Duration::from_secs(5));

    let (name, default) = settings.default_connection().unwrap();
    assert_eq!(name, "default");
    assert_eq!(default.drivername, "sqlite");
    assert!(default.libpath.is_none());
    assert!(default.user.is_none());
}

#[test]
fn test_to_driver_config_expands_env_vars() {
    env::set_var("DBMETA_IT_HOST", "db.internal");
    env::set_var("DBMETA_IT_PASSWORD", "s3cret");

    let settings: Settings = toml::from_str(SAMPLE).unwrap();
    let config = settings
        .get_connection("warehouse")
        .unwrap()
        .to_driver_config()
        .unwrap();

    assert_eq!(config.drivername, "com.mysql.jdbc.Driver");
    assert_eq!(config.url, "jdbc:mysql://db.internal:3306/test");
    assert_eq!(
        config.libpath,
        Some(PathBuf::from("/opt/drivers/dbmeta-mysql-worker"))
    );
    assert_eq!(config.user.as_deref(), Some("root"));
    assert_eq!(config.password.as_deref(), Some("s3cret"));
    assert!(!format!("{:?}", config).contains("s3cret"));

    env::remove_var("DBMETA_IT_HOST");
    env::remove_var("DBMETA_IT_PASSWORD");
}

#[test]
fn test_missing_env_var_is_reported() {
    let settings: Settings = toml::from_str(
        r#"
        [connections.only]
        drivername = "sqlite"
        url = "jdbc:sqlite:${DBMETA_IT_UNSET_DIR}/hr.db"
        "#,
    )
    .unwrap();

    let (name, connection) = settings.default_connection().unwrap();
    assert_eq!(name, "only");
    assert!(matches!(
        connection.to_driver_config(),
        Err(SettingsError::MissingEnvVar(var)) if var == "DBMETA_IT_UNSET_DIR"
    ));
}

#[test]
fn test_dollar_escape_and_unterminated_reference() {
    let settings: Settings = toml::from_str(
        r#"
        [connections.escaped]
        drivername = "com.mysql.jdbc.Driver"
        url = "jdbc:mysql://localhost:3306/test"
        password = "pa$$word"

        [connections.broken]
        drivername = "com.mysql.jdbc.Driver"
        url = "jdbc:mysql://${DBMETA_IT_HOST:3306/test"
        "#,
    )
    .unwrap();

    let escaped = settings
        .get_connection("escaped")
        .unwrap()
        .to_driver_config()
        .unwrap();
    assert_eq!(escaped.password.as_deref(), Some("pa$word"));

    assert!(matches!(
        settings.get_connection("broken").unwrap().to_driver_config(),
        Err(SettingsError::InvalidSyntax(_))
    ));
}

#[test]
fn test_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dbmeta.toml");
    fs::write(&path, SAMPLE).unwrap();

    let settings = Settings::from_file(&path).unwrap();
    assert!(settings.get_connection("default").is_ok());
    assert!(matches!(
        settings.get_connection("staging"),
        Err(SettingsError::ConnectionNotFound(name)) if name == "staging"
    ));
}

#[test]
fn test_from_file_errors() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("absent.toml");
    assert!(matches!(
        Settings::from_file(&missing),
        Err(SettingsError::FileNotFound(_))
    ));

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[connections.default\ndrivername = ").unwrap();
    assert!(matches!(
        Settings::from_file(&broken),
        Err(SettingsError::ParseError(_))
    ));
}

#[test]
fn test_no_default_among_several() {
    let settings: Settings = toml::from_str(
        r#"
        [connections.a]
        drivername = "sqlite"
        url = "sqlite::memory:"

        [connections.b]
        drivername = "sqlite"
        url = "sqlite::memory:"
        "#,
    )
    .unwrap();

    assert!(settings.default_connection().is_none());
    assert_eq!(settings.worker.timeout(), Duration::from_secs(30));
}

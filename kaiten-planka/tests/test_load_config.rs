use serial_test::serial;
use std::env;
use std::fs::write;
use tempfile::NamedTempFile;

use kaiten_planka::load_config::{load_config, REQUIRED_ENV};

fn set_required_env() {
    env::set_var("KAITEN_URL", "https://team.kaiten.ru/");
    env::set_var("KAITEN_TOKEN", "kaiten-token");
    env::set_var("PLANKA_URL", "http://planka.local:3000//");
    env::set_var("PLANKA_TOKEN", "planka-token");
    env::set_var("ADMIN_EMAIL", "admin@example.com");
    env::set_var("ADMIN_PASSWORD", "adminpw");
}

fn yaml(content: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), content).unwrap();
    file
}

#[test]
#[serial]
fn defaults_apply_without_a_config_file() {
    set_required_env();

    let config = load_config(None).expect("Config should load");

    assert_eq!(config.kaiten.url, "https://team.kaiten.ru");
    assert_eq!(config.planka.url, "http://planka.local:3000");
    assert_eq!(config.kaiten.token, "kaiten-token");
    assert_eq!(config.migration.admin_email, "admin@example.com");
    assert_eq!(config.migration.admin_password, "adminpw");
    assert_eq!(config.migration.default_user_password, "1234tempPass");
    assert_eq!(config.migration.default_user_role, "boardUser");
    assert_eq!(config.migration.concurrency.boards, 4);
    assert_eq!(config.migration.concurrency.columns, 2);
    assert_eq!(config.migration.concurrency.attachments, 3);
    assert_eq!(config.rate_limit.per_second, 4);
    assert_eq!(config.rate_limit.burst, 2);
    assert_eq!(config.http.timeout_secs, 60);
    assert!(!config.migration.teardown);
}

#[test]
#[serial]
fn yaml_tunables_override_defaults() {
    set_required_env();
    let file = yaml(
        r#"
default_user_password: "changeme"
rate_limit:
  per_second: 2
concurrency:
  boards: 1
  cards: 8
http:
  timeout_secs: 5
"#,
    );

    let config = load_config(Some(file.path())).expect("Config should load");

    assert_eq!(config.migration.default_user_password, "changeme");
    assert_eq!(config.migration.default_user_role, "boardUser");
    assert_eq!(config.rate_limit.per_second, 2);
    assert_eq!(config.rate_limit.burst, 2);
    assert_eq!(config.migration.concurrency.boards, 1);
    assert_eq!(config.migration.concurrency.cards, 8);
    assert_eq!(config.migration.concurrency.tags, 5);
    assert_eq!(config.http.timeout_secs, 5);
    assert_eq!(config.http.pool_max_idle_per_host, 16);
}

#[test]
#[serial]
fn empty_file_is_all_defaults() {
    set_required_env();
    let file = yaml("");
    let config = load_config(Some(file.path())).expect("Config should load");
    assert_eq!(config.migration.concurrency.checklist_items, 5);
}

#[test]
#[serial]
fn each_missing_variable_is_named() {
    for name in REQUIRED_ENV {
        set_required_env();
        env::remove_var(name);
        let err = load_config(None).unwrap_err();
        assert!(
            err.to_string().contains(name),
            "error for {name} was: {err}"
        );
    }
}

#[test]
#[serial]
fn blank_variable_counts_as_missing() {
    set_required_env();
    env::set_var("PLANKA_TOKEN", "   ");
    let err = load_config(None).unwrap_err();
    assert!(err.to_string().contains("PLANKA_TOKEN"));
}

#[test]
#[serial]
fn zero_rate_is_rejected() {
    set_required_env();
    let file = yaml("rate_limit:\n  burst: 0\n");
    let err = load_config(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("rate_limit"));
}

#[test]
#[serial]
fn checklist_bound_above_three_is_rejected() {
    set_required_env();
    let file = yaml("concurrency:\n  checklists: 10\n");
    let err = load_config(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("concurrency.checklists must be at most 3"));
}

#[test]
#[serial]
fn malformed_yaml_is_an_error() {
    set_required_env();
    let file = yaml("concurrency: [1, 2\n");
    let err = load_config(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}

use predicates::prelude::*;
use std::io::Write;

fn write_yaml(dir: &tempfile::TempDir, name: &str, body: &str) -> anyhow::Result<String> {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path)?;
    f.write_all(body.as_bytes())?;
    Ok(path.to_string_lossy().into_owned())
}

fn hash_line(out: &[u8]) -> String {
    String::from_utf8_lossy(out)
        .lines()
        .find(|l| l.starts_with("config_hash="))
        .unwrap_or_default()
        .to_string()
}

#[allow(deprecated)]
#[test]
fn config_hash_is_stable_across_key_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let a = write_yaml(
        &dir,
        "a.yaml",
        "sync:\n  anchor_weekday: wednesday\n  deadline_offset_minutes: 45\n",
    )?;
    let b = write_yaml(
        &dir,
        "b.yaml",
        "sync:\n  deadline_offset_minutes: 45\n  anchor_weekday: wednesday\n",
    )?;

    let out_a = assert_cmd::Command::cargo_bin("mpl-cli")?
        .args(["config-hash", &a])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_hash="))
        .get_output()
        .stdout
        .clone();
    let out_b = assert_cmd::Command::cargo_bin("mpl-cli")?
        .args(["config-hash", &b])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(hash_line(&out_a), hash_line(&out_b));
    Ok(())
}

#[allow(deprecated)]
#[test]
fn config_hash_refuses_secret_literals() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let bad = write_yaml(
        &dir,
        "bad.yaml",
        "provider:\n  keys_env:\n    api_key: \"postgres://user:pw@db/mpl\"\n",
    )?;

    assert_cmd::Command::cargo_bin("mpl-cli")?
        .args(["config-hash", &bad])
        .assert()
        .failure();
    Ok(())
}

#[allow(deprecated)]
#[test]
fn window_reports_wednesday_week_and_membership() -> anyhow::Result<()> {
    assert_cmd::Command::cargo_bin("mpl-cli")?
        .args([
            "window",
            "--round-start",
            "2024-08-17T14:00:00Z",
            "--kickoff",
            "2024-08-20T19:45:00Z",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "window_start_utc=2024-08-14T00:00:00+00:00",
        ))
        .stdout(predicate::str::contains(
            "window_end_utc=2024-08-21T00:00:00+00:00",
        ))
        .stdout(predicate::str::contains("belongs=true"));
    Ok(())
}

#[allow(deprecated)]
#[test]
fn window_end_is_exclusive() -> anyhow::Result<()> {
    assert_cmd::Command::cargo_bin("mpl-cli")?
        .args([
            "window",
            "--round-start",
            "2024-08-17T14:00:00Z",
            "--kickoff",
            "2024-08-21T00:00:00Z",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("belongs=false"));
    Ok(())
}

#[allow(deprecated)]
#[test]
fn window_rejects_unknown_time_zone() -> anyhow::Result<()> {
    assert_cmd::Command::cargo_bin("mpl-cli")?
        .args([
            "window",
            "--round-start",
            "2024-08-17T14:00:00Z",
            "--kickoff",
            "2024-08-17T14:00:00Z",
            "--tz",
            "Atlantis/Capital",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid window timezone"));
    Ok(())
}

#[allow(deprecated)]
#[test]
fn sync_without_database_url_fails_cleanly() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = write_yaml(&dir, "base.yaml", "sync:\n  anchor_weekday: wednesday\n")?;

    assert_cmd::Command::cargo_bin("mpl-cli")?
        .current_dir(dir.path())
        .env_remove(mpl_db::ENV_DB_URL)
        .env("MPL_FIXTURES_API_KEY", "test-key")
        .args([
            "sync",
            "season",
            "--season-id",
            "6f1c0c4e-7f52-4b8e-9c0b-0d5c1b2a3e4f",
            "--config",
            &cfg,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MPL_DATABASE_URL"));
    Ok(())
}

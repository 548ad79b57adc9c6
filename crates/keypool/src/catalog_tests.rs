// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::store::Store;

fn temp_store() -> anyhow::Result<(tempfile::TempDir, Store)> {
    let dir = tempfile::tempdir()?;
    let store = Store::new(dir.path().join("pool.db"), Duration::from_secs(5));
    store.init()?;
    Ok((dir, store))
}

fn seed(store: &Store, catalog: &Catalog) -> Result<SeedReport, PoolError> {
    catalog.validate()?;
    store.write(|tx| upsert(tx, catalog, Utc::now()))
}

#[test]
fn parses_camel_case_descriptors() -> anyhow::Result<()> {
    let catalog = Catalog::from_json(
        r#"{
            "openai": [
                {"name": "k1", "secret": "sk-abcdef123", "concurrencyLimit": 2, "rpmLimit": 60,
                 "priority": 5, "tenantScope": ["acme", "globex"]}
            ],
            "kling": [
                {"name": "k2", "secret": {"access_key": "ak", "secret_key": "sk"},
                 "concurrencyLimit": 1, "active": false, "expiresAt": "2030-01-01T00:00:00Z"}
            ]
        }"#,
    )?;
    assert_eq!(catalog.len(), 2);

    let names: Vec<&str> = catalog.providers().map(|(p, _)| p).collect();
    assert_eq!(names, ["kling", "openai"]);
    let (_, openai) = catalog
        .providers()
        .find(|(p, _)| *p == "openai")
        .ok_or_else(|| anyhow::anyhow!("missing provider"))?;
    let k1 = &openai[0];
    assert_eq!(k1.secret.get("api_key"), Some("sk-abcdef123"));
    assert_eq!(k1.rpm_limit, Some(60));
    assert_eq!(k1.priority, 5);
    assert!(k1.tenant_scope.permits("globex"));
    assert!(!k1.tenant_scope.permits("initech"));
    assert!(k1.active);
    Ok(())
}

#[test]
fn unknown_fields_are_rejected() {
    let err = Catalog::from_json(
        r#"{"p": [{"name": "k1", "secret": "x", "concurrencyLimit": 1, "weight": 3}]}"#,
    );
    assert!(matches!(err, Err(PoolError::Config(msg)) if msg.contains("weight")));
}

#[test]
fn missing_secret_is_rejected() {
    let err = Catalog::from_json(r#"{"p": [{"name": "k1", "concurrencyLimit": 3}]}"#);
    assert!(matches!(err, Err(PoolError::Config(msg)) if msg.contains("secret")));
}

fn one(d: CredentialDescriptor) -> Catalog {
    Catalog::new().with("p", d)
}

#[yare::parameterized(
    blank_name     = { one(CredentialDescriptor::new(" ", Secret::api_key("sk-1"), 1)), "name is blank" },
    zero_limit     = { one(CredentialDescriptor::new("k1", Secret::api_key("sk-1"), 0)), "concurrencyLimit" },
    empty_secret   = { one(CredentialDescriptor::new("k1", Secret::new(BTreeMap::new()), 1)), "secret is empty" },
    blank_value    = { one(CredentialDescriptor::new("k1", Secret::api_key("  "), 1)), "is blank" },
    duplicate_name = {
        one(CredentialDescriptor::new("k1", Secret::api_key("a"), 1))
            .with("p", CredentialDescriptor::new("k1", Secret::api_key("b"), 1)),
        "p[1]: duplicate"
    },
)]
fn validate_rejects(catalog: Catalog, needle: &str) {
    match catalog.validate() {
        Err(PoolError::Config(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn seeding_twice_updates_in_place() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    let first = Catalog::from_json(
        r#"{"p": [{"name": "k1", "secret": "sk-one", "concurrencyLimit": 3}]}"#,
    )?;
    let second = Catalog::from_json(
        r#"{"p": [{"name": "k1", "secret": "sk-one", "concurrencyLimit": 5}]}"#,
    )?;

    assert_eq!(seed(&store, &first)?, SeedReport { inserted: 1, updated: 0 });
    let id = store.read(|c| credential_id(c, "p", "k1"))?;
    assert_eq!(seed(&store, &second)?, SeedReport { inserted: 0, updated: 1 });

    let (rows, limit, id_after): (i64, i64, i64) = store.read(|c| {
        Ok(c.query_row(
            "SELECT COUNT(*), MAX(concurrency_limit), MAX(credential_id) FROM credentials",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?)
    })?;
    assert_eq!(rows, 1);
    assert_eq!(limit, 5);
    assert_eq!(Some(id_after), id);
    Ok(())
}

#[test]
fn non_positive_rpm_is_stored_as_unlimited() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    seed(&store, &one(CredentialDescriptor::new("k1", Secret::api_key("sk-1"), 1).rpm_limit(0)))?;
    let rpm: Option<i64> = store.read(|c| {
        Ok(c.query_row("SELECT rpm_limit FROM credentials", [], |r| r.get(0))?)
    })?;
    assert_eq!(rpm, None);
    Ok(())
}

#[test]
fn invalid_catalog_writes_nothing() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    let catalog = one(CredentialDescriptor::new("k1", Secret::api_key("sk-1"), 1))
        .with("p", CredentialDescriptor::new("k2", Secret::api_key("sk-2"), 0));
    assert!(seed(&store, &catalog).is_err());
    let n: i64 =
        store.read(|c| Ok(c.query_row("SELECT COUNT(*) FROM credentials", [], |r| r.get(0))?))?;
    assert_eq!(n, 0);
    Ok(())
}

#[test]
fn load_reads_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("keys.json");
    std::fs::write(&path, r#"{"p": [{"name": "k1", "secret": "sk-1", "concurrencyLimit": 1}]}"#)?;
    assert_eq!(Catalog::load(&path)?.len(), 1);
    assert!(matches!(Catalog::load(&dir.path().join("missing.json")), Err(PoolError::Config(_))));
    Ok(())
}

#[test]
#[serial_test::serial]
fn from_env_reads_inline_json() -> anyhow::Result<()> {
    std::env::set_var(
        CATALOG_ENV,
        r#"{"p": [{"name": "k1", "secret": "sk-1", "concurrencyLimit": 1}]}"#,
    );
    let loaded = Catalog::from_env();
    std::env::remove_var(CATALOG_ENV);
    assert_eq!(loaded?.map(|c| c.len()), Some(1));
    Ok(())
}

#[test]
#[serial_test::serial]
fn from_env_is_none_when_unset() -> anyhow::Result<()> {
    std::env::remove_var(CATALOG_ENV);
    assert!(Catalog::from_env()?.is_none());
    Ok(())
}

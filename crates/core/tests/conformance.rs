//! Runs the configuration fixtures under conformance/: every negative
//! fixture must fail with the category in its `.expected-error.json`, every
//! positive fixture must compile deterministically.

use lineage_core::pass5_upgrade::UpgradeBody;
use lineage_core::{compile, load_config_str, CompileOptions, ConfigFormat};
use std::path::{Path, PathBuf};

fn conformance_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../conformance")
}

fn collect_configs(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let name = p.to_string_lossy();
            (name.ends_with(".json") || name.ends_with(".toml"))
                && !name.contains(".expected-error.")
        })
        .collect();
    paths.sort();
    paths
}

fn load(path: &Path) -> lineage_core::SchemaConfig {
    let text = std::fs::read_to_string(path).unwrap();
    load_config_str(&text, ConfigFormat::from_path(path))
        .unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
}

#[test]
fn negative_fixtures_fail_with_expected_category() {
    let dir = conformance_root().join("negative");
    let mut tested = 0usize;
    let mut failures = Vec::new();

    for path in collect_configs(&dir) {
        let expected_path = path.with_extension("expected-error.json");
        let expected: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&expected_path).unwrap()).unwrap();
        match compile(&load(&path), &CompileOptions::default()) {
            Ok(_) => failures.push(format!("{}: compiled, expected an error", path.display())),
            Err(err) => {
                let actual = err.to_json_value();
                if actual["category"] != expected["category"] {
                    failures.push(format!(
                        "{}: expected {}, got {} ({})",
                        path.display(),
                        expected["category"],
                        actual["category"],
                        err
                    ));
                }
            }
        }
        tested += 1;
    }

    assert!(tested >= 6, "only {} negative fixtures found", tested);
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[test]
fn positive_fixtures_compile_deterministically() {
    let dir = conformance_root().join("positive");
    let paths = collect_configs(&dir);
    assert!(!paths.is_empty());

    for path in paths {
        let cfg = load(&path);
        let sequential = compile(&cfg, &CompileOptions::sequential())
            .unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
        let parallel = compile(&cfg, &CompileOptions { workers: 4 }).unwrap();
        assert_eq!(sequential.to_json(), parallel.to_json(), "{}", path.display());

        for upgrade in &sequential.plan.paths {
            if let UpgradeBody::Record { assignments, .. } = &upgrade.body {
                let target = sequential.graph.resolve(&upgrade.to).unwrap();
                let declared: Vec<&str> = target.fields().iter().map(|f| f.name.as_str()).collect();
                let derived: Vec<&str> = assignments.iter().map(|a| a.field.as_str()).collect();
                assert_eq!(derived, declared, "{}: {}", path.display(), upgrade.from);
            }
        }
    }
}

#[test]
fn users_fixture_versions() {
    let c = compile(
        &load(&conformance_root().join("positive/users.json")),
        &CompileOptions::default(),
    )
    .unwrap();
    for name in ["User", "Team", "Principal", "§User", "-User"] {
        assert_eq!(c.graph.labels(name).unwrap(), vec![0, 1, 2], "{}", name);
    }
    let team = c.graph.node_at("Team", 2).unwrap();
    let names: Vec<&str> = team.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["name", "slug", "members", "lead"]);
    assert_eq!(c.plan.references.len(), 2);
}

#[test]
fn orders_fixture_versions() {
    let c = compile(
        &load(&conformance_root().join("positive/orders.toml")),
        &CompileOptions::default(),
    )
    .unwrap();
    assert_eq!(c.chain.get(0).unwrap().name, "2024-01");
    assert_eq!(c.chain.current().name, "2024-06");
    assert_eq!(c.graph.labels("Line").unwrap(), vec![0, 1, 2]);
    assert_eq!(c.graph.labels("Money").unwrap(), Vec::<usize>::new());
    let order = c.graph.node_at("Order", 2).unwrap();
    let names: Vec<&str> = order.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "amount", "lines"]);
}

//! Integration tests for Arbor
//!
//! These exercise the whole pipeline: scan, convert, collect, resolve,
//! emit, and the incremental entity-map path, across language frontends.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use arbor_analyzer::Analyzer;
use arbor_core::{AnalyzerConfig, CancelToken, EntityMap};
use arbor_graph::MemoryGraphStore;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn analyzer(store: Arc<MemoryGraphStore>) -> Analyzer {
    let config = AnalyzerConfig {
        project_id: "shop".to_string(),
        ..Default::default()
    };
    Analyzer::new(config, store).unwrap()
}

#[tokio::test]
async fn cross_language_project_builds_one_graph() {
    let dir = TempDir::new().unwrap();

    write(
        dir.path(),
        "db/schema.sql",
        "CREATE SCHEMA public;\nCREATE TABLE public.users(id INT NOT NULL, email VARCHAR(255));\n",
    );
    write(
        dir.path(),
        "api/users.py",
        concat!(
            "@app.get(\"/users/{id}\")\n",
            "def get_user(id):\n",
            "    return db.execute(\"SELECT * FROM users WHERE id=?\", id)\n",
        ),
    );
    write(
        dir.path(),
        "web/client.ts",
        concat!(
            "export async function loadUser(id: string) {\n",
            "  const res = await fetch(`/users/${id}`, { method: 'GET' });\n",
            "  return res.json();\n",
            "}\n",
        ),
    );

    let store = Arc::new(MemoryGraphStore::new());
    let analyzer = analyzer(Arc::clone(&store));
    let summary = analyzer
        .analyze_project(dir.path(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(summary.files_analyzed, 3);
    assert_eq!(summary.parse_errors, 0);

    // SQL elements landed with their hierarchy
    assert_eq!(store.node_ids_of_kind("database_schema_definition").len(), 1);
    let tables = store.node_ids_of_kind("database_table");
    assert_eq!(tables.len(), 1);
    assert!(tables[0].ends_with("public.users"));
    assert_eq!(store.node_ids_of_kind("database_column").len(), 2);

    // the Python route exists and the handler is recorded on it
    let routes = store.node_ids_of_kind("api_route_definition");
    assert_eq!(routes.len(), 1);
    let route = store.node(&routes[0]).unwrap();
    assert_eq!(route.properties["httpMethod"], "GET");
    assert_eq!(route.properties["pathPattern"], "/users/{id}");

    // the TS fetch edge binds to that route across languages
    let functions = store.node_ids_of_kind("function");
    let loader = functions
        .iter()
        .find(|id| id.contains("loaduser"))
        .expect("loadUser function node");
    let fetch_edges: Vec<_> = store
        .edges_from(loader)
        .into_iter()
        .filter(|(e, _)| e.edge_type == "API_FETCH")
        .collect();
    assert_eq!(fetch_edges.len(), 1);
    assert_eq!(fetch_edges[0].1, routes[0]);
    assert_eq!(fetch_edges[0].0.properties["urlPattern"], "/users/{var}");

    // the DB query edge binds to the users table and keeps its SQL
    let handlers = store.node_ids_of_kind("function");
    let get_user = handlers
        .iter()
        .find(|id| id.contains("get_user"))
        .expect("get_user node");
    let query_edges: Vec<_> = store
        .edges_from(get_user)
        .into_iter()
        .filter(|(e, _)| e.edge_type == "DATABASE_QUERY")
        .collect();
    assert_eq!(query_edges.len(), 1);
    assert_eq!(query_edges[0].1, tables[0]);
    assert_eq!(
        query_edges[0].0.properties["rawSql"],
        "SELECT * FROM users WHERE id=?"
    );
}

#[tokio::test]
async fn heritage_resolves_to_extends_and_implements() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "src/animal.ts",
        "export class Animal {}\nexport interface IBark { bark(): void; }\n",
    );
    write(
        dir.path(),
        "src/dog.ts",
        "import { Animal, IBark } from './animal';\nexport class Dog extends Animal implements IBark {\n  bark() {}\n}\n",
    );

    let store = Arc::new(MemoryGraphStore::new());
    let analyzer = analyzer(Arc::clone(&store));
    analyzer
        .analyze_project(dir.path(), &CancelToken::new())
        .await
        .unwrap();

    let classes = store.node_ids_of_kind("class");
    let dog = classes.iter().find(|id| id.contains(":dog")).unwrap();
    let out = store.edges_from(dog);
    let extends: Vec<_> = out.iter().filter(|(e, _)| e.edge_type == "EXTENDS").collect();
    let implements: Vec<_> = out
        .iter()
        .filter(|(e, _)| e.edge_type == "IMPLEMENTS")
        .collect();
    assert_eq!(extends.len(), 1);
    assert!(extends[0].1.contains("animal"));
    assert_eq!(implements.len(), 1);
    assert!(implements[0].1.contains("ibark"));

    // the named imports resolved to the sibling file, not placeholders
    let files = store.node_ids_of_kind("file");
    let dog_file = files.iter().find(|id| id.ends_with("src/dog.ts")).unwrap();
    let imports: Vec<_> = store
        .edges_from(dog_file)
        .into_iter()
        .filter(|(e, _)| e.edge_type == "IMPORTS")
        .collect();
    assert_eq!(imports.len(), 1, "both bindings collapse to one edge identity");
    assert!(!imports[0]
        .0
        .properties
        .contains_key("isPlaceholder"));
}

#[tokio::test]
async fn analysis_is_deterministic_across_runs() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "src/a.py",
        "import os\n\nclass Repo:\n    def load(self):\n        return None\n",
    );
    write(
        dir.path(),
        "src/b.py",
        "from a import Repo\n\ndef main():\n    r = Repo()\n    r.load()\n",
    );

    let store_a = Arc::new(MemoryGraphStore::new());
    let first = analyzer(Arc::clone(&store_a));
    first
        .analyze_project(dir.path(), &CancelToken::new())
        .await
        .unwrap();
    let map_a = EntityMap::load(&first.config().cache_dir_under(dir.path())).unwrap();
    let ids_a: Vec<_> = map_a.paths().cloned().collect();
    let a_nodes = store_a.node_count();
    let a_edges = store_a.edge_count();

    // wipe the cache and run again from scratch
    fs::remove_dir_all(first.config().cache_dir_under(dir.path())).unwrap();
    let store_b = Arc::new(MemoryGraphStore::new());
    let second = analyzer(Arc::clone(&store_b));
    second
        .analyze_project(dir.path(), &CancelToken::new())
        .await
        .unwrap();
    let map_b = EntityMap::load(&second.config().cache_dir_under(dir.path())).unwrap();
    let ids_b: Vec<_> = map_b.paths().cloned().collect();

    assert_eq!(ids_a, ids_b);
    assert_eq!(a_nodes, store_b.node_count());
    assert_eq!(a_edges, store_b.edge_count());
    for path in map_a.paths() {
        assert_eq!(map_a.ids_for(path), map_b.ids_for(path));
    }
}

#[tokio::test]
async fn modifying_a_file_removes_only_its_stale_nodes() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "src/keep.ts",
        "export class Keeper { hold() {} }\n",
    );
    write(
        dir.path(),
        "src/edit.ts",
        "export function alpha() {}\nexport function beta() {}\nexport function gamma() {}\n",
    );

    let store = Arc::new(MemoryGraphStore::new());
    let analyzer = analyzer(Arc::clone(&store));
    analyzer
        .analyze_project(dir.path(), &CancelToken::new())
        .await
        .unwrap();

    let map = EntityMap::load(&analyzer.config().cache_dir_under(dir.path())).unwrap();
    let old_edit_ids = map.ids_for("src/edit.ts");
    let keep_ids = map.ids_for("src/keep.ts");
    assert_eq!(old_edit_ids.len(), 4, "file + three functions");

    write(
        dir.path(),
        "src/edit.ts",
        "export function alpha() {}\nexport function delta() {}\n",
    );
    analyzer
        .analyze_file(Path::new("src/edit.ts"), dir.path(), &CancelToken::new())
        .await
        .unwrap();

    let map = EntityMap::load(&analyzer.config().cache_dir_under(dir.path())).unwrap();
    let new_edit_ids = map.ids_for("src/edit.ts");
    assert_eq!(new_edit_ids.len(), 3, "file + alpha + delta");

    for stale in old_edit_ids.iter().filter(|id| !new_edit_ids.contains(id)) {
        assert!(!store.has_node(stale.as_str()), "{stale} should be deleted");
    }
    for kept in keep_ids.iter().chain(&new_edit_ids) {
        assert!(store.has_node(kept.as_str()), "{kept} should survive");
    }
}

#[tokio::test]
async fn unresolved_references_survive_as_placeholders() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "src/app.ts",
        "import React from 'react';\nexport class View extends Component {}\n",
    );

    let store = Arc::new(MemoryGraphStore::new());
    let analyzer = analyzer(Arc::clone(&store));
    analyzer
        .analyze_project(dir.path(), &CancelToken::new())
        .await
        .unwrap();

    let files = store.node_ids_of_kind("file");
    let imports: Vec<_> = store
        .edges_from(&files[0])
        .into_iter()
        .filter(|(e, _)| e.edge_type == "IMPORTS")
        .collect();
    assert_eq!(imports.len(), 1);
    assert_eq!(
        imports[0].0.properties["isPlaceholder"],
        serde_json::Value::Bool(true)
    );
    assert_eq!(imports[0].0.properties["targetPattern"], "react");

    let classes = store.node_ids_of_kind("class");
    let extends: Vec<_> = store
        .edges_from(&classes[0])
        .into_iter()
        .filter(|(e, _)| e.edge_type == "EXTENDS")
        .collect();
    assert_eq!(extends.len(), 1);
    assert_eq!(
        extends[0].0.properties["isPlaceholder"],
        serde_json::Value::Bool(true)
    );
    assert_eq!(extends[0].0.properties["targetPattern"], "Component");
}

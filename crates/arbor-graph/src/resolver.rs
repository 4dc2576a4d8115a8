//! Turns potential relationships into concrete, deduplicated edges.
//!
//! Resolution is symbolic: patterns match element names through the
//! collector's indexes with scope preference (same file, then same
//! directory, then project-wide). Anything that cannot be bound survives
//! as a placeholder edge carrying its original pattern; guessing is worse
//! than a placeholder.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use arbor_core::{
    AnalyzerConfig, AnalyzerError, CancelToken, CanonicalId, EdgeType, ElementKind, ElementPayload,
    IdMinter, IrCollector, IrElement, PotentialRelationship, RelationDetail, RelationKind,
    ResolvedEdge,
};

static SQL_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:FROM|INTO|UPDATE|JOIN)\s+([A-Za-z0-9_."]+)"#).unwrap()
});

/// Fixed processing order; cancellation is checked between kinds.
const KIND_ORDER: &[RelationKind] = &[
    RelationKind::Imports,
    RelationKind::Inherits,
    RelationKind::Implements,
    RelationKind::Calls,
    RelationKind::ApiFetch,
    RelationKind::DatabaseQuery,
    RelationKind::Instantiates,
    RelationKind::UsesAnnotation,
    RelationKind::ReferencesType,
    RelationKind::Reads,
    RelationKind::Writes,
    RelationKind::ReferencesElement,
];

const TYPE_LIKE: &[ElementKind] = &[
    ElementKind::Class,
    ElementKind::Interface,
    ElementKind::Enum,
    ElementKind::TypeAlias,
];

const VALUE_LIKE: &[ElementKind] = &[ElementKind::Variable, ElementKind::Field];

const CALLABLE: &[ElementKind] = &[ElementKind::Function, ElementKind::Method];

/// What a file-scoped import binding points at.
#[derive(Debug, Clone)]
struct ImportBinding {
    module: String,
    imported_name: Option<String>,
}

pub struct Resolver<'a> {
    collector: &'a IrCollector,
    config: &'a AnalyzerConfig,
    minter: IdMinter,
    edges: BTreeMap<(CanonicalId, EdgeType, CanonicalId), ResolvedEdge>,
}

impl<'a> Resolver<'a> {
    pub fn new(collector: &'a IrCollector, config: &'a AnalyzerConfig) -> Self {
        Resolver {
            collector,
            config,
            minter: IdMinter::new(config.project_id.clone()),
            edges: BTreeMap::new(),
        }
    }

    /// Run the full resolution pass. Deterministic: the same collector
    /// state always yields the identical edge set.
    pub fn resolve(mut self, cancel: &CancelToken) -> Result<Vec<ResolvedEdge>, AnalyzerError> {
        self.emit_containment();

        let relationships = self.collector.relationships_by_file();
        let mut files: Vec<&String> = relationships.keys().collect();
        files.sort();

        for kind in KIND_ORDER {
            if cancel.is_cancelled() {
                return Err(AnalyzerError::Cancelled);
            }
            for file in &files {
                let rels = &relationships[file.as_str()];
                let bindings = self.import_bindings(rels);
                for rel in rels.iter().filter(|r| r.kind() == *kind) {
                    self.resolve_one(file.as_str(), rel, &bindings);
                }
            }
        }

        Ok(self.edges.into_values().collect())
    }

    // ── Containment ─────────────────────────────────────────

    /// `CONTAINS` edges cover exactly the links `parentId` does not:
    /// file -> top-level element, and package -> file.
    fn emit_containment(&mut self) {
        let mut elements: Vec<&IrElement> = self.collector.elements().collect();
        elements.sort_by(|a, b| a.id.cmp(&b.id));

        for element in elements {
            match &element.payload {
                ElementPayload::File { module, .. } => {
                    if let Some(module) = module {
                        if let Some(package) = self.find_package(module) {
                            let package_id = package.id.clone();
                            self.add_edge(
                                package_id,
                                EdgeType::Contains,
                                element.id.clone(),
                                BTreeMap::new(),
                                false,
                                None,
                            );
                        }
                    }
                }
                ElementPayload::Package => {}
                _ => {
                    if element.parent_id.is_none() {
                        if let Some(file) = self.collector.file_element(&element.file_path) {
                            let file_id = file.id.clone();
                            self.add_edge(
                                file_id,
                                EdgeType::Contains,
                                element.id.clone(),
                                BTreeMap::new(),
                                false,
                                None,
                            );
                        }
                    }
                }
            }
        }
    }

    fn find_package(&self, name: &str) -> Option<&'a IrElement> {
        let simple = simple_of(name);
        self.collector
            .by_name(ElementKind::Package, &simple)
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    // ── Dispatch ────────────────────────────────────────────

    fn resolve_one(
        &mut self,
        file: &str,
        rel: &PotentialRelationship,
        bindings: &HashMap<String, ImportBinding>,
    ) {
        match rel.kind() {
            RelationKind::Imports => self.resolve_import(file, rel),
            RelationKind::Inherits | RelationKind::Implements => self.resolve_heritage(file, rel),
            RelationKind::Calls => self.resolve_call(file, rel, bindings),
            RelationKind::ApiFetch => self.resolve_api_fetch(rel),
            RelationKind::DatabaseQuery => self.resolve_database_query(rel),
            RelationKind::Instantiates => self.resolve_by_name(
                file,
                rel,
                &[ElementKind::Class],
                ElementKind::Class,
                EdgeType::Instantiates,
            ),
            RelationKind::UsesAnnotation => self.resolve_by_name(
                file,
                rel,
                &[ElementKind::AnnotationDefinition],
                ElementKind::AnnotationDefinition,
                EdgeType::UsesAnnotation,
            ),
            RelationKind::ReferencesType => self.resolve_by_name(
                file,
                rel,
                TYPE_LIKE,
                ElementKind::Class,
                EdgeType::ReferencesType,
            ),
            RelationKind::Reads => self.resolve_by_name(
                file,
                rel,
                VALUE_LIKE,
                ElementKind::Variable,
                EdgeType::Reads,
            ),
            RelationKind::Writes => self.resolve_by_name(
                file,
                rel,
                VALUE_LIKE,
                ElementKind::Variable,
                EdgeType::Writes,
            ),
            RelationKind::ReferencesElement => self.resolve_by_name(
                file,
                rel,
                &[
                    ElementKind::Class,
                    ElementKind::Interface,
                    ElementKind::Enum,
                    ElementKind::TypeAlias,
                    ElementKind::Function,
                    ElementKind::Method,
                    ElementKind::Variable,
                    ElementKind::Field,
                    ElementKind::Module,
                    ElementKind::Package,
                ],
                ElementKind::GenericElement,
                EdgeType::ReferencesElement,
            ),
        }
    }

    // ── Imports ─────────────────────────────────────────────

    fn resolve_import(&mut self, file: &str, rel: &PotentialRelationship) {
        let RelationDetail::Imports {
            module_specifier, ..
        } = &rel.detail
        else {
            return;
        };
        let properties = self.base_properties(rel);

        // (a) relative specifiers resolve against the importing file's
        // directory; bare names carrying a supported extension (C headers)
        // get the same treatment
        let relative = module_specifier.starts_with("./")
            || module_specifier.starts_with("../")
            || self.has_supported_extension(module_specifier);
        if relative {
            let base = join_relative(parent_dir(file), module_specifier);
            if let Some(target) = self.try_path_candidates(&base) {
                let target_id = target.id.clone();
                self.add_edge(
                    rel.source_id.clone(),
                    EdgeType::Imports,
                    target_id,
                    properties,
                    false,
                    None,
                );
                return;
            }
            if module_specifier.starts_with("./") || module_specifier.starts_with("../") {
                let placeholder = self.minter.mint(ElementKind::Module, &base);
                self.add_edge(
                    rel.source_id.clone(),
                    EdgeType::Imports,
                    placeholder,
                    properties,
                    true,
                    Some("import path did not match any analyzed file".to_string()),
                );
                return;
            }
            // extension-bearing bare names fall through to the alias and
            // external rules below
        }

        // (b) path aliases, longest prefix first
        let mut aliases: Vec<(&String, &String)> = self.config.path_aliases.iter().collect();
        aliases.sort_by_key(|(prefix, _)| std::cmp::Reverse(prefix.len()));
        for (prefix, directory) in aliases {
            if let Some(rest) = module_specifier.strip_prefix(prefix.as_str()) {
                let base = join_relative(directory.trim_end_matches('/'), rest);
                if let Some(target) = self.try_path_candidates(&base) {
                    let target_id = target.id.clone();
                    self.add_edge(
                        rel.source_id.clone(),
                        EdgeType::Imports,
                        target_id,
                        properties,
                        false,
                        None,
                    );
                } else {
                    let placeholder = self.minter.mint(ElementKind::Module, &base);
                    self.add_edge(
                        rel.source_id.clone(),
                        EdgeType::Imports,
                        placeholder,
                        properties,
                        true,
                        Some("alias path did not match any analyzed file".to_string()),
                    );
                }
                return;
            }
        }

        // (c) external module
        let placeholder = self.minter.mint(ElementKind::Module, module_specifier);
        self.add_edge(
            rel.source_id.clone(),
            EdgeType::Imports,
            placeholder,
            properties,
            true,
            Some("external module".to_string()),
        );
    }

    fn has_supported_extension(&self, specifier: &str) -> bool {
        specifier
            .rsplit_once('.')
            .is_some_and(|(_, ext)| self.config.supports_extension(ext))
    }

    /// Probe `base`, `base.<ext>`, then `base/index.<ext>` in the
    /// configured extension order.
    fn try_path_candidates(&self, base: &str) -> Option<&'a IrElement> {
        if let Some(found) = self.collector.file_element(base) {
            return Some(found);
        }
        for ext in &self.config.supported_extensions {
            let ext = ext.trim_start_matches('.');
            if let Some(found) = self.collector.file_element(&format!("{base}.{ext}")) {
                return Some(found);
            }
        }
        for ext in &self.config.supported_extensions {
            let ext = ext.trim_start_matches('.');
            if let Some(found) = self.collector.file_element(&format!("{base}/index.{ext}")) {
                return Some(found);
            }
        }
        None
    }

    fn import_bindings(&self, rels: &[PotentialRelationship]) -> HashMap<String, ImportBinding> {
        let mut bindings = HashMap::new();
        for rel in rels {
            let RelationDetail::Imports {
                module_specifier,
                imported_entity_name,
                alias,
                is_side_effect,
            } = &rel.detail
            else {
                continue;
            };
            if *is_side_effect {
                continue;
            }
            let binding = ImportBinding {
                module: module_specifier.clone(),
                imported_name: imported_entity_name.clone(),
            };
            if let Some(alias) = alias {
                bindings.insert(alias.clone(), binding);
            } else if let Some(name) = imported_entity_name {
                if name != "*" && name != "default" {
                    bindings.insert(name.clone(), binding);
                }
            } else if let Some(last) = module_specifier.rsplit(['.', '/']).next() {
                bindings.insert(last.to_string(), binding);
            }
        }
        bindings
    }

    // ── Heritage ────────────────────────────────────────────

    /// The final edge type follows the resolved base: a class base is
    /// `EXTENDS`, an interface base `IMPLEMENTS`.
    fn resolve_heritage(&mut self, file: &str, rel: &PotentialRelationship) {
        let properties = self.base_properties(rel);
        let found = self.lookup(
            &[ElementKind::Class, ElementKind::Interface],
            &rel.target_pattern,
            file,
        );
        match found {
            Some(target) => {
                let edge_type = if target.kind() == ElementKind::Interface {
                    EdgeType::Implements
                } else {
                    EdgeType::Extends
                };
                let target_id = target.id.clone();
                self.add_edge(
                    rel.source_id.clone(),
                    edge_type,
                    target_id,
                    properties,
                    false,
                    None,
                );
            }
            None => {
                let (edge_type, placeholder_kind) = match rel.kind() {
                    RelationKind::Implements => {
                        (EdgeType::Implements, ElementKind::Interface)
                    }
                    _ => (EdgeType::Extends, ElementKind::Class),
                };
                let placeholder = self.minter.mint(placeholder_kind, &rel.target_pattern);
                self.add_edge(
                    rel.source_id.clone(),
                    edge_type,
                    placeholder,
                    properties,
                    true,
                    Some("base type not found in project".to_string()),
                );
            }
        }
    }

    // ── Calls ───────────────────────────────────────────────

    fn resolve_call(
        &mut self,
        file: &str,
        rel: &PotentialRelationship,
        bindings: &HashMap<String, ImportBinding>,
    ) {
        let properties = self.base_properties(rel);
        let pattern = &rel.target_pattern;

        // (1) a callable in the source file's lexical scope
        if let Some(target) = self.lookup_in_file(CALLABLE, pattern, file) {
            let target_id = target.id.clone();
            self.add_edge(
                rel.source_id.clone(),
                EdgeType::Calls,
                target_id,
                properties,
                false,
                None,
            );
            return;
        }

        // (2) an import alias mapping to another module's symbol
        let head = pattern.split(['.', ':']).next().unwrap_or(pattern);
        let tail = pattern.rsplit(['.', ':']).next().unwrap_or(pattern);
        if let Some(binding) = bindings.get(head) {
            let symbol = if head == tail {
                binding.imported_name.as_deref().unwrap_or(tail)
            } else {
                tail
            };
            if let Some(module_file) = self.module_file(file, &binding.module) {
                let path = module_file.file_path.clone();
                if let Some(target) = self.lookup_in_file(CALLABLE, symbol, &path) {
                    let target_id = target.id.clone();
                    self.add_edge(
                        rel.source_id.clone(),
                        EdgeType::Calls,
                        target_id,
                        properties,
                        false,
                        None,
                    );
                    return;
                }
            }
            let placeholder = self
                .minter
                .mint(ElementKind::Function, &format!("{}.{symbol}", binding.module));
            self.add_edge(
                rel.source_id.clone(),
                EdgeType::Calls,
                placeholder,
                properties,
                true,
                Some("call through external import".to_string()),
            );
            return;
        }

        // (3) unresolved; keep the pattern
        let placeholder = self.minter.mint(ElementKind::Function, pattern);
        self.add_edge(
            rel.source_id.clone(),
            EdgeType::Calls,
            placeholder,
            properties,
            true,
            Some("no callable matched pattern".to_string()),
        );
    }

    fn module_file(&self, from_file: &str, specifier: &str) -> Option<&'a IrElement> {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let base = join_relative(parent_dir(from_file), specifier);
            return self.try_path_candidates(&base);
        }
        None
    }

    // ── API and database edges ──────────────────────────────

    /// The edge keeps its raw url pattern either way; a matching route
    /// element upgrades the target from placeholder to the route.
    fn resolve_api_fetch(&mut self, rel: &PotentialRelationship) {
        let RelationDetail::ApiFetch {
            http_method,
            url_pattern,
            ..
        } = &rel.detail
        else {
            return;
        };
        let properties = self.base_properties(rel);

        let mut routes: Vec<&IrElement> = self
            .collector
            .elements()
            .filter(|e| e.kind() == ElementKind::ApiRouteDefinition)
            .collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));

        let matched = routes.into_iter().find(|route| {
            let ElementPayload::ApiRouteDefinition {
                http_method: route_method,
                path_pattern,
                ..
            } = &route.payload
            else {
                return false;
            };
            route_method.eq_ignore_ascii_case(http_method)
                && url_matches_route(url_pattern, path_pattern)
        });

        match matched {
            Some(route) => {
                let target_id = route.id.clone();
                self.add_edge(
                    rel.source_id.clone(),
                    EdgeType::ApiFetch,
                    target_id,
                    properties,
                    false,
                    None,
                );
            }
            None => {
                let placeholder = self.minter.mint(
                    ElementKind::ApiRouteDefinition,
                    &format!("{http_method}:{url_pattern}"),
                );
                self.add_edge(
                    rel.source_id.clone(),
                    EdgeType::ApiFetch,
                    placeholder,
                    properties,
                    true,
                    Some("no matching route definition".to_string()),
                );
            }
        }
    }

    /// Database queries bind to every table the SQL names that exists as
    /// an element; the raw SQL rides on the edge regardless.
    fn resolve_database_query(&mut self, rel: &PotentialRelationship) {
        let RelationDetail::DatabaseQuery { raw_sql } = &rel.detail else {
            return;
        };
        let properties = self.base_properties(rel);

        let mut bound = false;
        for capture in SQL_TABLE_RE.captures_iter(raw_sql) {
            let table_ref = capture[1].replace('"', "");
            if let Some(table) = self.find_table(&table_ref) {
                let target_id = table.id.clone();
                self.add_edge(
                    rel.source_id.clone(),
                    EdgeType::DatabaseQuery,
                    target_id,
                    properties.clone(),
                    false,
                    None,
                );
                bound = true;
            }
        }
        if bound {
            return;
        }

        let fragment = SQL_TABLE_RE
            .captures(raw_sql)
            .map(|c| c[1].replace('"', ""))
            .unwrap_or_else(|| truncate(raw_sql, 80).to_string());
        let placeholder = self.minter.mint(ElementKind::DatabaseTable, &fragment);
        self.add_edge(
            rel.source_id.clone(),
            EdgeType::DatabaseQuery,
            placeholder,
            properties,
            true,
            Some("query does not name an analyzed table".to_string()),
        );
    }

    fn find_table(&self, table_ref: &str) -> Option<&'a IrElement> {
        let simple = simple_of(table_ref);
        let candidates = self.collector.by_name(ElementKind::DatabaseTable, &simple);
        if table_ref.contains('.') {
            let qualified = table_ref.to_ascii_lowercase();
            candidates
                .into_iter()
                .find(|e| e.id.as_str().ends_with(&qualified))
        } else {
            candidates.into_iter().next()
        }
    }

    // ── Shared symbolic lookup ──────────────────────────────

    fn resolve_by_name(
        &mut self,
        file: &str,
        rel: &PotentialRelationship,
        kinds: &[ElementKind],
        placeholder_kind: ElementKind,
        edge_type: EdgeType,
    ) {
        let properties = self.base_properties(rel);
        match self.lookup(kinds, &rel.target_pattern, file) {
            Some(target) => {
                let target_id = target.id.clone();
                self.add_edge(
                    rel.source_id.clone(),
                    edge_type,
                    target_id,
                    properties,
                    false,
                    None,
                );
            }
            None => {
                let placeholder = self.minter.mint(placeholder_kind, &rel.target_pattern);
                self.add_edge(
                    rel.source_id.clone(),
                    edge_type,
                    placeholder,
                    properties,
                    true,
                    Some("no element matched pattern".to_string()),
                );
            }
        }
    }

    /// Name lookup with scope preference: same file, then same directory,
    /// then project-wide; ambiguity falls to the smallest id.
    fn lookup(&self, kinds: &[ElementKind], pattern: &str, from_file: &str) -> Option<&'a IrElement> {
        let simple = simple_of(pattern);
        let mut candidates: Vec<&IrElement> = kinds
            .iter()
            .flat_map(|kind| self.collector.by_name(*kind, &simple))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        if pattern.contains('.') || pattern.contains("::") {
            let qualified = arbor_core::normalize_fragment(pattern).replace("::", ".");
            let qualified_matches: Vec<&IrElement> = candidates
                .iter()
                .copied()
                .filter(|e| e.id.as_str().contains(&qualified))
                .collect();
            if !qualified_matches.is_empty() {
                candidates = qualified_matches;
            }
        }
        let dir = parent_dir(from_file);
        let rank = |e: &IrElement| -> u8 {
            if e.file_path == from_file {
                0
            } else if parent_dir(&e.file_path) == dir {
                1
            } else {
                2
            }
        };
        candidates.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.id.cmp(&b.id)));
        candidates.into_iter().next()
    }

    fn lookup_in_file(
        &self,
        kinds: &[ElementKind],
        pattern: &str,
        file: &str,
    ) -> Option<&'a IrElement> {
        self.lookup(kinds, pattern, file)
            .filter(|e| e.file_path == file)
    }

    // ── Edge assembly ───────────────────────────────────────

    fn base_properties(&self, rel: &PotentialRelationship) -> BTreeMap<String, Value> {
        let mut properties = BTreeMap::new();
        if let Ok(Value::Object(map)) = serde_json::to_value(&rel.detail) {
            for (key, value) in map {
                if key != "kind" && !value.is_null() {
                    properties.insert(key, value);
                }
            }
        }
        properties.insert(
            "line".to_string(),
            Value::from(rel.location.start_line),
        );
        properties.insert(
            "targetPattern".to_string(),
            Value::from(rel.target_pattern.clone()),
        );
        properties
    }

    fn add_edge(
        &mut self,
        source_id: CanonicalId,
        edge_type: EdgeType,
        target_id: CanonicalId,
        properties: BTreeMap<String, Value>,
        is_placeholder: bool,
        resolution_hint: Option<String>,
    ) {
        use std::collections::btree_map::Entry;

        let key = (source_id.clone(), edge_type, target_id.clone());
        match self.edges.entry(key) {
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                merge_properties(&mut existing.properties, properties);
                // a concrete sighting outranks a placeholder record
                if existing.is_placeholder && !is_placeholder {
                    existing.is_placeholder = false;
                    existing.resolution_hint = None;
                }
            }
            Entry::Vacant(slot) => {
                let id = self.minter.mint_relationship(&source_id, edge_type, &target_id);
                slot.insert(ResolvedEdge {
                    id,
                    source_id,
                    edge_type,
                    target_id,
                    properties,
                    is_placeholder,
                    resolution_hint,
                });
            }
        }
    }
}

/// Merge incoming edge properties: scalars take the latest value, arrays
/// union element-wise.
fn merge_properties(existing: &mut BTreeMap<String, Value>, incoming: BTreeMap<String, Value>) {
    use std::collections::btree_map::Entry;

    for (key, value) in incoming {
        match existing.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), value) {
                (Value::Array(current), Value::Array(new_items)) => {
                    for item in new_items {
                        if !current.contains(&item) {
                            current.push(item);
                        }
                    }
                }
                (slot_value, value) => {
                    *slot_value = value;
                }
            },
        }
    }
}

fn simple_of(pattern: &str) -> String {
    pattern
        .trim_start_matches('@')
        .rsplit(['.', ':', '/'])
        .next()
        .unwrap_or(pattern)
        .to_string()
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Join a relative specifier onto a directory, folding `.` and `..`.
fn join_relative(dir: &str, specifier: &str) -> String {
    let mut segments: Vec<&str> = if dir.is_empty() {
        vec![]
    } else {
        dir.split('/').collect()
    };
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Segment-wise URL match: literal segments compare equal, `{…}` matches
/// any `{…}`.
fn url_matches_route(url: &str, route: &str) -> bool {
    let normalize = |s: &str| -> Vec<String> {
        s.trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    };
    let url_segments = normalize(url);
    let route_segments = normalize(route);
    if url_segments.len() != route_segments.len() {
        return false;
    }
    url_segments.iter().zip(&route_segments).all(|(a, b)| {
        let a_var = a.starts_with('{') && a.ends_with('}');
        let b_var = b.starts_with('{') && b.ends_with('}');
        (a_var && b_var) || a.eq_ignore_ascii_case(b)
    })
}

//! Aggregation of per-file IRs into the project-wide element index.

use std::collections::{BTreeSet, HashMap};

use crate::model::{
    CanonicalId, ElementKind, FileIr, IrElement, PotentialRelationship, SourceLanguage,
};

/// Aggregates [`FileIr`] values and maintains the indexes the resolver
/// matches against.
///
/// Elements deduplicate by canonical id with a last-writer-wins policy;
/// potential relationships are kept as-is; uniqueness of materialized
/// edges belongs to the resolver.
#[derive(Debug, Default)]
pub struct IrCollector {
    by_id: HashMap<CanonicalId, IrElement>,
    by_kind_name: HashMap<(ElementKind, String), BTreeSet<CanonicalId>>,
    by_file: HashMap<String, BTreeSet<CanonicalId>>,
    relationships_by_file: HashMap<String, Vec<PotentialRelationship>>,
    languages_by_file: HashMap<String, SourceLanguage>,
    conversion_errors: usize,
}

impl IrCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one file's IR, replacing anything previously collected for
    /// the same path.
    pub fn ingest(&mut self, ir: FileIr) {
        self.remove_file(&ir.file_path);
        self.conversion_errors += ir.errors.len();
        self.languages_by_file
            .insert(ir.file_path.clone(), ir.language);
        for element in ir.elements {
            self.insert_element(element);
        }
        self.relationships_by_file
            .insert(ir.file_path, ir.potential_relationships);
    }

    fn insert_element(&mut self, element: IrElement) {
        let id = element.id.clone();
        if let Some(previous) = self.by_id.remove(&id) {
            self.unindex(&previous);
        }
        self.by_kind_name
            .entry((element.kind(), element.simple_name()))
            .or_default()
            .insert(id.clone());
        self.by_file
            .entry(element.file_path.clone())
            .or_default()
            .insert(id.clone());
        self.by_id.insert(id, element);
    }

    fn unindex(&mut self, element: &IrElement) {
        if let Some(set) = self
            .by_kind_name
            .get_mut(&(element.kind(), element.simple_name()))
        {
            set.remove(&element.id);
        }
        if let Some(set) = self.by_file.get_mut(&element.file_path) {
            set.remove(&element.id);
        }
    }

    /// Drop everything collected for a file path.
    pub fn remove_file(&mut self, file_path: &str) {
        if let Some(ids) = self.by_file.remove(file_path) {
            for id in ids {
                if let Some(element) = self.by_id.remove(&id) {
                    if let Some(set) = self
                        .by_kind_name
                        .get_mut(&(element.kind(), element.simple_name()))
                    {
                        set.remove(&element.id);
                    }
                }
            }
        }
        self.relationships_by_file.remove(file_path);
        self.languages_by_file.remove(file_path);
    }

    pub fn element(&self, id: &CanonicalId) -> Option<&IrElement> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &CanonicalId) -> bool {
        self.by_id.contains_key(id)
    }

    /// All elements of `kind` whose simple name equals `name`
    /// (case-insensitive), in stable id order.
    pub fn by_name(&self, kind: ElementKind, name: &str) -> Vec<&IrElement> {
        self.by_kind_name
            .get(&(kind, name.to_ascii_lowercase()))
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// Canonical ids of all elements produced for a file, in stable order.
    pub fn ids_for_file(&self, file_path: &str) -> Vec<CanonicalId> {
        self.by_file
            .get(file_path)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn files(&self) -> impl Iterator<Item = &String> {
        self.by_file.keys()
    }

    pub fn elements(&self) -> impl Iterator<Item = &IrElement> {
        self.by_id.values()
    }

    pub fn element_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn language_of(&self, file_path: &str) -> Option<SourceLanguage> {
        self.languages_by_file.get(file_path).copied()
    }

    /// Relationships grouped per source file. The grouping matters: import
    /// alias tables are file-scoped.
    pub fn relationships_by_file(&self) -> &HashMap<String, Vec<PotentialRelationship>> {
        &self.relationships_by_file
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships_by_file.values().map(Vec::len).sum()
    }

    /// Conversion errors accumulated across all ingested files.
    pub fn conversion_error_count(&self) -> usize {
        self.conversion_errors
    }

    /// Find the file element whose project-relative path matches `path`
    /// (case-insensitive, `/`-separated).
    pub fn file_element(&self, path: &str) -> Option<&IrElement> {
        let wanted = path.replace('\\', "/").to_ascii_lowercase();
        let ids = self.by_file.get(&wanted).or_else(|| {
            self.by_file
                .iter()
                .find(|(k, _)| k.to_ascii_lowercase() == wanted)
                .map(|(_, v)| v)
        })?;
        ids.iter()
            .filter_map(|id| self.by_id.get(id))
            .find(|e| e.kind() == ElementKind::File)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdMinter;
    use crate::model::{ElementPayload, SourceSpan, IR_SCHEMA_VERSION};

    fn file_ir(path: &str, elements: Vec<IrElement>) -> FileIr {
        let minter = IdMinter::new("demo");
        FileIr {
            schema_version: IR_SCHEMA_VERSION.to_string(),
            project_id: "demo".to_string(),
            file_id: minter.mint_file(path),
            file_path: path.to_string(),
            language: SourceLanguage::TypeScript,
            elements,
            potential_relationships: vec![],
            errors: vec![],
        }
    }

    fn class_element(path: &str, name: &str) -> IrElement {
        let minter = IdMinter::new("demo");
        IrElement {
            id: minter.mint(ElementKind::Class, &format!("{path}:{name}")),
            name: name.to_string(),
            file_path: path.to_string(),
            location: SourceSpan::line(1),
            parent_id: None,
            payload: ElementPayload::Class {
                is_abstract: false,
                is_exported: false,
            },
            tags: vec![],
        }
    }

    #[test]
    fn dedup_is_last_writer_wins() {
        let mut collector = IrCollector::new();
        let mut first = class_element("src/a.ts", "User");
        first.tags = vec!["old".to_string()];
        let mut second = class_element("src/a.ts", "User");
        second.tags = vec!["new".to_string()];

        collector.ingest(file_ir("src/a.ts", vec![first]));
        collector.ingest(file_ir("src/a.ts", vec![second.clone()]));

        assert_eq!(collector.element_count(), 1);
        assert_eq!(collector.element(&second.id).unwrap().tags, vec!["new"]);
    }

    #[test]
    fn name_index_finds_elements_case_insensitively() {
        let mut collector = IrCollector::new();
        collector.ingest(file_ir("src/a.ts", vec![class_element("src/a.ts", "User")]));

        let found = collector.by_name(ElementKind::Class, "user");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "User");
        assert!(collector.by_name(ElementKind::Interface, "user").is_empty());
    }

    #[test]
    fn reingest_replaces_file_scope() {
        let mut collector = IrCollector::new();
        collector.ingest(file_ir(
            "src/a.ts",
            vec![
                class_element("src/a.ts", "User"),
                class_element("src/a.ts", "Account"),
            ],
        ));
        collector.ingest(file_ir("src/a.ts", vec![class_element("src/a.ts", "User")]));

        assert_eq!(collector.element_count(), 1);
        assert!(collector.by_name(ElementKind::Class, "account").is_empty());
        assert_eq!(collector.ids_for_file("src/a.ts").len(), 1);
    }
}

//! Shared walk scaffolding: id allocation, the container stack, and the
//! FileIr assembly buffer every frontend writes into.

use std::collections::HashSet;

use tree_sitter::Node;

use arbor_core::{
    CanonicalId, ElementKind, ElementPayload, FileIr, IdMinter, IrElement, IrError, IrErrorKind,
    Parameter, PotentialRelationship, RelationDetail, SourceLanguage, SourceSpan,
    IR_SCHEMA_VERSION,
};

/// Maximum recursion depth for tree traversal. Deeply nested literals stop
/// contributing elements past this point instead of overflowing the stack.
pub const MAX_WALK_DEPTH: usize = 400;

/// 1-based line / 0-based column span of a node.
pub fn span_of(node: &Node) -> SourceSpan {
    SourceSpan {
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        start_col: node.start_position().column as u32,
        end_col: node.end_position().column as u32,
    }
}

/// UTF-8 text of a node, empty on decode failure.
pub fn text_of<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// One frame of the container stack.
#[derive(Debug, Clone)]
struct Scope {
    id: CanonicalId,
    qualified: String,
}

/// Accumulates one file's IR during a walk.
///
/// The builder owns the container stack: walkers push a scope when they
/// enter a class/interface/function and pop on subtree completion, so
/// nested elements pick up `parent_id` and qualified names without
/// position lookups.
pub struct FileIrBuilder {
    minter: IdMinter,
    project_id: String,
    file_path: String,
    language: SourceLanguage,
    file_id: CanonicalId,
    elements: Vec<IrElement>,
    relationships: Vec<PotentialRelationship>,
    errors: Vec<IrError>,
    used_ids: HashSet<CanonicalId>,
    scopes: Vec<Scope>,
}

impl FileIrBuilder {
    /// Create the builder and its File element at the module level.
    pub fn new(
        ctx: &crate::frontend::FrontendContext,
        file_path: &str,
        language: SourceLanguage,
        loc: u32,
    ) -> Self {
        let minter = ctx.minter.clone();
        let file_id = minter.mint_file(file_path);
        let name = file_path
            .rsplit('/')
            .next()
            .unwrap_or(file_path)
            .to_string();
        let file_element = IrElement {
            id: file_id.clone(),
            name,
            file_path: file_path.to_string(),
            location: SourceSpan::line(1),
            parent_id: None,
            payload: ElementPayload::File {
                language,
                loc,
                module: None,
            },
            tags: vec![],
        };
        let mut used_ids = HashSet::new();
        used_ids.insert(file_id.clone());
        FileIrBuilder {
            minter,
            project_id: ctx.project_id.clone(),
            file_path: file_path.to_string(),
            language,
            file_id: file_id.clone(),
            elements: vec![file_element],
            relationships: vec![],
            errors: vec![],
            used_ids,
            scopes: vec![],
        }
    }

    pub fn file_id(&self) -> &CanonicalId {
        &self.file_id
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn minter(&self) -> &IdMinter {
        &self.minter
    }

    /// Dot-join `name` onto the enclosing type/function qualifiers.
    pub fn qualify(&self, name: &str) -> String {
        match self.scopes.last() {
            Some(scope) => format!("{}.{}", scope.qualified, name),
            None => name.to_string(),
        }
    }

    /// Id of the innermost container, if any. Top-level elements have no
    /// parent id; their containment is the File `CONTAINS` edge emitted
    /// later.
    pub fn parent_id(&self) -> Option<CanonicalId> {
        self.scopes.last().map(|s| s.id.clone())
    }

    /// Source element for relationships observed at the current position:
    /// the innermost scope, or the file itself at module level.
    pub fn scope_source(&self) -> CanonicalId {
        self.scopes
            .last()
            .map(|s| s.id.clone())
            .unwrap_or_else(|| self.file_id.clone())
    }

    /// Mint an id for `<file_path>:<qualified_name>`, disambiguating
    /// same-name definitions within the file by a start-line suffix.
    pub fn mint_scoped(&mut self, kind: ElementKind, qualified: &str, start_line: u32) -> CanonicalId {
        let fragment = format!("{}:{}", self.file_path, qualified);
        let id = self.minter.mint(kind, &fragment);
        self.claim(kind, id, &fragment, start_line)
    }

    /// Mint an id for a callable: `<file_path>:<qualified>(<sig>)` where
    /// the signature uses parameter types when present and names otherwise.
    pub fn mint_callable(
        &mut self,
        kind: ElementKind,
        qualified: &str,
        parameters: &[Parameter],
        start_line: u32,
    ) -> CanonicalId {
        let signature: Vec<&str> = parameters
            .iter()
            .map(|p| p.type_name.as_deref().unwrap_or(p.name.as_str()))
            .collect();
        let fragment = format!("{}:{}({})", self.file_path, qualified, signature.join(","));
        let id = self.minter.mint(kind, &fragment);
        self.claim(kind, id, &fragment, start_line)
    }

    /// Mint a project-scoped id (routes, tables: no file in the fragment).
    pub fn mint_global(&mut self, kind: ElementKind, fragment: &str, start_line: u32) -> CanonicalId {
        let id = self.minter.mint(kind, fragment);
        self.claim(kind, id, fragment, start_line)
    }

    fn claim(
        &mut self,
        kind: ElementKind,
        id: CanonicalId,
        fragment: &str,
        start_line: u32,
    ) -> CanonicalId {
        if !self.used_ids.contains(&id) {
            self.used_ids.insert(id.clone());
            return id;
        }
        let suffixed = self
            .minter
            .mint(kind, &format!("{fragment}:{start_line}"));
        self.used_ids.insert(suffixed.clone());
        suffixed
    }

    pub fn add_element(&mut self, element: IrElement) {
        self.elements.push(element);
    }

    /// Record the declared package/namespace name on the File element.
    pub fn set_module(&mut self, module: impl Into<String>) {
        if let ElementPayload::File {
            module: slot @ None,
            ..
        } = &mut self.elements[0].payload
        {
            *slot = Some(module.into());
        }
    }

    /// Push a container scope. Callers pair this with [`Self::exit_scope`]
    /// on subtree completion.
    pub fn enter_scope(&mut self, id: CanonicalId, qualified: impl Into<String>) {
        self.scopes.push(Scope {
            id,
            qualified: qualified.into(),
        });
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn relate(
        &mut self,
        source_id: CanonicalId,
        target_pattern: impl Into<String>,
        location: SourceSpan,
        detail: RelationDetail,
    ) {
        self.relationships.push(PotentialRelationship {
            source_id,
            target_pattern: target_pattern.into(),
            location,
            detail,
        });
    }

    pub fn parse_error(&mut self, message: impl Into<String>) {
        self.errors.push(IrError {
            kind: IrErrorKind::Parse,
            message: message.into(),
            line: None,
        });
    }

    pub fn conversion_error(&mut self, message: impl Into<String>, line: Option<u32>) {
        self.errors.push(IrError {
            kind: IrErrorKind::Conversion,
            message: message.into(),
            line,
        });
    }

    pub fn finish(self) -> FileIr {
        FileIr {
            schema_version: IR_SCHEMA_VERSION.to_string(),
            project_id: self.project_id,
            file_id: self.file_id,
            file_path: self.file_path,
            language: self.language,
            elements: self.elements,
            potential_relationships: self.relationships,
            errors: self.errors,
        }
    }

    /// A FileIr with no elements at all, for files whose parse failed.
    pub fn failed(
        ctx: &crate::frontend::FrontendContext,
        file_path: &str,
        language: SourceLanguage,
        message: impl Into<String>,
    ) -> FileIr {
        FileIr {
            schema_version: IR_SCHEMA_VERSION.to_string(),
            project_id: ctx.project_id.clone(),
            file_id: ctx.minter.mint_file(file_path),
            file_path: file_path.to_string(),
            language,
            elements: vec![],
            potential_relationships: vec![],
            errors: vec![IrError {
                kind: IrErrorKind::Parse,
                message: message.into(),
                line: None,
            }],
        }
    }
}

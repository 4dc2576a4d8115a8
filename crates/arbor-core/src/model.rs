//! Core data structures for the intermediate representation and the
//! resolved graph vocabulary.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Version string embedded in every [`FileIr`].
pub const IR_SCHEMA_VERSION: &str = "1.0";

/// Project-wide deterministic identifier for an element.
///
/// Format: `arbor://<project>/<kind>:<fragment>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct CanonicalId(pub String);

impl CanonicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CanonicalId {
    fn from(value: String) -> Self {
        CanonicalId(value)
    }
}

impl From<&str> for CanonicalId {
    fn from(value: &str) -> Self {
        CanonicalId(value.to_string())
    }
}

/// Languages the frontends can lower into IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLanguage {
    TypeScript,
    Tsx,
    Python,
    Java,
    CSharp,
    C,
    Cpp,
    Go,
    Sql,
    Unknown,
}

impl SourceLanguage {
    /// Detect language from a file extension (without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "ts" | "js" => SourceLanguage::TypeScript,
            "tsx" | "jsx" => SourceLanguage::Tsx,
            "py" => SourceLanguage::Python,
            "java" => SourceLanguage::Java,
            "cs" => SourceLanguage::CSharp,
            "c" | "h" => SourceLanguage::C,
            "cpp" | "hpp" | "cc" | "hh" => SourceLanguage::Cpp,
            "go" => SourceLanguage::Go,
            "sql" => SourceLanguage::Sql,
            _ => SourceLanguage::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceLanguage::TypeScript => "typescript",
            SourceLanguage::Tsx => "tsx",
            SourceLanguage::Python => "python",
            SourceLanguage::Java => "java",
            SourceLanguage::CSharp => "csharp",
            SourceLanguage::C => "c",
            SourceLanguage::Cpp => "cpp",
            SourceLanguage::Go => "go",
            SourceLanguage::Sql => "sql",
            SourceLanguage::Unknown => "unknown",
        }
    }
}

/// Where an element or relationship appears in source.
///
/// Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpan {
    pub start_line: u32,
    pub end_line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl SourceSpan {
    pub fn line(line: u32) -> Self {
        SourceSpan {
            start_line: line,
            end_line: line,
            start_col: 0,
            end_col: 0,
        }
    }
}

/// A declared parameter of a callable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl Parameter {
    pub fn untyped(name: impl Into<String>) -> Self {
        Parameter {
            name: name.into(),
            type_name: None,
        }
    }

    pub fn typed(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Parameter {
            name: name.into(),
            type_name: Some(type_name.into()),
        }
    }
}

/// Discriminates what kind of code entity an element represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    File,
    Module,
    Package,
    Class,
    Interface,
    Enum,
    Function,
    Method,
    Variable,
    Field,
    TypeAlias,
    AnnotationDefinition,
    ApiRouteDefinition,
    DatabaseSchemaDefinition,
    DatabaseTable,
    DatabaseView,
    DatabaseColumn,
    DatabaseFunction,
    DatabaseProcedure,
    GenericElement,
}

impl ElementKind {
    /// Stable snake_case form used inside canonical ids and node labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::File => "file",
            ElementKind::Module => "module",
            ElementKind::Package => "package",
            ElementKind::Class => "class",
            ElementKind::Interface => "interface",
            ElementKind::Enum => "enum",
            ElementKind::Function => "function",
            ElementKind::Method => "method",
            ElementKind::Variable => "variable",
            ElementKind::Field => "field",
            ElementKind::TypeAlias => "type_alias",
            ElementKind::AnnotationDefinition => "annotation_definition",
            ElementKind::ApiRouteDefinition => "api_route_definition",
            ElementKind::DatabaseSchemaDefinition => "database_schema_definition",
            ElementKind::DatabaseTable => "database_table",
            ElementKind::DatabaseView => "database_view",
            ElementKind::DatabaseColumn => "database_column",
            ElementKind::DatabaseFunction => "database_function",
            ElementKind::DatabaseProcedure => "database_procedure",
            ElementKind::GenericElement => "generic_element",
        }
    }

    /// True for kinds the resolver treats as type-like when matching
    /// `ReferencesType` patterns.
    pub fn is_type_like(&self) -> bool {
        matches!(
            self,
            ElementKind::Class | ElementKind::Interface | ElementKind::Enum | ElementKind::TypeAlias
        )
    }
}

/// Kind-specific properties, discriminated by element kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementPayload {
    #[serde(rename_all = "camelCase")]
    File {
        language: SourceLanguage,
        loc: u32,
        /// Declared package/namespace/module name, when the language has one.
        #[serde(skip_serializing_if = "Option::is_none")]
        module: Option<String>,
    },
    Module,
    Package,
    #[serde(rename_all = "camelCase")]
    Class {
        #[serde(default)]
        is_abstract: bool,
        #[serde(default)]
        is_exported: bool,
    },
    #[serde(rename_all = "camelCase")]
    Interface {
        #[serde(default)]
        is_exported: bool,
    },
    #[serde(rename_all = "camelCase")]
    Enum {
        #[serde(default)]
        variants: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Function {
        parameters: Vec<Parameter>,
        #[serde(skip_serializing_if = "Option::is_none")]
        return_type: Option<String>,
        #[serde(default)]
        is_async: bool,
        #[serde(default)]
        is_exported: bool,
    },
    #[serde(rename_all = "camelCase")]
    Method {
        parameters: Vec<Parameter>,
        #[serde(skip_serializing_if = "Option::is_none")]
        return_type: Option<String>,
        #[serde(default)]
        is_async: bool,
        #[serde(default)]
        is_static: bool,
        /// Implicit receiver excluded from `parameters` (Python `self`/`cls`).
        #[serde(skip_serializing_if = "Option::is_none")]
        receiver: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        receiver_position: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Variable {
        #[serde(skip_serializing_if = "Option::is_none")]
        declared_type: Option<String>,
        #[serde(default)]
        is_const: bool,
    },
    #[serde(rename_all = "camelCase")]
    Field {
        #[serde(skip_serializing_if = "Option::is_none")]
        declared_type: Option<String>,
        #[serde(default)]
        is_static: bool,
    },
    #[serde(rename_all = "camelCase")]
    TypeAlias {
        #[serde(skip_serializing_if = "Option::is_none")]
        aliased_type: Option<String>,
    },
    AnnotationDefinition,
    #[serde(rename_all = "camelCase")]
    ApiRouteDefinition {
        http_method: String,
        path_pattern: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        handler_id: Option<CanonicalId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        framework: Option<String>,
    },
    DatabaseSchemaDefinition,
    #[serde(rename_all = "camelCase")]
    DatabaseTable { schema: String },
    #[serde(rename_all = "camelCase")]
    DatabaseView { schema: String },
    #[serde(rename_all = "camelCase")]
    DatabaseColumn {
        #[serde(skip_serializing_if = "Option::is_none")]
        data_type: Option<String>,
        #[serde(default)]
        nullable: bool,
    },
    DatabaseFunction,
    DatabaseProcedure,
    #[serde(rename_all = "camelCase")]
    GenericElement {
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl ElementPayload {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementPayload::File { .. } => ElementKind::File,
            ElementPayload::Module => ElementKind::Module,
            ElementPayload::Package => ElementKind::Package,
            ElementPayload::Class { .. } => ElementKind::Class,
            ElementPayload::Interface { .. } => ElementKind::Interface,
            ElementPayload::Enum { .. } => ElementKind::Enum,
            ElementPayload::Function { .. } => ElementKind::Function,
            ElementPayload::Method { .. } => ElementKind::Method,
            ElementPayload::Variable { .. } => ElementKind::Variable,
            ElementPayload::Field { .. } => ElementKind::Field,
            ElementPayload::TypeAlias { .. } => ElementKind::TypeAlias,
            ElementPayload::AnnotationDefinition => ElementKind::AnnotationDefinition,
            ElementPayload::ApiRouteDefinition { .. } => ElementKind::ApiRouteDefinition,
            ElementPayload::DatabaseSchemaDefinition => ElementKind::DatabaseSchemaDefinition,
            ElementPayload::DatabaseTable { .. } => ElementKind::DatabaseTable,
            ElementPayload::DatabaseView { .. } => ElementKind::DatabaseView,
            ElementPayload::DatabaseColumn { .. } => ElementKind::DatabaseColumn,
            ElementPayload::DatabaseFunction => ElementKind::DatabaseFunction,
            ElementPayload::DatabaseProcedure => ElementKind::DatabaseProcedure,
            ElementPayload::GenericElement { .. } => ElementKind::GenericElement,
        }
    }
}

/// A single node candidate in the IR of one file.
///
/// Equality and hashing are on `id` alone; two elements with the same
/// canonical id are the same entity regardless of payload drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IrElement {
    pub id: CanonicalId,
    pub name: String,
    pub file_path: String,
    pub location: SourceSpan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CanonicalId>,
    #[serde(flatten)]
    pub payload: ElementPayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl IrElement {
    pub fn kind(&self) -> ElementKind {
        self.payload.kind()
    }

    /// Name without any qualifier, lowercased for index lookups.
    pub fn simple_name(&self) -> String {
        self.name
            .rsplit(['.', ':'])
            .next()
            .unwrap_or(&self.name)
            .to_ascii_lowercase()
    }
}

impl PartialEq for IrElement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for IrElement {}

impl Hash for IrElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Unresolved reference observed by a frontend, awaiting resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Imports,
    Calls,
    ApiFetch,
    DatabaseQuery,
    Inherits,
    Implements,
    Instantiates,
    Reads,
    Writes,
    UsesAnnotation,
    ReferencesType,
    ReferencesElement,
}

/// Kind-specific relationship properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationDetail {
    #[serde(rename_all = "camelCase")]
    Imports {
        module_specifier: String,
        /// `"default"`, `"*"`, or a named binding. `None` for side-effect
        /// imports.
        #[serde(skip_serializing_if = "Option::is_none")]
        imported_entity_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        #[serde(default)]
        is_side_effect: bool,
    },
    #[serde(rename_all = "camelCase")]
    Calls {
        #[serde(skip_serializing_if = "Option::is_none")]
        receiver: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ApiFetch {
        http_method: String,
        url_pattern: String,
        framework: String,
    },
    #[serde(rename_all = "camelCase")]
    DatabaseQuery { raw_sql: String },
    Inherits,
    Implements,
    Instantiates,
    Reads,
    Writes,
    #[serde(rename_all = "camelCase")]
    UsesAnnotation {
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },
    ReferencesType,
    ReferencesElement,
}

impl RelationDetail {
    pub fn kind(&self) -> RelationKind {
        match self {
            RelationDetail::Imports { .. } => RelationKind::Imports,
            RelationDetail::Calls { .. } => RelationKind::Calls,
            RelationDetail::ApiFetch { .. } => RelationKind::ApiFetch,
            RelationDetail::DatabaseQuery { .. } => RelationKind::DatabaseQuery,
            RelationDetail::Inherits => RelationKind::Inherits,
            RelationDetail::Implements => RelationKind::Implements,
            RelationDetail::Instantiates => RelationKind::Instantiates,
            RelationDetail::Reads => RelationKind::Reads,
            RelationDetail::Writes => RelationKind::Writes,
            RelationDetail::UsesAnnotation { .. } => RelationKind::UsesAnnotation,
            RelationDetail::ReferencesType => RelationKind::ReferencesType,
            RelationDetail::ReferencesElement => RelationKind::ReferencesElement,
        }
    }
}

/// An edge candidate produced by a frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PotentialRelationship {
    pub source_id: CanonicalId,
    /// Human-readable name of the target (`"./utils"`, `"User"`,
    /// `"axios.get"`, `"public.users"`, …).
    pub target_pattern: String,
    pub location: SourceSpan,
    #[serde(flatten)]
    pub detail: RelationDetail,
}

impl PotentialRelationship {
    pub fn kind(&self) -> RelationKind {
        self.detail.kind()
    }
}

/// Class of a recoverable per-file problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrErrorKind {
    /// The parser produced no usable tree; the file contributed no elements.
    Parse,
    /// One construct could not be lowered; the walk continued past it.
    Conversion,
}

/// A recoverable problem recorded during a walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IrError {
    pub kind: IrErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// The IR produced for a single source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIr {
    pub schema_version: String,
    pub project_id: String,
    pub file_id: CanonicalId,
    pub file_path: String,
    pub language: SourceLanguage,
    pub elements: Vec<IrElement>,
    pub potential_relationships: Vec<PotentialRelationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<IrError>,
}

/// Concrete edge type after resolution, uppercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeType {
    #[serde(rename = "CONTAINS")]
    Contains,
    #[serde(rename = "IMPORTS")]
    Imports,
    #[serde(rename = "CALLS")]
    Calls,
    #[serde(rename = "API_FETCH")]
    ApiFetch,
    #[serde(rename = "DATABASE_QUERY")]
    DatabaseQuery,
    #[serde(rename = "EXTENDS")]
    Extends,
    #[serde(rename = "IMPLEMENTS")]
    Implements,
    #[serde(rename = "INSTANTIATES")]
    Instantiates,
    #[serde(rename = "READS")]
    Reads,
    #[serde(rename = "WRITES")]
    Writes,
    #[serde(rename = "USES_ANNOTATION")]
    UsesAnnotation,
    #[serde(rename = "REFERENCES_TYPE")]
    ReferencesType,
    #[serde(rename = "REFERENCES_ELEMENT")]
    ReferencesElement,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Contains => "CONTAINS",
            EdgeType::Imports => "IMPORTS",
            EdgeType::Calls => "CALLS",
            EdgeType::ApiFetch => "API_FETCH",
            EdgeType::DatabaseQuery => "DATABASE_QUERY",
            EdgeType::Extends => "EXTENDS",
            EdgeType::Implements => "IMPLEMENTS",
            EdgeType::Instantiates => "INSTANTIATES",
            EdgeType::Reads => "READS",
            EdgeType::Writes => "WRITES",
            EdgeType::UsesAnnotation => "USES_ANNOTATION",
            EdgeType::ReferencesType => "REFERENCES_TYPE",
            EdgeType::ReferencesElement => "REFERENCES_ELEMENT",
        }
    }

    /// Default edge type for a relationship kind. `Inherits` may still be
    /// flipped to `IMPLEMENTS` (and vice versa) once the target kind is known.
    pub fn from_relation(kind: RelationKind) -> Self {
        match kind {
            RelationKind::Imports => EdgeType::Imports,
            RelationKind::Calls => EdgeType::Calls,
            RelationKind::ApiFetch => EdgeType::ApiFetch,
            RelationKind::DatabaseQuery => EdgeType::DatabaseQuery,
            RelationKind::Inherits => EdgeType::Extends,
            RelationKind::Implements => EdgeType::Implements,
            RelationKind::Instantiates => EdgeType::Instantiates,
            RelationKind::Reads => EdgeType::Reads,
            RelationKind::Writes => EdgeType::Writes,
            RelationKind::UsesAnnotation => EdgeType::UsesAnnotation,
            RelationKind::ReferencesType => EdgeType::ReferencesType,
            RelationKind::ReferencesElement => EdgeType::ReferencesElement,
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolver output: a concrete, deduplicated edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEdge {
    /// `<sourceId>:<TYPE>:<targetId>`.
    pub id: String,
    pub source_id: CanonicalId,
    pub edge_type: EdgeType,
    pub target_id: CanonicalId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub is_placeholder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_hint: Option<String>,
}

impl ResolvedEdge {
    /// Identity triple the resolver and store key on.
    pub fn identity(&self) -> (CanonicalId, EdgeType, CanonicalId) {
        (self.source_id.clone(), self.edge_type, self.target_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_detection_matches_extension_table() {
        let cases = [
            ("ts", SourceLanguage::TypeScript),
            ("js", SourceLanguage::TypeScript),
            ("tsx", SourceLanguage::Tsx),
            ("jsx", SourceLanguage::Tsx),
            ("py", SourceLanguage::Python),
            ("java", SourceLanguage::Java),
            ("cs", SourceLanguage::CSharp),
            ("c", SourceLanguage::C),
            ("h", SourceLanguage::C),
            ("cpp", SourceLanguage::Cpp),
            ("hh", SourceLanguage::Cpp),
            ("go", SourceLanguage::Go),
            ("sql", SourceLanguage::Sql),
            ("xyz", SourceLanguage::Unknown),
        ];
        for (ext, expected) in cases {
            assert_eq!(SourceLanguage::from_extension(ext), expected, "ext {ext}");
        }
    }

    #[test]
    fn element_equality_is_id_only() {
        let a = IrElement {
            id: CanonicalId::from("arbor://p/function:src/a.ts:foo()"),
            name: "foo".to_string(),
            file_path: "src/a.ts".to_string(),
            location: SourceSpan::line(1),
            parent_id: None,
            payload: ElementPayload::Function {
                parameters: vec![],
                return_type: None,
                is_async: false,
                is_exported: false,
            },
            tags: vec![],
        };
        let mut b = a.clone();
        b.name = "renamed".to_string();
        b.payload = ElementPayload::Function {
            parameters: vec![Parameter::untyped("x")],
            return_type: Some("number".to_string()),
            is_async: true,
            is_exported: true,
        };
        assert_eq!(a, b);
    }

    #[test]
    fn payload_serializes_with_kind_tag_and_camel_case() {
        let payload = ElementPayload::ApiRouteDefinition {
            http_method: "GET".to_string(),
            path_pattern: "/users/{id}".to_string(),
            handler_id: None,
            framework: Some("flask".to_string()),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "api_route_definition");
        assert_eq!(json["httpMethod"], "GET");
        assert_eq!(json["pathPattern"], "/users/{id}");
    }

    #[test]
    fn relation_detail_kind_roundtrip() {
        let detail = RelationDetail::Imports {
            module_specifier: "react".to_string(),
            imported_entity_name: Some("default".to_string()),
            alias: Some("React".to_string()),
            is_side_effect: false,
        };
        assert_eq!(detail.kind(), RelationKind::Imports);
        let json = serde_json::to_string(&detail).unwrap();
        let back: RelationDetail = serde_json::from_str(&json).unwrap();
        assert_eq!(back, detail);
    }

    #[test]
    fn edge_type_strings_are_uppercase() {
        assert_eq!(EdgeType::ApiFetch.as_str(), "API_FETCH");
        assert_eq!(EdgeType::from_relation(RelationKind::Inherits), EdgeType::Extends);
        assert_eq!(
            EdgeType::from_relation(RelationKind::Implements),
            EdgeType::Implements
        );
    }

    #[test]
    fn simple_name_strips_qualifiers() {
        let el = IrElement {
            id: CanonicalId::from("arbor://p/method:src/a.ts:dog.bark()"),
            name: "Dog.bark".to_string(),
            file_path: "src/a.ts".to_string(),
            location: SourceSpan::line(3),
            parent_id: None,
            payload: ElementPayload::Method {
                parameters: vec![],
                return_type: None,
                is_async: false,
                is_static: false,
                receiver: None,
                receiver_position: None,
            },
            tags: vec![],
        };
        assert_eq!(el.simple_name(), "bark");
    }
}

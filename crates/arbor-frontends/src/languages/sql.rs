//! SQL frontend.
//!
//! No grammar compatible with this tree-sitter generation parses SQL, so
//! DDL is scanned at statement level. Unqualified names default to the
//! `public` schema; columns inherit their table's canonical id as parent.

use std::sync::LazyLock;

use regex::Regex;

use arbor_core::{
    CanonicalId, ElementKind, ElementPayload, FileIr, IrElement, RelationDetail, SourceLanguage,
    SourceSpan,
};

use crate::frontend::{FileSource, FrontendContext, LanguageFrontend};
use crate::walk::FileIrBuilder;

pub const DEFAULT_SCHEMA: &str = "public";

static SCHEMA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*CREATE\s+SCHEMA\s+(?:IF\s+NOT\s+EXISTS\s+)?"?([A-Za-z0-9_]+)"?"#)
        .unwrap()
});
static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^\s*CREATE\s+(?:TEMP(?:ORARY)?\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?([A-Za-z0-9_."]+)\s*\("#,
    )
    .unwrap()
});
static VIEW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^\s*CREATE\s+(?:OR\s+REPLACE\s+)?(?:MATERIALIZED\s+)?VIEW\s+([A-Za-z0-9_."]+)"#,
    )
    .unwrap()
});
static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*CREATE\s+(?:OR\s+REPLACE\s+)?FUNCTION\s+([A-Za-z0-9_."]+)"#).unwrap()
});
static PROCEDURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*CREATE\s+(?:OR\s+REPLACE\s+)?PROCEDURE\s+([A-Za-z0-9_."]+)"#).unwrap()
});
static DML_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(SELECT|INSERT|UPDATE|DELETE|MERGE)\b").unwrap());

/// Keywords that start a table-level constraint instead of a column.
const CONSTRAINT_STARTERS: &[&str] = &[
    "PRIMARY", "FOREIGN", "UNIQUE", "CONSTRAINT", "CHECK", "KEY", "INDEX", "EXCLUDE", "LIKE",
];

/// Keywords that end the type portion of a column definition.
const TYPE_TERMINATORS: &[&str] = &[
    "NOT", "NULL", "DEFAULT", "PRIMARY", "REFERENCES", "UNIQUE", "CHECK", "GENERATED", "CONSTRAINT",
];

pub struct SqlFrontend;

impl SqlFrontend {
    pub fn new() -> Self {
        SqlFrontend
    }
}

impl Default for SqlFrontend {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageFrontend for SqlFrontend {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::Sql
    }

    fn convert_to_ir(&self, source: &FileSource, ctx: &FrontendContext) -> FileIr {
        let text = source.text().into_owned();
        let loc = text.lines().count() as u32;
        let mut builder = FileIrBuilder::new(ctx, &source.relative_path, SourceLanguage::Sql, loc);

        for statement in split_statements(&text) {
            convert_statement(&mut builder, &statement);
        }

        builder.finish()
    }
}

struct Statement {
    text: String,
    start_line: u32,
}

/// Split on `;` outside of quotes, keeping 1-based start lines.
fn split_statements(text: &str) -> Vec<Statement> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut line = 1u32;
    let mut start_line = 1u32;
    let mut in_string: Option<char> = None;

    for c in text.chars() {
        match in_string {
            Some(quote) => {
                current.push(c);
                if c == quote {
                    in_string = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    current.push(c);
                    in_string = Some(c);
                }
                ';' => {
                    if !current.trim().is_empty() {
                        out.push(Statement {
                            text: current.trim().to_string(),
                            start_line,
                        });
                    }
                    current.clear();
                    start_line = line;
                }
                _ => {
                    if current.trim().is_empty() && !c.is_whitespace() {
                        start_line = line;
                    }
                    current.push(c);
                }
            },
        }
        if c == '\n' {
            line += 1;
        }
    }
    if !current.trim().is_empty() {
        out.push(Statement {
            text: current.trim().to_string(),
            start_line,
        });
    }
    out
}

fn convert_statement(b: &mut FileIrBuilder, statement: &Statement) {
    let text = &statement.text;
    let location = SourceSpan::line(statement.start_line);

    if let Some(captures) = SCHEMA_RE.captures(text) {
        let name = captures[1].to_string();
        let id = b.mint_global(
            ElementKind::DatabaseSchemaDefinition,
            &name,
            statement.start_line,
        );
        b.add_element(IrElement {
            id,
            name,
            file_path: b.file_path().to_string(),
            location,
            parent_id: None,
            payload: ElementPayload::DatabaseSchemaDefinition,
            tags: vec![],
        });
    } else if let Some(captures) = TABLE_RE.captures(text) {
        let (schema, table) = split_qualified(&captures[1]);
        let table_id = add_relation_element(
            b,
            ElementKind::DatabaseTable,
            &schema,
            &table,
            statement.start_line,
            location,
        );
        if let Some(body) = column_body(text) {
            for column in split_columns(&body) {
                add_column(b, &schema, &table, &table_id, &column, statement.start_line);
            }
        }
    } else if let Some(captures) = VIEW_RE.captures(text) {
        let (schema, view) = split_qualified(&captures[1]);
        add_relation_element(
            b,
            ElementKind::DatabaseView,
            &schema,
            &view,
            statement.start_line,
            location,
        );
    } else if let Some(captures) = FUNCTION_RE.captures(text) {
        let (schema, name) = split_qualified(&captures[1]);
        let id = b.mint_global(
            ElementKind::DatabaseFunction,
            &format!("{schema}.{name}"),
            statement.start_line,
        );
        b.add_element(IrElement {
            id,
            name,
            file_path: b.file_path().to_string(),
            location,
            parent_id: None,
            payload: ElementPayload::DatabaseFunction,
            tags: vec![],
        });
    } else if let Some(captures) = PROCEDURE_RE.captures(text) {
        let (schema, name) = split_qualified(&captures[1]);
        let id = b.mint_global(
            ElementKind::DatabaseProcedure,
            &format!("{schema}.{name}"),
            statement.start_line,
        );
        b.add_element(IrElement {
            id,
            name,
            file_path: b.file_path().to_string(),
            location,
            parent_id: None,
            payload: ElementPayload::DatabaseProcedure,
            tags: vec![],
        });
    } else if DML_RE.is_match(text) {
        // seed data and migration DML read as queries issued by the file
        b.relate(
            b.file_id().clone(),
            text.clone(),
            location,
            RelationDetail::DatabaseQuery {
                raw_sql: text.clone(),
            },
        );
    }
}

fn add_relation_element(
    b: &mut FileIrBuilder,
    kind: ElementKind,
    schema: &str,
    name: &str,
    start_line: u32,
    location: SourceSpan,
) -> CanonicalId {
    let id = b.mint_global(kind, &format!("{schema}.{name}"), start_line);
    let payload = match kind {
        ElementKind::DatabaseView => ElementPayload::DatabaseView {
            schema: schema.to_string(),
        },
        _ => ElementPayload::DatabaseTable {
            schema: schema.to_string(),
        },
    };
    b.add_element(IrElement {
        id: id.clone(),
        name: name.to_string(),
        file_path: b.file_path().to_string(),
        location,
        parent_id: None,
        payload,
        tags: vec![],
    });
    id
}

fn add_column(
    b: &mut FileIrBuilder,
    schema: &str,
    table: &str,
    table_id: &CanonicalId,
    definition: &str,
    start_line: u32,
) {
    let mut tokens = definition.split_whitespace();
    let Some(first) = tokens.next() else { return };
    let name = first.trim_matches('"').to_string();
    if CONSTRAINT_STARTERS.contains(&name.to_ascii_uppercase().as_str()) {
        return;
    }
    let mut type_tokens = Vec::new();
    for token in tokens {
        if TYPE_TERMINATORS.contains(&token.to_ascii_uppercase().as_str()) {
            break;
        }
        type_tokens.push(token);
    }
    let data_type = if type_tokens.is_empty() {
        None
    } else {
        Some(type_tokens.join(" "))
    };
    let nullable = !definition.to_ascii_uppercase().contains("NOT NULL");

    let id = b.mint_global(
        ElementKind::DatabaseColumn,
        &format!("{schema}.{table}.{name}"),
        start_line,
    );
    b.add_element(IrElement {
        id,
        name,
        file_path: b.file_path().to_string(),
        location: SourceSpan::line(start_line),
        parent_id: Some(table_id.clone()),
        payload: ElementPayload::DatabaseColumn {
            data_type,
            nullable,
        },
        tags: vec![],
    });
}

fn split_qualified(raw: &str) -> (String, String) {
    let cleaned = raw.replace('"', "");
    match cleaned.split_once('.') {
        Some((schema, name)) => (schema.to_string(), name.to_string()),
        None => (DEFAULT_SCHEMA.to_string(), cleaned),
    }
}

/// The parenthesized column list of a CREATE TABLE statement.
fn column_body(statement: &str) -> Option<String> {
    let open = statement.find('(')?;
    let mut depth = 0usize;
    for (offset, c) in statement[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(statement[open + 1..open + offset].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a column body at top-level commas.
fn split_columns(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in body.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                if !current.trim().is_empty() {
                    out.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::RelationKind;
    use std::path::PathBuf;

    fn convert(code: &str) -> FileIr {
        let frontend = SqlFrontend::new();
        let ctx = FrontendContext::new("demo");
        frontend.convert_to_ir(
            &FileSource {
                absolute_path: PathBuf::from("/tmp/schema.sql"),
                relative_path: "db/schema.sql".to_string(),
                extension: "sql".to_string(),
                contents: code.as_bytes().to_vec(),
                declared_language: None,
            },
            &ctx,
        )
    }

    #[test]
    fn schema_table_and_column_elements() {
        let ir = convert(
            "CREATE SCHEMA public;\nCREATE TABLE public.users(email VARCHAR(255));\n",
        );
        let schema = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::DatabaseSchemaDefinition)
            .unwrap();
        assert_eq!(schema.name, "public");

        let table = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::DatabaseTable)
            .unwrap();
        assert!(table.id.as_str().ends_with("public.users"));

        let column = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::DatabaseColumn)
            .unwrap();
        assert!(column.id.as_str().ends_with("public.users.email"));
        assert_eq!(column.parent_id.as_ref(), Some(&table.id));
        let ElementPayload::DatabaseColumn { data_type, .. } = &column.payload else {
            panic!()
        };
        assert_eq!(data_type.as_deref(), Some("VARCHAR(255)"));
    }

    #[test]
    fn unqualified_table_defaults_to_public() {
        let ir = convert("CREATE TABLE orders (id INT NOT NULL, total NUMERIC DEFAULT 0);\n");
        let table = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::DatabaseTable)
            .unwrap();
        assert!(table.id.as_str().ends_with("public.orders"));
        let columns: Vec<_> = ir
            .elements
            .iter()
            .filter(|e| e.kind() == ElementKind::DatabaseColumn)
            .collect();
        assert_eq!(columns.len(), 2);
        let ElementPayload::DatabaseColumn { nullable, .. } = &columns[0].payload else {
            panic!()
        };
        assert!(!nullable);
    }

    #[test]
    fn constraint_entries_are_not_columns() {
        let ir = convert(
            "CREATE TABLE t (id INT, name TEXT, PRIMARY KEY (id), CONSTRAINT uq UNIQUE (name));\n",
        );
        let columns: Vec<_> = ir
            .elements
            .iter()
            .filter(|e| e.kind() == ElementKind::DatabaseColumn)
            .collect();
        assert_eq!(columns.len(), 2);
    }

    #[test]
    fn views_functions_and_procedures() {
        let ir = convert(
            "CREATE VIEW public.active_users AS SELECT 1;\nCREATE OR REPLACE FUNCTION count_users() RETURNS int AS $$ $$;\nCREATE PROCEDURE sync_users();\n",
        );
        assert!(ir
            .elements
            .iter()
            .any(|e| e.kind() == ElementKind::DatabaseView && e.name == "active_users"));
        assert!(ir
            .elements
            .iter()
            .any(|e| e.kind() == ElementKind::DatabaseFunction && e.name == "count_users"));
        assert!(ir
            .elements
            .iter()
            .any(|e| e.kind() == ElementKind::DatabaseProcedure && e.name == "sync_users"));
    }

    #[test]
    fn dml_statements_become_query_relationships() {
        let ir = convert("INSERT INTO public.users (email) VALUES ('a@b.c');\n");
        let queries: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::DatabaseQuery)
            .collect();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].source_id, ir.file_id);
    }
}

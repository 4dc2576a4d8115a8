//! Go frontend.
//!
//! Struct embedding is recorded as inheritance; `db.Query`/`db.Exec` calls
//! with literal SQL surface as database queries.

use tree_sitter::Node;

use arbor_core::{
    CanonicalId, ElementKind, ElementPayload, FileIr, IrElement, Parameter, RelationDetail,
    SourceLanguage,
};

use crate::frontend::{FileSource, FrontendContext, LanguageFrontend};
use crate::parser_pool::{ParseRequest, ParserPool};
use crate::walk::{span_of, text_of, FileIrBuilder, MAX_WALK_DEPTH};

const QUERY_METHODS: &[&str] = &["Query", "QueryRow", "QueryContext", "Exec", "ExecContext"];

pub struct GoFrontend {
    pool: ParserPool,
}

impl GoFrontend {
    pub fn new(pool: ParserPool) -> Self {
        Self { pool }
    }
}

impl LanguageFrontend for GoFrontend {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::Go
    }

    fn convert_to_ir(&self, source: &FileSource, ctx: &FrontendContext) -> FileIr {
        let text = source.text().into_owned();
        let loc = text.lines().count() as u32;

        let outcome = match self.pool.parse_blocking(ParseRequest {
            language: SourceLanguage::Go,
            content: text,
            path: source.relative_path.clone(),
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                return FileIrBuilder::failed(
                    ctx,
                    &source.relative_path,
                    SourceLanguage::Go,
                    e.to_string(),
                );
            }
        };

        let mut builder = FileIrBuilder::new(ctx, &source.relative_path, SourceLanguage::Go, loc);
        let mut walker = GoWalker {
            b: &mut builder,
            src: &outcome.content,
            package_id: None,
        };
        walker.visit(outcome.tree.root_node(), 0);
        builder.finish()
    }
}

struct GoWalker<'a, 'b> {
    b: &'b mut FileIrBuilder,
    src: &'a str,
    package_id: Option<CanonicalId>,
}

impl<'a, 'b> GoWalker<'a, 'b> {
    fn visit(&mut self, node: Node, depth: usize) {
        if depth > MAX_WALK_DEPTH {
            return;
        }
        match node.kind() {
            "package_clause" => self.handle_package(node),
            "import_declaration" => self.handle_imports(node),
            "function_declaration" => self.handle_function(node, depth),
            "method_declaration" => self.handle_method(node, depth),
            "type_declaration" => self.handle_type_declaration(node, depth),
            "var_declaration" | "const_declaration" => self.handle_var(node, depth),
            "call_expression" => self.handle_call(node, depth),
            "composite_literal" => self.handle_composite(node, depth),
            _ => self.visit_children(node, depth),
        }
    }

    fn visit_children(&mut self, node: Node, depth: usize) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, depth + 1);
        }
    }

    fn handle_package(&mut self, node: Node) {
        let mut cursor = node.walk();
        let Some(name_node) = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "package_identifier")
        else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let location = span_of(&node);
        let id = self
            .b
            .mint_global(ElementKind::Package, &name, location.start_line);
        self.b.add_element(IrElement {
            id: id.clone(),
            name: name.clone(),
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: None,
            payload: ElementPayload::Package,
            tags: vec![],
        });
        self.b.set_module(&name);
        self.package_id = Some(id);
    }

    fn handle_imports(&mut self, node: Node) {
        let mut specs = Vec::new();
        collect_import_specs(node, &mut specs);
        for spec in specs {
            let Some(path_node) = spec.child_by_field_name("path") else {
                continue;
            };
            let path = text_of(&path_node, self.src)
                .trim_matches(['"', '`'])
                .to_string();
            let alias = spec
                .child_by_field_name("name")
                .map(|n| text_of(&n, self.src).to_string())
                .filter(|n| n != "_" && n != ".");
            self.b.relate(
                self.b.file_id().clone(),
                path.clone(),
                span_of(&spec),
                RelationDetail::Imports {
                    module_specifier: path,
                    imported_entity_name: None,
                    alias,
                    is_side_effect: false,
                },
            );
        }
    }

    fn top_parent(&self) -> Option<CanonicalId> {
        self.b.parent_id().or_else(|| self.package_id.clone())
    }

    fn handle_function(&mut self, node: Node, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let parameters = self.parameters_of(node);
        let location = span_of(&node);
        let id = self.b.mint_callable(
            ElementKind::Function,
            &name,
            &parameters,
            location.start_line,
        );

        self.b.add_element(IrElement {
            id: id.clone(),
            name: name.clone(),
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.top_parent(),
            payload: ElementPayload::Function {
                parameters,
                return_type: node
                    .child_by_field_name("result")
                    .map(|n| text_of(&n, self.src).to_string()),
                is_async: false,
                is_exported: name.chars().next().is_some_and(|c| c.is_uppercase()),
            },
            tags: vec![],
        });

        self.b.enter_scope(id, name);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body, depth + 1);
        }
        self.b.exit_scope();
    }

    /// Methods qualify by their receiver type: `func (s *Server) Start`
    /// becomes `Server.Start`.
    fn handle_method(&mut self, node: Node, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let receiver_type = node
            .child_by_field_name("receiver")
            .and_then(|r| receiver_type_name(r, self.src));
        let qualified = match &receiver_type {
            Some(t) => format!("{t}.{name}"),
            None => name.clone(),
        };
        let parameters = self.parameters_of(node);
        let location = span_of(&node);
        let id = self.b.mint_callable(
            ElementKind::Method,
            &qualified,
            &parameters,
            location.start_line,
        );

        self.b.add_element(IrElement {
            id: id.clone(),
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.top_parent(),
            payload: ElementPayload::Method {
                parameters,
                return_type: node
                    .child_by_field_name("result")
                    .map(|n| text_of(&n, self.src).to_string()),
                is_async: false,
                is_static: false,
                receiver: receiver_type,
                receiver_position: None,
            },
            tags: vec![],
        });

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body, depth + 1);
        }
        self.b.exit_scope();
    }

    fn handle_type_declaration(&mut self, node: Node, depth: usize) {
        let mut cursor = node.walk();
        for spec in node.named_children(&mut cursor) {
            if spec.kind() != "type_spec" {
                continue;
            }
            let Some(name_node) = spec.child_by_field_name("name") else {
                continue;
            };
            let name = text_of(&name_node, self.src).to_string();
            let location = span_of(&spec);
            match spec.child_by_field_name("type").map(|t| (t, t.kind())) {
                Some((struct_node, "struct_type")) => {
                    let id = self
                        .b
                        .mint_scoped(ElementKind::Class, &name, location.start_line);
                    self.b.add_element(IrElement {
                        id: id.clone(),
                        name: name.clone(),
                        file_path: self.b.file_path().to_string(),
                        location,
                        parent_id: self.top_parent(),
                        payload: ElementPayload::Class {
                            is_abstract: false,
                            is_exported: name.chars().next().is_some_and(|c| c.is_uppercase()),
                        },
                        tags: vec![],
                    });
                    self.b.enter_scope(id, name);
                    self.handle_struct_fields(struct_node, depth);
                    self.b.exit_scope();
                }
                Some((_, "interface_type")) => {
                    let id = self
                        .b
                        .mint_scoped(ElementKind::Interface, &name, location.start_line);
                    self.b.add_element(IrElement {
                        id,
                        name,
                        file_path: self.b.file_path().to_string(),
                        location,
                        parent_id: self.top_parent(),
                        payload: ElementPayload::Interface { is_exported: true },
                        tags: vec![],
                    });
                }
                Some((other, _)) => {
                    let id = self
                        .b
                        .mint_scoped(ElementKind::TypeAlias, &name, location.start_line);
                    self.b.add_element(IrElement {
                        id,
                        name,
                        file_path: self.b.file_path().to_string(),
                        location,
                        parent_id: self.top_parent(),
                        payload: ElementPayload::TypeAlias {
                            aliased_type: Some(text_of(&other, self.src).to_string()),
                        },
                        tags: vec![],
                    });
                }
                None => {}
            }
        }
    }

    fn handle_struct_fields(&mut self, struct_node: Node, _depth: usize) {
        let mut cursor = struct_node.walk();
        let Some(list) = struct_node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "field_declaration_list")
        else {
            return;
        };
        let mut inner = list.walk();
        for field in list.named_children(&mut inner) {
            if field.kind() != "field_declaration" {
                continue;
            }
            let mut names = Vec::new();
            let mut c2 = field.walk();
            for child in field.children(&mut c2) {
                if child.kind() == "field_identifier" {
                    names.push(text_of(&child, self.src).to_string());
                }
            }
            let type_text = field
                .child_by_field_name("type")
                .map(|t| text_of(&t, self.src).to_string());

            if names.is_empty() {
                // embedded field: the struct inherits the embedded type
                if let Some(embedded) = type_text {
                    let pattern = embedded.trim_start_matches('*').to_string();
                    if let Some(source) = self.b.parent_id() {
                        self.b.relate(
                            source,
                            pattern,
                            span_of(&field),
                            RelationDetail::Inherits,
                        );
                    }
                }
                continue;
            }
            for name in names {
                let qualified = self.b.qualify(&name);
                let location = span_of(&field);
                let id = self
                    .b
                    .mint_scoped(ElementKind::Field, &qualified, location.start_line);
                self.b.add_element(IrElement {
                    id,
                    name,
                    file_path: self.b.file_path().to_string(),
                    location,
                    parent_id: self.b.parent_id(),
                    payload: ElementPayload::Field {
                        declared_type: type_text.clone(),
                        is_static: false,
                    },
                    tags: vec![],
                });
            }
        }
    }

    fn handle_var(&mut self, node: Node, depth: usize) {
        let at_top = self.b.parent_id().is_none();
        let is_const = node.kind() == "const_declaration";
        let mut cursor = node.walk();
        for spec in node.named_children(&mut cursor) {
            if !matches!(spec.kind(), "var_spec" | "const_spec") {
                continue;
            }
            if at_top {
                let mut c2 = spec.walk();
                for name_node in spec.children(&mut c2) {
                    if name_node.kind() != "identifier" {
                        continue;
                    }
                    let name = text_of(&name_node, self.src).to_string();
                    let location = span_of(&spec);
                    let id = self
                        .b
                        .mint_scoped(ElementKind::Variable, &name, location.start_line);
                    self.b.add_element(IrElement {
                        id,
                        name,
                        file_path: self.b.file_path().to_string(),
                        location,
                        parent_id: self.top_parent(),
                        payload: ElementPayload::Variable {
                            declared_type: spec
                                .child_by_field_name("type")
                                .map(|t| text_of(&t, self.src).to_string()),
                            is_const,
                        },
                        tags: vec![],
                    });
                }
            }
            if let Some(value) = spec.child_by_field_name("value") {
                self.visit(value, depth + 1);
            }
        }
    }

    fn handle_call(&mut self, node: Node, depth: usize) {
        let Some(function) = node.child_by_field_name("function") else {
            self.visit_children(node, depth);
            return;
        };
        let location = span_of(&node);
        let source_id = self.b.scope_source();
        let pattern = text_of(&function, self.src).to_string();

        if function.kind() == "selector_expression" {
            let method = function
                .child_by_field_name("field")
                .map(|n| text_of(&n, self.src).to_string())
                .unwrap_or_default();
            let receiver = function
                .child_by_field_name("operand")
                .map(|n| text_of(&n, self.src).to_string());
            if QUERY_METHODS.contains(&method.as_str()) {
                if let Some(sql) = self.first_string_arg(node) {
                    self.b.relate(
                        source_id,
                        sql.clone(),
                        location,
                        RelationDetail::DatabaseQuery { raw_sql: sql },
                    );
                    self.visit_arguments(node, depth);
                    return;
                }
            }
            self.b.relate(
                source_id,
                pattern,
                location,
                RelationDetail::Calls { receiver },
            );
        } else if function.kind() == "identifier" {
            self.b.relate(
                source_id,
                pattern,
                location,
                RelationDetail::Calls { receiver: None },
            );
        } else {
            self.visit(function, depth + 1);
        }
        self.visit_arguments(node, depth);
    }

    fn visit_arguments(&mut self, call: Node, depth: usize) {
        if let Some(arguments) = call.child_by_field_name("arguments") {
            self.visit_children(arguments, depth);
        }
    }

    fn first_string_arg(&self, call: Node) -> Option<String> {
        let arguments = call.child_by_field_name("arguments")?;
        let mut cursor = arguments.walk();
        arguments
            .named_children(&mut cursor)
            .find(|n| matches!(n.kind(), "interpreted_string_literal" | "raw_string_literal"))
            .map(|n| text_of(&n, self.src).trim_matches(['"', '`']).to_string())
    }

    /// `T{...}` composite literals of exported types read as constructions.
    fn handle_composite(&mut self, node: Node, depth: usize) {
        if let Some(type_node) = node.child_by_field_name("type") {
            let pattern = text_of(&type_node, self.src).to_string();
            let simple = pattern.rsplit('.').next().unwrap_or(&pattern);
            if simple.chars().next().is_some_and(|c| c.is_uppercase()) {
                self.b.relate(
                    self.b.scope_source(),
                    pattern,
                    span_of(&node),
                    RelationDetail::Instantiates,
                );
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, depth);
        }
    }

    fn parameters_of(&self, callable: Node) -> Vec<Parameter> {
        let Some(params) = callable.child_by_field_name("parameters") else {
            return vec![];
        };
        let mut out = Vec::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            if !matches!(param.kind(), "parameter_declaration" | "variadic_parameter_declaration") {
                continue;
            }
            let type_name = param
                .child_by_field_name("type")
                .map(|t| text_of(&t, self.src).to_string());
            let mut c2 = param.walk();
            let mut any_name = false;
            for child in param.children(&mut c2) {
                if child.kind() == "identifier" {
                    any_name = true;
                    let name = text_of(&child, self.src).to_string();
                    out.push(match &type_name {
                        Some(t) => Parameter::typed(name, t.clone()),
                        None => Parameter::untyped(name),
                    });
                }
            }
            if !any_name {
                if let Some(t) = &type_name {
                    out.push(Parameter::untyped(t.clone()));
                }
            }
        }
        out
    }
}

fn collect_import_specs<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "import_spec" => out.push(child),
            "import_spec_list" => collect_import_specs(child, out),
            _ => {}
        }
    }
}

fn receiver_type_name(receiver: Node, src: &str) -> Option<String> {
    let mut cursor = receiver.walk();
    for param in receiver.named_children(&mut cursor) {
        if param.kind() != "parameter_declaration" {
            continue;
        }
        if let Some(t) = param.child_by_field_name("type") {
            return Some(text_of(&t, src).trim_start_matches('*').to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser_pool::ParserPool;
    use arbor_core::RelationKind;
    use std::path::PathBuf;

    fn convert(path: &str, code: &str) -> FileIr {
        let frontend = GoFrontend::new(ParserPool::new(1));
        let ctx = FrontendContext::new("demo");
        frontend.convert_to_ir(
            &FileSource {
                absolute_path: PathBuf::from(format!("/tmp/{path}")),
                relative_path: path.to_string(),
                extension: "go".to_string(),
                contents: code.as_bytes().to_vec(),
                declared_language: None,
            },
            &ctx,
        )
    }

    #[test]
    fn package_and_imports() {
        let ir = convert(
            "main.go",
            "package main\n\nimport (\n\t\"fmt\"\n\tlog \"github.com/sirupsen/logrus\"\n)\n",
        );
        let package = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Package)
            .unwrap();
        assert_eq!(package.name, "main");
        let imports: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Imports)
            .collect();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].target_pattern, "fmt");
        let RelationDetail::Imports { alias, .. } = &imports[1].detail else {
            panic!()
        };
        assert_eq!(alias.as_deref(), Some("log"));
    }

    #[test]
    fn method_qualifies_by_receiver() {
        let ir = convert(
            "server.go",
            "package api\n\ntype Server struct{}\n\nfunc (s *Server) Start(port int) error { return nil }\n",
        );
        let method = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Method)
            .unwrap();
        assert_eq!(method.name, "Start");
        assert!(method.id.as_str().contains("server.start(int)"));
        let ElementPayload::Method { receiver, .. } = &method.payload else {
            panic!()
        };
        assert_eq!(receiver.as_deref(), Some("Server"));
    }

    #[test]
    fn struct_embedding_is_inheritance() {
        let ir = convert(
            "model.go",
            "package m\n\ntype Base struct{}\n\ntype User struct {\n\tBase\n\tName string\n}\n",
        );
        let inherits: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Inherits)
            .collect();
        assert_eq!(inherits.len(), 1);
        assert_eq!(inherits[0].target_pattern, "Base");
        let field = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Field)
            .unwrap();
        assert_eq!(field.name, "Name");
    }

    #[test]
    fn db_query_with_literal_sql() {
        let ir = convert(
            "repo.go",
            "package repo\n\nfunc load(db DB) {\n\tdb.Query(\"SELECT * FROM users\")\n}\n",
        );
        let queries: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::DatabaseQuery)
            .collect();
        assert_eq!(queries.len(), 1);
        let RelationDetail::DatabaseQuery { raw_sql } = &queries[0].detail else {
            panic!()
        };
        assert_eq!(raw_sql, "SELECT * FROM users");
    }

    #[test]
    fn composite_literal_is_instantiation() {
        let ir = convert(
            "a.go",
            "package a\n\ntype Point struct{ X int }\n\nfunc mk() Point { return Point{X: 1} }\n",
        );
        assert!(ir
            .potential_relationships
            .iter()
            .any(|r| r.kind() == RelationKind::Instantiates && r.target_pattern == "Point"));
    }
}

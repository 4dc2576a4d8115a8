//! Python frontend.
//!
//! Walks `module -> class_definition -> function_definition`, lifts route
//! decorators into `ApiRouteDefinition` elements, and observes
//! `<cursor>.execute(<sql>)` calls as database queries.

use tree_sitter::Node;

use arbor_core::{
    CanonicalId, ElementKind, ElementPayload, FileIr, IrElement, Parameter, RelationDetail,
    SourceLanguage,
};

use crate::frontend::{FileSource, FrontendContext, LanguageFrontend};
use crate::parser_pool::{ParseRequest, ParserPool};
use crate::walk::{span_of, text_of, FileIrBuilder, MAX_WALK_DEPTH};

/// Decorator attribute names that declare HTTP routes (Flask / FastAPI
/// style `@app.<name>(...)`).
const ROUTE_ATTRS: &[&str] = &[
    "route", "get", "post", "put", "delete", "patch", "head", "options", "websocket",
];

const EXECUTE_METHODS: &[&str] = &["execute", "executemany"];

pub struct PythonFrontend {
    pool: ParserPool,
}

impl PythonFrontend {
    pub fn new(pool: ParserPool) -> Self {
        Self { pool }
    }
}

impl LanguageFrontend for PythonFrontend {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::Python
    }

    fn convert_to_ir(&self, source: &FileSource, ctx: &FrontendContext) -> FileIr {
        let text = source.text().into_owned();
        let loc = text.lines().count() as u32;

        let outcome = match self.pool.parse_blocking(ParseRequest {
            language: SourceLanguage::Python,
            content: text,
            path: source.relative_path.clone(),
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                return FileIrBuilder::failed(
                    ctx,
                    &source.relative_path,
                    SourceLanguage::Python,
                    e.to_string(),
                );
            }
        };

        let mut builder = FileIrBuilder::new(ctx, &source.relative_path, SourceLanguage::Python, loc);
        let mut walker = PyWalker {
            b: &mut builder,
            src: &outcome.content,
        };
        walker.visit(outcome.tree.root_node(), 0);
        builder.finish()
    }
}

struct PyWalker<'a, 'b> {
    b: &'b mut FileIrBuilder,
    src: &'a str,
}

/// A definition is a method when its immediate container (skipping a
/// decorator wrapper) is a class body.
fn enclosed_by_class(node: Node) -> bool {
    let mut parent = node.parent();
    if parent.is_some_and(|p| p.kind() == "decorated_definition") {
        parent = parent.and_then(|p| p.parent());
    }
    match parent {
        Some(block) if block.kind() == "block" => block
            .parent()
            .is_some_and(|g| g.kind() == "class_definition"),
        _ => false,
    }
}

impl<'a, 'b> PyWalker<'a, 'b> {
    fn visit(&mut self, node: Node, depth: usize) {
        if depth > MAX_WALK_DEPTH {
            return;
        }
        match node.kind() {
            "import_statement" => self.handle_import(node),
            "import_from_statement" => self.handle_import_from(node),
            "decorated_definition" => self.handle_decorated(node, depth),
            "class_definition" => {
                self.handle_class(node, depth, &[]);
            }
            "function_definition" => {
                self.handle_function(node, depth);
            }
            "call" => self.handle_call(node, depth),
            "assignment" => self.handle_assignment(node, depth),
            _ => self.visit_children(node, depth),
        }
    }

    fn visit_children(&mut self, node: Node, depth: usize) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, depth + 1);
        }
    }

    // ── Imports ─────────────────────────────────────────────

    /// `import a, b as c` produces one candidate per module.
    fn handle_import(&mut self, node: Node) {
        let source_id = self.b.file_id().clone();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "dotted_name" => {
                    let module = text_of(&child, self.src).to_string();
                    self.b.relate(
                        source_id.clone(),
                        module.clone(),
                        span_of(&child),
                        RelationDetail::Imports {
                            module_specifier: module,
                            imported_entity_name: None,
                            alias: None,
                            is_side_effect: false,
                        },
                    );
                }
                "aliased_import" => {
                    let Some(module) = child
                        .child_by_field_name("name")
                        .map(|n| text_of(&n, self.src).to_string())
                    else {
                        continue;
                    };
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|n| text_of(&n, self.src).to_string());
                    self.b.relate(
                        source_id.clone(),
                        module.clone(),
                        span_of(&child),
                        RelationDetail::Imports {
                            module_specifier: module,
                            imported_entity_name: None,
                            alias,
                            is_side_effect: false,
                        },
                    );
                }
                _ => {}
            }
        }
    }

    /// `from m import x, y as z` produces one candidate per imported name.
    fn handle_import_from(&mut self, node: Node) {
        let Some(module) = node
            .child_by_field_name("module_name")
            .map(|n| text_of(&n, self.src).to_string())
        else {
            return;
        };
        let source_id = self.b.file_id().clone();
        let mut cursor = node.walk();
        let mut past_import_kw = false;
        for child in node.children(&mut cursor) {
            if child.kind() == "import" {
                past_import_kw = true;
                continue;
            }
            if !past_import_kw {
                continue;
            }
            match child.kind() {
                "dotted_name" | "identifier" => {
                    let name = text_of(&child, self.src).to_string();
                    self.b.relate(
                        source_id.clone(),
                        format!("{module}#{name}"),
                        span_of(&child),
                        RelationDetail::Imports {
                            module_specifier: module.clone(),
                            imported_entity_name: Some(name),
                            alias: None,
                            is_side_effect: false,
                        },
                    );
                }
                "aliased_import" => {
                    let Some(name) = child
                        .child_by_field_name("name")
                        .map(|n| text_of(&n, self.src).to_string())
                    else {
                        continue;
                    };
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|n| text_of(&n, self.src).to_string());
                    self.b.relate(
                        source_id.clone(),
                        format!("{module}#{name}"),
                        span_of(&child),
                        RelationDetail::Imports {
                            module_specifier: module.clone(),
                            imported_entity_name: Some(name),
                            alias,
                            is_side_effect: false,
                        },
                    );
                }
                "wildcard_import" => {
                    self.b.relate(
                        source_id.clone(),
                        module.clone(),
                        span_of(&child),
                        RelationDetail::Imports {
                            module_specifier: module.clone(),
                            imported_entity_name: Some("*".to_string()),
                            alias: None,
                            is_side_effect: false,
                        },
                    );
                }
                _ => {}
            }
        }
    }

    // ── Definitions ─────────────────────────────────────────

    fn handle_decorated(&mut self, node: Node, depth: usize) {
        let mut decorators = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "decorator" {
                decorators.push(child);
            }
        }
        let Some(definition) = node.child_by_field_name("definition") else {
            self.visit_children(node, depth);
            return;
        };
        match definition.kind() {
            "function_definition" => {
                if let Some(handler_id) = self.handle_function(definition, depth) {
                    for decorator in &decorators {
                        self.emit_decorator(*decorator, &handler_id);
                    }
                }
            }
            "class_definition" => {
                self.handle_class(definition, depth, &decorators);
            }
            _ => self.visit(definition, depth + 1),
        }
    }

    fn handle_class(&mut self, node: Node, depth: usize, decorators: &[Node]) {
        let Some(name_node) = node.child_by_field_name("name") else {
            self.b
                .conversion_error("class without a name", Some(span_of(&node).start_line));
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
        let id = self
            .b
            .mint_scoped(ElementKind::Class, &qualified, location.start_line);

        self.b.add_element(IrElement {
            id: id.clone(),
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Class {
                is_abstract: false,
                is_exported: false,
            },
            tags: vec![],
        });

        for decorator in decorators {
            self.emit_decorator(*decorator, &id);
        }

        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for base in superclasses.named_children(&mut cursor) {
                if !matches!(base.kind(), "identifier" | "attribute") {
                    continue;
                }
                self.b.relate(
                    id.clone(),
                    text_of(&base, self.src).to_string(),
                    span_of(&base),
                    RelationDetail::Inherits,
                );
            }
        }

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, depth);
        }
        self.b.exit_scope();
    }

    fn handle_function(&mut self, node: Node, depth: usize) -> Option<CanonicalId> {
        let name_node = node.child_by_field_name("name")?;
        let name = text_of(&name_node, self.src).to_string();
        let in_class = enclosed_by_class(node);
        let (parameters, receiver, receiver_position) = self.parameters_of(node, in_class);
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
        let kind = if in_class {
            ElementKind::Method
        } else {
            ElementKind::Function
        };
        let id = self
            .b
            .mint_callable(kind, &qualified, &parameters, location.start_line);
        let is_async = has_keyword_child(node, "async") || contains_await(node, 0);
        let return_type = node
            .child_by_field_name("return_type")
            .map(|n| text_of(&n, self.src).to_string());

        let payload = if in_class {
            ElementPayload::Method {
                parameters,
                return_type,
                is_async,
                is_static: false,
                receiver,
                receiver_position,
            }
        } else {
            ElementPayload::Function {
                parameters,
                return_type,
                is_async,
                is_exported: false,
            }
        };
        self.b.add_element(IrElement {
            id: id.clone(),
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload,
            tags: vec![],
        });

        self.b.enter_scope(id.clone(), qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, depth);
        }
        self.b.exit_scope();
        Some(id)
    }

    /// Parse the parameter list. In methods the leading `self`/`cls` is
    /// excluded from the list but its name and position are kept.
    fn parameters_of(
        &self,
        function: Node,
        in_class: bool,
    ) -> (Vec<Parameter>, Option<String>, Option<u32>) {
        let Some(params) = function.child_by_field_name("parameters") else {
            return (vec![], None, None);
        };
        let mut out = Vec::new();
        let mut receiver = None;
        let mut receiver_position = None;
        let mut position = 0u32;
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            let (name, type_name) = match param.kind() {
                "identifier" => (text_of(&param, self.src).to_string(), None),
                "typed_parameter" => {
                    let name = param
                        .named_child(0)
                        .map(|n| text_of(&n, self.src).to_string())
                        .unwrap_or_default();
                    let type_name = param
                        .child_by_field_name("type")
                        .map(|n| text_of(&n, self.src).to_string());
                    (name, type_name)
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = param
                        .child_by_field_name("name")
                        .map(|n| text_of(&n, self.src).to_string())
                        .unwrap_or_default();
                    let type_name = param
                        .child_by_field_name("type")
                        .map(|n| text_of(&n, self.src).to_string());
                    (name, type_name)
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    (text_of(&param, self.src).to_string(), None)
                }
                _ => continue,
            };
            if name.is_empty() {
                continue;
            }
            if in_class && position == 0 && (name == "self" || name == "cls") {
                receiver = Some(name);
                receiver_position = Some(0);
                position += 1;
                continue;
            }
            out.push(match type_name {
                Some(t) => Parameter::typed(name, t),
                None => Parameter::untyped(name),
            });
            position += 1;
        }
        (out, receiver, receiver_position)
    }

    // ── Decorators and routes ───────────────────────────────

    fn emit_decorator(&mut self, decorator: Node, element_id: &CanonicalId) {
        let Some(expr) = decorator.named_child(0) else {
            return;
        };
        let (pattern, call_node) = match expr.kind() {
            "call" => {
                let name = expr
                    .child_by_field_name("function")
                    .map(|n| text_of(&n, self.src).to_string())
                    .unwrap_or_default();
                (name, Some(expr))
            }
            _ => (text_of(&expr, self.src).to_string(), None),
        };
        if pattern.is_empty() {
            return;
        }

        let arguments = call_node
            .and_then(|c| c.child_by_field_name("arguments"))
            .map(|a| text_of(&a, self.src).to_string());
        self.b.relate(
            element_id.clone(),
            pattern.clone(),
            span_of(&decorator),
            RelationDetail::UsesAnnotation { arguments },
        );

        if let Some(call) = call_node {
            self.maybe_emit_route(&pattern, call, element_id, decorator);
        }
    }

    /// `@app.get("/users/{id}")` and friends become route elements bound to
    /// the decorated handler.
    fn maybe_emit_route(
        &mut self,
        pattern: &str,
        call: Node,
        handler_id: &CanonicalId,
        decorator: Node,
    ) {
        let attr = pattern.rsplit('.').next().unwrap_or(pattern);
        if !ROUTE_ATTRS.contains(&attr) || !pattern.contains('.') {
            return;
        }
        let Some(arguments) = call.child_by_field_name("arguments") else {
            return;
        };
        let mut cursor = arguments.walk();
        let mut path_pattern = None;
        let mut method_override = None;
        for arg in arguments.named_children(&mut cursor) {
            match arg.kind() {
                "string" if path_pattern.is_none() => {
                    path_pattern = Some(py_string_value(&arg, self.src));
                }
                "keyword_argument" => {
                    let Some(name) = arg.child_by_field_name("name") else {
                        continue;
                    };
                    if text_of(&name, self.src) != "methods" {
                        continue;
                    }
                    if let Some(value) = arg.child_by_field_name("value") {
                        let mut inner = value.walk();
                        if let Some(first) = value
                            .named_children(&mut inner)
                            .find(|n| n.kind() == "string")
                        {
                            method_override = Some(py_string_value(&first, self.src));
                        }
                    }
                }
                _ => {}
            }
        }
        let Some(path_pattern) = path_pattern else {
            return;
        };
        let http_method = method_override
            .unwrap_or_else(|| {
                if attr == "route" {
                    "GET".to_string()
                } else {
                    attr.to_string()
                }
            })
            .to_ascii_uppercase();

        let location = span_of(&decorator);
        let route_id = self.b.mint_global(
            ElementKind::ApiRouteDefinition,
            &format!("{http_method}:{path_pattern}"),
            location.start_line,
        );
        self.b.add_element(IrElement {
            id: route_id,
            name: path_pattern.clone(),
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: None,
            payload: ElementPayload::ApiRouteDefinition {
                http_method,
                path_pattern,
                handler_id: Some(handler_id.clone()),
                framework: Some(pattern.split('.').next().unwrap_or("").to_string()),
            },
            tags: vec![],
        });
    }

    // ── Expressions ─────────────────────────────────────────

    fn handle_call(&mut self, node: Node, depth: usize) {
        let Some(callee) = node.child_by_field_name("function") else {
            self.visit_children(node, depth);
            return;
        };
        let location = span_of(&node);
        let source_id = self.b.scope_source();
        let callee_text = text_of(&callee, self.src).to_string();

        if callee.kind() == "attribute" {
            let attr = callee
                .child_by_field_name("attribute")
                .map(|n| text_of(&n, self.src).to_string())
                .unwrap_or_default();
            let receiver = callee
                .child_by_field_name("object")
                .map(|n| text_of(&n, self.src).to_string());
            if EXECUTE_METHODS.contains(&attr.as_str()) {
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
                callee_text,
                location,
                RelationDetail::Calls { receiver },
            );
        } else if callee.kind() == "identifier" {
            // Capitalized bare calls are, by convention, constructions
            let detail = if callee_text.chars().next().is_some_and(|c| c.is_uppercase()) {
                RelationDetail::Instantiates
            } else {
                RelationDetail::Calls { receiver: None }
            };
            self.b.relate(source_id, callee_text, location, detail);
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
            .find(|n| n.kind() == "string" || n.kind() == "concatenated_string")
            .map(|n| py_string_value(&n, self.src))
    }

    fn handle_assignment(&mut self, node: Node, depth: usize) {
        let at_module_level = self.b.parent_id().is_none();
        if let Some(left) = node.child_by_field_name("left") {
            if left.kind() == "identifier" {
                let name = text_of(&left, self.src).to_string();
                if at_module_level {
                    let location = span_of(&node);
                    let id =
                        self.b
                            .mint_scoped(ElementKind::Variable, &name, location.start_line);
                    let declared_type = node
                        .child_by_field_name("type")
                        .map(|n| text_of(&n, self.src).to_string());
                    self.b.add_element(IrElement {
                        id,
                        name,
                        file_path: self.b.file_path().to_string(),
                        location,
                        parent_id: None,
                        payload: ElementPayload::Variable {
                            declared_type,
                            is_const: false,
                        },
                        tags: vec![],
                    });
                } else {
                    self.b.relate(
                        self.b.scope_source(),
                        name,
                        span_of(&left),
                        RelationDetail::Writes,
                    );
                }
            }
        }
        if let Some(right) = node.child_by_field_name("right") {
            if right.kind() == "identifier" && !at_module_level {
                self.b.relate(
                    self.b.scope_source(),
                    text_of(&right, self.src).to_string(),
                    span_of(&right),
                    RelationDetail::Reads,
                );
            } else {
                self.visit(right, depth + 1);
            }
        }
    }
}

/// Value of a Python string literal without quotes or prefixes.
fn py_string_value(node: &Node, src: &str) -> String {
    let mut cursor = node.walk();
    let content: String = node
        .children(&mut cursor)
        .filter(|c| c.kind() == "string_content")
        .map(|c| text_of(&c, src).to_string())
        .collect();
    if !content.is_empty() {
        return content;
    }
    text_of(node, src)
        .trim_start_matches(['r', 'b', 'f', 'u', 'R', 'B', 'F', 'U'])
        .trim_matches(['"', '\''])
        .to_string()
}

fn has_keyword_child(node: Node, keyword: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == keyword)
}

fn contains_await(node: Node, depth: usize) -> bool {
    if depth > MAX_WALK_DEPTH {
        return false;
    }
    if node.kind() == "await" {
        return true;
    }
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .any(|c| c.kind() != "function_definition" && contains_await(c, depth + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser_pool::ParserPool;
    use arbor_core::RelationKind;
    use std::path::PathBuf;

    fn convert(path: &str, code: &str) -> FileIr {
        let frontend = PythonFrontend::new(ParserPool::new(1));
        let ctx = FrontendContext::new("demo");
        frontend.convert_to_ir(
            &FileSource {
                absolute_path: PathBuf::from(format!("/tmp/{path}")),
                relative_path: path.to_string(),
                extension: "py".to_string(),
                contents: code.as_bytes().to_vec(),
                declared_language: None,
            },
            &ctx,
        )
    }

    #[test]
    fn plain_and_aliased_imports_produce_one_candidate_each() {
        let ir = convert("app.py", "import os, json as j\n");
        let found: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Imports)
            .collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].target_pattern, "os");
        let RelationDetail::Imports { alias, .. } = &found[1].detail else {
            panic!()
        };
        assert_eq!(alias.as_deref(), Some("j"));
    }

    #[test]
    fn from_imports_produce_one_candidate_per_name() {
        let ir = convert("app.py", "from models import User, Account as Acct\n");
        let found: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Imports)
            .collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].target_pattern, "models#User");
        let RelationDetail::Imports {
            imported_entity_name,
            alias,
            ..
        } = &found[1].detail
        else {
            panic!()
        };
        assert_eq!(imported_entity_name.as_deref(), Some("Account"));
        assert_eq!(alias.as_deref(), Some("Acct"));
    }

    #[test]
    fn wildcard_import_uses_star() {
        let ir = convert("app.py", "from helpers import *\n");
        let RelationDetail::Imports {
            imported_entity_name,
            ..
        } = &ir.potential_relationships[0].detail
        else {
            panic!()
        };
        assert_eq!(imported_entity_name.as_deref(), Some("*"));
    }

    #[test]
    fn route_decorator_emits_route_element_and_annotation() {
        let ir = convert(
            "api.py",
            "@app.get(\"/users/{id}\")\ndef get_user(id):\n    return db.execute(\"SELECT * FROM users WHERE id=?\", id)\n",
        );
        let route = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::ApiRouteDefinition)
            .expect("route element");
        let handler = ir.elements.iter().find(|e| e.name == "get_user").unwrap();
        let ElementPayload::ApiRouteDefinition {
            http_method,
            path_pattern,
            handler_id,
            ..
        } = &route.payload
        else {
            panic!()
        };
        assert_eq!(http_method, "GET");
        assert_eq!(path_pattern, "/users/{id}");
        assert_eq!(handler_id.as_ref(), Some(&handler.id));

        let annotation: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::UsesAnnotation)
            .collect();
        assert_eq!(annotation.len(), 1);
        assert_eq!(annotation[0].target_pattern, "app.get");
        assert_eq!(annotation[0].source_id, handler.id);

        let queries: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::DatabaseQuery)
            .collect();
        assert_eq!(queries.len(), 1);
        let RelationDetail::DatabaseQuery { raw_sql } = &queries[0].detail else {
            panic!()
        };
        assert_eq!(raw_sql, "SELECT * FROM users WHERE id=?");
        assert_eq!(queries[0].source_id, handler.id);
    }

    #[test]
    fn route_decorator_with_methods_kwarg() {
        let ir = convert(
            "api.py",
            "@app.route(\"/items\", methods=[\"POST\"])\ndef create_item():\n    pass\n",
        );
        let route = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::ApiRouteDefinition)
            .unwrap();
        let ElementPayload::ApiRouteDefinition { http_method, .. } = &route.payload else {
            panic!()
        };
        assert_eq!(http_method, "POST");
    }

    #[test]
    fn methods_exclude_self_but_record_position() {
        let ir = convert(
            "models.py",
            "class User:\n    def save(self, db):\n        pass\n",
        );
        let method = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Method)
            .unwrap();
        let ElementPayload::Method {
            parameters,
            receiver,
            receiver_position,
            ..
        } = &method.payload
        else {
            panic!()
        };
        assert_eq!(parameters.len(), 1);
        assert_eq!(parameters[0].name, "db");
        assert_eq!(receiver.as_deref(), Some("self"));
        assert_eq!(*receiver_position, Some(0));

        let class_el = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Class)
            .unwrap();
        assert_eq!(method.parent_id.as_ref(), Some(&class_el.id));
    }

    #[test]
    fn async_function_is_detected() {
        let ir = convert("a.py", "async def poll():\n    await tick()\n");
        let func = ir.elements.iter().find(|e| e.name == "poll").unwrap();
        let ElementPayload::Function { is_async, .. } = &func.payload else {
            panic!()
        };
        assert!(is_async);
    }

    #[test]
    fn class_inheritance_is_observed() {
        let ir = convert("a.py", "class Admin(User, AbstractRole):\n    pass\n");
        let inherits: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Inherits)
            .collect();
        assert_eq!(inherits.len(), 2);
        assert_eq!(inherits[0].target_pattern, "User");
        assert_eq!(inherits[1].target_pattern, "AbstractRole");
    }

    #[test]
    fn capitalized_call_is_instantiation() {
        let ir = convert("a.py", "def make():\n    u = User()\n    log(u)\n");
        let kinds: Vec<_> = ir
            .potential_relationships
            .iter()
            .map(|r| (r.kind(), r.target_pattern.clone()))
            .collect();
        assert!(kinds.contains(&(RelationKind::Instantiates, "User".to_string())));
        assert!(kinds.contains(&(RelationKind::Calls, "log".to_string())));
    }

    #[test]
    fn module_level_assignment_becomes_variable() {
        let ir = convert("config.py", "DEBUG = True\n");
        let var = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Variable)
            .unwrap();
        assert_eq!(var.name, "DEBUG");
    }
}

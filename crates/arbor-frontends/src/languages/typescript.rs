//! TypeScript / TSX / JavaScript frontend.
//!
//! `.ts` and `.js` parse under the TypeScript grammar, `.tsx`/`.jsx` under
//! the TSX grammar; a `.js` file containing JSX-like syntax is routed to
//! the TSX grammar as well.

use std::sync::LazyLock;

use regex::Regex;
use tree_sitter::Node;

use arbor_core::{
    ElementKind, ElementPayload, FileIr, IrElement, Parameter, RelationDetail, SourceLanguage,
};

use crate::frontend::{FileSource, FrontendContext, LanguageFrontend};
use crate::parser_pool::{ParseRequest, ParserPool};
use crate::walk::{span_of, text_of, FileIrBuilder, MAX_WALK_DEPTH};

static JSX_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z][A-Za-z0-9.]*(\s[^<>]*)?/?>").unwrap());

const AXIOS_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "head", "options"];

pub struct TypeScriptFrontend {
    pool: ParserPool,
}

impl TypeScriptFrontend {
    pub fn new(pool: ParserPool) -> Self {
        Self { pool }
    }

    fn pick_grammar(&self, source: &FileSource, text: &str) -> SourceLanguage {
        match source.language() {
            SourceLanguage::Tsx => SourceLanguage::Tsx,
            _ if source.extension == "js" && JSX_HINT.is_match(text) => SourceLanguage::Tsx,
            _ => SourceLanguage::TypeScript,
        }
    }
}

impl LanguageFrontend for TypeScriptFrontend {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::TypeScript
    }

    fn convert_to_ir(&self, source: &FileSource, ctx: &FrontendContext) -> FileIr {
        let text = source.text().into_owned();
        let language = source.language();
        let grammar = self.pick_grammar(source, &text);
        let loc = text.lines().count() as u32;

        let outcome = match self.pool.parse_blocking(ParseRequest {
            language: grammar,
            content: text,
            path: source.relative_path.clone(),
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                return FileIrBuilder::failed(ctx, &source.relative_path, language, e.to_string());
            }
        };

        let mut builder = FileIrBuilder::new(ctx, &source.relative_path, language, loc);
        let mut walker = TsWalker {
            b: &mut builder,
            src: &outcome.content,
        };
        walker.visit(outcome.tree.root_node(), false, 0);
        builder.finish()
    }
}

struct TsWalker<'a, 'b> {
    b: &'b mut FileIrBuilder,
    src: &'a str,
}

impl<'a, 'b> TsWalker<'a, 'b> {
    fn visit(&mut self, node: Node, exported: bool, depth: usize) {
        if depth > MAX_WALK_DEPTH {
            return;
        }
        match node.kind() {
            "import_statement" => self.handle_import(node),
            "export_statement" => self.handle_export(node, depth),
            "class_declaration" | "abstract_class_declaration" => {
                self.handle_class(node, exported, depth)
            }
            "interface_declaration" => self.handle_interface(node, exported, depth),
            "enum_declaration" => self.handle_enum(node),
            "type_alias_declaration" => self.handle_type_alias(node),
            "function_declaration" | "generator_function_declaration" => {
                self.handle_function(node, exported, depth)
            }
            "lexical_declaration" | "variable_declaration" => {
                self.handle_variable_statement(node, exported, depth)
            }
            "call_expression" => self.handle_call(node, depth),
            "new_expression" => self.handle_new(node, depth),
            "assignment_expression" => self.handle_assignment(node, depth),
            _ => self.visit_children(node, depth),
        }
    }

    fn visit_children(&mut self, node: Node, depth: usize) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, false, depth + 1);
        }
    }

    // ── Imports ─────────────────────────────────────────────

    fn handle_import(&mut self, node: Node) {
        let Some(module) = node
            .child_by_field_name("source")
            .map(|n| string_value(&n, self.src))
        else {
            return;
        };
        let location = span_of(&node);
        let source_id = self.b.file_id().clone();

        let clause = {
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .find(|c| c.kind() == "import_clause")
        };
        let Some(clause) = clause else {
            // `import './polyfills';` keeps only the module specifier
            self.b.relate(
                source_id,
                module.clone(),
                location,
                RelationDetail::Imports {
                    module_specifier: module,
                    imported_entity_name: None,
                    alias: None,
                    is_side_effect: true,
                },
            );
            return;
        };

        let mut cursor = clause.walk();
        for child in clause.named_children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    let alias = text_of(&child, self.src).to_string();
                    self.b.relate(
                        source_id.clone(),
                        module.clone(),
                        location,
                        RelationDetail::Imports {
                            module_specifier: module.clone(),
                            imported_entity_name: Some("default".to_string()),
                            alias: Some(alias),
                            is_side_effect: false,
                        },
                    );
                }
                "namespace_import" => {
                    let alias = child
                        .named_child(0)
                        .map(|n| text_of(&n, self.src).to_string());
                    self.b.relate(
                        source_id.clone(),
                        module.clone(),
                        location,
                        RelationDetail::Imports {
                            module_specifier: module.clone(),
                            imported_entity_name: Some("*".to_string()),
                            alias,
                            is_side_effect: false,
                        },
                    );
                }
                "named_imports" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name) = spec
                            .child_by_field_name("name")
                            .map(|n| text_of(&n, self.src).to_string())
                        else {
                            continue;
                        };
                        let alias = spec
                            .child_by_field_name("alias")
                            .map(|n| text_of(&n, self.src).to_string());
                        self.b.relate(
                            source_id.clone(),
                            format!("{module}#{name}"),
                            span_of(&spec),
                            RelationDetail::Imports {
                                module_specifier: module.clone(),
                                imported_entity_name: Some(name),
                                alias,
                                is_side_effect: false,
                            },
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn handle_export(&mut self, node: Node, depth: usize) {
        if let Some(declaration) = node.child_by_field_name("declaration") {
            self.visit(declaration, true, depth + 1);
            return;
        }
        // `export { a, b } from './m'` re-imports the named bindings
        if let Some(module) = node
            .child_by_field_name("source")
            .map(|n| string_value(&n, self.src))
        {
            let source_id = self.b.file_id().clone();
            let mut cursor = node.walk();
            for clause in node.children(&mut cursor) {
                if clause.kind() != "export_clause" {
                    continue;
                }
                let mut inner = clause.walk();
                for spec in clause.named_children(&mut inner) {
                    if spec.kind() != "export_specifier" {
                        continue;
                    }
                    let Some(name) = spec
                        .child_by_field_name("name")
                        .map(|n| text_of(&n, self.src).to_string())
                    else {
                        continue;
                    };
                    self.b.relate(
                        source_id.clone(),
                        format!("{module}#{name}"),
                        span_of(&spec),
                        RelationDetail::Imports {
                            module_specifier: module.clone(),
                            imported_entity_name: Some(name),
                            alias: None,
                            is_side_effect: false,
                        },
                    );
                }
            }
        }
    }

    // ── Type declarations ───────────────────────────────────

    fn handle_class(&mut self, node: Node, exported: bool, depth: usize) {
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
            name: name.clone(),
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Class {
                is_abstract: node.kind() == "abstract_class_declaration",
                is_exported: exported,
            },
            tags: vec![],
        });

        self.emit_decorators(node, &id);
        self.emit_heritage(node, &id);

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                match member.kind() {
                    "method_definition" => self.handle_method(member, depth + 1),
                    "public_field_definition" | "field_definition" => self.handle_field(member),
                    _ => self.visit(member, false, depth + 1),
                }
            }
        }
        self.b.exit_scope();
    }

    fn emit_heritage(&mut self, class_node: Node, class_id: &arbor_core::CanonicalId) {
        let mut cursor = class_node.walk();
        for child in class_node.children(&mut cursor) {
            if child.kind() != "class_heritage" {
                continue;
            }
            let mut inner = child.walk();
            for clause in child.children(&mut inner) {
                let (detail, is_extends) = match clause.kind() {
                    "extends_clause" => (RelationDetail::Inherits, true),
                    "implements_clause" => (RelationDetail::Implements, false),
                    _ => continue,
                };
                let mut c2 = clause.walk();
                for target in clause.named_children(&mut c2) {
                    if target.kind() == "type_arguments" {
                        continue;
                    }
                    let pattern = text_of(&target, self.src).to_string();
                    if pattern.is_empty() {
                        continue;
                    }
                    self.b.relate(
                        class_id.clone(),
                        base_type_name(&pattern),
                        span_of(&target),
                        if is_extends {
                            RelationDetail::Inherits
                        } else {
                            detail.clone()
                        },
                    );
                }
            }
        }
    }

    fn handle_interface(&mut self, node: Node, exported: bool, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
        let id = self
            .b
            .mint_scoped(ElementKind::Interface, &qualified, location.start_line);

        self.b.add_element(IrElement {
            id: id.clone(),
            name: name.clone(),
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Interface {
                is_exported: exported,
            },
            tags: vec![],
        });

        // `interface A extends B, C`
        let mut cursor = node.walk();
        for clause in node.children(&mut cursor) {
            if clause.kind() != "extends_type_clause" && clause.kind() != "extends_clause" {
                continue;
            }
            let mut inner = clause.walk();
            for target in clause.named_children(&mut inner) {
                if target.kind() == "type_arguments" {
                    continue;
                }
                let pattern = text_of(&target, self.src).to_string();
                if !pattern.is_empty() {
                    self.b.relate(
                        id.clone(),
                        base_type_name(&pattern),
                        span_of(&target),
                        RelationDetail::Inherits,
                    );
                }
            }
        }

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                match member.kind() {
                    "method_signature" => self.handle_method_signature(member),
                    "property_signature" => self.handle_field(member),
                    _ => self.visit(member, false, depth + 1),
                }
            }
        }
        self.b.exit_scope();
    }

    fn handle_enum(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
        let id = self
            .b
            .mint_scoped(ElementKind::Enum, &qualified, location.start_line);

        let mut variants = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                let variant = match member.kind() {
                    "property_identifier" => Some(text_of(&member, self.src).to_string()),
                    "enum_assignment" => member
                        .child_by_field_name("name")
                        .map(|n| text_of(&n, self.src).to_string()),
                    _ => None,
                };
                if let Some(v) = variant {
                    variants.push(v);
                }
            }
        }

        self.b.add_element(IrElement {
            id,
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Enum { variants },
            tags: vec![],
        });
    }

    fn handle_type_alias(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
        let id = self
            .b
            .mint_scoped(ElementKind::TypeAlias, &qualified, location.start_line);
        let aliased = node
            .child_by_field_name("value")
            .map(|n| text_of(&n, self.src).to_string());

        self.b.add_element(IrElement {
            id,
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::TypeAlias {
                aliased_type: aliased,
            },
            tags: vec![],
        });
    }

    // ── Callables ───────────────────────────────────────────

    fn handle_function(&mut self, node: Node, exported: bool, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        self.add_function_element(node, &name, exported, depth, None);
    }

    /// Shared by function declarations and arrow/function expressions bound
    /// to variables; `value_node` overrides where parameters/body live.
    fn add_function_element(
        &mut self,
        node: Node,
        name: &str,
        exported: bool,
        depth: usize,
        value_node: Option<Node>,
    ) {
        let callable = value_node.unwrap_or(node);
        let parameters = self.parameters_of(callable);
        let qualified = self.b.qualify(name);
        let location = span_of(&node);
        let id = self.b.mint_callable(
            ElementKind::Function,
            &qualified,
            &parameters,
            location.start_line,
        );
        let is_async = has_keyword_child(callable, "async") || contains_await(callable, 0);

        self.b.add_element(IrElement {
            id: id.clone(),
            name: name.to_string(),
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Function {
                parameters,
                return_type: self.return_type_of(callable),
                is_async,
                is_exported: exported,
            },
            tags: vec![],
        });

        self.b.enter_scope(id, qualified);
        if let Some(body) = callable.child_by_field_name("body") {
            self.visit(body, false, depth + 1);
        }
        self.b.exit_scope();
    }

    fn handle_method(&mut self, node: Node, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let parameters = self.parameters_of(node);
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
        let id = self.b.mint_callable(
            ElementKind::Method,
            &qualified,
            &parameters,
            location.start_line,
        );
        let is_async = has_keyword_child(node, "async") || contains_await(node, 0);

        self.b.add_element(IrElement {
            id: id.clone(),
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Method {
                parameters,
                return_type: self.return_type_of(node),
                is_async,
                is_static: has_keyword_child(node, "static"),
                receiver: None,
                receiver_position: None,
            },
            tags: vec![],
        });

        self.emit_decorators(node, &id);

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body, false, depth + 1);
        }
        self.b.exit_scope();
    }

    fn handle_method_signature(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let parameters = self.parameters_of(node);
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
        let id = self.b.mint_callable(
            ElementKind::Method,
            &qualified,
            &parameters,
            location.start_line,
        );
        self.b.add_element(IrElement {
            id,
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Method {
                parameters,
                return_type: self.return_type_of(node),
                is_async: false,
                is_static: false,
                receiver: None,
                receiver_position: None,
            },
            tags: vec![],
        });
    }

    fn handle_field(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
        let id = self
            .b
            .mint_scoped(ElementKind::Field, &qualified, location.start_line);
        let declared_type = node
            .child_by_field_name("type")
            .map(|t| annotation_type(&t, self.src));

        self.b.add_element(IrElement {
            id,
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Field {
                declared_type,
                is_static: has_keyword_child(node, "static"),
            },
            tags: vec![],
        });
    }

    fn handle_variable_statement(&mut self, node: Node, exported: bool, depth: usize) {
        let at_module_level = self.b.parent_id().is_none();
        let is_const = node
            .child(0)
            .map(|c| text_of(&c, self.src) == "const")
            .unwrap_or(false);

        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            if name_node.kind() != "identifier" {
                // destructuring patterns still get their initializers walked
                if let Some(value) = declarator.child_by_field_name("value") {
                    self.visit(value, false, depth + 1);
                }
                continue;
            }
            let name = text_of(&name_node, self.src).to_string();
            let value = declarator.child_by_field_name("value");

            match value {
                Some(v) if matches!(v.kind(), "arrow_function" | "function_expression" | "function") =>
                {
                    self.add_function_element(declarator, &name, exported, depth, Some(v));
                }
                _ => {
                    if at_module_level {
                        let location = span_of(&declarator);
                        let qualified = self.b.qualify(&name);
                        let id = self.b.mint_scoped(
                            ElementKind::Variable,
                            &qualified,
                            location.start_line,
                        );
                        let declared_type = declarator
                            .child_by_field_name("type")
                            .map(|t| annotation_type(&t, self.src));
                        self.b.add_element(IrElement {
                            id,
                            name,
                            file_path: self.b.file_path().to_string(),
                            location,
                            parent_id: None,
                            payload: ElementPayload::Variable {
                                declared_type,
                                is_const,
                            },
                            tags: vec![],
                        });
                    }
                    if let Some(v) = value {
                        self.visit(v, false, depth + 1);
                    }
                }
            }
        }
    }

    // ── Expressions ─────────────────────────────────────────

    fn handle_call(&mut self, node: Node, depth: usize) {
        let Some(callee) = node.child_by_field_name("function") else {
            self.visit_children(node, depth);
            return;
        };
        let location = span_of(&node);
        let source_id = self.b.scope_source();
        let callee_text = text_of(&callee, self.src);

        if callee.kind() == "identifier" && callee_text == "fetch" {
            self.emit_fetch(node, "fetch");
        } else if callee.kind() == "member_expression" {
            let object = callee
                .child_by_field_name("object")
                .map(|n| text_of(&n, self.src).to_string());
            let property = callee
                .child_by_field_name("property")
                .map(|n| text_of(&n, self.src).to_string());
            match (object.as_deref(), property.as_deref()) {
                (Some("axios"), Some(method)) if AXIOS_METHODS.contains(&method) => {
                    self.emit_axios_method(node, method);
                }
                (Some("axios"), Some("request")) => {
                    self.emit_axios_request(node);
                }
                _ => {
                    self.b.relate(
                        source_id,
                        callee_text.to_string(),
                        location,
                        RelationDetail::Calls { receiver: object },
                    );
                }
            }
        } else if callee.kind() == "identifier" {
            self.b.relate(
                source_id,
                callee_text.to_string(),
                location,
                RelationDetail::Calls { receiver: None },
            );
        }

        // nested calls in the callee chain and in arguments
        if callee.kind() != "identifier" {
            self.visit(callee, false, depth + 1);
        }
        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.visit_children(arguments, depth);
        }
    }

    fn handle_new(&mut self, node: Node, depth: usize) {
        if let Some(constructor) = node.child_by_field_name("constructor") {
            let pattern = text_of(&constructor, self.src).to_string();
            if !pattern.is_empty() {
                self.b.relate(
                    self.b.scope_source(),
                    pattern,
                    span_of(&node),
                    RelationDetail::Instantiates,
                );
            }
        }
        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.visit_children(arguments, depth);
        }
    }

    fn handle_assignment(&mut self, node: Node, depth: usize) {
        let source_id = self.b.scope_source();
        if let Some(left) = node.child_by_field_name("left") {
            if left.kind() == "identifier" {
                self.b.relate(
                    source_id.clone(),
                    text_of(&left, self.src).to_string(),
                    span_of(&left),
                    RelationDetail::Writes,
                );
            }
        }
        if let Some(right) = node.child_by_field_name("right") {
            if right.kind() == "identifier" {
                self.b.relate(
                    source_id,
                    text_of(&right, self.src).to_string(),
                    span_of(&right),
                    RelationDetail::Reads,
                );
            } else {
                self.visit(right, false, depth + 1);
            }
        }
    }

    // ── API fetch extraction ────────────────────────────────

    fn emit_fetch(&mut self, call: Node, framework: &str) {
        let Some(arguments) = call.child_by_field_name("arguments") else {
            return;
        };
        let args: Vec<Node> = named_args(arguments);
        let Some(url_node) = args.first() else {
            return;
        };
        let url_pattern = self.reduce_url(*url_node);
        let http_method = args
            .get(1)
            .and_then(|options| self.object_string_entry(*options, "method"))
            .map(|m| m.to_ascii_uppercase())
            .unwrap_or_else(|| "GET".to_string());

        self.b.relate(
            self.b.scope_source(),
            url_pattern.clone(),
            span_of(&call),
            RelationDetail::ApiFetch {
                http_method,
                url_pattern,
                framework: framework.to_string(),
            },
        );
    }

    fn emit_axios_method(&mut self, call: Node, method: &str) {
        let Some(arguments) = call.child_by_field_name("arguments") else {
            return;
        };
        let args = named_args(arguments);
        let Some(url_node) = args.first() else {
            return;
        };
        let url_pattern = self.reduce_url(*url_node);
        self.b.relate(
            self.b.scope_source(),
            url_pattern.clone(),
            span_of(&call),
            RelationDetail::ApiFetch {
                http_method: method.to_ascii_uppercase(),
                url_pattern,
                framework: "axios".to_string(),
            },
        );
    }

    fn emit_axios_request(&mut self, call: Node) {
        let Some(arguments) = call.child_by_field_name("arguments") else {
            return;
        };
        let args = named_args(arguments);
        let Some(config) = args.first().filter(|n| n.kind() == "object") else {
            return;
        };
        let Some(url_pattern) = self.object_url_entry(*config, "url") else {
            return;
        };
        let http_method = self
            .object_string_entry(*config, "method")
            .map(|m| m.to_ascii_uppercase())
            .unwrap_or_else(|| "GET".to_string());
        self.b.relate(
            self.b.scope_source(),
            url_pattern.clone(),
            span_of(&call),
            RelationDetail::ApiFetch {
                http_method,
                url_pattern,
                framework: "axios".to_string(),
            },
        );
    }

    /// Reduce a URL expression to a pattern: template substitutions and
    /// non-literal parts become `{var}`, concatenations reduce recursively.
    fn reduce_url(&self, node: Node) -> String {
        match node.kind() {
            "string" => string_value(&node, self.src),
            "template_string" => {
                let mut out = String::new();
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    match child.kind() {
                        "template_substitution" => out.push_str("{var}"),
                        "`" => {}
                        _ => out.push_str(text_of(&child, self.src)),
                    }
                }
                out
            }
            "binary_expression" => {
                let left = node
                    .child_by_field_name("left")
                    .map(|n| self.reduce_url(n))
                    .unwrap_or_default();
                let right = node
                    .child_by_field_name("right")
                    .map(|n| self.reduce_url(n))
                    .unwrap_or_default();
                format!("{left}{right}")
            }
            "parenthesized_expression" => node
                .named_child(0)
                .map(|n| self.reduce_url(n))
                .unwrap_or_else(|| "{var}".to_string()),
            _ => "{var}".to_string(),
        }
    }

    fn object_string_entry(&self, object: Node, key: &str) -> Option<String> {
        if object.kind() != "object" {
            return None;
        }
        let mut cursor = object.walk();
        for pair in object.named_children(&mut cursor) {
            if pair.kind() != "pair" {
                continue;
            }
            let key_node = pair.child_by_field_name("key")?;
            if text_of(&key_node, self.src).trim_matches(['"', '\'']) != key {
                continue;
            }
            let value = pair.child_by_field_name("value")?;
            if value.kind() == "string" {
                return Some(string_value(&value, self.src));
            }
        }
        None
    }

    fn object_url_entry(&self, object: Node, key: &str) -> Option<String> {
        let mut cursor = object.walk();
        for pair in object.named_children(&mut cursor) {
            if pair.kind() != "pair" {
                continue;
            }
            let key_node = pair.child_by_field_name("key")?;
            if text_of(&key_node, self.src).trim_matches(['"', '\'']) != key {
                continue;
            }
            return pair
                .child_by_field_name("value")
                .map(|v| self.reduce_url(v));
        }
        None
    }

    // ── Shared pieces ───────────────────────────────────────

    fn emit_decorators(&mut self, node: Node, element_id: &arbor_core::CanonicalId) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "decorator" {
                continue;
            }
            let Some(expr) = child.named_child(0) else {
                continue;
            };
            let (pattern, arguments) = match expr.kind() {
                "call_expression" => {
                    let name = expr
                        .child_by_field_name("function")
                        .map(|n| text_of(&n, self.src).to_string())
                        .unwrap_or_default();
                    let args = expr
                        .child_by_field_name("arguments")
                        .map(|n| text_of(&n, self.src).to_string());
                    (name, args)
                }
                _ => (text_of(&expr, self.src).to_string(), None),
            };
            if pattern.is_empty() {
                continue;
            }
            self.b.relate(
                element_id.clone(),
                pattern,
                span_of(&child),
                RelationDetail::UsesAnnotation { arguments },
            );
        }
    }

    fn parameters_of(&self, callable: Node) -> Vec<Parameter> {
        let Some(params) = callable
            .child_by_field_name("parameters")
            .or_else(|| callable.child_by_field_name("parameter"))
        else {
            return vec![];
        };
        if params.kind() == "identifier" {
            // single-parameter arrow function
            return vec![Parameter::untyped(text_of(&params, self.src))];
        }
        let mut out = Vec::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            match param.kind() {
                "required_parameter" | "optional_parameter" => {
                    let Some(pattern) = param.child_by_field_name("pattern") else {
                        continue;
                    };
                    let name = text_of(&pattern, self.src).to_string();
                    match param.child_by_field_name("type") {
                        Some(t) => out.push(Parameter::typed(name, annotation_type(&t, self.src))),
                        None => out.push(Parameter::untyped(name)),
                    }
                }
                "identifier" => out.push(Parameter::untyped(text_of(&param, self.src))),
                "rest_parameter" => {
                    out.push(Parameter::untyped(text_of(&param, self.src)));
                }
                _ => {}
            }
        }
        out
    }

    fn return_type_of(&self, callable: Node) -> Option<String> {
        callable
            .child_by_field_name("return_type")
            .map(|t| annotation_type(&t, self.src))
    }
}

/// Text of a type annotation without its leading `:`.
fn annotation_type(node: &Node, src: &str) -> String {
    match node.named_child(0) {
        Some(inner) => text_of(&inner, src).to_string(),
        None => text_of(node, src).trim_start_matches(':').trim().to_string(),
    }
}

/// Value of a string literal node, quotes stripped.
fn string_value(node: &Node, src: &str) -> String {
    let mut cursor = node.walk();
    let fragments: String = node
        .children(&mut cursor)
        .filter(|c| c.kind() == "string_fragment")
        .map(|c| text_of(&c, src).to_string())
        .collect();
    if fragments.is_empty() {
        text_of(node, src).trim_matches(['"', '\'', '`']).to_string()
    } else {
        fragments
    }
}

/// Simple name of a heritage target: `Base<T>` -> `Base`, `ns.Base` kept.
fn base_type_name(raw: &str) -> String {
    raw.split('<').next().unwrap_or(raw).trim().to_string()
}

fn has_keyword_child(node: Node, keyword: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == keyword)
}

fn contains_await(node: Node, depth: usize) -> bool {
    if depth > MAX_WALK_DEPTH {
        return false;
    }
    if node.kind() == "await_expression" {
        return true;
    }
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| {
        // nested functions own their own awaits
        !matches!(
            c.kind(),
            "function_declaration" | "function_expression" | "arrow_function" | "method_definition"
        ) && contains_await(c, depth + 1)
    })
}

fn named_args(arguments: Node) -> Vec<Node> {
    let mut cursor = arguments.walk();
    let out: Vec<Node> = arguments.named_children(&mut cursor).collect();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser_pool::ParserPool;
    use arbor_core::{RelationKind, SourceLanguage};
    use std::path::PathBuf;

    fn convert(path: &str, code: &str) -> FileIr {
        let frontend = TypeScriptFrontend::new(ParserPool::new(1));
        let ctx = FrontendContext::new("demo");
        let ext = path.rsplit('.').next().unwrap().to_string();
        frontend.convert_to_ir(
            &FileSource {
                absolute_path: PathBuf::from(format!("/tmp/{path}")),
                relative_path: path.to_string(),
                extension: ext,
                contents: code.as_bytes().to_vec(),
                declared_language: None,
            },
            &ctx,
        )
    }

    fn imports(ir: &FileIr) -> Vec<&arbor_core::PotentialRelationship> {
        ir.potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Imports)
            .collect()
    }

    #[test]
    fn default_and_named_imports_produce_one_candidate_each() {
        let ir = convert("src/a.ts", "import React, { useState } from 'react';\n");
        let found = imports(&ir);
        assert_eq!(found.len(), 2);

        let RelationDetail::Imports {
            module_specifier,
            imported_entity_name,
            alias,
            ..
        } = &found[0].detail
        else {
            panic!("expected import detail");
        };
        assert_eq!(module_specifier, "react");
        assert_eq!(imported_entity_name.as_deref(), Some("default"));
        assert_eq!(alias.as_deref(), Some("React"));
        assert_eq!(found[0].target_pattern, "react");

        let RelationDetail::Imports {
            imported_entity_name,
            ..
        } = &found[1].detail
        else {
            panic!("expected import detail");
        };
        assert_eq!(imported_entity_name.as_deref(), Some("useState"));
        assert_eq!(found[1].target_pattern, "react#useState");
    }

    #[test]
    fn namespace_and_side_effect_imports() {
        let ir = convert(
            "src/a.ts",
            "import * as path from 'path';\nimport './polyfills';\n",
        );
        let found = imports(&ir);
        assert_eq!(found.len(), 2);
        let RelationDetail::Imports {
            imported_entity_name,
            alias,
            ..
        } = &found[0].detail
        else {
            panic!()
        };
        assert_eq!(imported_entity_name.as_deref(), Some("*"));
        assert_eq!(alias.as_deref(), Some("path"));
        let RelationDetail::Imports { is_side_effect, .. } = &found[1].detail else {
            panic!()
        };
        assert!(is_side_effect);
    }

    #[test]
    fn class_with_heritage_emits_inherits_and_implements() {
        let ir = convert(
            "src/dog.ts",
            "class Dog extends Animal implements IBark { bark() {} }\n",
        );
        let class_el = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Class)
            .unwrap();
        assert_eq!(class_el.name, "Dog");
        let method = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Method)
            .unwrap();
        assert_eq!(method.name, "bark");
        assert_eq!(method.parent_id.as_ref(), Some(&class_el.id));

        let inherits: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Inherits)
            .collect();
        assert_eq!(inherits.len(), 1);
        assert_eq!(inherits[0].target_pattern, "Animal");
        assert_eq!(inherits[0].source_id, class_el.id);

        let implements: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Implements)
            .collect();
        assert_eq!(implements.len(), 1);
        assert_eq!(implements[0].target_pattern, "IBark");
    }

    #[test]
    fn arrow_function_takes_variable_name() {
        let ir = convert(
            "src/util.ts",
            "export const sum = async (a: number, b: number): Promise<number> => a + b;\n",
        );
        let func = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Function)
            .unwrap();
        assert_eq!(func.name, "sum");
        let ElementPayload::Function {
            parameters,
            is_async,
            is_exported,
            ..
        } = &func.payload
        else {
            panic!()
        };
        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters[0].type_name.as_deref(), Some("number"));
        assert!(is_async);
        assert!(is_exported);
    }

    #[test]
    fn await_descendant_marks_function_async() {
        let ir = convert(
            "src/a.ts",
            "function load() { return fetch('/x').then(r => r); }\nfunction wait() { return (async () => { await load(); })(); }\n",
        );
        let load = ir.elements.iter().find(|e| e.name == "load").unwrap();
        let ElementPayload::Function { is_async, .. } = &load.payload else {
            panic!()
        };
        assert!(!is_async);
    }

    #[test]
    fn fetch_with_template_url_reduces_substitutions() {
        let ir = convert(
            "src/api.ts",
            "async function createUser(id: string) {\n  await fetch(`/api/users/${id}`, { method: 'POST' });\n}\n",
        );
        let fetches: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::ApiFetch)
            .collect();
        assert_eq!(fetches.len(), 1);
        let RelationDetail::ApiFetch {
            http_method,
            url_pattern,
            framework,
        } = &fetches[0].detail
        else {
            panic!()
        };
        assert_eq!(http_method, "POST");
        assert_eq!(url_pattern, "/api/users/{var}");
        assert_eq!(framework, "fetch");
        // emitted from inside createUser, not the file
        let func = ir.elements.iter().find(|e| e.name == "createUser").unwrap();
        assert_eq!(fetches[0].source_id, func.id);
    }

    #[test]
    fn axios_method_and_request_forms() {
        let ir = convert(
            "src/api.ts",
            "import axios from 'axios';\nfunction go(id: string) {\n  axios.get('/items/' + id);\n  axios.request({ url: '/orders', method: 'put' });\n}\n",
        );
        let fetches: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::ApiFetch)
            .collect();
        assert_eq!(fetches.len(), 2);
        let RelationDetail::ApiFetch {
            http_method,
            url_pattern,
            ..
        } = &fetches[0].detail
        else {
            panic!()
        };
        assert_eq!(http_method, "GET");
        assert_eq!(url_pattern, "/items/{var}");
        let RelationDetail::ApiFetch {
            http_method,
            url_pattern,
            ..
        } = &fetches[1].detail
        else {
            panic!()
        };
        assert_eq!(http_method, "PUT");
        assert_eq!(url_pattern, "/orders");
    }

    #[test]
    fn calls_and_instantiations_are_observed() {
        let ir = convert(
            "src/a.ts",
            "function main() {\n  const s = new Service();\n  helper();\n  s.run();\n}\n",
        );
        let kinds: Vec<RelationKind> = ir
            .potential_relationships
            .iter()
            .map(|r| r.kind())
            .collect();
        assert!(kinds.contains(&RelationKind::Instantiates));
        let calls: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Calls)
            .collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].target_pattern, "helper");
        assert_eq!(calls[1].target_pattern, "s.run");
    }

    #[test]
    fn parse_failure_yields_empty_ir_with_error() {
        let frontend = TypeScriptFrontend::new(ParserPool::new(1));
        let ctx = FrontendContext::new("demo");
        let ir = frontend.convert_to_ir(
            &FileSource {
                absolute_path: PathBuf::from("/tmp/a.sql"),
                relative_path: "a.sql".to_string(),
                extension: "sql".to_string(),
                contents: b"SELECT 1;".to_vec(),
                declared_language: Some(SourceLanguage::Sql),
            },
            &ctx,
        );
        assert!(ir.elements.is_empty());
        assert_eq!(ir.errors.len(), 1);
    }

    #[test]
    fn ids_are_stable_across_runs() {
        let a = convert("src/a.ts", "export class User { save() {} }\n");
        let b = convert("src/a.ts", "export class User { save() {} }\n");
        let ids_a: Vec<_> = a.elements.iter().map(|e| e.id.clone()).collect();
        let ids_b: Vec<_> = b.elements.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn every_relationship_source_exists_in_elements() {
        let ir = convert(
            "src/a.ts",
            "import x from 'y';\nclass A extends B { m() { other(); } }\nconst f = () => fetch('/z');\n",
        );
        for rel in &ir.potential_relationships {
            assert!(
                ir.elements.iter().any(|e| e.id == rel.source_id),
                "dangling source {}",
                rel.source_id
            );
        }
    }
}

//! C++ frontend.
//!
//! Namespaces become package elements; classes carry their base-class
//! clauses as inheritance candidates; out-of-line `Qualified::name`
//! definitions attach to their class qualifier.

use tree_sitter::Node;

use arbor_core::{
    CanonicalId, ElementKind, ElementPayload, FileIr, IrElement, Parameter, RelationDetail,
    SourceLanguage,
};

use crate::frontend::{FileSource, FrontendContext, LanguageFrontend};
use crate::parser_pool::{ParseRequest, ParserPool};
use crate::walk::{span_of, text_of, FileIrBuilder, MAX_WALK_DEPTH};

pub struct CppFrontend {
    pool: ParserPool,
}

impl CppFrontend {
    pub fn new(pool: ParserPool) -> Self {
        Self { pool }
    }
}

impl LanguageFrontend for CppFrontend {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::Cpp
    }

    fn convert_to_ir(&self, source: &FileSource, ctx: &FrontendContext) -> FileIr {
        let text = source.text().into_owned();
        let loc = text.lines().count() as u32;

        let outcome = match self.pool.parse_blocking(ParseRequest {
            language: SourceLanguage::Cpp,
            content: text,
            path: source.relative_path.clone(),
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                return FileIrBuilder::failed(
                    ctx,
                    &source.relative_path,
                    SourceLanguage::Cpp,
                    e.to_string(),
                );
            }
        };

        let mut builder = FileIrBuilder::new(ctx, &source.relative_path, SourceLanguage::Cpp, loc);
        let mut walker = CppWalker {
            b: &mut builder,
            src: &outcome.content,
            namespace_id: None,
        };
        walker.visit(outcome.tree.root_node(), 0);
        builder.finish()
    }
}

struct CppWalker<'a, 'b> {
    b: &'b mut FileIrBuilder,
    src: &'a str,
    namespace_id: Option<CanonicalId>,
}

impl<'a, 'b> CppWalker<'a, 'b> {
    fn visit(&mut self, node: Node, depth: usize) {
        if depth > MAX_WALK_DEPTH {
            return;
        }
        match node.kind() {
            "preproc_include" => self.handle_include(node),
            "namespace_definition" => self.handle_namespace(node, depth),
            "class_specifier" | "struct_specifier" => self.handle_class(node, depth),
            "enum_specifier" => self.handle_enum(node),
            "function_definition" => self.handle_function(node, depth),
            "template_declaration" => self.visit_children(node, depth),
            "call_expression" => self.handle_call(node, depth),
            "new_expression" => self.handle_new(node, depth),
            _ => self.visit_children(node, depth),
        }
    }

    fn visit_children(&mut self, node: Node, depth: usize) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, depth + 1);
        }
    }

    fn handle_include(&mut self, node: Node) {
        let Some(path_node) = node.child_by_field_name("path") else {
            return;
        };
        let raw = text_of(&path_node, self.src);
        let path = raw.trim_matches(['"', '<', '>']).to_string();
        self.b.relate(
            self.b.file_id().clone(),
            path.clone(),
            span_of(&node),
            RelationDetail::Imports {
                module_specifier: path,
                imported_entity_name: None,
                alias: None,
                is_side_effect: path_node.kind() == "system_lib_string",
            },
        );
    }

    fn handle_namespace(&mut self, node: Node, depth: usize) {
        let name = node
            .child_by_field_name("name")
            .map(|n| text_of(&n, self.src).to_string());
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            // anonymous namespaces only contribute their contents
            if let Some(body) = node.child_by_field_name("body") {
                self.visit_children(body, depth);
            }
            return;
        };
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

        let previous = self.namespace_id.replace(id);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, depth);
        }
        self.namespace_id = previous;
    }

    fn type_parent(&self) -> Option<CanonicalId> {
        self.b.parent_id().or_else(|| self.namespace_id.clone())
    }

    fn handle_class(&mut self, node: Node, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        // references without a body (`class Foo;`, `struct Foo *p`) are not
        // definitions
        let Some(body) = node.child_by_field_name("body") else {
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
            parent_id: self.type_parent(),
            payload: ElementPayload::Class {
                is_abstract: false,
                is_exported: true,
            },
            tags: vec![],
        });

        // `class Dog : public Animal, private Tag`
        let mut cursor = node.walk();
        for clause in node.children(&mut cursor) {
            if clause.kind() != "base_class_clause" {
                continue;
            }
            let mut inner = clause.walk();
            for base in clause.named_children(&mut inner) {
                if !matches!(
                    base.kind(),
                    "type_identifier" | "qualified_identifier" | "template_type"
                ) {
                    continue;
                }
                self.b.relate(
                    id.clone(),
                    erase_template(text_of(&base, self.src)),
                    span_of(&base),
                    RelationDetail::Inherits,
                );
            }
        }

        self.b.enter_scope(id, qualified);
        let mut c2 = body.walk();
        for member in body.named_children(&mut c2) {
            match member.kind() {
                "function_definition" => self.handle_function(member, depth),
                "field_declaration" => self.handle_member_declaration(member, depth),
                _ => self.visit(member, depth + 1),
            }
        }
        self.b.exit_scope();
    }

    /// In-class declarations: method prototypes and data members share the
    /// `field_declaration` kind.
    fn handle_member_declaration(&mut self, node: Node, _depth: usize) {
        if let Some(declarator) = node.child_by_field_name("declarator") {
            if declarator.kind() == "function_declarator" {
                self.add_method(node, declarator);
                return;
            }
        }
        let Some(declarator) = node.child_by_field_name("declarator") else {
            return;
        };
        let name = text_of(&declarator, self.src)
            .trim_start_matches(['*', '&'])
            .to_string();
        if name.is_empty() {
            return;
        }
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
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
                declared_type: node
                    .child_by_field_name("type")
                    .map(|t| text_of(&t, self.src).to_string()),
                is_static: false,
            },
            tags: vec![],
        });
    }

    fn add_method(&mut self, decl: Node, declarator: Node) {
        let Some(name_node) = declarator.child_by_field_name("declarator") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let parameters = self.parameters_of(declarator);
        let qualified = self.b.qualify(&name);
        let location = span_of(&decl);
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
                return_type: decl
                    .child_by_field_name("type")
                    .map(|t| text_of(&t, self.src).to_string()),
                is_async: false,
                is_static: false,
                receiver: None,
                receiver_position: None,
            },
            tags: vec![],
        });
    }

    fn handle_function(&mut self, node: Node, depth: usize) {
        let Some(declarator) = find_function_declarator(node) else {
            self.visit_children(node, depth);
            return;
        };
        let Some(raw_name) = declarator
            .child_by_field_name("declarator")
            .map(|n| text_of(&n, self.src).to_string())
        else {
            return;
        };
        // out-of-line definitions use their qualifier as the enclosing type
        let (kind, qualified, name) = match raw_name.rsplit_once("::") {
            Some((scope, method)) => (
                ElementKind::Method,
                format!("{scope}.{method}").replace("::", "."),
                method.to_string(),
            ),
            None => {
                let qualified = self.b.qualify(&raw_name);
                let kind = if self.b.parent_id().is_some() {
                    ElementKind::Method
                } else {
                    ElementKind::Function
                };
                (kind, qualified, raw_name)
            }
        };
        let parameters = self.parameters_of(declarator);
        let location = span_of(&node);
        let id = self
            .b
            .mint_callable(kind, &qualified, &parameters, location.start_line);
        let return_type = node
            .child_by_field_name("type")
            .map(|t| text_of(&t, self.src).to_string());
        let payload = match kind {
            ElementKind::Method => ElementPayload::Method {
                parameters,
                return_type,
                is_async: false,
                is_static: false,
                receiver: None,
                receiver_position: None,
            },
            _ => ElementPayload::Function {
                parameters,
                return_type,
                is_async: false,
                is_exported: true,
            },
        };
        self.b.add_element(IrElement {
            id: id.clone(),
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.type_parent(),
            payload,
            tags: vec![],
        });

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body, depth + 1);
        }
        self.b.exit_scope();
    }

    fn handle_enum(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
        let id = self
            .b
            .mint_scoped(ElementKind::Enum, &qualified, location.start_line);
        let mut variants = Vec::new();
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            if member.kind() == "enumerator" {
                if let Some(n) = member.child_by_field_name("name") {
                    variants.push(text_of(&n, self.src).to_string());
                }
            }
        }
        self.b.add_element(IrElement {
            id,
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.type_parent(),
            payload: ElementPayload::Enum { variants },
            tags: vec![],
        });
    }

    fn handle_call(&mut self, node: Node, depth: usize) {
        if let Some(function) = node.child_by_field_name("function") {
            match function.kind() {
                "identifier" | "qualified_identifier" => {
                    self.b.relate(
                        self.b.scope_source(),
                        text_of(&function, self.src).replace("::", "."),
                        span_of(&node),
                        RelationDetail::Calls { receiver: None },
                    );
                }
                "field_expression" => {
                    let receiver = function
                        .child_by_field_name("argument")
                        .map(|n| text_of(&n, self.src).to_string());
                    self.b.relate(
                        self.b.scope_source(),
                        text_of(&function, self.src).to_string(),
                        span_of(&node),
                        RelationDetail::Calls { receiver },
                    );
                }
                _ => self.visit(function, depth + 1),
            }
        }
        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.visit_children(arguments, depth);
        }
    }

    fn handle_new(&mut self, node: Node, depth: usize) {
        if let Some(type_node) = node.child_by_field_name("type") {
            self.b.relate(
                self.b.scope_source(),
                erase_template(text_of(&type_node, self.src)),
                span_of(&node),
                RelationDetail::Instantiates,
            );
        }
        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.visit_children(arguments, depth);
        }
    }

    fn parameters_of(&self, declarator: Node) -> Vec<Parameter> {
        let Some(params) = declarator.child_by_field_name("parameters") else {
            return vec![];
        };
        let mut out = Vec::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            if !matches!(
                param.kind(),
                "parameter_declaration" | "optional_parameter_declaration"
            ) {
                continue;
            }
            let type_name = param
                .child_by_field_name("type")
                .map(|t| text_of(&t, self.src).to_string());
            let name = param
                .child_by_field_name("declarator")
                .map(|d| {
                    text_of(&d, self.src)
                        .trim_start_matches(['*', '&'])
                        .to_string()
                })
                .filter(|n| !n.is_empty());
            match (name, type_name) {
                (Some(n), Some(t)) => out.push(Parameter::typed(n, t)),
                (Some(n), None) => out.push(Parameter::untyped(n)),
                (None, Some(t)) => out.push(Parameter::untyped(t)),
                _ => {}
            }
        }
        out
    }
}

/// Unwrap pointer/reference declarators down to the function_declarator.
fn find_function_declarator(node: Node) -> Option<Node> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "function_declarator" => return Some(current),
            "pointer_declarator" | "reference_declarator" | "parenthesized_declarator" => {
                current = current.child_by_field_name("declarator").or_else(|| {
                    let mut cursor = current.walk();
                    current.named_children(&mut cursor).next()
                })?;
            }
            _ => return None,
        }
    }
}

fn erase_template(raw: &str) -> String {
    raw.split('<').next().unwrap_or(raw).trim().to_string()
}

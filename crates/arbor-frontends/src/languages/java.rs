//! Java frontend.
//!
//! Packages become elements and parent the types declared under them;
//! Spring-style mapping annotations additionally surface as route
//! definitions.

use tree_sitter::Node;

use arbor_core::{
    CanonicalId, ElementKind, ElementPayload, FileIr, IrElement, Parameter, RelationDetail,
    SourceLanguage,
};

use crate::frontend::{FileSource, FrontendContext, LanguageFrontend};
use crate::parser_pool::{ParseRequest, ParserPool};
use crate::walk::{span_of, text_of, FileIrBuilder, MAX_WALK_DEPTH};

/// `@GetMapping`-style annotations and the methods they imply.
const MAPPING_ANNOTATIONS: &[(&str, &str)] = &[
    ("GetMapping", "GET"),
    ("PostMapping", "POST"),
    ("PutMapping", "PUT"),
    ("DeleteMapping", "DELETE"),
    ("PatchMapping", "PATCH"),
    ("RequestMapping", "GET"),
];

pub struct JavaFrontend {
    pool: ParserPool,
}

impl JavaFrontend {
    pub fn new(pool: ParserPool) -> Self {
        Self { pool }
    }
}

impl LanguageFrontend for JavaFrontend {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::Java
    }

    fn convert_to_ir(&self, source: &FileSource, ctx: &FrontendContext) -> FileIr {
        let text = source.text().into_owned();
        let loc = text.lines().count() as u32;

        let outcome = match self.pool.parse_blocking(ParseRequest {
            language: SourceLanguage::Java,
            content: text,
            path: source.relative_path.clone(),
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                return FileIrBuilder::failed(
                    ctx,
                    &source.relative_path,
                    SourceLanguage::Java,
                    e.to_string(),
                );
            }
        };

        let mut builder = FileIrBuilder::new(ctx, &source.relative_path, SourceLanguage::Java, loc);
        let mut walker = JavaWalker {
            b: &mut builder,
            src: &outcome.content,
            package_id: None,
        };
        walker.visit(outcome.tree.root_node(), 0);
        builder.finish()
    }
}

struct JavaWalker<'a, 'b> {
    b: &'b mut FileIrBuilder,
    src: &'a str,
    package_id: Option<CanonicalId>,
}

impl<'a, 'b> JavaWalker<'a, 'b> {
    fn visit(&mut self, node: Node, depth: usize) {
        if depth > MAX_WALK_DEPTH {
            return;
        }
        match node.kind() {
            "package_declaration" => self.handle_package(node),
            "import_declaration" => self.handle_import(node),
            "class_declaration" => self.handle_class(node, depth),
            "interface_declaration" => self.handle_interface(node, depth),
            "enum_declaration" => self.handle_enum(node, depth),
            "annotation_type_declaration" => self.handle_annotation_type(node),
            "method_invocation" => self.handle_invocation(node, depth),
            "object_creation_expression" => self.handle_new(node, depth),
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
        let found = node
            .named_children(&mut cursor)
            .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"));
        let Some(name_node) = found else {
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

    /// One candidate per import; `import a.b.*` is a wildcard on the
    /// containing package.
    fn handle_import(&mut self, node: Node) {
        let mut cursor = node.walk();
        let Some(path_node) = node
            .named_children(&mut cursor)
            .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
        else {
            return;
        };
        let path = text_of(&path_node, self.src).to_string();
        let is_wildcard = {
            let mut c2 = node.walk();
            node.children(&mut c2).any(|c| c.kind() == "asterisk")
        };
        let imported = if is_wildcard {
            Some("*".to_string())
        } else {
            path.rsplit('.').next().map(|s| s.to_string())
        };
        self.b.relate(
            self.b.file_id().clone(),
            path.clone(),
            span_of(&node),
            RelationDetail::Imports {
                module_specifier: path,
                imported_entity_name: imported,
                alias: None,
                is_side_effect: false,
            },
        );
    }

    fn type_parent(&self) -> Option<CanonicalId> {
        self.b.parent_id().or_else(|| self.package_id.clone())
    }

    fn handle_class(&mut self, node: Node, depth: usize) {
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
        let modifiers = modifiers_node(node);
        let is_abstract = modifiers
            .map(|m| text_of(&m, self.src).contains("abstract"))
            .unwrap_or(false);

        self.b.add_element(IrElement {
            id: id.clone(),
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.type_parent(),
            payload: ElementPayload::Class {
                is_abstract,
                is_exported: modifiers
                    .map(|m| text_of(&m, self.src).contains("public"))
                    .unwrap_or(false),
            },
            tags: vec![],
        });

        if let Some(modifiers) = modifiers {
            self.emit_annotations(modifiers, &id, None);
        }

        if let Some(superclass) = node.child_by_field_name("superclass") {
            let mut cursor = superclass.walk();
            for base in superclass.named_children(&mut cursor) {
                self.b.relate(
                    id.clone(),
                    erase_generics(text_of(&base, self.src)),
                    span_of(&base),
                    RelationDetail::Inherits,
                );
            }
        }
        if let Some(interfaces) = node.child_by_field_name("interfaces") {
            for base in type_list_members(interfaces) {
                self.b.relate(
                    id.clone(),
                    erase_generics(text_of(&base, self.src)),
                    span_of(&base),
                    RelationDetail::Implements,
                );
            }
        }

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            let class_name = {
                let scope = self.b.qualify("");
                scope.trim_end_matches('.').to_string()
            };
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                match member.kind() {
                    "method_declaration" => self.handle_method(member, depth),
                    "constructor_declaration" => self.handle_constructor(member, &class_name, depth),
                    "field_declaration" => self.handle_field(member),
                    _ => self.visit(member, depth + 1),
                }
            }
        }
        self.b.exit_scope();
    }

    fn handle_interface(&mut self, node: Node, depth: usize) {
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
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.type_parent(),
            payload: ElementPayload::Interface { is_exported: true },
            tags: vec![],
        });

        // `interface A extends B, C`
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "extends_interfaces" {
                continue;
            }
            for base in type_list_members(child) {
                self.b.relate(
                    id.clone(),
                    erase_generics(text_of(&base, self.src)),
                    span_of(&base),
                    RelationDetail::Inherits,
                );
            }
        }

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            let mut c2 = body.walk();
            for member in body.named_children(&mut c2) {
                match member.kind() {
                    "method_declaration" => self.handle_method(member, depth),
                    "constant_declaration" | "field_declaration" => self.handle_field(member),
                    _ => self.visit(member, depth + 1),
                }
            }
        }
        self.b.exit_scope();
    }

    fn handle_enum(&mut self, node: Node, depth: usize) {
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
                if member.kind() == "enum_constant" {
                    if let Some(n) = member.child_by_field_name("name") {
                        variants.push(text_of(&n, self.src).to_string());
                    }
                }
            }
        }

        self.b.add_element(IrElement {
            id: id.clone(),
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.type_parent(),
            payload: ElementPayload::Enum { variants },
            tags: vec![],
        });

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, depth);
        }
        self.b.exit_scope();
    }

    fn handle_annotation_type(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
        let id =
            self.b
                .mint_scoped(ElementKind::AnnotationDefinition, &qualified, location.start_line);
        self.b.add_element(IrElement {
            id,
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.type_parent(),
            payload: ElementPayload::AnnotationDefinition,
            tags: vec![],
        });
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
        let modifiers = modifiers_node(node);
        let return_type = node
            .child_by_field_name("type")
            .map(|n| text_of(&n, self.src).to_string());

        self.b.add_element(IrElement {
            id: id.clone(),
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Method {
                parameters,
                return_type,
                is_async: false,
                is_static: modifiers
                    .map(|m| text_of(&m, self.src).contains("static"))
                    .unwrap_or(false),
                receiver: None,
                receiver_position: None,
            },
            tags: vec![],
        });

        if let Some(modifiers) = modifiers {
            self.emit_annotations(modifiers, &id, Some(&id));
        }

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body, depth + 1);
        }
        self.b.exit_scope();
    }

    /// Constructors surface as methods named after their class.
    fn handle_constructor(&mut self, node: Node, class_name: &str, depth: usize) {
        let parameters = self.parameters_of(node);
        let simple = class_name.rsplit('.').next().unwrap_or(class_name);
        let qualified = self.b.qualify(simple);
        let location = span_of(&node);
        let id = self.b.mint_callable(
            ElementKind::Method,
            &qualified,
            &parameters,
            location.start_line,
        );
        self.b.add_element(IrElement {
            id: id.clone(),
            name: simple.to_string(),
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Method {
                parameters,
                return_type: None,
                is_async: false,
                is_static: false,
                receiver: None,
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

    fn handle_field(&mut self, node: Node) {
        let declared_type = node
            .child_by_field_name("type")
            .map(|n| text_of(&n, self.src).to_string());
        let is_static = modifiers_node(node)
            .map(|m| text_of(&m, self.src).contains("static"))
            .unwrap_or(false);
        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            let name = text_of(&name_node, self.src).to_string();
            let qualified = self.b.qualify(&name);
            let location = span_of(&declarator);
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
                    declared_type: declared_type.clone(),
                    is_static,
                },
                tags: vec![],
            });
        }
        if let Some(t) = node.child_by_field_name("type") {
            let pattern = erase_generics(text_of(&t, self.src));
            if pattern.chars().next().is_some_and(|c| c.is_uppercase()) {
                self.b.relate(
                    self.b.scope_source(),
                    pattern,
                    span_of(&t),
                    RelationDetail::ReferencesType,
                );
            }
        }
    }

    fn handle_invocation(&mut self, node: Node, depth: usize) {
        let name = node
            .child_by_field_name("name")
            .map(|n| text_of(&n, self.src).to_string())
            .unwrap_or_default();
        let receiver = node
            .child_by_field_name("object")
            .map(|n| text_of(&n, self.src).to_string());
        if !name.is_empty() {
            let pattern = match &receiver {
                Some(obj) => format!("{obj}.{name}"),
                None => name,
            };
            self.b.relate(
                self.b.scope_source(),
                pattern,
                span_of(&node),
                RelationDetail::Calls { receiver },
            );
        }
        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.visit_children(arguments, depth);
        }
        if let Some(object) = node.child_by_field_name("object") {
            if object.kind() == "method_invocation" {
                self.visit(object, depth + 1);
            }
        }
    }

    fn handle_new(&mut self, node: Node, depth: usize) {
        if let Some(type_node) = node.child_by_field_name("type") {
            self.b.relate(
                self.b.scope_source(),
                erase_generics(text_of(&type_node, self.src)),
                span_of(&node),
                RelationDetail::Instantiates,
            );
        }
        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.visit_children(arguments, depth);
        }
    }

    /// Emit `UsesAnnotation` for each annotation in a modifiers node; when
    /// `route_handler` is set, mapping annotations also become route
    /// elements bound to it.
    fn emit_annotations(
        &mut self,
        modifiers: Node,
        element_id: &CanonicalId,
        route_handler: Option<&CanonicalId>,
    ) {
        let mut cursor = modifiers.walk();
        for child in modifiers.children(&mut cursor) {
            let (name_node, arguments) = match child.kind() {
                "marker_annotation" => (child.child_by_field_name("name"), None),
                "annotation" => (
                    child.child_by_field_name("name"),
                    child.child_by_field_name("arguments"),
                ),
                _ => continue,
            };
            let Some(name_node) = name_node else { continue };
            let name = text_of(&name_node, self.src).to_string();
            self.b.relate(
                element_id.clone(),
                name.clone(),
                span_of(&child),
                RelationDetail::UsesAnnotation {
                    arguments: arguments.map(|a| text_of(&a, self.src).to_string()),
                },
            );

            if let (Some(handler), Some((_, method))) = (
                route_handler,
                MAPPING_ANNOTATIONS.iter().find(|(n, _)| *n == name),
            ) {
                if let Some(path) = arguments.and_then(|a| first_string_literal(a, self.src)) {
                    let location = span_of(&child);
                    let route_id = self.b.mint_global(
                        ElementKind::ApiRouteDefinition,
                        &format!("{method}:{path}"),
                        location.start_line,
                    );
                    self.b.add_element(IrElement {
                        id: route_id,
                        name: path.clone(),
                        file_path: self.b.file_path().to_string(),
                        location,
                        parent_id: None,
                        payload: ElementPayload::ApiRouteDefinition {
                            http_method: method.to_string(),
                            path_pattern: path,
                            handler_id: Some(handler.clone()),
                            framework: Some("spring".to_string()),
                        },
                        tags: vec![],
                    });
                }
            }
        }
    }

    fn parameters_of(&self, callable: Node) -> Vec<Parameter> {
        let Some(params) = callable.child_by_field_name("parameters") else {
            return vec![];
        };
        let mut out = Vec::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            if !matches!(param.kind(), "formal_parameter" | "spread_parameter") {
                continue;
            }
            let name = param
                .child_by_field_name("name")
                .map(|n| text_of(&n, self.src).to_string());
            let type_name = param
                .child_by_field_name("type")
                .map(|n| text_of(&n, self.src).to_string());
            match (name, type_name) {
                (Some(n), Some(t)) => out.push(Parameter::typed(n, t)),
                (Some(n), None) => out.push(Parameter::untyped(n)),
                _ => {}
            }
        }
        out
    }
}

fn modifiers_node(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == "modifiers")
}

fn type_list_members(clause: Node) -> Vec<Node> {
    let mut out = Vec::new();
    let mut cursor = clause.walk();
    for child in clause.named_children(&mut cursor) {
        if child.kind() == "type_list" {
            let mut inner = child.walk();
            out.extend(child.named_children(&mut inner));
        } else {
            out.push(child);
        }
    }
    out
}

fn erase_generics(raw: &str) -> String {
    raw.split('<').next().unwrap_or(raw).trim().to_string()
}

fn first_string_literal(node: Node, src: &str) -> Option<String> {
    if node.kind() == "string_literal" {
        return Some(text_of(&node, src).trim_matches('"').to_string());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_string_literal(child, src) {
            return Some(found);
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
        let frontend = JavaFrontend::new(ParserPool::new(1));
        let ctx = FrontendContext::new("demo");
        frontend.convert_to_ir(
            &FileSource {
                absolute_path: PathBuf::from(format!("/tmp/{path}")),
                relative_path: path.to_string(),
                extension: "java".to_string(),
                contents: code.as_bytes().to_vec(),
                declared_language: None,
            },
            &ctx,
        )
    }

    #[test]
    fn package_parents_top_level_types() {
        let ir = convert(
            "src/App.java",
            "package com.example.app;\n\npublic class App {}\n",
        );
        let package = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Package)
            .unwrap();
        assert_eq!(package.name, "com.example.app");
        let class_el = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Class)
            .unwrap();
        assert_eq!(class_el.parent_id.as_ref(), Some(&package.id));
        // the file records its package for resolve-time containment
        let file = ir.elements.iter().find(|e| e.id == ir.file_id).unwrap();
        let ElementPayload::File { module, .. } = &file.payload else {
            panic!()
        };
        assert_eq!(module.as_deref(), Some("com.example.app"));
    }

    #[test]
    fn inheritance_and_implementation_candidates() {
        let ir = convert(
            "src/Dog.java",
            "public class Dog extends Animal implements Barker, Pet {\n  void bark() {}\n}\n",
        );
        let inherits: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Inherits)
            .collect();
        assert_eq!(inherits.len(), 1);
        assert_eq!(inherits[0].target_pattern, "Animal");
        let implements: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Implements)
            .collect();
        assert_eq!(implements.len(), 2);
        assert_eq!(implements[0].target_pattern, "Barker");
        assert_eq!(implements[1].target_pattern, "Pet");
    }

    #[test]
    fn methods_carry_typed_parameters() {
        let ir = convert(
            "src/Svc.java",
            "class Svc {\n  int add(int a, int b) { return a + b; }\n}\n",
        );
        let method = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Method)
            .unwrap();
        let ElementPayload::Method {
            parameters,
            return_type,
            ..
        } = &method.payload
        else {
            panic!()
        };
        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters[0].type_name.as_deref(), Some("int"));
        assert_eq!(return_type.as_deref(), Some("int"));
        // parameter types flow into the canonical id
        assert!(method.id.as_str().contains("svc.add(int,int)"));
    }

    #[test]
    fn constructor_is_method_named_after_class() {
        let ir = convert(
            "src/User.java",
            "class User {\n  User(String name) {}\n}\n",
        );
        let methods: Vec<_> = ir
            .elements
            .iter()
            .filter(|e| e.kind() == ElementKind::Method)
            .collect();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "User");
    }

    #[test]
    fn mapping_annotation_becomes_route() {
        let ir = convert(
            "src/Api.java",
            "class Api {\n  @GetMapping(\"/users\")\n  String list() { return \"\"; }\n}\n",
        );
        let route = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::ApiRouteDefinition)
            .expect("route element");
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
        assert_eq!(path_pattern, "/users");
        let method = ir.elements.iter().find(|e| e.name == "list").unwrap();
        assert_eq!(handler_id.as_ref(), Some(&method.id));
        assert!(ir
            .potential_relationships
            .iter()
            .any(|r| r.kind() == RelationKind::UsesAnnotation
                && r.target_pattern == "GetMapping"));
    }

    #[test]
    fn invocations_and_instantiations_are_observed() {
        let ir = convert(
            "src/Main.java",
            "class Main {\n  void run() {\n    Service s = new Service();\n    s.start();\n  }\n}\n",
        );
        assert!(ir
            .potential_relationships
            .iter()
            .any(|r| r.kind() == RelationKind::Instantiates && r.target_pattern == "Service"));
        assert!(ir
            .potential_relationships
            .iter()
            .any(|r| r.kind() == RelationKind::Calls && r.target_pattern == "s.start"));
    }

    #[test]
    fn wildcard_import_is_flagged() {
        let ir = convert(
            "src/A.java",
            "import java.util.List;\nimport com.example.util.*;\nclass A {}\n",
        );
        let imports: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Imports)
            .collect();
        assert_eq!(imports.len(), 2);
        let RelationDetail::Imports {
            imported_entity_name,
            ..
        } = &imports[0].detail
        else {
            panic!()
        };
        assert_eq!(imported_entity_name.as_deref(), Some("List"));
        let RelationDetail::Imports {
            imported_entity_name,
            ..
        } = &imports[1].detail
        else {
            panic!()
        };
        assert_eq!(imported_entity_name.as_deref(), Some("*"));
    }
}

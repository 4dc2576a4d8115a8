//! C# frontend.
//!
//! Namespaces (block and file-scoped) become package elements parenting
//! the types under them; `[HttpGet("…")]`-style attributes surface as
//! route definitions.

use tree_sitter::Node;

use arbor_core::{
    CanonicalId, ElementKind, ElementPayload, FileIr, IrElement, Parameter, RelationDetail,
    SourceLanguage,
};

use crate::frontend::{FileSource, FrontendContext, LanguageFrontend};
use crate::parser_pool::{ParseRequest, ParserPool};
use crate::walk::{span_of, text_of, FileIrBuilder, MAX_WALK_DEPTH};

const HTTP_ATTRIBUTES: &[(&str, &str)] = &[
    ("HttpGet", "GET"),
    ("HttpPost", "POST"),
    ("HttpPut", "PUT"),
    ("HttpDelete", "DELETE"),
    ("HttpPatch", "PATCH"),
];

pub struct CSharpFrontend {
    pool: ParserPool,
}

impl CSharpFrontend {
    pub fn new(pool: ParserPool) -> Self {
        Self { pool }
    }
}

impl LanguageFrontend for CSharpFrontend {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::CSharp
    }

    fn convert_to_ir(&self, source: &FileSource, ctx: &FrontendContext) -> FileIr {
        let text = source.text().into_owned();
        let loc = text.lines().count() as u32;

        let outcome = match self.pool.parse_blocking(ParseRequest {
            language: SourceLanguage::CSharp,
            content: text,
            path: source.relative_path.clone(),
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                return FileIrBuilder::failed(
                    ctx,
                    &source.relative_path,
                    SourceLanguage::CSharp,
                    e.to_string(),
                );
            }
        };

        let mut builder =
            FileIrBuilder::new(ctx, &source.relative_path, SourceLanguage::CSharp, loc);
        let mut walker = CSharpWalker {
            b: &mut builder,
            src: &outcome.content,
            namespace_id: None,
        };
        walker.visit(outcome.tree.root_node(), 0);
        builder.finish()
    }
}

struct CSharpWalker<'a, 'b> {
    b: &'b mut FileIrBuilder,
    src: &'a str,
    namespace_id: Option<CanonicalId>,
}

impl<'a, 'b> CSharpWalker<'a, 'b> {
    fn visit(&mut self, node: Node, depth: usize) {
        if depth > MAX_WALK_DEPTH {
            return;
        }
        match node.kind() {
            "using_directive" => self.handle_using(node),
            "namespace_declaration" | "file_scoped_namespace_declaration" => {
                self.handle_namespace(node, depth)
            }
            "class_declaration" | "record_declaration" | "struct_declaration" => {
                self.handle_type(node, ElementKind::Class, depth)
            }
            "interface_declaration" => self.handle_type(node, ElementKind::Interface, depth),
            "enum_declaration" => self.handle_enum(node),
            "method_declaration" => self.handle_method(node, depth),
            "constructor_declaration" => self.handle_method(node, depth),
            "property_declaration" => self.handle_property(node),
            "field_declaration" => self.handle_field(node),
            "invocation_expression" => self.handle_invocation(node, depth),
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

    fn handle_using(&mut self, node: Node) {
        let mut cursor = node.walk();
        let mut alias = None;
        let mut target = None;
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "name_equals" => {
                    alias = child
                        .named_child(0)
                        .map(|n| text_of(&n, self.src).to_string());
                }
                "qualified_name" | "identifier" => {
                    target = Some(text_of(&child, self.src).to_string());
                }
                _ => {}
            }
        }
        let Some(namespace) = target else { return };
        self.b.relate(
            self.b.file_id().clone(),
            namespace.clone(),
            span_of(&node),
            RelationDetail::Imports {
                module_specifier: namespace,
                imported_entity_name: Some("*".to_string()),
                alias,
                is_side_effect: false,
            },
        );
    }

    fn handle_namespace(&mut self, node: Node, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            self.visit_children(node, depth);
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

        let previous = self.namespace_id.replace(id);
        if node.kind() == "file_scoped_namespace_declaration" {
            // covers the rest of the file: declarations parsed as children
            // are visited here, siblings by the enclosing walk loop with
            // namespace_id left in place
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if Some(child) != node.child_by_field_name("name") {
                    self.visit(child, depth + 1);
                }
            }
            return;
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, depth);
        }
        self.namespace_id = previous;
    }

    fn type_parent(&self) -> Option<CanonicalId> {
        self.b.parent_id().or_else(|| self.namespace_id.clone())
    }

    fn handle_type(&mut self, node: Node, kind: ElementKind, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            self.b
                .conversion_error("type without a name", Some(span_of(&node).start_line));
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let qualified = self.b.qualify(&name);
        let location = span_of(&node);
        let id = self.b.mint_scoped(kind, &qualified, location.start_line);
        let is_abstract = has_modifier(node, self.src, "abstract");
        let is_public = has_modifier(node, self.src, "public");

        self.b.add_element(IrElement {
            id: id.clone(),
            name,
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.type_parent(),
            payload: match kind {
                ElementKind::Interface => ElementPayload::Interface {
                    is_exported: is_public,
                },
                _ => ElementPayload::Class {
                    is_abstract,
                    is_exported: is_public,
                },
            },
            tags: vec![],
        });

        self.emit_attributes(node, &id, None);

        // `class C : Base, IFirst`: the I-prefix convention splits the
        // candidates; the resolver corrects the edge type once the target
        // kind is known.
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "base_list" {
                continue;
            }
            let mut inner = child.walk();
            for base in child.named_children(&mut inner) {
                let raw = erase_generics(text_of(&base, self.src));
                if raw.is_empty() {
                    continue;
                }
                let simple = raw.rsplit('.').next().unwrap_or(&raw);
                let looks_like_interface = kind == ElementKind::Interface
                    || (simple.len() > 1
                        && simple.starts_with('I')
                        && simple.chars().nth(1).is_some_and(|c| c.is_uppercase()));
                self.b.relate(
                    id.clone(),
                    raw.clone(),
                    span_of(&base),
                    if looks_like_interface {
                        RelationDetail::Implements
                    } else {
                        RelationDetail::Inherits
                    },
                );
            }
        }

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, depth);
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
        let mut cursor = node.walk();
        if let Some(body) = node
            .children(&mut cursor)
            .find(|c| c.kind() == "enum_member_declaration_list")
        {
            let mut inner = body.walk();
            for member in body.named_children(&mut inner) {
                if member.kind() == "enum_member_declaration" {
                    if let Some(n) = member.child_by_field_name("name") {
                        variants.push(text_of(&n, self.src).to_string());
                    }
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
        let return_type = node
            .child_by_field_name("returns")
            .or_else(|| node.child_by_field_name("type"))
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
                is_async: has_modifier(node, self.src, "async"),
                is_static: has_modifier(node, self.src, "static"),
                receiver: None,
                receiver_position: None,
            },
            tags: vec![],
        });

        self.emit_attributes(node, &id, Some(&id));

        self.b.enter_scope(id, qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body, depth + 1);
        }
        self.b.exit_scope();
    }

    fn handle_property(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
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
                    .map(|n| text_of(&n, self.src).to_string()),
                is_static: has_modifier(node, self.src, "static"),
            },
            tags: vec![],
        });
    }

    fn handle_field(&mut self, node: Node) {
        let mut cursor = node.walk();
        let Some(declaration) = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "variable_declaration")
        else {
            return;
        };
        let declared_type = declaration
            .child_by_field_name("type")
            .map(|n| text_of(&n, self.src).to_string());
        let is_static = has_modifier(node, self.src, "static");
        let mut inner = declaration.walk();
        for declarator in declaration.named_children(&mut inner) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.named_child(0) else {
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
    }

    fn handle_invocation(&mut self, node: Node, depth: usize) {
        if let Some(function) = node.child_by_field_name("function") {
            let pattern = text_of(&function, self.src).to_string();
            if !pattern.is_empty() {
                let receiver = if function.kind() == "member_access_expression" {
                    function
                        .child_by_field_name("expression")
                        .map(|n| text_of(&n, self.src).to_string())
                } else {
                    None
                };
                self.b.relate(
                    self.b.scope_source(),
                    pattern,
                    span_of(&node),
                    RelationDetail::Calls { receiver },
                );
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
                erase_generics(text_of(&type_node, self.src)),
                span_of(&node),
                RelationDetail::Instantiates,
            );
        }
        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.visit_children(arguments, depth);
        }
    }

    fn emit_attributes(
        &mut self,
        node: Node,
        element_id: &CanonicalId,
        route_handler: Option<&CanonicalId>,
    ) {
        let mut cursor = node.walk();
        for list in node.children(&mut cursor) {
            if list.kind() != "attribute_list" {
                continue;
            }
            let mut inner = list.walk();
            for attribute in list.named_children(&mut inner) {
                if attribute.kind() != "attribute" {
                    continue;
                }
                let Some(name_node) = attribute.child_by_field_name("name") else {
                    continue;
                };
                let name = text_of(&name_node, self.src).to_string();
                let arguments = {
                    let mut c2 = attribute.walk();
                    attribute
                        .children(&mut c2)
                        .find(|c| c.kind() == "attribute_argument_list")
                };
                self.b.relate(
                    element_id.clone(),
                    name.clone(),
                    span_of(&attribute),
                    RelationDetail::UsesAnnotation {
                        arguments: arguments.map(|a| text_of(&a, self.src).to_string()),
                    },
                );

                if let (Some(handler), Some((_, method))) = (
                    route_handler,
                    HTTP_ATTRIBUTES.iter().find(|(n, _)| *n == name),
                ) {
                    if let Some(path) =
                        arguments.and_then(|a| first_string_literal(a, self.src))
                    {
                        let location = span_of(&attribute);
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
                                framework: Some("aspnet".to_string()),
                            },
                            tags: vec![],
                        });
                    }
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
            if param.kind() != "parameter" {
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

fn has_modifier(node: Node, src: &str, keyword: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .any(|c| c.kind() == "modifier" && text_of(&c, src) == keyword)
}

fn erase_generics(raw: &str) -> String {
    raw.split('<').next().unwrap_or(raw).trim().to_string()
}

fn first_string_literal(node: Node, src: &str) -> Option<String> {
    if matches!(node.kind(), "string_literal" | "verbatim_string_literal") {
        return Some(
            text_of(&node, src)
                .trim_start_matches('@')
                .trim_matches('"')
                .to_string(),
        );
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
        let frontend = CSharpFrontend::new(ParserPool::new(1));
        let ctx = FrontendContext::new("demo");
        frontend.convert_to_ir(
            &FileSource {
                absolute_path: PathBuf::from(format!("/tmp/{path}")),
                relative_path: path.to_string(),
                extension: "cs".to_string(),
                contents: code.as_bytes().to_vec(),
                declared_language: None,
            },
            &ctx,
        )
    }

    #[test]
    fn block_namespace_parents_types() {
        let ir = convert(
            "src/App.cs",
            "namespace Example.App {\n  public class Service {}\n}\n",
        );
        let package = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Package)
            .unwrap();
        assert_eq!(package.name, "Example.App");
        let class_el = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Class)
            .unwrap();
        assert_eq!(class_el.parent_id.as_ref(), Some(&package.id));
    }

    #[test]
    fn file_scoped_namespace_covers_following_types() {
        let ir = convert(
            "src/App.cs",
            "namespace Example.App;\n\npublic class Service {}\n",
        );
        let package = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Package)
            .unwrap();
        let class_el = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Class)
            .unwrap();
        assert_eq!(class_el.parent_id.as_ref(), Some(&package.id));
    }

    #[test]
    fn base_list_splits_by_interface_convention() {
        let ir = convert(
            "src/Dog.cs",
            "class Dog : Animal, IBark {\n  public void Bark() {}\n}\n",
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
        assert_eq!(implements.len(), 1);
        assert_eq!(implements[0].target_pattern, "IBark");
    }

    #[test]
    fn using_directives_are_imports() {
        let ir = convert("src/A.cs", "using System.Text;\nclass A {}\n");
        let imports: Vec<_> = ir
            .potential_relationships
            .iter()
            .filter(|r| r.kind() == RelationKind::Imports)
            .collect();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].target_pattern, "System.Text");
    }

    #[test]
    fn http_attribute_becomes_route() {
        let ir = convert(
            "src/Api.cs",
            "class UsersController {\n  [HttpGet(\"/api/users\")]\n  public string List() { return \"\"; }\n}\n",
        );
        let route = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::ApiRouteDefinition)
            .expect("route element");
        let ElementPayload::ApiRouteDefinition {
            http_method,
            path_pattern,
            ..
        } = &route.payload
        else {
            panic!()
        };
        assert_eq!(http_method, "GET");
        assert_eq!(path_pattern, "/api/users");
    }

    #[test]
    fn async_method_is_detected() {
        let ir = convert(
            "src/A.cs",
            "class A {\n  public async Task Run() { await Step(); }\n}\n",
        );
        let method = ir
            .elements
            .iter()
            .find(|e| e.kind() == ElementKind::Method)
            .unwrap();
        let ElementPayload::Method { is_async, .. } = &method.payload else {
            panic!()
        };
        assert!(is_async);
    }
}

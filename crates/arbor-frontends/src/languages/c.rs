//! C frontend.
//!
//! `#include "…"` lines are import candidates resolved through the
//! configured extensions, which covers local headers; structs surface as
//! class elements because the inheritance rules key on Class/Interface.

use tree_sitter::Node;

use arbor_core::{
    ElementKind, ElementPayload, FileIr, IrElement, Parameter, RelationDetail, SourceLanguage,
};

use crate::frontend::{FileSource, FrontendContext, LanguageFrontend};
use crate::parser_pool::{ParseRequest, ParserPool};
use crate::walk::{span_of, text_of, FileIrBuilder, MAX_WALK_DEPTH};

pub struct CFrontend {
    pool: ParserPool,
}

impl CFrontend {
    pub fn new(pool: ParserPool) -> Self {
        Self { pool }
    }
}

impl LanguageFrontend for CFrontend {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::C
    }

    fn convert_to_ir(&self, source: &FileSource, ctx: &FrontendContext) -> FileIr {
        let text = source.text().into_owned();
        let loc = text.lines().count() as u32;

        let outcome = match self.pool.parse_blocking(ParseRequest {
            language: SourceLanguage::C,
            content: text,
            path: source.relative_path.clone(),
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                return FileIrBuilder::failed(
                    ctx,
                    &source.relative_path,
                    SourceLanguage::C,
                    e.to_string(),
                );
            }
        };

        let mut builder = FileIrBuilder::new(ctx, &source.relative_path, SourceLanguage::C, loc);
        let mut walker = CWalker {
            b: &mut builder,
            src: &outcome.content,
        };
        walker.visit(outcome.tree.root_node(), 0);
        builder.finish()
    }
}

struct CWalker<'a, 'b> {
    b: &'b mut FileIrBuilder,
    src: &'a str,
}

impl<'a, 'b> CWalker<'a, 'b> {
    fn visit(&mut self, node: Node, depth: usize) {
        if depth > MAX_WALK_DEPTH {
            return;
        }
        match node.kind() {
            "preproc_include" => self.handle_include(node),
            "function_definition" => self.handle_function(node, depth),
            "struct_specifier" => self.handle_struct(node),
            "enum_specifier" => self.handle_enum(node),
            "type_definition" => self.handle_typedef(node),
            "call_expression" => self.handle_call(node, depth),
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

    fn handle_function(&mut self, node: Node, depth: usize) {
        let Some(declarator) = find_function_declarator(node) else {
            self.visit_children(node, depth);
            return;
        };
        let Some(name) = declarator_name(declarator, self.src) else {
            self.b
                .conversion_error("unnamed function definition", Some(span_of(&node).start_line));
            return;
        };
        let parameters = self.parameters_of(declarator);
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
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Function {
                parameters,
                return_type: node
                    .child_by_field_name("type")
                    .map(|t| text_of(&t, self.src).to_string()),
                is_async: false,
                is_exported: true,
            },
            tags: vec![],
        });

        self.b.enter_scope(id, name);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body, depth + 1);
        }
        self.b.exit_scope();
    }

    fn handle_struct(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        // bodyless references (`struct foo *p`) are usages, not definitions
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let name = text_of(&name_node, self.src).to_string();
        let location = span_of(&node);
        let id = self
            .b
            .mint_scoped(ElementKind::Class, &name, location.start_line);
        self.b.add_element(IrElement {
            id: id.clone(),
            name: name.clone(),
            file_path: self.b.file_path().to_string(),
            location,
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Class {
                is_abstract: false,
                is_exported: true,
            },
            tags: vec![],
        });

        self.b.enter_scope(id, name);
        let mut cursor = body.walk();
        for field in body.named_children(&mut cursor) {
            if field.kind() != "field_declaration" {
                continue;
            }
            let declared_type = field
                .child_by_field_name("type")
                .map(|t| text_of(&t, self.src).to_string());
            if let Some(field_name) = field_declarator_name(field, self.src) {
                let qualified = self.b.qualify(&field_name);
                let field_location = span_of(&field);
                let field_id =
                    self.b
                        .mint_scoped(ElementKind::Field, &qualified, field_location.start_line);
                self.b.add_element(IrElement {
                    id: field_id,
                    name: field_name,
                    file_path: self.b.file_path().to_string(),
                    location: field_location,
                    parent_id: self.b.parent_id(),
                    payload: ElementPayload::Field {
                        declared_type,
                        is_static: false,
                    },
                    tags: vec![],
                });
            }
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
        let location = span_of(&node);
        let id = self
            .b
            .mint_scoped(ElementKind::Enum, &name, location.start_line);
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
            parent_id: self.b.parent_id(),
            payload: ElementPayload::Enum { variants },
            tags: vec![],
        });
    }

    fn handle_typedef(&mut self, node: Node) {
        let Some(declarator) = node.child_by_field_name("declarator") else {
            return;
        };
        let name = text_of(&declarator, self.src).to_string();
        if name.is_empty() {
            return;
        }
        let aliased = node
            .child_by_field_name("type")
            .map(|t| text_of(&t, self.src).to_string());
        let location = span_of(&node);
        let id = self
            .b
            .mint_scoped(ElementKind::TypeAlias, &name, location.start_line);
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
        // typedef'd struct bodies still contribute their element
        if let Some(t) = node.child_by_field_name("type") {
            if t.kind() == "struct_specifier" {
                self.handle_struct(t);
            }
        }
    }

    fn handle_call(&mut self, node: Node, depth: usize) {
        if let Some(function) = node.child_by_field_name("function") {
            if function.kind() == "identifier" {
                self.b.relate(
                    self.b.scope_source(),
                    text_of(&function, self.src).to_string(),
                    span_of(&node),
                    RelationDetail::Calls { receiver: None },
                );
            }
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
            if param.kind() != "parameter_declaration" {
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

/// Unwrap pointer declarators down to the function_declarator.
pub(crate) fn find_function_declarator(node: Node) -> Option<Node> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "function_declarator" => return Some(current),
            "pointer_declarator" | "parenthesized_declarator" => {
                current = current.child_by_field_name("declarator").or_else(|| {
                    let mut cursor = current.walk();
                    current.named_children(&mut cursor).next()
                })?;
            }
            _ => return None,
        }
    }
}

pub(crate) fn declarator_name(declarator: Node, src: &str) -> Option<String> {
    let inner = declarator.child_by_field_name("declarator")?;
    let text = text_of(&inner, src);
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn field_declarator_name(field: Node, src: &str) -> Option<String> {
    let declarator = field.child_by_field_name("declarator")?;
    let text = text_of(&declarator, src)
        .trim_start_matches(['*', '&'])
        .to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

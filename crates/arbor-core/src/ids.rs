//! Deterministic canonical-id minting.
//!
//! Ids are plain strings of the form `arbor://<project>/<kind>:<fragment>`
//! so the graph store can key on them directly. Minting is pure: the same
//! inputs always produce the same id, independent of platform path
//! separators or input casing.

use sha2::{Digest, Sha256};

use crate::model::{CanonicalId, EdgeType, ElementKind};

/// Scheme prefix shared by every canonical id.
pub const ID_SCHEME: &str = "arbor";

/// Pure, stateless id factory bound to one project.
#[derive(Debug, Clone)]
pub struct IdMinter {
    project: String,
}

impl IdMinter {
    pub fn new(project_id: impl Into<String>) -> Self {
        IdMinter {
            project: normalize_fragment(&project_id.into()),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Mint the canonical id for an element.
    ///
    /// Empty fragments fall back to a hash-derived id so the result is never
    /// the empty string.
    pub fn mint(&self, kind: ElementKind, fragment: &str) -> CanonicalId {
        let normalized = normalize_fragment(fragment);
        let fragment = if normalized.is_empty() {
            hash_fallback(kind, fragment)
        } else {
            normalized
        };
        CanonicalId(format!(
            "{ID_SCHEME}://{}/{}:{}",
            self.project,
            kind.as_str(),
            fragment
        ))
    }

    /// Mint the id for a file element from its project-relative path.
    pub fn mint_file(&self, relative_path: &str) -> CanonicalId {
        self.mint(ElementKind::File, relative_path)
    }

    /// Relationship ids are `<sourceId>:<TYPE>:<targetId>`.
    pub fn mint_relationship(
        &self,
        source: &CanonicalId,
        edge_type: EdgeType,
        target: &CanonicalId,
    ) -> String {
        format!("{}:{}:{}", source, edge_type.as_str(), target)
    }
}

/// Normalize a fragment: backslashes become `/`, the result is lowercased,
/// and characters outside the restricted set collapse to `_`. The
/// structural characters of callable fragments (`(`, `)`, `,`) survive.
pub fn normalize_fragment(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '\\' => '/',
            c if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
            '_' | '.' | ':' | '/' | '-' | '(' | ')' | ',' => c,
            c if c.is_alphanumeric() => c.to_lowercase().next().unwrap_or('_'),
            _ => '_',
        })
        .collect()
}

fn hash_fallback(kind: ElementKind, raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(raw.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{}_{hex}", kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minter() -> IdMinter {
        IdMinter::new("demo")
    }

    #[test]
    fn minting_is_deterministic() {
        let a = minter().mint(ElementKind::Class, "src/models.ts:User");
        let b = minter().mint(ElementKind::Class, "src/models.ts:User");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "arbor://demo/class:src/models.ts:user");
    }

    #[test]
    fn backslashes_normalize_to_forward_slashes() {
        let a = minter().mint(ElementKind::File, "src\\util\\io.ts");
        let b = minter().mint(ElementKind::File, "src/util/io.ts");
        assert_eq!(a, b);
    }

    #[test]
    fn minting_is_case_insensitive() {
        let a = minter().mint(ElementKind::Function, "SRC/A.TS:Foo(x,y)");
        let b = minter().mint(ElementKind::Function, "src/a.ts:foo(x,y)");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_fragments_keep_structural_characters() {
        let id = minter().mint(ElementKind::Method, "src/a.ts:Dog.bark(name,count)");
        assert_eq!(id.as_str(), "arbor://demo/method:src/a.ts:dog.bark(name,count)");
    }

    #[test]
    fn disallowed_characters_become_underscores() {
        let id = minter().mint(ElementKind::Variable, "src/a.ts:weird name!");
        assert_eq!(id.as_str(), "arbor://demo/variable:src/a.ts:weird_name_");
    }

    #[test]
    fn empty_fragment_falls_back_to_hash() {
        let a = minter().mint(ElementKind::GenericElement, "");
        let b = minter().mint(ElementKind::GenericElement, "");
        assert_eq!(a, b);
        assert!(a.as_str().contains("generic_element_"));
        // 16 hex digits after the kind prefix
        let frag = a.as_str().rsplit('_').next().unwrap();
        assert_eq!(frag.len(), 16);
        assert!(frag.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn relationship_id_is_source_type_target() {
        let m = minter();
        let src = m.mint(ElementKind::Function, "src/a.ts:caller()");
        let dst = m.mint(ElementKind::Function, "src/b.ts:callee()");
        let rel = m.mint_relationship(&src, EdgeType::Calls, &dst);
        assert_eq!(rel, format!("{src}:CALLS:{dst}"));
    }

    #[test]
    fn route_ids_are_project_scoped() {
        let id = minter().mint(ElementKind::ApiRouteDefinition, "GET:/users/{id}");
        assert_eq!(id.as_str(), "arbor://demo/api_route_definition:get:/users/_id_");
    }
}

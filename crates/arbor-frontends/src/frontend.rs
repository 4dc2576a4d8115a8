//! Frontend trait, file input, and the language registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use arbor_core::{FileIr, IdMinter, SourceLanguage};

use crate::languages;
use crate::parser_pool::ParserPool;

/// One source file handed to a frontend.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub absolute_path: PathBuf,
    /// Project-relative, `/`-separated.
    pub relative_path: String,
    /// Extension without the leading dot, lowercased.
    pub extension: String,
    pub contents: Vec<u8>,
    pub declared_language: Option<SourceLanguage>,
}

impl FileSource {
    /// Effective language: the declared tag wins over the extension table.
    pub fn language(&self) -> SourceLanguage {
        self.declared_language
            .unwrap_or_else(|| SourceLanguage::from_extension(&self.extension))
    }

    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.contents)
    }
}

/// Per-run context shared by all frontends.
#[derive(Debug, Clone)]
pub struct FrontendContext {
    pub project_id: String,
    pub minter: IdMinter,
}

impl FrontendContext {
    pub fn new(project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        FrontendContext {
            minter: IdMinter::new(project_id.clone()),
            project_id,
        }
    }
}

/// A per-language converter from source bytes to [`FileIr`].
///
/// Frontends never fail: a file that cannot be parsed yields a FileIr with
/// empty collections and an error entry, and a construct that cannot be
/// lowered is skipped with an error entry while the walk continues.
pub trait LanguageFrontend: Send + Sync {
    fn language(&self) -> SourceLanguage;

    fn convert_to_ir(&self, source: &FileSource, ctx: &FrontendContext) -> FileIr;
}

/// Maps languages to their frontend. Conversion is dispatched per file by
/// the driver.
pub struct FrontendRegistry {
    frontends: HashMap<SourceLanguage, Arc<dyn LanguageFrontend>>,
}

impl FrontendRegistry {
    /// Registry covering the full language matrix, sharing one parser pool.
    pub fn with_defaults(pool: ParserPool) -> Self {
        let mut frontends: HashMap<SourceLanguage, Arc<dyn LanguageFrontend>> = HashMap::new();

        let typescript = Arc::new(languages::typescript::TypeScriptFrontend::new(pool.clone()));
        frontends.insert(SourceLanguage::TypeScript, typescript.clone());
        frontends.insert(SourceLanguage::Tsx, typescript);
        frontends.insert(
            SourceLanguage::Python,
            Arc::new(languages::python::PythonFrontend::new(pool.clone())),
        );
        frontends.insert(
            SourceLanguage::Java,
            Arc::new(languages::java::JavaFrontend::new(pool.clone())),
        );
        frontends.insert(
            SourceLanguage::CSharp,
            Arc::new(languages::csharp::CSharpFrontend::new(pool.clone())),
        );
        frontends.insert(
            SourceLanguage::Go,
            Arc::new(languages::go::GoFrontend::new(pool.clone())),
        );
        frontends.insert(
            SourceLanguage::C,
            Arc::new(languages::c::CFrontend::new(pool.clone())),
        );
        frontends.insert(
            SourceLanguage::Cpp,
            Arc::new(languages::cpp::CppFrontend::new(pool)),
        );
        frontends.insert(
            SourceLanguage::Sql,
            Arc::new(languages::sql::SqlFrontend::new()),
        );

        FrontendRegistry { frontends }
    }

    pub fn get(&self, language: SourceLanguage) -> Option<Arc<dyn LanguageFrontend>> {
        self.frontends.get(&language).cloned()
    }

    pub fn supports(&self, language: SourceLanguage) -> bool {
        self.frontends.contains_key(&language)
    }
}

//! Thread-safe parser pool for tree-sitter parsers.
//!
//! Tree-sitter parsers are not Send + Sync, so parsing runs on dedicated
//! worker threads behind an mpsc channel. Each worker owns one parser and
//! retargets its grammar per request; callers block on a response channel
//! or bridge through `spawn_blocking` from async contexts.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tree_sitter::{Language, Parser};

use arbor_core::SourceLanguage;

/// Grammar for a source language, when tree-sitter covers it.
///
/// SQL returns `None`: no grammar in this tree-sitter generation parses it,
/// so the SQL frontend scans statements itself.
pub fn grammar_for(language: SourceLanguage) -> Option<Language> {
    match language {
        SourceLanguage::TypeScript => {
            Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
        }
        SourceLanguage::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        SourceLanguage::Python => Some(tree_sitter_python::LANGUAGE.into()),
        SourceLanguage::Java => Some(tree_sitter_java::LANGUAGE.into()),
        SourceLanguage::CSharp => Some(tree_sitter_c_sharp::LANGUAGE.into()),
        SourceLanguage::Go => Some(tree_sitter_go::LANGUAGE.into()),
        SourceLanguage::C => Some(tree_sitter_c::LANGUAGE.into()),
        SourceLanguage::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
        SourceLanguage::Sql | SourceLanguage::Unknown => None,
    }
}

/// A parsing request sent to the pool.
#[derive(Debug)]
pub struct ParseRequest {
    pub language: SourceLanguage,
    pub content: String,
    pub path: String,
}

/// Result of a parsing operation.
#[derive(Debug)]
pub struct ParseOutcome {
    pub tree: tree_sitter::Tree,
    pub content: String,
}

struct WorkerRequest {
    request: ParseRequest,
    response_sender: mpsc::Sender<Result<ParseOutcome>>,
}

/// Handle to the worker threads. Cheap to clone.
pub struct ParserPool {
    sender: mpsc::Sender<WorkerRequest>,
}

impl ParserPool {
    /// Spawn a pool with the given number of worker threads.
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<WorkerRequest>();
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..num_workers.max(1) {
            let receiver = Arc::clone(&receiver);
            std::thread::spawn(move || Self::worker_thread(worker_id, receiver));
        }

        Self { sender }
    }

    fn worker_thread(worker_id: usize, receiver: Arc<Mutex<mpsc::Receiver<WorkerRequest>>>) {
        tracing::debug!("parser worker {worker_id} started");

        let mut parser = Parser::new();

        loop {
            let next = {
                let guard = match receiver.lock() {
                    Ok(guard) => guard,
                    Err(_) => break,
                };
                guard.recv()
            };
            let WorkerRequest {
                request,
                response_sender,
            } = match next {
                Ok(req) => req,
                Err(_) => {
                    tracing::debug!("parser worker {worker_id} shutting down");
                    break;
                }
            };

            let Some(grammar) = grammar_for(request.language) else {
                let _ = response_sender.send(Err(anyhow::anyhow!(
                    "no grammar for {}",
                    request.language.as_str()
                )));
                continue;
            };
            if let Err(e) = parser.set_language(&grammar) {
                let _ = response_sender.send(Err(anyhow::anyhow!("failed to set language: {e}")));
                continue;
            }

            let result = match parser.parse(&request.content, None) {
                Some(tree) => Ok(ParseOutcome {
                    tree,
                    content: request.content,
                }),
                None => Err(anyhow::anyhow!("parser produced no tree for {}", request.path)),
            };

            if response_sender.send(result).is_err() {
                tracing::warn!("parse result receiver dropped");
            }
        }
    }

    /// Parse synchronously, blocking the current thread.
    pub fn parse_blocking(&self, request: ParseRequest) -> Result<ParseOutcome> {
        let (response_sender, response_receiver) = mpsc::channel();
        self.sender
            .send(WorkerRequest {
                request,
                response_sender,
            })
            .map_err(|_| anyhow::anyhow!("parser pool is shut down"))?;
        response_receiver
            .recv()
            .map_err(|_| anyhow::anyhow!("parser worker died"))?
    }

    /// Parse from an async context without blocking the runtime.
    pub async fn parse(&self, request: ParseRequest) -> Result<ParseOutcome> {
        let sender = self.sender.clone();
        tokio::task::spawn_blocking(move || {
            let (response_sender, response_receiver) = mpsc::channel();
            sender
                .send(WorkerRequest {
                    request,
                    response_sender,
                })
                .map_err(|_| anyhow::anyhow!("parser pool is shut down"))?;
            response_receiver
                .recv()
                .map_err(|_| anyhow::anyhow!("parser worker died"))?
        })
        .await
        .map_err(|e| anyhow::anyhow!("task join error: {e}"))?
    }
}

impl Clone for ParserPool {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Pool sized to the machine, with a floor of two workers.
pub fn create_parser_pool() -> ParserPool {
    let num_workers = std::thread::available_parallelism()
        .map(|n| n.get().max(2))
        .unwrap_or(2);
    ParserPool::new(num_workers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typescript() {
        let pool = ParserPool::new(1);
        let outcome = pool
            .parse_blocking(ParseRequest {
                language: SourceLanguage::TypeScript,
                content: "class A { m() {} }".to_string(),
                path: "a.ts".to_string(),
            })
            .unwrap();
        assert_eq!(outcome.tree.root_node().kind(), "program");
    }

    #[test]
    fn parses_python() {
        let pool = ParserPool::new(1);
        let outcome = pool
            .parse_blocking(ParseRequest {
                language: SourceLanguage::Python,
                content: "def f():\n    pass\n".to_string(),
                path: "a.py".to_string(),
            })
            .unwrap();
        assert_eq!(outcome.tree.root_node().kind(), "module");
    }

    #[test]
    fn sql_has_no_grammar() {
        let pool = ParserPool::new(1);
        let result = pool.parse_blocking(ParseRequest {
            language: SourceLanguage::Sql,
            content: "SELECT 1;".to_string(),
            path: "a.sql".to_string(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn async_parse_bridges_to_workers() {
        let pool = ParserPool::new(2);
        let outcome = pool
            .parse(ParseRequest {
                language: SourceLanguage::Go,
                content: "package main\nfunc main() {}\n".to_string(),
                path: "main.go".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.tree.root_node().kind(), "source_file");
    }
}

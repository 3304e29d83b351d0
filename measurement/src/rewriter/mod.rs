//! Configuration Rewriter: minimal configuration for one resource type
//!
//! The isolated workspace of a resource type only needs enough configuration
//! to initialize and refresh that type:
//!
//! ```text
//! *.tf  →  variable blocks                      (kept as-is)
//!       →  provider "<prefix>" blocks           (variable references made literal)
//!       →  terraform { required_providers {..} } (only <prefix>, no backend/cloud)
//! ```
//!
//! `<prefix>` is the token before the first underscore of the resource type,
//! e.g. `aws` for `aws_s3_bucket`. Dropping the backend forces a local state
//! file so the isolated run never touches shared remote state.

pub mod eval;

use std::path::Path;
use std::sync::LazyLock;

use hcl::{Block, Body, Expression, Structure};
use regex::Regex;

use crate::error::RewriteError;

pub use eval::{ConsoleEvaluator, EvalAttempt, ExpressionEvaluator};

/// References that only resolve with the full configuration and var-files.
static VARIABLE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_.])(?:var|local)\.[A-Za-z_]").expect("valid reference regex")
});

/// One configuration file of the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub contents: String,
}

/// Read every `*.tf` file directly inside `dir`, sorted by file name.
pub async fn load_config_files(dir: &Path) -> Result<Vec<SourceFile>, RewriteError> {
    let read_err = |source| RewriteError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("tf") || !is_file(&path).await {
            continue;
        }
        let contents = tokio::fs::read_to_string(&path).await.map_err(|source| RewriteError::Read {
            path: path.clone(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        files.push(SourceFile { name, contents });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Regular file, following symlinks.
pub(crate) async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Plugin name implied by a resource type (`aws_s3_bucket` → `aws`).
pub fn provider_prefix(resource_type: &str) -> &str {
    resource_type.split('_').next().unwrap_or(resource_type)
}

/// Whether an expression's source text references input variables or locals.
pub fn references_variables(expression: &str) -> bool {
    VARIABLE_REF_RE.is_match(expression)
}

/// Builds the reduced configuration of an isolated workspace.
pub struct ConfigRewriter<'a> {
    evaluator: &'a dyn ExpressionEvaluator,
    rewrite_providers: bool,
}

impl<'a> ConfigRewriter<'a> {
    /// `rewrite_providers` is false for tool releases that predate attribute
    /// redaction; matching provider blocks are then copied verbatim.
    pub fn new(evaluator: &'a dyn ExpressionEvaluator, rewrite_providers: bool) -> Self {
        Self {
            evaluator,
            rewrite_providers,
        }
    }

    /// Produce the minimal configuration for `resource_type` as HCL text.
    pub async fn rewrite(
        &self,
        resource_type: &str,
        files: &[SourceFile],
    ) -> Result<String, RewriteError> {
        let prefix = provider_prefix(resource_type);
        let mut kept: Vec<Structure> = Vec::new();

        for file in files {
            let body = hcl::parse(&file.contents).map_err(|e| RewriteError::Parse {
                file: file.name.clone(),
                message: e.to_string(),
            })?;

            for structure in body {
                let Structure::Block(block) = structure else {
                    continue;
                };
                match block.identifier.as_str() {
                    "variable" => kept.push(Structure::Block(block)),
                    "terraform" => kept.push(Structure::Block(strip_settings(block, prefix))),
                    "provider" => {
                        if block_label(&block) != Some(prefix) {
                            continue;
                        }
                        let block = if self.rewrite_providers {
                            self.inline_provider(block, &file.name).await?
                        } else {
                            block
                        };
                        kept.push(Structure::Block(block));
                    }
                    _ => {}
                }
            }
        }

        let body: Body = kept.into_iter().collect();
        hcl::to_string(&body).map_err(|e| RewriteError::Format {
            file: "main.tf".to_string(),
            message: e.to_string(),
        })
    }

    /// Replace every attribute that references variables with its literal value.
    async fn inline_provider(&self, mut block: Block, file: &str) -> Result<Block, RewriteError> {
        let mut rewritten: Vec<Structure> = Vec::new();
        for structure in block.body {
            match structure {
                Structure::Attribute(mut attr) => {
                    let source = hcl::format::to_string(&attr.expr).map_err(|e| {
                        RewriteError::Format {
                            file: file.to_string(),
                            message: e.to_string(),
                        }
                    })?;
                    if references_variables(&source) {
                        let value = self.evaluator.evaluate(&source).await?;
                        tracing::debug!(attribute = %attr.key.as_str(), "inlined provider attribute");
                        attr.expr = Expression::String(value);
                    }
                    rewritten.push(Structure::Attribute(attr));
                }
                other => rewritten.push(other),
            }
        }
        block.body = rewritten.into_iter().collect();
        Ok(block)
    }
}

fn block_label(block: &Block) -> Option<&str> {
    block.labels.first().map(|label| label.as_str())
}

/// Drop remote state settings and unrelated required providers.
fn strip_settings(mut block: Block, prefix: &str) -> Block {
    let mut kept: Vec<Structure> = Vec::new();
    for structure in block.body {
        match structure {
            Structure::Block(inner)
                if matches!(inner.identifier.as_str(), "backend" | "cloud") =>
            {
                tracing::debug!(kind = %inner.identifier.as_str(), "dropped remote state settings");
            }
            Structure::Block(mut inner) if inner.identifier.as_str() == "required_providers" => {
                inner.body = inner
                    .body
                    .into_iter()
                    .filter(|entry| match entry {
                        Structure::Attribute(attr) => attr.key.as_str() == prefix,
                        Structure::Block(_) => true,
                    })
                    .collect();
                kept.push(Structure::Block(inner));
            }
            other => kept.push(other),
        }
    }
    block.body = kept.into_iter().collect();
    block
}

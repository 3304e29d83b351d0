//! Expression evaluation through `terraform console`
//!
//! The console prints a redaction sentinel for sensitive values. Resolution
//! is a fixed two-step policy: evaluate as written, and if the result is
//! redacted evaluate once more wrapped in `nonsensitive(...)`. A value that
//! is still redacted after that is an error.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RewriteError;
use crate::runner::CommandRunner;

/// Sentinels the console prints instead of a sensitive value.
const REDACTED_SENTINELS: [&str; 2] = ["(sensitive)", "(sensitive value)"];

/// One step of the resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalAttempt {
    AsWritten,
    Unmasked,
}

impl EvalAttempt {
    /// Ordered attempts; the policy never goes beyond this list.
    pub const POLICY: [EvalAttempt; 2] = [EvalAttempt::AsWritten, EvalAttempt::Unmasked];

    pub fn wrap(self, expression: &str) -> String {
        match self {
            Self::AsWritten => expression.to_string(),
            Self::Unmasked => format!("nonsensitive({expression})"),
        }
    }
}

/// Produces the literal value of an attribute expression.
#[async_trait]
pub trait ExpressionEvaluator: Send + Sync {
    async fn evaluate(&self, expression: &str) -> Result<String, RewriteError>;
}

/// Evaluates expressions with `terraform console` in the original workspace,
/// where the real variable context is available.
pub struct ConsoleEvaluator {
    runner: Arc<dyn CommandRunner>,
    workspace: PathBuf,
    var_file_arg: Option<String>,
}

impl ConsoleEvaluator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        workspace: impl Into<PathBuf>,
        var_file_arg: Option<String>,
    ) -> Self {
        Self {
            runner,
            workspace: workspace.into(),
            var_file_arg,
        }
    }

    async fn console(&self, input: &str) -> Result<String, RewriteError> {
        let mut args = vec!["console".to_string()];
        args.extend(self.var_file_arg.clone());
        let out = self
            .runner
            .run_with_input(&self.workspace, &args, input)
            .await
            .map_err(|source| RewriteError::Evaluation {
                expression: input.to_string(),
                source,
            })?;
        Ok(clean_console_output(&String::from_utf8_lossy(&out)))
    }
}

#[async_trait]
impl ExpressionEvaluator for ConsoleEvaluator {
    async fn evaluate(&self, expression: &str) -> Result<String, RewriteError> {
        for attempt in EvalAttempt::POLICY {
            let value = self.console(&attempt.wrap(expression)).await?;
            if !is_redacted(&value) {
                return Ok(value);
            }
            tracing::debug!(expression, ?attempt, "console returned a redacted value");
        }
        Err(RewriteError::Redacted {
            expression: expression.to_string(),
        })
    }
}

/// Trim whitespace and the quotes the console puts around strings.
pub fn clean_console_output(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}

pub fn is_redacted(value: &str) -> bool {
    REDACTED_SENTINELS.contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunnerError;
    use crate::runner::StreamingProcess;
    use std::path::Path;
    use std::sync::Mutex;

    /// Console stand-in: answers each stdin expression from a fixed table.
    struct ScriptedConsole {
        answers: Vec<(&'static str, &'static str)>,
        inputs: Mutex<Vec<String>>,
    }

    impl ScriptedConsole {
        fn new(answers: Vec<(&'static str, &'static str)>) -> Self {
            Self {
                answers,
                inputs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedConsole {
        async fn run(&self, _dir: &Path, _args: &[String]) -> Result<Vec<u8>, RunnerError> {
            unreachable!("console evaluation only uses stdin")
        }

        async fn run_with_input(
            &self,
            _dir: &Path,
            args: &[String],
            input: &str,
        ) -> Result<Vec<u8>, RunnerError> {
            assert_eq!(args[0], "console");
            self.inputs.lock().unwrap().push(input.to_string());
            self.answers
                .iter()
                .find(|(expr, _)| *expr == input)
                .map(|(_, out)| out.as_bytes().to_vec())
                .ok_or_else(|| RunnerError::NonZeroExit {
                    command: "terraform console".to_string(),
                    code: Some(1),
                    output: format!("Error: Reference to undeclared input variable: {input}"),
                })
        }

        async fn run_streaming(
            &self,
            _dir: &Path,
            _args: &[String],
        ) -> Result<StreamingProcess, RunnerError> {
            unreachable!("console evaluation does not stream")
        }
    }

    fn evaluator(console: Arc<ScriptedConsole>) -> ConsoleEvaluator {
        ConsoleEvaluator::new(console, "/workspace", Some("-var-file=prod.tfvars".to_string()))
    }

    #[tokio::test]
    async fn test_plain_value() {
        let console = Arc::new(ScriptedConsole::new(vec![("var.region", "\"us-east-1\"\n")]));
        let value = evaluator(console.clone()).evaluate("var.region").await.unwrap();
        assert_eq!(value, "us-east-1");
        assert_eq!(console.inputs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redacted_value_retried_unmasked_once() {
        let console = Arc::new(ScriptedConsole::new(vec![
            ("var.password", "(sensitive)\n"),
            ("nonsensitive(var.password)", "\"s3cret\"\n"),
        ]));
        let value = evaluator(console.clone()).evaluate("var.password").await.unwrap();
        assert_eq!(value, "s3cret");
        assert_eq!(
            *console.inputs.lock().unwrap(),
            vec!["var.password", "nonsensitive(var.password)"]
        );
    }

    #[tokio::test]
    async fn test_persistently_redacted_value_fails() {
        let console = Arc::new(ScriptedConsole::new(vec![
            ("var.token", "(sensitive value)"),
            ("nonsensitive(var.token)", "(sensitive value)"),
        ]));
        let err = evaluator(console.clone()).evaluate("var.token").await.unwrap_err();
        assert!(matches!(err, RewriteError::Redacted { .. }));
        assert_eq!(console.inputs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_console_failure_is_evaluation_error() {
        let console = Arc::new(ScriptedConsole::new(vec![]));
        let err = evaluator(console).evaluate("var.missing").await.unwrap_err();
        match err {
            RewriteError::Evaluation { expression, source } => {
                assert_eq!(expression, "var.missing");
                assert!(source.output().unwrap().contains("undeclared"));
            }
            other => panic!("expected Evaluation, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_console_output() {
        assert_eq!(clean_console_output("  \"abc\"\n"), "abc");
        assert_eq!(clean_console_output("42\n"), "42");
        assert!(is_redacted(&clean_console_output("(sensitive)\n")));
        assert!(!is_redacted("sensitive"));
    }
}

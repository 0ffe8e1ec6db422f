//! In-process reference engine.
//!
//! The loopback engine does not evaluate anything. It echoes code back,
//! which is enough to drive every path of the broker end to end:
//! - each non-empty line is written to `stdout`, and the cell's
//!   result is the code itself wrapped in `<pre>`;
//! - `:sleep <ms>` pauses execution and can be interrupted, also while
//!   the request is still queued behind another execution;
//! - an unclosed bracket is an *incomplete* error, a stray closing
//!   bracket is a plain error reported on `stderr`;
//! - completion and object info look names up in the configured
//!   imports plus a small keyword list;
//! - init scripts go through the same bracket check on start, and a
//!   failing script is logged.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use kernel_core::{EngineConfig, Request, Response};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{EngineContext, EngineLauncher};
use crate::types::{EngineCommand, EngineId, EngineRx, OperationId, ReplyTx};

const KEYWORDS: &[&str] = &[
    "def", "val", "var", "import", "object", "class", "trait", "match", "case", "println",
];

/// Launches [`EngineContext`]s as loopback engines on the tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct LoopbackLauncher;

impl EngineLauncher for LoopbackLauncher {
    fn launch(&self, ctx: EngineContext) -> JoinHandle<()> {
        tokio::spawn(LoopbackEngine::new(ctx).run())
    }
}

struct LoopbackEngine {
    id: EngineId,
    config: Arc<EngineConfig>,
    commands: EngineRx,

    /// Commands that arrived while an execution was sleeping.
    backlog: VecDeque<EngineCommand>,

    /// Backlogged operations interrupted before they started.
    interrupted: HashSet<OperationId>,
}

impl LoopbackEngine {
    fn new(ctx: EngineContext) -> Self {
        info!(engine = %ctx.id, directive = %ctx.directive, "loopback engine starting");
        LoopbackEngine {
            id: ctx.id,
            config: ctx.config,
            commands: ctx.commands,
            backlog: VecDeque::new(),
            interrupted: HashSet::new(),
        }
    }

    async fn run(mut self) {
        self.run_init_scripts();

        loop {
            let cmd = match self.backlog.pop_front() {
                Some(cmd) => cmd,
                None => match self.commands.recv().await {
                    Some(cmd) => cmd,
                    None => break,
                },
            };

            match cmd {
                EngineCommand::Request {
                    operation,
                    request,
                    reply_to,
                } => self.handle(operation, request, reply_to).await,
                EngineCommand::Interrupt { operation } => {
                    debug!(engine = %self.id, %operation, "interrupt for idle operation ignored");
                }
            }
        }
        debug!(engine = %self.id, "loopback engine stopped");
    }

    async fn handle(&mut self, operation: OperationId, request: Request, reply_to: ReplyTx) {
        match request {
            Request::Execute(execute) => self.execute(operation, &execute.code, &reply_to).await,
            Request::Completion(completion) => {
                let (prefix, candidates) =
                    self.complete(&completion.text, completion.cursor_position);
                let _ = reply_to.send(Response::completion(
                    completion.cursor_position,
                    candidates,
                    prefix,
                ));
            }
            Request::ObjectInfo(info) => {
                let found = self.lookup(&info.object_name);
                let signature = found.clone().unwrap_or_default();
                let _ = reply_to.send(Response::object_info(
                    found.is_some(),
                    info.object_name,
                    signature,
                    String::new(),
                ));
            }
        }
    }

    /// Check every init script in order. Returns the names of the ones
    /// that failed.
    fn run_init_scripts(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for script in &self.config.init_scripts {
            match check_brackets(&script.body).problem() {
                None => {
                    let lines = script.body.lines().filter(|l| !l.trim().is_empty()).count();
                    debug!(engine = %self.id, script = %script.name, lines, "init script ran");
                }
                Some(problem) => {
                    warn!(engine = %self.id, script = %script.name, %problem, "init script failed");
                    failed.push(script.name.clone());
                }
            }
        }
        failed
    }

    async fn execute(&mut self, operation: OperationId, code: &str, reply_to: &ReplyTx) {
        if self.interrupted.remove(&operation) {
            info!(engine = %self.id, %operation, "execution interrupted before it started");
            send_interrupted(reply_to);
            return;
        }

        let brackets = check_brackets(code);
        if let Some(problem) = brackets.problem() {
            if let Brackets::Stray(_) = brackets {
                let _ = reply_to.send(Response::stream("stderr", format!("error: {problem}\n")));
            }
            let incomplete = matches!(brackets, Brackets::Unclosed(_));
            let _ = reply_to.send(Response::error(problem, incomplete));
            return;
        }

        for line in code.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(arg) = line.strip_prefix(":sleep") {
                let millis = arg.trim().parse::<u64>().unwrap_or(0);
                if !self.sleep(operation, Duration::from_millis(millis)).await {
                    send_interrupted(reply_to);
                    return;
                }
                continue;
            }
            let _ = reply_to.send(Response::stream("stdout", format!("{line}\n")));
        }

        let _ = reply_to.send(Response::execute(format!("<pre>{}</pre>", escape_html(code.trim()))));
    }

    /// Wait for `duration`, or until `operation` is interrupted. Returns
    /// false when interrupted.
    async fn sleep(&mut self, operation: OperationId, duration: Duration) -> bool {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return true,
                cmd = self.commands.recv() => match cmd {
                    Some(EngineCommand::Interrupt { operation: target }) if target == operation => {
                        info!(engine = %self.id, %operation, "execution interrupted");
                        return false;
                    }
                    Some(EngineCommand::Interrupt { operation: target }) if is_queued(&self.backlog, target) => {
                        debug!(engine = %self.id, operation = %target, "interrupt recorded for queued operation");
                        self.interrupted.insert(target);
                    }
                    Some(EngineCommand::Interrupt { operation: target }) => {
                        debug!(engine = %self.id, operation = %target, "interrupt for other operation ignored");
                    }
                    Some(other) => self.backlog.push_back(other),
                    None => {
                        (&mut deadline).await;
                        return true;
                    }
                },
            }
        }
    }

    fn vocabulary(&self) -> impl Iterator<Item = &str> {
        KEYWORDS
            .iter()
            .copied()
            .chain(self.config.imports.iter().filter_map(|i| import_name(i)))
    }

    fn complete(&self, text: &str, cursor: usize) -> (String, Vec<String>) {
        let before: String = text.chars().take(cursor).collect();
        let prefix: String = before
            .chars()
            .rev()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let mut candidates: Vec<String> = self
            .vocabulary()
            .filter(|word| word.starts_with(prefix.as_str()))
            .map(str::to_string)
            .collect();
        candidates.sort();
        candidates.dedup();
        (prefix, candidates)
    }

    /// Full import path for a short name, if imported.
    fn lookup(&self, name: &str) -> Option<String> {
        self.config
            .imports
            .iter()
            .find(|i| import_name(i) == Some(name))
            .cloned()
    }
}

fn is_queued(backlog: &VecDeque<EngineCommand>, operation: OperationId) -> bool {
    backlog.iter().any(|cmd| {
        matches!(cmd, EngineCommand::Request { operation: queued, .. } if *queued == operation)
    })
}

fn send_interrupted(reply_to: &ReplyTx) {
    let _ = reply_to.send(Response::stream("stderr", "Interrupted\n"));
    let _ = reply_to.send(Response::error("interrupted", false));
}

enum Brackets {
    Balanced,
    Unclosed(char),
    Stray(char),
}

impl Brackets {
    fn problem(&self) -> Option<String> {
        match self {
            Brackets::Balanced => None,
            Brackets::Unclosed(open) => Some(format!("incomplete input: unclosed `{open}`")),
            Brackets::Stray(close) => Some(format!("unexpected `{close}`")),
        }
    }
}

fn check_brackets(code: &str) -> Brackets {
    let mut stack = Vec::new();
    for c in code.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Brackets::Stray(c);
                }
            }
            _ => {}
        }
    }
    match stack.pop() {
        Some(open) => Brackets::Unclosed(open),
        None => Brackets::Balanced,
    }
}

/// Last path segment of an import, e.g. `scala.util.Random` → `Random`.
fn import_name(import: &str) -> Option<&str> {
    import
        .rsplit('.')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "_")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use kernel_core::{DeploymentDirective, InitScript};
    use tokio::sync::mpsc;

    use super::*;

    fn engine_with(config: EngineConfig) -> LoopbackEngine {
        let (_commands_tx, commands) = mpsc::unbounded_channel();
        LoopbackEngine::new(EngineContext {
            id: EngineId(1),
            config: Arc::new(config),
            directive: DeploymentDirective::Local,
            commands,
        })
    }

    #[test]
    fn unbalanced_init_script_is_reported() {
        let config = EngineConfig {
            init_scripts: vec![
                InitScript::new("prelude", "val a = (1)\nval b = a"),
                InitScript::new("broken", "def f() = {"),
                InitScript::new("stray", "x)"),
            ],
            ..EngineConfig::default()
        };
        assert_eq!(engine_with(config).run_init_scripts(), vec!["broken", "stray"]);
    }

    #[test]
    fn no_init_scripts_no_failures() {
        assert!(engine_with(EngineConfig::default()).run_init_scripts().is_empty());
    }

    #[test]
    fn bracket_checks() {
        assert!(matches!(check_brackets("f(x)[0]"), Brackets::Balanced));
        assert!(matches!(check_brackets("def f() = {"), Brackets::Unclosed('{')));
        assert!(matches!(check_brackets("x)"), Brackets::Stray(')')));
        assert!(matches!(check_brackets("(]"), Brackets::Stray(']')));
    }

    #[test]
    fn import_names() {
        assert_eq!(import_name("scala.util.Random"), Some("Random"));
        assert_eq!(import_name("scala.math._"), None);
        assert_eq!(import_name("Predef"), Some("Predef"));
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html("a < b && c"), "a &lt; b &amp;&amp; c");
    }
}

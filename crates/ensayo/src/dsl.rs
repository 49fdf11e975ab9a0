//! Parser for `.test` scripts.
//!
//! ```text
//! # comment
//! test "Login"
//!   navigate https://example.com/login
//!   type #user "alice"
//!   click #submit
//!   wait_for_url /dashboard
//!   assert_attribute a.home href /
//!   screenshot
//! ```
//!
//! One step per line. Lines before the first `test` header are ignored.

use std::path::Path;

use crate::result::{EngineError, EnsayoResult};
use crate::step::{ActionKind, Step, TestCase};

const QUOTES: [char; 2] = ['"', '\''];

/// Argument shape of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    /// Everything after the keyword
    Rest,
    /// One token, then everything after it
    TokenRest,
    /// Two tokens, then everything after them
    TwoTokensRest,
    /// Optional rest of line
    Optional,
}

const fn arity(kind: ActionKind) -> Arity {
    match kind {
        ActionKind::Type
        | ActionKind::AssertText
        | ActionKind::AssertTextContains
        | ActionKind::WaitForText
        | ActionKind::Select => Arity::TokenRest,
        ActionKind::AssertAttribute => Arity::TwoTokensRest,
        ActionKind::Screenshot | ActionKind::Snapshot => Arity::Optional,
        _ => Arity::Rest,
    }
}

const fn requirement(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Navigate => "a URL",
        ActionKind::Type | ActionKind::Select => "a selector and value",
        ActionKind::AssertText => "a selector and expected text",
        ActionKind::AssertTextContains | ActionKind::WaitForText => "a selector and text",
        ActionKind::AssertUrl | ActionKind::WaitForUrl => "a URL pattern",
        ActionKind::AssertTitle => "expected title",
        ActionKind::AssertTextVisible => "text to search for",
        ActionKind::AssertAttribute => "selector, attribute name, and expected value",
        ActionKind::Screenshot | ActionKind::Snapshot => "nothing",
        _ => "a selector",
    }
}

fn unquote(s: &str) -> String {
    s.trim_matches(&QUOTES[..]).to_string()
}

/// Parse one step line (already trimmed, non-empty)
fn parse_step(line: &str, line_no: usize) -> EnsayoResult<Step> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&keyword, args)) = parts.split_first() else {
        return Err(EngineError::parse(line_no, "empty step"));
    };
    let kind: ActionKind = keyword
        .parse()
        .map_err(|_| EngineError::parse(line_no, format!("unknown action: {keyword}")))?;

    let needed = match arity(kind) {
        Arity::Rest => 1,
        Arity::TokenRest => 2,
        Arity::TwoTokensRest => 3,
        Arity::Optional => 0,
    };
    if args.len() < needed {
        return Err(EngineError::parse(
            line_no,
            format!("{keyword} requires {}", requirement(kind)),
        ));
    }

    let rest = |from: usize| unquote(&args[from.min(args.len())..].join(" "));
    Ok(match arity(kind) {
        // assert_text_visible reads its argument from the value slot
        Arity::Rest | Arity::Optional => {
            let arg = rest(0);
            Step::from_parts(keyword, &arg, &arg)
        }
        Arity::TokenRest => Step::from_parts(keyword, &unquote(args[0]), &rest(1)),
        Arity::TwoTokensRest => Step::AssertAttribute {
            selector: unquote(args[0]),
            attribute: unquote(args[1]),
            expected: rest(2),
        },
    })
}

/// Parse script text into tests
pub fn parse_str(source: &str) -> EnsayoResult<Vec<TestCase>> {
    let mut tests = Vec::new();
    let mut current: Option<TestCase> = None;

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix("test ") {
            tests.extend(current.take());
            current = Some(TestCase::new(unquote(name.trim())));
            continue;
        }

        if let Some(test) = current.as_mut() {
            test.steps.push(parse_step(line, line_no)?);
        }
    }

    tests.extend(current);
    Ok(tests)
}

/// Parse a script file
pub fn parse_file(path: &Path) -> EnsayoResult<Vec<TestCase>> {
    let source = std::fs::read_to_string(path).map_err(|e| EngineError::Io {
        message: format!("{}: {e}", path.display()),
    })?;
    parse_str(&source)
}

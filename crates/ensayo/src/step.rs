//! Step model: one DSL action, and the tests built from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::result::EngineError;

/// Separator used by legacy `assert_attribute` targets (`selector|attribute`)
pub const ATTRIBUTE_SEPARATOR: char = '|';

/// Kind of action a step performs, named after its DSL keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// `navigate <url>`
    Navigate,
    /// `click <selector>`
    Click,
    /// `type <selector> <text>`
    Type,
    /// `wait_for <selector>`
    WaitFor,
    /// `assert_text <selector> <text>`
    AssertText,
    /// `assert_text_contains <selector> <text>`
    AssertTextContains,
    /// `assert_text_visible <text>`
    AssertTextVisible,
    /// `assert_element_exists <selector>`
    AssertElementExists,
    /// `assert_element_not_exists <selector>`
    AssertElementNotExists,
    /// `assert_url <url>`
    AssertUrl,
    /// `assert_title <title>`
    AssertTitle,
    /// `assert_attribute <selector> <attribute> <value>`
    AssertAttribute,
    /// `screenshot [filename]`
    Screenshot,
    /// `snapshot [filename]`
    Snapshot,
    /// `wait_for_text <selector> <text>`
    WaitForText,
    /// `wait_for_url <fragment>`
    WaitForUrl,
    /// `select <selector> <value>`
    Select,
    /// `check <selector>`
    Check,
    /// `uncheck <selector>`
    Uncheck,
    /// `hover <selector>`
    Hover,
}

impl ActionKind {
    /// Every action kind, in DSL documentation order
    pub const ALL: [Self; 20] = [
        Self::Navigate,
        Self::Click,
        Self::Type,
        Self::WaitFor,
        Self::AssertText,
        Self::AssertTextContains,
        Self::AssertTextVisible,
        Self::AssertElementExists,
        Self::AssertElementNotExists,
        Self::AssertUrl,
        Self::AssertTitle,
        Self::AssertAttribute,
        Self::Screenshot,
        Self::Snapshot,
        Self::WaitForText,
        Self::WaitForUrl,
        Self::Select,
        Self::Check,
        Self::Uncheck,
        Self::Hover,
    ];

    /// DSL keyword for this action
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Type => "type",
            Self::WaitFor => "wait_for",
            Self::AssertText => "assert_text",
            Self::AssertTextContains => "assert_text_contains",
            Self::AssertTextVisible => "assert_text_visible",
            Self::AssertElementExists => "assert_element_exists",
            Self::AssertElementNotExists => "assert_element_not_exists",
            Self::AssertUrl => "assert_url",
            Self::AssertTitle => "assert_title",
            Self::AssertAttribute => "assert_attribute",
            Self::Screenshot => "screenshot",
            Self::Snapshot => "snapshot",
            Self::WaitForText => "wait_for_text",
            Self::WaitForUrl => "wait_for_url",
            Self::Select => "select",
            Self::Check => "check",
            Self::Uncheck => "uncheck",
            Self::Hover => "hover",
        }
    }

    /// Whether the step only polls and is bounded by the test deadline
    #[must_use]
    pub const fn is_polling(self) -> bool {
        matches!(self, Self::WaitForText | Self::WaitForUrl)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EngineError::configuration(format!("unknown action: {s}")))
    }
}

/// One action within a test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Navigate to a URL
    Navigate {
        /// Destination
        url: String,
    },
    /// Click an element once visible
    Click {
        /// CSS selector
        selector: String,
    },
    /// Type text into an element once visible
    Type {
        /// CSS selector
        selector: String,
        /// Text to send
        text: String,
    },
    /// Wait for an element to become visible
    WaitFor {
        /// CSS selector
        selector: String,
    },
    /// Element text equals `expected`
    AssertText {
        /// CSS selector
        selector: String,
        /// Exact expected text
        expected: String,
    },
    /// Element text contains `substring`
    AssertTextContains {
        /// CSS selector
        selector: String,
        /// Expected substring
        substring: String,
    },
    /// Page body text contains `text`
    AssertTextVisible {
        /// Expected substring
        text: String,
    },
    /// Element is present in the DOM
    AssertElementExists {
        /// CSS selector
        selector: String,
    },
    /// Element is absent from the DOM
    AssertElementNotExists {
        /// CSS selector
        selector: String,
    },
    /// Current URL equals `expected`
    AssertUrl {
        /// Exact expected URL
        expected: String,
    },
    /// Page title equals `expected`
    AssertTitle {
        /// Exact expected title
        expected: String,
    },
    /// Element attribute is present and equals `expected`
    AssertAttribute {
        /// CSS selector
        selector: String,
        /// Attribute name
        attribute: String,
        /// Exact expected value
        expected: String,
    },
    /// Capture a screenshot and compare against its baseline
    Screenshot {
        /// Explicit baseline file name, or auto-named from the test
        filename: Option<String>,
    },
    /// Capture the serialized DOM and compare against its baseline
    Snapshot {
        /// Explicit baseline file name, or auto-named from the test
        filename: Option<String>,
    },
    /// Wait until an element is visible and its text contains `text`
    WaitForText {
        /// CSS selector
        selector: String,
        /// Expected substring
        text: String,
    },
    /// Wait until the current URL contains `fragment`
    WaitForUrl {
        /// Expected URL fragment
        fragment: String,
    },
    /// Activate a control and set its value
    Select {
        /// CSS selector
        selector: String,
        /// Value to set
        value: String,
    },
    /// Check a checkbox
    Check {
        /// CSS selector
        selector: String,
    },
    /// Uncheck a checkbox
    Uncheck {
        /// CSS selector
        selector: String,
    },
    /// Move the pointer over an element
    Hover {
        /// CSS selector
        selector: String,
    },
    /// A legacy step that could not be decoded; fails when executed
    Invalid {
        /// Action keyword as written
        action: String,
        /// Why it could not be decoded
        reason: String,
    },
}

impl Step {
    /// Decode a legacy `{action, target, value}` triple.
    ///
    /// Unknown actions and malformed compound targets decode to
    /// [`Step::Invalid`] so they fail at execution time rather than at
    /// submission.
    #[must_use]
    pub fn from_parts(action: &str, target: &str, value: &str) -> Self {
        let Ok(kind) = action.parse::<ActionKind>() else {
            return Self::Invalid {
                action: action.to_string(),
                reason: format!("unknown action: {action}"),
            };
        };
        let selector = target.to_string();
        let value = value.to_string();
        let optional = |s: &str| (!s.is_empty()).then(|| s.to_string());

        match kind {
            ActionKind::Navigate => Self::Navigate { url: selector },
            ActionKind::Click => Self::Click { selector },
            ActionKind::Type => Self::Type {
                selector,
                text: value,
            },
            ActionKind::WaitFor => Self::WaitFor { selector },
            ActionKind::AssertText => Self::AssertText {
                selector,
                expected: value,
            },
            ActionKind::AssertTextContains => Self::AssertTextContains {
                selector,
                substring: value,
            },
            ActionKind::AssertTextVisible => Self::AssertTextVisible { text: value },
            ActionKind::AssertElementExists => Self::AssertElementExists { selector },
            ActionKind::AssertElementNotExists => Self::AssertElementNotExists { selector },
            ActionKind::AssertUrl => Self::AssertUrl { expected: selector },
            ActionKind::AssertTitle => Self::AssertTitle { expected: selector },
            ActionKind::AssertAttribute => {
                let parts: Vec<&str> = target.split(ATTRIBUTE_SEPARATOR).collect();
                match parts.as_slice() {
                    [selector, attribute] => Self::AssertAttribute {
                        selector: (*selector).to_string(),
                        attribute: (*attribute).to_string(),
                        expected: value,
                    },
                    _ => Self::Invalid {
                        action: action.to_string(),
                        reason: "invalid assert_attribute format".to_string(),
                    },
                }
            }
            ActionKind::Screenshot => Self::Screenshot {
                filename: optional(target),
            },
            ActionKind::Snapshot => Self::Snapshot {
                filename: optional(target),
            },
            ActionKind::WaitForText => Self::WaitForText {
                selector,
                text: value,
            },
            ActionKind::WaitForUrl => Self::WaitForUrl { fragment: selector },
            ActionKind::Select => Self::Select { selector, value },
            ActionKind::Check => Self::Check { selector },
            ActionKind::Uncheck => Self::Uncheck { selector },
            ActionKind::Hover => Self::Hover { selector },
        }
    }

    /// Action kind, or `None` for an undecodable step
    #[must_use]
    pub const fn kind(&self) -> Option<ActionKind> {
        Some(match self {
            Self::Navigate { .. } => ActionKind::Navigate,
            Self::Click { .. } => ActionKind::Click,
            Self::Type { .. } => ActionKind::Type,
            Self::WaitFor { .. } => ActionKind::WaitFor,
            Self::AssertText { .. } => ActionKind::AssertText,
            Self::AssertTextContains { .. } => ActionKind::AssertTextContains,
            Self::AssertTextVisible { .. } => ActionKind::AssertTextVisible,
            Self::AssertElementExists { .. } => ActionKind::AssertElementExists,
            Self::AssertElementNotExists { .. } => ActionKind::AssertElementNotExists,
            Self::AssertUrl { .. } => ActionKind::AssertUrl,
            Self::AssertTitle { .. } => ActionKind::AssertTitle,
            Self::AssertAttribute { .. } => ActionKind::AssertAttribute,
            Self::Screenshot { .. } => ActionKind::Screenshot,
            Self::Snapshot { .. } => ActionKind::Snapshot,
            Self::WaitForText { .. } => ActionKind::WaitForText,
            Self::WaitForUrl { .. } => ActionKind::WaitForUrl,
            Self::Select { .. } => ActionKind::Select,
            Self::Check { .. } => ActionKind::Check,
            Self::Uncheck { .. } => ActionKind::Uncheck,
            Self::Hover { .. } => ActionKind::Hover,
            Self::Invalid { .. } => return None,
        })
    }

    /// Action keyword as it appears in scripts and logs
    #[must_use]
    pub fn action_name(&self) -> &str {
        match self {
            Self::Invalid { action, .. } => action,
            other => other.kind().map_or("invalid", ActionKind::as_str),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.action_name();
        match self {
            Self::Navigate { url: arg }
            | Self::AssertUrl { expected: arg }
            | Self::AssertTitle { expected: arg }
            | Self::WaitForUrl { fragment: arg }
            | Self::AssertTextVisible { text: arg } => write!(f, "{name} {arg}"),
            Self::Click { selector }
            | Self::WaitFor { selector }
            | Self::AssertElementExists { selector }
            | Self::AssertElementNotExists { selector }
            | Self::Check { selector }
            | Self::Uncheck { selector }
            | Self::Hover { selector } => write!(f, "{name} {selector}"),
            Self::Type {
                selector,
                text: arg,
            }
            | Self::AssertText {
                selector,
                expected: arg,
            }
            | Self::AssertTextContains {
                selector,
                substring: arg,
            }
            | Self::WaitForText {
                selector,
                text: arg,
            }
            | Self::Select {
                selector,
                value: arg,
            } => write!(f, "{name} {selector} \"{arg}\""),
            Self::AssertAttribute {
                selector,
                attribute,
                expected,
            } => write!(f, "{name} {selector} {attribute} \"{expected}\""),
            Self::Screenshot { filename } | Self::Snapshot { filename } => match filename {
                Some(file) => write!(f, "{name} {file}"),
                None => f.write_str(name),
            },
            Self::Invalid { reason, .. } => write!(f, "{name} ({reason})"),
        }
    }
}

/// A named, ordered sequence of steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Test name; also the stem of auto-named baselines
    pub name: String,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl TestCase {
    /// Create an empty test
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Start a fluent builder
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TestBuilder {
        TestBuilder {
            test: Self::new(name),
        }
    }

    /// Append a step
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Number of steps
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// Fluent builder for [`TestCase`]
#[derive(Debug, Clone)]
pub struct TestBuilder {
    test: TestCase,
}

impl TestBuilder {
    fn push(mut self, step: Step) -> Self {
        self.test.steps.push(step);
        self
    }

    /// Append an arbitrary step
    pub fn step(self, step: Step) -> Self {
        self.push(step)
    }

    /// Append a legacy `{action, target, value}` triple
    pub fn raw(self, action: &str, target: &str, value: &str) -> Self {
        self.push(Step::from_parts(action, target, value))
    }

    /// `navigate <url>`
    pub fn navigate(self, url: impl Into<String>) -> Self {
        self.push(Step::Navigate { url: url.into() })
    }

    /// `click <selector>`
    pub fn click(self, selector: impl Into<String>) -> Self {
        self.push(Step::Click {
            selector: selector.into(),
        })
    }

    /// `type <selector> <text>`
    pub fn type_text(self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.push(Step::Type {
            selector: selector.into(),
            text: text.into(),
        })
    }

    /// `wait_for <selector>`
    pub fn wait_for(self, selector: impl Into<String>) -> Self {
        self.push(Step::WaitFor {
            selector: selector.into(),
        })
    }

    /// `assert_text <selector> <expected>`
    pub fn assert_text(self, selector: impl Into<String>, expected: impl Into<String>) -> Self {
        self.push(Step::AssertText {
            selector: selector.into(),
            expected: expected.into(),
        })
    }

    /// `assert_text_contains <selector> <substring>`
    pub fn assert_text_contains(
        self,
        selector: impl Into<String>,
        substring: impl Into<String>,
    ) -> Self {
        self.push(Step::AssertTextContains {
            selector: selector.into(),
            substring: substring.into(),
        })
    }

    /// `assert_text_visible <text>`
    pub fn assert_text_visible(self, text: impl Into<String>) -> Self {
        self.push(Step::AssertTextVisible { text: text.into() })
    }

    /// `assert_element_exists <selector>`
    pub fn assert_element_exists(self, selector: impl Into<String>) -> Self {
        self.push(Step::AssertElementExists {
            selector: selector.into(),
        })
    }

    /// `assert_element_not_exists <selector>`
    pub fn assert_element_not_exists(self, selector: impl Into<String>) -> Self {
        self.push(Step::AssertElementNotExists {
            selector: selector.into(),
        })
    }

    /// `assert_url <expected>`
    pub fn assert_url(self, expected: impl Into<String>) -> Self {
        self.push(Step::AssertUrl {
            expected: expected.into(),
        })
    }

    /// `assert_title <expected>`
    pub fn assert_title(self, expected: impl Into<String>) -> Self {
        self.push(Step::AssertTitle {
            expected: expected.into(),
        })
    }

    /// `assert_attribute <selector> <attribute> <expected>`
    pub fn assert_attribute(
        self,
        selector: impl Into<String>,
        attribute: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        self.push(Step::AssertAttribute {
            selector: selector.into(),
            attribute: attribute.into(),
            expected: expected.into(),
        })
    }

    /// `screenshot`, auto-named from the test name
    pub fn screenshot(self) -> Self {
        self.push(Step::Screenshot { filename: None })
    }

    /// `screenshot <filename>`
    pub fn screenshot_as(self, filename: impl Into<String>) -> Self {
        self.push(Step::Screenshot {
            filename: Some(filename.into()),
        })
    }

    /// `snapshot`, auto-named from the test name
    pub fn snapshot(self) -> Self {
        self.push(Step::Snapshot { filename: None })
    }

    /// `snapshot <filename>`
    pub fn snapshot_as(self, filename: impl Into<String>) -> Self {
        self.push(Step::Snapshot {
            filename: Some(filename.into()),
        })
    }

    /// `wait_for_text <selector> <text>`
    pub fn wait_for_text(self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.push(Step::WaitForText {
            selector: selector.into(),
            text: text.into(),
        })
    }

    /// `wait_for_url <fragment>`
    pub fn wait_for_url(self, fragment: impl Into<String>) -> Self {
        self.push(Step::WaitForUrl {
            fragment: fragment.into(),
        })
    }

    /// `select <selector> <value>`
    pub fn select(self, selector: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(Step::Select {
            selector: selector.into(),
            value: value.into(),
        })
    }

    /// `check <selector>`
    pub fn check(self, selector: impl Into<String>) -> Self {
        self.push(Step::Check {
            selector: selector.into(),
        })
    }

    /// `uncheck <selector>`
    pub fn uncheck(self, selector: impl Into<String>) -> Self {
        self.push(Step::Uncheck {
            selector: selector.into(),
        })
    }

    /// `hover <selector>`
    pub fn hover(self, selector: impl Into<String>) -> Self {
        self.push(Step::Hover {
            selector: selector.into(),
        })
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> TestCase {
        self.test
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_round_trips_through_keyword() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert!("teleport".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_action_kind_serde_matches_keyword() {
        let json = serde_json::to_string(&ActionKind::WaitForText).unwrap();
        assert_eq!(json, "\"wait_for_text\"");
    }

    #[test]
    fn test_from_parts_attribute_target() {
        let step = Step::from_parts("assert_attribute", "#link|href", "/home");
        assert_eq!(
            step,
            Step::AssertAttribute {
                selector: "#link".to_string(),
                attribute: "href".to_string(),
                expected: "/home".to_string(),
            }
        );
    }

    #[test]
    fn test_from_parts_malformed_attribute_target() {
        for target in ["#link", "#link|href|extra"] {
            let step = Step::from_parts("assert_attribute", target, "x");
            assert!(matches!(step, Step::Invalid { .. }), "{target}");
            assert_eq!(step.kind(), None);
            assert_eq!(step.action_name(), "assert_attribute");
        }
    }

    #[test]
    fn test_from_parts_unknown_action() {
        let step = Step::from_parts("teleport", "#a", "");
        match step {
            Step::Invalid { action, reason } => {
                assert_eq!(action, "teleport");
                assert_eq!(reason, "unknown action: teleport");
            }
            other => panic!("expected invalid step, got {other:?}"),
        }
    }

    #[test]
    fn test_from_parts_screenshot_filename() {
        assert_eq!(
            Step::from_parts("screenshot", "", ""),
            Step::Screenshot { filename: None }
        );
        assert_eq!(
            Step::from_parts("snapshot", "home.html", ""),
            Step::Snapshot {
                filename: Some("home.html".to_string())
            }
        );
    }

    #[test]
    fn test_builder_preserves_order() {
        let test = TestCase::builder("Login Test")
            .navigate("https://example.com/login")
            .type_text("#user", "alice")
            .click("#submit")
            .wait_for_url("/dashboard")
            .screenshot()
            .build();

        assert_eq!(test.name, "Login Test");
        let kinds: Vec<_> = test.steps.iter().filter_map(Step::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::Navigate,
                ActionKind::Type,
                ActionKind::Click,
                ActionKind::WaitForUrl,
                ActionKind::Screenshot,
            ]
        );
    }

    #[test]
    fn test_step_display() {
        let step = Step::AssertAttribute {
            selector: "#link".to_string(),
            attribute: "href".to_string(),
            expected: "/home".to_string(),
        };
        assert_eq!(step.to_string(), "assert_attribute #link href \"/home\"");
        assert_eq!(
            Step::Screenshot { filename: None }.to_string(),
            "screenshot"
        );
    }

    #[test]
    fn test_polling_kinds() {
        assert!(ActionKind::WaitForUrl.is_polling());
        assert!(ActionKind::WaitForText.is_polling());
        assert!(!ActionKind::WaitFor.is_polling());
    }
}

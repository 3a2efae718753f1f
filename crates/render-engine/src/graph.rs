//! Filtergraph node types and serialization.
//!
//! Nodes are plain data until [`serialize_chain`] renders them into ffmpeg's
//! `-filter_complex` syntax. All escaping happens here.
//!
//! ffmpeg reads a filtergraph in two passes. The graph parser splits the
//! description into filters and unescapes it once (`\` and `'` quoting, with
//! `[ ] , ;` as delimiters). Each filter then splits its argument string into
//! `key=value` options and unescapes again (with `:` as delimiter). A literal
//! string therefore has to survive both passes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named stream inside the filtergraph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamLabel {
    /// Video stream of engine input `index` (`0` is the main video).
    Input { index: usize },
    /// Intermediate stream produced by a node.
    Named(String),
}

impl StreamLabel {
    /// Video stream of the main input.
    pub const BASE: StreamLabel = StreamLabel::Input { index: 0 };

    pub fn input(index: usize) -> Self {
        Self::Input { index }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Selector for `-map`. Input streams map without brackets.
    pub fn map_selector(&self) -> String {
        match self {
            Self::Input { index } => format!("{index}:v"),
            Self::Named(name) => format!("[{name}]"),
        }
    }
}

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input { index } => write!(f, "{index}:v"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// How an argument value is written into the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    /// Arbitrary user text; escaped for both parsing passes.
    Literal(String),
    /// Evaluated expression such as `between(t,1,3)`; quoted so its commas
    /// survive the graph pass. Must not contain `'` or `:`.
    Expr(String),
    /// Trusted token emitted verbatim (numbers, `iw*0.5`, `none`).
    Raw(String),
}

/// One filter argument, optionally keyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterArg {
    pub key: Option<String>,
    pub value: ArgValue,
}

/// A filter invocation: name plus arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub args: Vec<FilterArg>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Keyed literal argument.
    pub fn literal(self, key: &str, value: impl Into<String>) -> Self {
        self.push(Some(key), ArgValue::Literal(value.into()))
    }

    /// Keyed expression argument.
    pub fn expr(self, key: &str, value: impl Into<String>) -> Self {
        self.push(Some(key), ArgValue::Expr(value.into()))
    }

    /// Keyed raw argument.
    pub fn raw(self, key: &str, value: impl fmt::Display) -> Self {
        self.push(Some(key), ArgValue::Raw(value.to_string()))
    }

    /// Positional raw argument.
    pub fn positional(self, value: impl fmt::Display) -> Self {
        self.push(None, ArgValue::Raw(value.to_string()))
    }

    fn push(mut self, key: Option<&str>, value: ArgValue) -> Self {
        self.args.push(FilterArg {
            key: key.map(str::to_string),
            value,
        });
        self
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            if let Some(key) = &arg.key {
                write!(f, "{key}=")?;
            }
            match &arg.value {
                ArgValue::Literal(text) => f.write_str(&escape_literal(text))?,
                ArgValue::Expr(expr) => write!(f, "'{expr}'")?,
                ArgValue::Raw(token) => f.write_str(token)?,
            }
        }
        Ok(())
    }
}

/// One graph step: consumes `inputs`, produces `output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterNode {
    pub inputs: Vec<StreamLabel>,
    pub filter: Filter,
    pub output: StreamLabel,
}

impl FilterNode {
    pub fn new(inputs: Vec<StreamLabel>, filter: Filter, output: StreamLabel) -> Self {
        Self {
            inputs,
            filter,
            output,
        }
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "[{input}]")?;
        }
        write!(f, "{}[{}]", self.filter, self.output)
    }
}

/// Render nodes as a `-filter_complex` description, `;`-separated in order.
pub fn serialize_chain(nodes: &[FilterNode]) -> String {
    nodes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

/// Escape a value for the filter option pass.
pub fn escape_option_value(value: &str) -> String {
    escape_chars(value, &['\\', '\'', ':'])
}

/// Escape a filter argument string for the graph pass.
pub fn escape_graph_value(value: &str) -> String {
    escape_chars(value, &['\\', '\'', '[', ']', ',', ';'])
}

/// Escape arbitrary text so both passes recover the input text.
pub fn escape_literal(value: &str) -> String {
    escape_graph_value(&escape_option_value(value))
}

/// Whitespace ffmpeg's tokenizer strips from both ends of a token.
const TOKEN_WHITESPACE: &[char] = &[' ', '\n', '\t', '\r'];

/// Backslash-escape `special` characters everywhere, and whitespace at
/// either end of `value` so tokenizing keeps it.
fn escape_chars(value: &str, special: &[char]) -> String {
    let lead_end = value.len() - value.trim_start_matches(TOKEN_WHITESPACE).len();
    let trail_start = value.trim_end_matches(TOKEN_WHITESPACE).len();
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.char_indices() {
        let edge = i < lead_end || i >= trail_start;
        if special.contains(&c) || (edge && TOKEN_WHITESPACE.contains(&c)) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Format a number the way expressions expect: no exponent, no trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Mirror of ffmpeg's `av_get_token`: skips leading whitespace, reads up
    /// to an unquoted, unescaped terminator dropping quotes and escape
    /// backslashes, then trims trailing whitespace that was neither escaped
    /// nor quoted.
    pub(crate) fn get_token<'a>(input: &'a str, terms: &[char]) -> (String, &'a str) {
        let input = input.trim_start_matches(TOKEN_WHITESPACE);
        let mut out = String::new();
        let mut kept = 0;
        let mut rest = "";
        let mut chars = input.char_indices().peekable();
        while let Some(&(i, c)) = chars.peek() {
            if terms.contains(&c) {
                rest = &input[i..];
                break;
            }
            chars.next();
            match c {
                '\\' => match chars.next() {
                    Some((_, next)) => {
                        out.push(next);
                        kept = out.len();
                    }
                    None => out.push(c),
                },
                '\'' => {
                    let mut closed = false;
                    for (_, q) in chars.by_ref() {
                        if q == '\'' {
                            closed = true;
                            break;
                        }
                        out.push(q);
                    }
                    if closed {
                        kept = out.len();
                    }
                }
                _ => out.push(c),
            }
        }
        while out.len() > kept && out.ends_with(TOKEN_WHITESPACE) {
            out.pop();
        }
        (out, rest)
    }

    /// Read the option value of `key` out of one serialized node the way
    /// ffmpeg would: graph pass first, then option pass.
    pub(crate) fn parsed_option(node: &str, key: &str) -> Option<String> {
        let mut rest = node;
        while let Some(stripped) = rest.strip_prefix('[') {
            rest = stripped.split_once(']').map(|(_, tail)| tail)?;
        }
        let rest = rest.split_once('=').map(|(_, args)| args)?;
        let (args, _) = get_token(rest, &['[', ']', ',', ';']);

        let mut remaining = args.as_str();
        loop {
            let (option, tail) = get_token(remaining, &[':']);
            if let Some(value) = option.strip_prefix(&format!("{key}=")) {
                return Some(value.to_string());
            }
            if tail.is_empty() {
                return None;
            }
            remaining = &tail[1..];
        }
    }

    #[test]
    fn test_label_rendering() {
        assert_eq!(StreamLabel::BASE.to_string(), "0:v");
        assert_eq!(StreamLabel::input(3).to_string(), "3:v");
        assert_eq!(StreamLabel::named("v0").to_string(), "v0");
        assert_eq!(StreamLabel::BASE.map_selector(), "0:v");
        assert_eq!(StreamLabel::named("v2").map_selector(), "[v2]");
    }

    #[test]
    fn test_node_rendering() {
        let node = FilterNode::new(
            vec![StreamLabel::named("v0"), StreamLabel::named("filtered_1")],
            Filter::new("overlay")
                .raw("x", 10)
                .raw("y", -5)
                .expr("enable", "between(t,1,3)"),
            StreamLabel::named("v1"),
        );
        assert_eq!(
            node.to_string(),
            "[v0][filtered_1]overlay=x=10:y=-5:enable='between(t,1,3)'[v1]"
        );

        let identity = FilterNode::new(
            vec![StreamLabel::named("scaled_0")],
            Filter::new("null"),
            StreamLabel::named("filtered_0"),
        );
        assert_eq!(identity.to_string(), "[scaled_0]null[filtered_0]");
    }

    #[test]
    fn test_positional_args() {
        let filter = Filter::new("scale").positional("iw*0.5").positional(-1);
        assert_eq!(filter.to_string(), "scale=iw*0.5:-1");
    }

    #[test]
    fn test_escape_levels() {
        assert_eq!(escape_option_value("a:b's"), r"a\:b\'s");
        assert_eq!(escape_graph_value(r"a\:b\'s"), r"a\\:b\\\'s");
        assert_eq!(escape_literal("one, two; [x]"), r"one\, two\; \[x\]");
        assert_eq!(escape_literal("plain text"), "plain text");
    }

    #[test]
    fn test_colon_and_apostrophe_survive_both_passes() {
        let node = FilterNode::new(
            vec![StreamLabel::BASE],
            Filter::new("drawtext")
                .literal("text", "a:b's")
                .raw("x", 10)
                .expr("enable", "between(t,1,3)"),
            StreamLabel::named("v0"),
        )
        .to_string();

        assert_eq!(parsed_option(&node, "text").as_deref(), Some("a:b's"));
        assert_eq!(parsed_option(&node, "x").as_deref(), Some("10"));
        assert_eq!(
            parsed_option(&node, "enable").as_deref(),
            Some("between(t,1,3)")
        );
    }

    #[test]
    fn test_hostile_text_survives_both_passes() {
        let text = r"C:\path [with] 'quotes', semi; colons: 100%";
        let node = FilterNode::new(
            vec![StreamLabel::BASE],
            Filter::new("drawtext").literal("text", text).raw("y", 0),
            StreamLabel::named("v0"),
        )
        .to_string();
        assert_eq!(parsed_option(&node, "text").as_deref(), Some(text));
        assert_eq!(parsed_option(&node, "y").as_deref(), Some("0"));
    }

    #[test]
    fn test_edge_whitespace_is_escaped() {
        assert_eq!(escape_option_value("  padded  "), r"\ \ padded\ \ ");
        assert_eq!(escape_literal("  padded  "), r"\\ \\ padded\\ \\\ ");
        assert_eq!(escape_literal("Score: 10 "), r"Score\\: 10\\\ ");
        assert_eq!(escape_literal("a b"), "a b");
    }

    #[test]
    fn test_unescaped_edge_whitespace_is_trimmed_by_tokenizer() {
        assert_eq!(get_token("  x y  :z", &[':']), ("x y".to_string(), ":z"));
        assert_eq!(get_token(r"\ x\ ", &[':']), (" x ".to_string(), ""));
        assert_eq!(get_token("' x ' ", &[':']), (" x ".to_string(), ""));
    }

    #[test]
    fn test_padded_text_survives_both_passes() {
        for text in ["  padded  ", "Score: 10 ", "\tlead", "trail\n", " ", "x ; y "] {
            for trailing in [false, true] {
                let mut filter = Filter::new("drawtext").literal("text", text);
                if !trailing {
                    filter = filter.raw("x", 0);
                }
                let node =
                    FilterNode::new(vec![StreamLabel::BASE], filter, StreamLabel::named("v0"))
                        .to_string();
                assert_eq!(
                    parsed_option(&node, "text").as_deref(),
                    Some(text),
                    "node: {node}"
                );
            }
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_any_text_survives_both_passes(text in "[ -~\t\n]{0,24}") {
            let node = FilterNode::new(
                vec![StreamLabel::BASE],
                Filter::new("drawtext").literal("text", text.clone()).raw("x", 0),
                StreamLabel::named("v0"),
            )
            .to_string();
            proptest::prop_assert_eq!(parsed_option(&node, "text"), Some(text));
        }
    }

    #[test]
    fn test_serialize_chain_joins_in_order() {
        let a = FilterNode::new(
            vec![StreamLabel::BASE],
            Filter::new("null"),
            StreamLabel::named("a"),
        );
        let b = FilterNode::new(
            vec![StreamLabel::named("a")],
            Filter::new("negate"),
            StreamLabel::named("b"),
        );
        assert_eq!(serialize_chain(&[a, b]), "[0:v]null[a];[a]negate[b]");
        assert_eq!(serialize_chain(&[]), "");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(format_number(-3.0), "-3");
    }
}

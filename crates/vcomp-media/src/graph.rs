//! Structured filter-graph statements.
//!
//! The compiler never concatenates filter text directly. It pushes tagged
//! [`Statement`]s with explicit input and output labels into a
//! [`FilterGraph`], checks label invariants on that structure, and renders
//! text only at the end.

use std::collections::HashSet;
use std::fmt;

use crate::error::{MediaError, MediaResult};

/// What a statement does. Used for inspection and tests; rendering only
/// depends on labels and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Scale/pad/fps normalization ahead of concat
    Normalize,
    /// Resample/format normalization ahead of concat
    NormalizeAudio,
    /// Silent audio substituted for a clip without an audio track
    SilentAudio,
    Concat,
    /// Transparent lead-in for a delayed overlay
    TimePad,
    ColorKey,
    Scale,
    /// Opacity via the alpha channel
    Alpha,
    Overlay,
    /// Delay/trim of an overlay's audio to its visibility window
    AudioTiming,
    Mix,
    /// `null`/`anull` used to give an input stream a custom label
    Passthrough,
    /// Caller-supplied fragment
    Raw,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Normalize => "normalize",
            FilterKind::NormalizeAudio => "normalize_audio",
            FilterKind::SilentAudio => "silent_audio",
            FilterKind::Concat => "concat",
            FilterKind::TimePad => "timepad",
            FilterKind::ColorKey => "colorkey",
            FilterKind::Scale => "scale",
            FilterKind::Alpha => "alpha",
            FilterKind::Overlay => "overlay",
            FilterKind::AudioTiming => "audio_timing",
            FilterKind::Mix => "mix",
            FilterKind::Passthrough => "passthrough",
            FilterKind::Raw => "raw",
        }
    }
}

/// One filter chain with its link labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    kind: FilterKind,
    inputs: Vec<String>,
    outputs: Vec<String>,
    body: String,
}

impl Statement {
    pub fn new<I, O>(kind: FilterKind, inputs: I, body: impl Into<String>, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            kind,
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            body: body.into(),
        }
    }

    /// A single-input, single-output chain.
    pub fn chain(kind: FilterKind, input: &str, body: impl Into<String>, output: &str) -> Self {
        Self::new(kind, [input], body, [output])
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Render as filter-graph text.
    pub fn render(&self) -> String {
        if self.kind == FilterKind::Raw {
            return self.body.clone();
        }

        let mut text = String::new();
        for label in &self.inputs {
            text.push('[');
            text.push_str(label);
            text.push(']');
        }
        text.push_str(&self.body);
        for label in &self.outputs {
            text.push('[');
            text.push_str(label);
            text.push(']');
        }
        text
    }

    fn rename_output(&mut self, from: &str, to: &str) -> bool {
        match self.outputs.iter_mut().find(|l| l.as_str() == from) {
            Some(label) => {
                *label = to.to_string();
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Ordered list of statements forming one `-filter_complex` program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    statements: Vec<Statement>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Number of statements of a kind.
    pub fn count(&self, kind: FilterKind) -> usize {
        self.statements.iter().filter(|s| s.kind == kind).count()
    }

    /// Whether any statement declares `label`.
    pub fn declares(&self, label: &str) -> bool {
        self.statements
            .iter()
            .any(|s| s.outputs.iter().any(|l| l == label))
    }

    /// Whether any statement consumes `label`.
    pub fn consumes(&self, label: &str) -> bool {
        self.statements
            .iter()
            .any(|s| s.inputs.iter().any(|l| l == label))
    }

    /// Rename the output label of whichever statement declares `from`.
    pub fn rename_output(&mut self, from: &str, to: &str) -> bool {
        self.statements
            .iter_mut()
            .rev()
            .any(|s| s.rename_output(from, to))
    }

    /// Render the whole program, statements joined with `;`.
    pub fn render(&self) -> String {
        self.statements
            .iter()
            .map(Statement::render)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Check the label invariants.
    ///
    /// - every declared label is unique and is not an input stream specifier
    /// - every consumed label is an input stream specifier of an existing
    ///   input, or was declared by a strictly earlier statement
    /// - a declared label feeds at most one consumer
    pub fn validate(&self, input_count: usize) -> MediaResult<()> {
        let mut declared: HashSet<&str> = HashSet::new();
        let mut consumed: HashSet<&str> = HashSet::new();

        for statement in &self.statements {
            for label in &statement.inputs {
                if let Some(index) = input_stream_index(label) {
                    if index >= input_count {
                        return Err(MediaError::graph_build(
                            format!(
                                "label [{}] references input {} but only {} inputs exist",
                                label, index, input_count
                            ),
                            Some(statement.render()),
                        ));
                    }
                    continue;
                }
                if !declared.contains(label.as_str()) {
                    return Err(MediaError::graph_build(
                        format!("label [{}] is used before it is defined", label),
                        Some(statement.render()),
                    ));
                }
                if !consumed.insert(label.as_str()) {
                    return Err(MediaError::graph_build(
                        format!("label [{}] is consumed more than once", label),
                        Some(statement.render()),
                    ));
                }
            }

            for label in &statement.outputs {
                if input_stream_index(label).is_some() {
                    return Err(MediaError::graph_build(
                        format!("label [{}] shadows an input stream specifier", label),
                        Some(statement.render()),
                    ));
                }
                if !declared.insert(label.as_str()) {
                    return Err(MediaError::graph_build(
                        format!("label [{}] is declared more than once", label),
                        Some(statement.render()),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Labels that were declared but never consumed.
    pub fn dangling_labels(&self) -> Vec<&str> {
        let consumed: HashSet<&str> = self
            .statements
            .iter()
            .flat_map(|s| s.inputs.iter().map(String::as_str))
            .collect();
        self.statements
            .iter()
            .flat_map(|s| s.outputs.iter().map(String::as_str))
            .filter(|l| !consumed.contains(l))
            .collect()
    }
}

/// Input index of a stream specifier label such as `0:v` or `2:a:0`.
pub fn input_stream_index(label: &str) -> Option<usize> {
    let (index, rest) = label.split_once(':')?;
    if rest.is_empty() {
        return None;
    }
    index.parse().ok()
}

/// Render a label the way `-map` expects it: bare for input stream
/// specifiers, bracketed for graph outputs.
pub fn map_target(label: &str) -> String {
    if input_stream_index(label).is_some() {
        label.to_string()
    } else {
        format!("[{}]", label)
    }
}

/// Split a caller-supplied fragment into one [`FilterKind::Raw`] statement
/// per filter chain, with link labels recovered from the text.
///
/// Within a chain, labels leading a filter are inputs and labels trailing a
/// filter are outputs. Links created and consumed inside the same chain are
/// internal and do not appear on the statement.
pub fn parse_raw_fragment(fragment: &str) -> Vec<Statement> {
    split_unquoted(fragment, ';')
        .into_iter()
        .map(str::trim)
        .filter(|chain| !chain.is_empty())
        .map(|chain| {
            let mut inputs: Vec<String> = Vec::new();
            let mut outputs: Vec<String> = Vec::new();

            for filter in split_unquoted(chain, ',') {
                let (leading, trailing) = filter_labels(filter);
                for label in leading {
                    if let Some(pos) = outputs.iter().position(|l| *l == label) {
                        outputs.remove(pos);
                    } else {
                        inputs.push(label);
                    }
                }
                outputs.extend(trailing);
            }

            Statement::new(FilterKind::Raw, inputs, chain.to_string(), outputs)
        })
        .collect()
}

/// Split on `sep` outside single quotes and backslash escapes.
fn split_unquoted(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '\'' => quoted = !quoted,
            c if c == sep && !quoted => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Leading and trailing `[label]` groups of one filter.
fn filter_labels(filter: &str) -> (Vec<String>, Vec<String>) {
    let mut rest = filter.trim();
    let mut leading = Vec::new();
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(end) => {
                leading.push(stripped[..end].to_string());
                rest = stripped[end + 1..].trim_start();
            }
            None => break,
        }
    }

    let mut trailing = Vec::new();
    while let Some(stripped) = rest.strip_suffix(']') {
        match stripped.rfind('[') {
            Some(start) => {
                trailing.push(stripped[start + 1..].to_string());
                rest = stripped[..start].trim_end();
            }
            None => break,
        }
    }
    trailing.reverse();

    (leading, trailing)
}

//! Structured GraphQL documents.
//!
//! Queries are assembled from typed field descriptors and rendered by a
//! single serialiser, so the shape of a batched query can be asserted on
//! without comparing whitespace.
//!
//! # Example
//!
//! ```
//! use label_watcher::watch::query::{Argument, Field, QueryDocument};
//!
//! let document = QueryDocument::new("Viewer")
//!     .with_variable("dryRun", "Boolean!")
//!     .with_field(
//!         Field::new("rateLimit")
//!             .with_argument("dryRun", Argument::variable("dryRun"))
//!             .with_field(Field::new("cost")),
//!     );
//!
//! assert_eq!(
//!     document.to_string(),
//!     "query Viewer($dryRun: Boolean!) {\n  rateLimit(dryRun: $dryRun) {\n    cost\n  }\n}\n"
//! );
//! ```

use std::fmt::{self, Write as _};

const INDENT: &str = "  ";

/// An argument value inside a field's argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// Reference to a declared variable, rendered with a `$` sigil.
    Variable(String),
    /// Integer literal.
    Int(u64),
    /// String literal, escaped on render.
    String(String),
    /// Enum value such as `OPEN`.
    Enum(String),
    /// List of values.
    List(Vec<Argument>),
    /// Input object with ordered fields.
    Object(Vec<(String, Argument)>),
}

impl Argument {
    /// Reference to the variable `name`.
    #[must_use]
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// String literal.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Enum literal.
    #[must_use]
    pub fn enumeration(value: impl Into<String>) -> Self {
        Self::Enum(value.into())
    }

    /// List of enum literals.
    #[must_use]
    pub fn enums(values: &[&str]) -> Self {
        Self::List(values.iter().map(|value| Self::enumeration(*value)).collect())
    }

    /// Input object built from `(name, value)` pairs.
    #[must_use]
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Self)>,
        K: Into<String>,
    {
        Self::Object(
            fields
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "${name}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::String(value) => write_string_literal(f, value),
            Self::Enum(value) => f.write_str(value),
            Self::List(values) => {
                f.write_char('[')?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_char(']')
            }
            Self::Object(fields) => {
                f.write_char('{')?;
                for (index, (name, value)) in fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_char('}')
            }
        }
    }
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_char('"')?;
    for character in value.chars() {
        match character {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            control if control.is_control() => write!(f, "\\u{:04x}", u32::from(control))?,
            other => f.write_char(other)?,
        }
    }
    f.write_char('"')
}

/// One entry of a selection set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A field, possibly aliased and with its own selection set.
    Field(Field),
    /// A named fragment spread (`...name`).
    Spread(String),
}

/// Field descriptor with alias, arguments, an optional include guard, and
/// child selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    alias: Option<String>,
    name: String,
    arguments: Vec<(String, Argument)>,
    include_if: Option<String>,
    selections: Vec<Selection>,
}

impl Field {
    /// Creates a plain field.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            include_if: None,
            selections: Vec::new(),
        }
    }

    /// Renders the field under `alias`.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Appends an argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: Argument) -> Self {
        self.arguments.push((name.into(), value));
        self
    }

    /// Guards the field with `@include(if: $variable)`.
    #[must_use]
    pub fn with_include_if(mut self, variable: impl Into<String>) -> Self {
        self.include_if = Some(variable.into());
        self
    }

    /// Appends a child field.
    #[must_use]
    pub fn with_field(mut self, field: Self) -> Self {
        self.selections.push(Selection::Field(field));
        self
    }

    /// Appends a fragment spread.
    #[must_use]
    pub fn with_spread(mut self, fragment: impl Into<String>) -> Self {
        self.selections.push(Selection::Spread(fragment.into()));
        self
    }

    /// Appends several plain child fields.
    #[must_use]
    pub fn with_scalars(mut self, names: &[&str]) -> Self {
        self.selections
            .extend(names.iter().map(|name| Selection::Field(Self::new(*name))));
        self
    }

    /// Response key of the field: its alias, or its name when unaliased.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Field name as defined by the schema.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variable guarding the field, if any.
    #[must_use]
    pub fn include_if(&self) -> Option<&str> {
        self.include_if.as_deref()
    }

    /// Value of the named argument.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value)
    }

    /// Child field with the given response key.
    #[must_use]
    pub fn child(&self, response_key: &str) -> Option<&Self> {
        self.selections.iter().find_map(|selection| match selection {
            Selection::Field(field) if field.response_key() == response_key => Some(field),
            _ => None,
        })
    }

    /// Child selections in render order.
    #[must_use]
    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    fn render(&self, out: &mut impl fmt::Write, depth: usize) -> fmt::Result {
        write_indent(out, depth)?;
        if let Some(alias) = &self.alias {
            write!(out, "{alias}: ")?;
        }
        out.write_str(&self.name)?;
        if !self.arguments.is_empty() {
            out.write_char('(')?;
            for (index, (name, value)) in self.arguments.iter().enumerate() {
                if index > 0 {
                    out.write_str(", ")?;
                }
                write!(out, "{name}: {value}")?;
            }
            out.write_char(')')?;
        }
        if let Some(variable) = &self.include_if {
            write!(out, " @include(if: ${variable})")?;
        }
        if self.selections.is_empty() {
            return out.write_char('\n');
        }
        out.write_str(" {\n")?;
        render_selections(out, &self.selections, depth + 1)?;
        write_indent(out, depth)?;
        out.write_str("}\n")
    }
}

fn write_indent(out: &mut impl fmt::Write, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        out.write_str(INDENT)?;
    }
    Ok(())
}

fn render_selections(
    out: &mut impl fmt::Write,
    selections: &[Selection],
    depth: usize,
) -> fmt::Result {
    for selection in selections {
        match selection {
            Selection::Field(field) => field.render(out, depth)?,
            Selection::Spread(name) => {
                write_indent(out, depth)?;
                writeln!(out, "...{name}")?;
            }
        }
    }
    Ok(())
}

/// Named fragment on a schema type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    name: String,
    type_condition: String,
    selections: Vec<Selection>,
}

impl Fragment {
    /// Creates an empty fragment.
    #[must_use]
    pub fn new(name: impl Into<String>, type_condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_condition: type_condition.into(),
            selections: Vec::new(),
        }
    }

    /// Appends a field.
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.selections.push(Selection::Field(field));
        self
    }

    /// Appends several plain fields.
    #[must_use]
    pub fn with_scalars(mut self, names: &[&str]) -> Self {
        self.selections
            .extend(names.iter().map(|name| Selection::Field(Field::new(*name))));
        self
    }

    /// Fragment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Declared operation variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDefinition {
    /// Variable name without the `$` sigil.
    pub name: String,
    /// GraphQL type, such as `Boolean!`.
    pub type_name: String,
}

/// A complete query operation with its fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDocument {
    operation: String,
    variables: Vec<VariableDefinition>,
    selections: Vec<Selection>,
    fragments: Vec<Fragment>,
}

impl QueryDocument {
    /// Creates an empty query named `operation`.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            variables: Vec::new(),
            selections: Vec::new(),
            fragments: Vec::new(),
        }
    }

    /// Declares a variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.push_variable(name, type_name);
        self
    }

    /// Appends a top-level field.
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.push_field(field);
        self
    }

    /// Appends a fragment definition.
    #[must_use]
    pub fn with_fragment(mut self, fragment: Fragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    /// Declares a variable in place.
    pub fn push_variable(&mut self, name: impl Into<String>, type_name: impl Into<String>) {
        self.variables.push(VariableDefinition {
            name: name.into(),
            type_name: type_name.into(),
        });
    }

    /// Appends a top-level field in place.
    pub fn push_field(&mut self, field: Field) {
        self.selections.push(Selection::Field(field));
    }

    /// Operation name.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns true when `name` is a declared variable.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.variables.iter().any(|variable| variable.name == name)
    }

    /// Declared variables in declaration order.
    #[must_use]
    pub fn variables(&self) -> &[VariableDefinition] {
        &self.variables
    }

    /// Top-level field with the given response key.
    #[must_use]
    pub fn field(&self, response_key: &str) -> Option<&Field> {
        self.selections.iter().find_map(|selection| match selection {
            Selection::Field(field) if field.response_key() == response_key => Some(field),
            Selection::Field(_) | Selection::Spread(_) => None,
        })
    }

    /// Fragment definitions in render order.
    #[must_use]
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }
}

impl fmt::Display for QueryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query {}", self.operation)?;
        if !self.variables.is_empty() {
            f.write_char('(')?;
            for (index, variable) in self.variables.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "${}: {}", variable.name, variable.type_name)?;
            }
            f.write_char(')')?;
        }
        f.write_str(" {\n")?;
        render_selections(f, &self.selections, 1)?;
        f.write_str("}\n")?;
        for fragment in &self.fragments {
            write!(
                f,
                "\nfragment {} on {} {{\n",
                fragment.name, fragment.type_condition
            )?;
            render_selections(f, &fragment.selections, 1)?;
            f.write_str("}\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Argument, Field, Fragment, QueryDocument};

    #[rstest]
    #[case::quote("say \"hi\"", r#""say \"hi\"""#)]
    #[case::backslash(r"a\b", r#""a\\b""#)]
    #[case::newline("a\nb", r#""a\nb""#)]
    #[case::unicode("größe", "\"größe\"")]
    fn escapes_string_literals(#[case] raw: &str, #[case] rendered: &str) {
        assert_eq!(Argument::string(raw).to_string(), rendered);
    }

    #[rstest]
    fn renders_nested_input_objects() {
        let filter = Argument::object([
            ("labels", Argument::List(vec![Argument::string("bug")])),
            ("states", Argument::enums(&["OPEN", "CLOSED"])),
            ("since", Argument::variable("since")),
        ]);

        assert_eq!(
            filter.to_string(),
            r#"{labels: ["bug"], states: [OPEN, CLOSED], since: $since}"#
        );
    }

    #[rstest]
    fn renders_aliases_guards_and_fragments() {
        let document = QueryDocument::new("Items")
            .with_variable("pageSize", "Int!")
            .with_variable("include_a", "Boolean!")
            .with_field(
                Field::new("repository")
                    .with_alias("r0")
                    .with_argument("owner", Argument::string("octo"))
                    .with_field(
                        Field::new("issues")
                            .with_alias("a")
                            .with_argument("first", Argument::variable("pageSize"))
                            .with_include_if("include_a")
                            .with_spread("fields"),
                    ),
            )
            .with_fragment(Fragment::new("fields", "IssueConnection").with_scalars(&["totalCount"]));

        let expected = concat!(
            "query Items($pageSize: Int!, $include_a: Boolean!) {\n",
            "  r0: repository(owner: \"octo\") {\n",
            "    a: issues(first: $pageSize) @include(if: $include_a) {\n",
            "      ...fields\n",
            "    }\n",
            "  }\n",
            "}\n",
            "\n",
            "fragment fields on IssueConnection {\n",
            "  totalCount\n",
            "}\n",
        );
        assert_eq!(document.to_string(), expected);
    }

    #[rstest]
    fn looks_up_fields_by_response_key() {
        let document = QueryDocument::new("Lookup").with_field(
            Field::new("repository")
                .with_alias("r0")
                .with_field(Field::new("labels").with_include_if("include_r0")),
        );

        let repository = document.field("r0").expect("aliased field present");
        assert_eq!(repository.name(), "repository");
        assert_eq!(
            repository.child("labels").and_then(Field::include_if),
            Some("include_r0")
        );
        assert!(document.field("repository").is_none());
        assert!(!document.declares("since"));
    }
}

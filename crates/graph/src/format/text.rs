//! Human-readable rendering of the raw shape
//!
//! One-way: meant for inspecting graphs, not for parsing back.
//!
//! # Format Examples
//!
//! - Int: `42`
//! - Float: `3.0` (always with a decimal point when finite)
//! - String: `"hello"` (with escaping)
//! - Ellipsis: `...`
//! - List: `[1, 2, 3]`
//! - Node: `tuple { items: [1, 2] }`
//! - Placeholder: `<self>` for the innermost value, `<self^2>` further out

use crate::raw::{Node, RawValue, SelfRef};

/// Configuration for text output formatting
#[derive(Debug, Clone)]
pub struct TextConfig {
    /// Use pretty printing with indentation
    pub pretty: bool,
    /// Number of spaces per indentation level
    pub indent: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            pretty: false,
            indent: 2,
        }
    }
}

impl TextConfig {
    /// Single-line output
    pub fn compact() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self {
            pretty: true,
            indent: 2,
        }
    }
}

pub fn render(raw: &RawValue, config: &TextConfig) -> String {
    let mut buf = String::new();
    format_value(raw, config, 0, &mut buf);
    buf
}

fn format_value(raw: &RawValue, config: &TextConfig, depth: usize, buf: &mut String) {
    match raw {
        RawValue::None => buf.push_str("None"),
        RawValue::Ellipsis => buf.push_str("..."),
        RawValue::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        RawValue::Int(n) => buf.push_str(&n.to_string()),
        RawValue::Float(x) => format_float(*x, buf),
        RawValue::Complex { re, im } => {
            buf.push_str("complex(");
            format_float(*re, buf);
            buf.push_str(", ");
            format_float(*im, buf);
            buf.push(')');
        }
        RawValue::Str(s) => format_string(s, buf),
        RawValue::List(items) => format_list(items, config, depth, buf),
        RawValue::Node(node) => format_node(node, config, depth, buf),
        RawValue::Placeholder(SelfRef { depth: 0 }) => buf.push_str("<self>"),
        RawValue::Placeholder(SelfRef { depth: up }) => buf.push_str(&format!("<self^{}>", up)),
    }
}

fn format_float(x: f64, buf: &mut String) {
    let s = x.to_string();
    buf.push_str(&s);
    // Keep floats distinguishable from ints
    if !s.contains('.') && x.is_finite() {
        buf.push_str(".0");
    }
}

/// Format a string with proper escaping
fn format_string(s: &str, buf: &mut String) {
    buf.push('"');
    for c in s.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            c if c.is_control() => {
                buf.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => buf.push(c),
        }
    }
    buf.push('"');
}

fn format_list(items: &[RawValue], config: &TextConfig, depth: usize, buf: &mut String) {
    buf.push('[');
    // Lists of literals stay on one line even when pretty
    if config.pretty && !items.iter().all(RawValue::is_literal) {
        for item in items {
            buf.push('\n');
            push_indent(buf, depth + 1, config.indent);
            format_value(item, config, depth + 1, buf);
        }
        buf.push('\n');
        push_indent(buf, depth, config.indent);
    } else {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                buf.push_str(", ");
            }
            format_value(item, config, depth, buf);
        }
    }
    buf.push(']');
}

fn format_node(node: &Node, config: &TextConfig, depth: usize, buf: &mut String) {
    buf.push_str(node.kind.as_str());
    if node.fields.is_empty() {
        buf.push_str(" {}");
        return;
    }
    buf.push_str(" {");
    if config.pretty {
        for (name, value) in &node.fields {
            buf.push('\n');
            push_indent(buf, depth + 1, config.indent);
            buf.push_str(name);
            buf.push_str(": ");
            format_value(value, config, depth + 1, buf);
        }
        buf.push('\n');
        push_indent(buf, depth, config.indent);
    } else {
        for (i, (name, value)) in node.fields.iter().enumerate() {
            buf.push_str(if i == 0 { " " } else { ", " });
            buf.push_str(name);
            buf.push_str(": ");
            format_value(value, config, depth, buf);
        }
        buf.push(' ');
    }
    buf.push('}');
}

/// Push indentation spaces
fn push_indent(buf: &mut String, depth: usize, indent_size: usize) {
    for _ in 0..(depth * indent_size) {
        buf.push(' ');
    }
}

//! Detection of tool-use blocks embedded in free-form model output.
//!
//! Models request tools with an XML-like block:
//!
//! ```text
//! <use_mcp_tool>
//! <server_name>todo</server_name>
//! <tool_name>add_task</tool_name>
//! <arguments>{"title": "buy milk"}</arguments>
//! </use_mcp_tool>
//! ```
//!
//! Malformed or partial blocks degrade to plain prose: parsing returns `None`
//! instead of an error.
//!
//! ```rust
//! use ktooling::ToolUseParser;
//!
//! let text = "Adding it now.\n<use_mcp_tool><server_name>todo</server_name>\
//!     <tool_name>add_task</tool_name><arguments>{\"title\":\"milk\"}</arguments>\
//!     </use_mcp_tool>";
//! let parsed = ToolUseParser::default().parse(text).expect("block should parse");
//!
//! assert_eq!(parsed.invocation.server, "todo");
//! assert_eq!(parsed.invocation.tool, "add_task");
//! assert_eq!(parsed.visible_text, "Adding it now.");
//! ```

use serde_json::{Map, Value};

use crate::ToolInvocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMarker {
    UseTool,
    AccessResource,
}

impl ToolMarker {
    pub const ALL: [ToolMarker; 2] = [ToolMarker::UseTool, ToolMarker::AccessResource];

    pub fn tag(self) -> &'static str {
        match self {
            Self::UseTool => "use_mcp_tool",
            Self::AccessResource => "access_mcp_resource",
        }
    }
}

/// A located block and the prose around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBlock<'a> {
    pub marker: ToolMarker,
    /// The block including its start and end markers.
    pub block: &'a str,
    /// Text before and after the block, trimmed.
    pub visible_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolUse {
    pub marker: ToolMarker,
    pub invocation: ToolInvocation,
    pub visible_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUseParser {
    markers: Vec<ToolMarker>,
}

impl Default for ToolUseParser {
    fn default() -> Self {
        Self {
            markers: ToolMarker::ALL.to_vec(),
        }
    }
}

impl ToolUseParser {
    pub fn with_markers(markers: impl IntoIterator<Item = ToolMarker>) -> Self {
        Self {
            markers: markers.into_iter().collect(),
        }
    }

    /// Finds the earliest start marker and its matching end marker.
    pub fn split<'a>(&self, text: &'a str) -> Option<ToolBlock<'a>> {
        let (start, marker) = self
            .markers
            .iter()
            .filter_map(|marker| {
                text.find(&format!("<{}>", marker.tag()))
                    .map(|index| (index, *marker))
            })
            .min_by_key(|(index, _)| *index)?;

        let close = format!("</{}>", marker.tag());
        let end = start + text[start..].find(&close)? + close.len();

        let mut visible_text = String::with_capacity(text.len() - (end - start));
        visible_text.push_str(&text[..start]);
        visible_text.push_str(&text[end..]);

        Some(ToolBlock {
            marker,
            block: &text[start..end],
            visible_text: visible_text.trim().to_string(),
        })
    }

    /// Extracts a complete invocation from the first block, if any.
    pub fn parse(&self, text: &str) -> Option<ParsedToolUse> {
        let block = self.split(text)?;
        let server = tag_content(block.block, "server_name")?.trim();
        let tool = tag_content(block.block, "tool_name")?.trim();
        if server.is_empty() || tool.is_empty() {
            return None;
        }

        let arguments = serde_json::from_str::<Map<String, Value>>(
            tag_content(block.block, "arguments")?.trim(),
        )
        .ok()?;

        Some(ParsedToolUse {
            marker: block.marker,
            invocation: ToolInvocation::new(server, tool, arguments),
            visible_text: block.visible_text,
        })
    }
}

fn tag_content<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let length = text[start..].find(&close)?;
    Some(&text[start..start + length])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn block_is_parsed_and_removed_from_prose() {
        let text = "Let me check.\n\n<use_mcp_tool><server_name>S</server_name><tool_name>T</tool_name><arguments>{\"a\":1}</arguments></use_mcp_tool>\n\nThen I'll answer.";

        let parsed = ToolUseParser::default().parse(text).expect("block should parse");

        assert_eq!(parsed.invocation, ToolInvocation::new("S", "T", args(json!({"a": 1}))));
        assert_eq!(parsed.visible_text, "Let me check.\n\n\n\nThen I'll answer.");
        assert_eq!(parsed.marker, ToolMarker::UseTool);
    }

    #[test]
    fn multiline_fields_are_trimmed() {
        let text = "<use_mcp_tool>\n<server_name>\n  weather \n</server_name>\n<tool_name> forecast </tool_name>\n<arguments>\n{\n  \"city\": \"Oslo\",\n  \"days\": [1, 2]\n}\n</arguments>\n</use_mcp_tool>";

        let parsed = ToolUseParser::default().parse(text).expect("block should parse");

        assert_eq!(parsed.invocation.server, "weather");
        assert_eq!(parsed.invocation.tool, "forecast");
        assert_eq!(
            parsed.invocation.arguments,
            args(json!({"city": "Oslo", "days": [1, 2]}))
        );
        assert_eq!(parsed.visible_text, "");
    }

    #[test]
    fn missing_fields_or_bad_json_mean_no_invocation() {
        let parser = ToolUseParser::default();

        assert!(parser.parse("plain answer").is_none());
        assert!(parser
            .parse("<use_mcp_tool><tool_name>T</tool_name><arguments>{}</arguments></use_mcp_tool>")
            .is_none());
        assert!(parser
            .parse("<use_mcp_tool><server_name>S</server_name><tool_name>T</tool_name></use_mcp_tool>")
            .is_none());
        assert!(parser
            .parse("<use_mcp_tool><server_name>S</server_name><tool_name>T</tool_name><arguments>[1]</arguments></use_mcp_tool>")
            .is_none());
        assert!(parser
            .parse("<use_mcp_tool><server_name>S</server_name><tool_name>T</tool_name><arguments>{}</arguments>")
            .is_none());
    }

    #[test]
    fn only_the_first_marker_in_document_order_is_honored() {
        let text = "<access_mcp_resource><server_name>S</server_name><uri>file:///x</uri></access_mcp_resource> then <use_mcp_tool><server_name>S</server_name><tool_name>T</tool_name><arguments>{}</arguments></use_mcp_tool>";
        let parser = ToolUseParser::default();

        let block = parser.split(text).expect("a block should be found");
        assert_eq!(block.marker, ToolMarker::AccessResource);
        assert!(block.visible_text.starts_with("then <use_mcp_tool>"));
        assert!(parser.parse(text).is_none());

        let tool_only = ToolUseParser::with_markers([ToolMarker::UseTool]);
        assert_eq!(
            tool_only.parse(text).map(|parsed| parsed.invocation.tool),
            Some("T".to_string())
        );
    }
}

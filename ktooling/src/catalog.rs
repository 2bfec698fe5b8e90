//! Per-server inventory of tools and resources, rendered for system prompts.

use crate::{ResourceDescriptor, ResourceTemplateDescriptor, ToolDescriptor};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerCatalog {
    pub server: String,
    pub tools: Vec<ToolDescriptor>,
    pub resource_templates: Vec<ResourceTemplateDescriptor>,
    pub resources: Vec<ResourceDescriptor>,
}

impl ServerCatalog {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }

    /// `## server` followed by whichever subsections are non-empty.
    pub fn render(&self) -> String {
        let mut section = format!("## {}", self.server);

        if !self.tools.is_empty() {
            let tools = self
                .tools
                .iter()
                .map(|tool| {
                    let schema = serde_json::to_string_pretty(&tool.input_schema)
                        .unwrap_or_else(|_| "{}".to_string());
                    format!(
                        "- {}: {}\n    Input Schema:\n    {}",
                        tool.name,
                        tool.description,
                        schema.replace('\n', "\n    ")
                    )
                })
                .collect::<Vec<_>>();
            section.push_str("\n\n### Available Tools\n");
            section.push_str(&tools.join("\n\n"));
        }

        if !self.resource_templates.is_empty() {
            let templates = self
                .resource_templates
                .iter()
                .map(|template| {
                    format!(
                        "- {} ({}): {}",
                        template.uri_template, template.name, template.description
                    )
                })
                .collect::<Vec<_>>();
            section.push_str("\n\n### Resource Templates\n");
            section.push_str(&templates.join("\n"));
        }

        if !self.resources.is_empty() {
            let resources = self
                .resources
                .iter()
                .map(|resource| {
                    format!(
                        "- {} ({}): {}",
                        resource.uri, resource.name, resource.description
                    )
                })
                .collect::<Vec<_>>();
            section.push_str("\n\n### Resources\n");
            section.push_str(&resources.join("\n"));
        }

        section
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCatalog {
    servers: Vec<ServerCatalog>,
}

impl ToolCatalog {
    pub fn new(servers: Vec<ServerCatalog>) -> Self {
        Self { servers }
    }

    pub fn push(&mut self, server: ServerCatalog) {
        self.servers.push(server);
    }

    pub fn servers(&self) -> &[ServerCatalog] {
        &self.servers
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// First server advertising a tool called `tool`.
    pub fn server_for_tool(&self, tool: &str) -> Option<&str> {
        self.servers
            .iter()
            .find(|server| server.tools.iter().any(|descriptor| descriptor.name == tool))
            .map(|server| server.server.as_str())
    }

    pub fn render(&self) -> String {
        self.servers
            .iter()
            .map(ServerCatalog::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

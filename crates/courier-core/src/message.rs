//! Outbound message model.
//!
//! A neutral representation of what the bot sends: plain text, embeds and
//! interactive component rows. The platform client maps it onto its own wire
//! format.

use serde::{Deserialize, Serialize};

/// Visual tone of an embed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Info,
    Success,
    Caution,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// A rich message body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub tone: Tone,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl Embed {
    /// Creates an embed with the given tone and description.
    pub fn new(tone: Tone, description: impl Into<String>) -> Self {
        Self {
            tone,
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn info(description: impl Into<String>) -> Self {
        Self::new(Tone::Info, description)
    }

    pub fn success(description: impl Into<String>) -> Self {
        Self::new(Tone::Success, description)
    }

    pub fn caution(description: impl Into<String>) -> Self {
        Self::new(Tone::Caution, description)
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self::new(Tone::Error, description)
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

// =============================================================================
// Interactive Components
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    #[default]
    Primary,
    Secondary,
    Danger,
}

/// A clickable button identified by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub style: ButtonStyle,
}

impl Button {
    pub fn new(id: impl Into<String>, label: impl Into<String>, style: ButtonStyle) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            style,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

/// A single-choice selection menu identified by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectMenu {
    pub id: String,
    #[serde(default)]
    pub placeholder: String,
    pub options: Vec<SelectOption>,
}

impl SelectMenu {
    pub fn new(id: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            placeholder: placeholder.into(),
            options: Vec::new(),
        }
    }

    pub fn option(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push(SelectOption {
            label: label.into(),
            value: value.into(),
        });
        self
    }
}

/// One row of interactive components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionRow {
    Buttons { buttons: Vec<Button> },
    Select { menu: SelectMenu },
}

// =============================================================================
// OutboundMessage
// =============================================================================

/// A message the bot sends or edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<ActionRow>,
}

impl OutboundMessage {
    /// A plain text message.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A message with a single embed.
    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
            ..Self::default()
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn with_select(mut self, menu: SelectMenu) -> Self {
        self.rows.push(ActionRow::Select { menu });
        self
    }

    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(ActionRow::Buttons { buttons });
        self
    }

    /// Returns the first select menu, if any.
    pub fn select_menu(&self) -> Option<&SelectMenu> {
        self.rows.iter().find_map(|row| match row {
            ActionRow::Select { menu } => Some(menu),
            ActionRow::Buttons { .. } => None,
        })
    }

    /// Returns the first embed description, or the text content.
    pub fn summary(&self) -> &str {
        self.embeds
            .first()
            .map(|e| e.description.as_str())
            .or(self.content.as_deref())
            .unwrap_or_default()
    }
}

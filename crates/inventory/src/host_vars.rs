//! Host-vars codec.
//!
//! A host-vars document is a YAML mapping per alias. Only a handful of keys
//! are owned by the host record; everything else is left untouched:
//!
//! ```text
//! ansible_host: 203.0.113.10
//! ansible_port: 22
//! ansible_user: deploy
//! description: Edge proxy
//! DOMAIN_PRIMARY: example.org
//! color: "#1e90ff"
//! logo:
//!   emoji: "🚀"
//! ```
//!
//! Writes go through [`HostVarsDocument::diff`] so that only fields that
//! actually differ are touched.

use crate::error::{Error, Result};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::sync::LazyLock;

static COLOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap());

const LOGO_KEY: &str = "logo";
const LOGO_EMOJI_KEY: &str = "emoji";

/// Host-record fields mirrored into the host-vars document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostVarsField {
    Host,
    Port,
    User,
    Description,
    PrimaryDomain,
    Color,
    LogoEmoji,
}

impl HostVarsField {
    /// Every mirrored field, in document order.
    pub const ALL: [HostVarsField; 7] = [
        HostVarsField::Host,
        HostVarsField::Port,
        HostVarsField::User,
        HostVarsField::Description,
        HostVarsField::PrimaryDomain,
        HostVarsField::Color,
        HostVarsField::LogoEmoji,
    ];

    /// Top-level key in the document.
    pub fn key(self) -> &'static str {
        match self {
            Self::Host => "ansible_host",
            Self::Port => "ansible_port",
            Self::User => "ansible_user",
            Self::Description => "description",
            Self::PrimaryDomain => "DOMAIN_PRIMARY",
            Self::Color => "color",
            Self::LogoEmoji => LOGO_KEY,
        }
    }
}

impl fmt::Display for HostVarsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogoEmoji => f.write_str("logo.emoji"),
            other => f.write_str(other.key()),
        }
    }
}

/// Typed view of the mirrored fields. `None` means absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostVars {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub description: Option<String>,
    pub primary_domain: Option<String>,
    pub color: Option<String>,
    pub logo_emoji: Option<String>,
}

impl HostVars {
    fn value_of(&self, field: HostVarsField) -> Option<Value> {
        let text = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Value::from)
        };
        match field {
            HostVarsField::Host => text(&self.host),
            HostVarsField::Port => self.port.map(|p| Value::from(u64::from(p))),
            HostVarsField::User => text(&self.user),
            HostVarsField::Description => text(&self.description),
            HostVarsField::PrimaryDomain => text(&self.primary_domain),
            HostVarsField::Color => text(&self.color),
            HostVarsField::LogoEmoji => text(&self.logo_emoji),
        }
    }
}

/// A single field update. `value: None` removes the field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: HostVarsField,
    pub value: Option<Value>,
}

/// Minimal set of field updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostVarsPatch {
    pub changes: Vec<FieldChange>,
}

impl HostVarsPatch {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Fields touched by this patch.
    pub fn fields(&self) -> impl Iterator<Item = HostVarsField> + '_ {
        self.changes.iter().map(|c| c.field)
    }
}

/// A parsed host-vars document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostVarsDocument {
    root: Mapping,
}

impl HostVarsDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document. Blank content is an empty document.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        match serde_yaml::from_str::<Value>(content)? {
            Value::Null => Ok(Self::new()),
            Value::Mapping(root) => Ok(Self { root }),
            _ => Err(Error::Parse {
                document: "host vars",
                message: "root must be a mapping".to_string(),
            }),
        }
    }

    /// Seed a document for a freshly added host.
    pub fn seeded(vars: &HostVars) -> Self {
        let mut doc = Self::new();
        let patch = doc.diff(vars);
        doc.apply(&patch);
        doc
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Read the mirrored fields.
    pub fn fields(&self) -> HostVars {
        HostVars {
            host: self.text(HostVarsField::Host),
            port: self.port(),
            user: self.text(HostVarsField::User),
            description: self.text(HostVarsField::Description),
            primary_domain: self.text(HostVarsField::PrimaryDomain),
            color: self.text(HostVarsField::Color),
            logo_emoji: self.logo_emoji(),
        }
    }

    /// Compute the minimal patch that makes this document match `desired`.
    pub fn diff(&self, desired: &HostVars) -> HostVarsPatch {
        let current = self.fields();
        let changes = HostVarsField::ALL
            .into_iter()
            .filter_map(|field| {
                let want = desired.value_of(field);
                (current.value_of(field) != want).then_some(FieldChange { field, value: want })
            })
            .collect();
        HostVarsPatch { changes }
    }

    /// Apply a patch, leaving every other key alone.
    pub fn apply(&mut self, patch: &HostVarsPatch) {
        for change in &patch.changes {
            match change.field {
                HostVarsField::LogoEmoji => self.set_logo_emoji(change.value.clone()),
                field => match &change.value {
                    Some(value) => {
                        self.root.insert(field.key().into(), value.clone());
                    }
                    None => {
                        self.root.remove(field.key());
                    }
                },
            }
        }
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        if self.root.is_empty() {
            return Ok(String::new());
        }
        Ok(serde_yaml::to_string(&self.root)?)
    }

    /// Raw access for callers that need keys outside the mirrored set.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    fn text(&self, field: HostVarsField) -> Option<String> {
        scalar_text(self.root.get(field.key())?)
    }

    fn port(&self) -> Option<u16> {
        match self.root.get(HostVarsField::Port.key())? {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .filter(|p| *p > 0)
    }

    fn logo_emoji(&self) -> Option<String> {
        let logo = self.root.get(LOGO_KEY)?.as_mapping()?;
        scalar_text(logo.get(LOGO_EMOJI_KEY)?)
    }

    /// Set or clear `logo.emoji`, keeping sibling keys and dropping the
    /// `logo` mapping once it is empty.
    fn set_logo_emoji(&mut self, value: Option<Value>) {
        let mut logo = match self.root.get(LOGO_KEY) {
            Some(Value::Mapping(logo)) => logo.clone(),
            _ => Mapping::new(),
        };
        match value {
            Some(value) => {
                logo.insert(LOGO_EMOJI_KEY.into(), value);
            }
            None => {
                logo.remove(LOGO_EMOJI_KEY);
            }
        }
        if logo.is_empty() {
            self.root.remove(LOGO_KEY);
        } else {
            self.root.insert(LOGO_KEY.into(), Value::Mapping(logo));
        }
    }
}

// =============================================================================
// Field validation
// =============================================================================

/// Require a non-blank value.
pub fn validate_required(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::field(field, "is required"));
    }
    Ok(())
}

/// Ports are 1-65535.
pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(Error::field("port", "must be between 1 and 65535"));
    }
    Ok(())
}

/// Colors are `#RRGGBB`.
pub fn validate_color(color: &str) -> Result<()> {
    if !COLOR_RE.is_match(color.trim()) {
        return Err(Error::field("color", format!("'{color}' is not #RRGGBB")));
    }
    Ok(())
}

/// A logo, when set, must not be blank.
pub fn validate_logo(logo: &str) -> Result<()> {
    validate_required("logo", logo)
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

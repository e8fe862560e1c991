use crate::CoreError;
use std::fmt;
use std::str::FromStr;

/// Report formats the server can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportFormat {
    Json,
    Xml,
    Yaml,
    HtmlZip,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 4] = [
        ReportFormat::Json,
        ReportFormat::Xml,
        ReportFormat::Yaml,
        ReportFormat::HtmlZip,
    ];

    /// Name as used in the report path suffix (`/report.{name}`).
    pub fn name(self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Xml => "xml",
            ReportFormat::Yaml => "yaml",
            ReportFormat::HtmlZip => "html.zip",
        }
    }

    /// File extension for a downloaded report, dot included.
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Json => ".json",
            ReportFormat::Xml => ".xml",
            ReportFormat::Yaml => ".yaml",
            ReportFormat::HtmlZip => ".html.zip",
        }
    }

    /// Exact-name lookup; anything else is not a known format.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Extension for a possibly unknown format name. Falls back to `.json`,
    /// which is what the server renders when no suffix is requested.
    pub fn extension_for(name: Option<&str>) -> &'static str {
        name.and_then(Self::from_name)
            .unwrap_or(ReportFormat::Json)
            .extension()
    }
}

impl FromStr for ReportFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| CoreError::UnknownReportFormat(s.to_string()))
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

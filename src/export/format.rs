use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Png,
    Jpg,
    Gif,
    Mp4,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpg => "jpg",
            ExportFormat::Gif => "gif",
            ExportFormat::Mp4 => "mp4",
            ExportFormat::Pdf => "pdf",
        }
    }

    /// File extension of artifacts in this format.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ExportFormat::Png),
            "jpg" | "jpeg" => Ok(ExportFormat::Jpg),
            "gif" => Ok(ExportFormat::Gif),
            "mp4" => Ok(ExportFormat::Mp4),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// What is being exported, as named in the `/export/{kind}` routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportKind {
    Image,
    Video,
    Gif,
    Pdf,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Image => "image",
            ExportKind::Video => "video",
            ExportKind::Gif => "gif",
            ExportKind::Pdf => "pdf",
        }
    }

    pub fn default_format(&self) -> ExportFormat {
        match self {
            ExportKind::Image => ExportFormat::Png,
            ExportKind::Video => ExportFormat::Mp4,
            ExportKind::Gif => ExportFormat::Gif,
            ExportKind::Pdf => ExportFormat::Pdf,
        }
    }

    pub fn supports(&self, format: ExportFormat) -> bool {
        match self {
            ExportKind::Image => matches!(format, ExportFormat::Png | ExportFormat::Jpg),
            _ => format == self.default_format(),
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(ExportKind::Image),
            "video" => Ok(ExportKind::Video),
            "gif" => Ok(ExportKind::Gif),
            "pdf" => Ok(ExportKind::Pdf),
            other => Err(format!("unknown export kind: {}", other)),
        }
    }
}

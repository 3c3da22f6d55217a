use std::fmt;
use std::str::FromStr;

/// Job categories. Each one maps to its own durable queue; categories never
/// share jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueCategory {
    Email,
    Export,
    Impressions,
    VideoPublish,
}

impl QueueCategory {
    pub const ALL: [QueueCategory; 4] = [
        QueueCategory::Email,
        QueueCategory::Export,
        QueueCategory::Impressions,
        QueueCategory::VideoPublish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueCategory::Email => "email",
            QueueCategory::Export => "export",
            QueueCategory::Impressions => "impressions",
            QueueCategory::VideoPublish => "video_publish",
        }
    }
}

impl fmt::Display for QueueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown queue category: {}", s))
    }
}

//! DatabaseRef codec (spec §3, §6): `<index>[/<suffix>][;<uuid>]`.

/// A parsed Source-supplied database string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRef {
    /// The Index index name. Also the Source-visible db name once the
    /// routing suffix and uuid have been stripped.
    pub index: String,
    /// Source-side routing hint after the first `/`; ignored by the
    /// translator but preserved for logging.
    pub suffix: Option<String>,
    /// The uuid the Source expects this target to currently own, if any.
    pub uuid: Option<String>,
}

impl DatabaseRef {
    /// Single-pass split on the first `/` and first `;`, in that order:
    /// `name[/suffix][;uuid]`. The `;uuid` suffix, if present, is always
    /// the final segment of the whole string.
    pub fn parse(raw: &str) -> Self {
        let (before_uuid, uuid) = match raw.split_once(';') {
            Some((head, tail)) => (head, Some(tail.to_string())),
            None => (raw, None),
        };

        let (index, suffix) = match before_uuid.split_once('/') {
            Some((head, tail)) => (head.to_string(), Some(tail.to_string())),
            None => (before_uuid.to_string(), None),
        };

        Self {
            index,
            suffix,
            uuid,
        }
    }

    /// The database name the Source sees, with the uuid suffix removed.
    pub fn name_without_uuid(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}/{}", self.index, suffix),
            None => self.index.clone(),
        }
    }
}

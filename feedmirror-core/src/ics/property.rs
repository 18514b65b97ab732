//! Property dispatch for VEVENT content lines.

/// Properties the feed parser understands.
///
/// Everything else falls through to `Extension` (for `X-` names, which are
/// preserved) or `Unrecognized` (ignored).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    Uid,
    Summary,
    Description,
    DtStart,
    DtEnd,
    LastModified,
    Location,
    Organizer,
    Status,
    RRule,
    Extension(String),
    Unrecognized,
}

impl Property {
    /// Property names are case-insensitive; extension names are kept upper-cased.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_ascii_uppercase();
        match name.as_str() {
            "UID" => Property::Uid,
            "SUMMARY" => Property::Summary,
            "DESCRIPTION" => Property::Description,
            "DTSTART" => Property::DtStart,
            "DTEND" => Property::DtEnd,
            "LAST-MODIFIED" => Property::LastModified,
            "LOCATION" => Property::Location,
            "ORGANIZER" => Property::Organizer,
            "STATUS" => Property::Status,
            "RRULE" => Property::RRule,
            n if n.starts_with("X-") => Property::Extension(n.to_string()),
            _ => Property::Unrecognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_properties_ignore_case() {
        assert_eq!(Property::from_name("DTSTART"), Property::DtStart);
        assert_eq!(Property::from_name("last-modified"), Property::LastModified);
    }

    #[test]
    fn test_extension_and_unknown_properties() {
        assert_eq!(
            Property::from_name("X-WR-CALNAME"),
            Property::Extension("X-WR-CALNAME".to_string())
        );
        assert_eq!(
            Property::from_name("x-custom"),
            Property::Extension("X-CUSTOM".to_string())
        );
        assert_eq!(Property::from_name("ATTENDEE"), Property::Unrecognized);
    }
}

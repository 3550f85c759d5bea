//! Path: crates/fraud-ingest/src/mode.rs
//! §4.1 step 3: reprocess-mode selection from `?reprocess=` / `X-Reprocess`,
//! with automatic promotion to `Auto` on a repeated batch fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Reprocess,
    Auto,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Reprocess => "reprocess",
            Self::Auto => "auto",
        }
    }
}

/// Parses the raw `reprocess` value per §4.1 step 3: `auto` requests
/// per-item re-classification; `1`/`true`/`yes` forces reprocessing of the
/// whole batch; anything else (including absent) is normal mode.
fn parse_requested(raw: Option<&str>) -> Mode {
    match raw.map(|s| s.to_ascii_lowercase()) {
        Some(ref s) if s == "auto" => Mode::Auto,
        Some(ref s) if matches!(s.as_str(), "1" | "true" | "yes") => Mode::Reprocess,
        _ => Mode::Normal,
    }
}

/// Selects the effective mode: the caller's explicit request, or an
/// automatic promotion to `Auto` when the batch fingerprint was already
/// seen and the caller did not explicitly request reprocessing.
pub fn select_mode(raw: Option<&str>, fingerprint_already_seen: bool) -> Mode {
    let requested = parse_requested(raw);
    if requested == Mode::Normal && fingerprint_already_seen {
        Mode::Auto
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_and_unseen_is_normal() {
        assert_eq!(select_mode(None, false), Mode::Normal);
    }

    #[test]
    fn repeated_fingerprint_without_explicit_request_promotes_to_auto() {
        assert_eq!(select_mode(None, true), Mode::Auto);
    }

    #[test]
    fn explicit_reprocess_values_are_not_overridden_by_fingerprint_state() {
        assert_eq!(select_mode(Some("1"), false), Mode::Reprocess);
        assert_eq!(select_mode(Some("true"), true), Mode::Reprocess);
        assert_eq!(select_mode(Some("auto"), false), Mode::Auto);
    }
}

//! Stylesheet for terminal output.

use owo_colors::Style;

/// Colors per output role. `Default` is the plain (uncolored) sheet.
#[derive(Default, Clone)]
pub struct Styles {
    /// Completed steps, healthy channels, cached images.
    pub ok: Style,
    /// Recoverable problems: failed undo steps, restarted channels.
    pub caution: Style,
    /// Fatal errors.
    pub failure: Style,
    /// Progress markers.
    pub step: Style,
    /// Secondary text: labels, missing images.
    pub muted: Style,
    /// Section titles.
    pub title: Style,
    /// File paths and commands the user may copy.
    pub literal: Style,
}

impl Styles {
    /// The colored sheet when `enabled`, the plain one otherwise.
    #[must_use]
    pub fn for_terminal(enabled: bool) -> Self {
        if !enabled {
            return Self::default();
        }
        Self {
            ok: Style::new().green(),
            caution: Style::new().yellow(),
            failure: Style::new().red().bold(),
            step: Style::new().blue(),
            muted: Style::new().dimmed(),
            title: Style::new().bold().cyan(),
            literal: Style::new().bold(),
        }
    }
}

//! Built-in color themes, cycled with `t` and persisted by slug.

use ratatui::style::{Color, Modifier, Style};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,
    pub slug: &'static str,
    /// Primary text, station names.
    pub fg: Color,
    /// Labels, active items, focused borders.
    pub accent: Color,
    /// Header background, panel borders.
    pub secondary: Color,
    /// Background and the text of highlighted items.
    pub bg: Color,
    pub success: Color,
    /// Hints and metadata.
    pub muted: Color,
    pub error: Color,
}

pub const THEMES: &[Theme] = &[
    Theme {
        name: "Vintage",
        slug: "vintage",
        fg: Color::Rgb(245, 230, 200),
        accent: Color::Rgb(217, 164, 65),
        secondary: Color::Rgb(110, 74, 47),
        bg: Color::Rgb(43, 26, 18),
        success: Color::Rgb(106, 143, 78),
        muted: Color::Rgb(184, 156, 122),
        error: Color::Rgb(242, 159, 142),
    },
    Theme {
        name: "Tokyo Night",
        slug: "tokyo-night",
        fg: Color::Rgb(192, 202, 245),
        accent: Color::Rgb(122, 162, 247),
        secondary: Color::Rgb(36, 40, 59),
        bg: Color::Rgb(26, 27, 38),
        success: Color::Rgb(158, 206, 106),
        muted: Color::Rgb(86, 95, 137),
        error: Color::Rgb(247, 118, 142),
    },
    Theme {
        name: "Nord",
        slug: "nord",
        fg: Color::Rgb(236, 239, 244),
        accent: Color::Rgb(136, 192, 208),
        secondary: Color::Rgb(59, 66, 82),
        bg: Color::Rgb(46, 52, 64),
        success: Color::Rgb(163, 190, 140),
        muted: Color::Rgb(76, 86, 106),
        error: Color::Rgb(191, 97, 106),
    },
    Theme {
        name: "Catppuccin Mocha",
        slug: "catppuccin-mocha",
        fg: Color::Rgb(205, 214, 244),
        accent: Color::Rgb(203, 166, 247),
        secondary: Color::Rgb(49, 50, 68),
        bg: Color::Rgb(30, 30, 46),
        success: Color::Rgb(166, 227, 161),
        muted: Color::Rgb(108, 112, 134),
        error: Color::Rgb(243, 139, 168),
    },
    Theme {
        name: "Gruvbox Dark",
        slug: "gruvbox-dark",
        fg: Color::Rgb(235, 219, 178),
        accent: Color::Rgb(250, 189, 47),
        secondary: Color::Rgb(60, 56, 54),
        bg: Color::Rgb(40, 40, 40),
        success: Color::Rgb(184, 187, 38),
        muted: Color::Rgb(146, 131, 116),
        error: Color::Rgb(251, 73, 52),
    },
    Theme {
        name: "Dracula",
        slug: "dracula",
        fg: Color::Rgb(248, 248, 242),
        accent: Color::Rgb(189, 147, 249),
        secondary: Color::Rgb(68, 71, 90),
        bg: Color::Rgb(40, 42, 54),
        success: Color::Rgb(80, 250, 123),
        muted: Color::Rgb(98, 114, 164),
        error: Color::Rgb(255, 85, 85),
    },
    Theme {
        name: "Solarized Dark",
        slug: "solarized-dark",
        fg: Color::Rgb(131, 148, 150),
        accent: Color::Rgb(181, 137, 0),
        secondary: Color::Rgb(7, 54, 66),
        bg: Color::Rgb(0, 43, 54),
        success: Color::Rgb(133, 153, 0),
        muted: Color::Rgb(88, 110, 117),
        error: Color::Rgb(220, 50, 47),
    },
    Theme {
        name: "One Dark",
        slug: "one-dark",
        fg: Color::Rgb(171, 178, 191),
        accent: Color::Rgb(97, 175, 239),
        secondary: Color::Rgb(62, 68, 82),
        bg: Color::Rgb(40, 44, 52),
        success: Color::Rgb(152, 195, 121),
        muted: Color::Rgb(92, 99, 112),
        error: Color::Rgb(224, 108, 117),
    },
    Theme {
        name: "Rose Pine",
        slug: "rose-pine",
        fg: Color::Rgb(224, 222, 244),
        accent: Color::Rgb(196, 167, 231),
        secondary: Color::Rgb(38, 35, 58),
        bg: Color::Rgb(25, 23, 36),
        success: Color::Rgb(156, 207, 216),
        muted: Color::Rgb(110, 106, 134),
        error: Color::Rgb(235, 111, 146),
    },
    Theme {
        name: "Kanagawa",
        slug: "kanagawa",
        fg: Color::Rgb(220, 215, 186),
        accent: Color::Rgb(126, 156, 216),
        secondary: Color::Rgb(42, 42, 55),
        bg: Color::Rgb(31, 31, 40),
        success: Color::Rgb(152, 187, 108),
        muted: Color::Rgb(114, 113, 105),
        error: Color::Rgb(232, 36, 36),
    },
    Theme {
        name: "Everforest",
        slug: "everforest",
        fg: Color::Rgb(211, 198, 170),
        accent: Color::Rgb(167, 192, 128),
        secondary: Color::Rgb(55, 65, 69),
        bg: Color::Rgb(45, 53, 59),
        success: Color::Rgb(131, 192, 146),
        muted: Color::Rgb(133, 146, 137),
        error: Color::Rgb(230, 126, 128),
    },
];

/// Look a theme up by its config slug, falling back to the first entry.
pub fn by_slug(slug: &str) -> Theme {
    THEMES
        .iter()
        .find(|t| t.slug == slug)
        .copied()
        .unwrap_or(THEMES[0])
}

impl Theme {
    pub fn style_default(&self) -> Style {
        Style::default().fg(self.fg).bg(self.bg)
    }

    pub fn style_header(&self) -> Style {
        Style::default()
            .fg(self.fg)
            .bg(self.secondary)
            .add_modifier(Modifier::BOLD)
    }

    pub fn style_accent(&self) -> Style {
        Style::default().fg(self.accent)
    }

    pub fn style_selected(&self) -> Style {
        Style::default()
            .fg(self.bg)
            .bg(self.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn style_playing(&self) -> Style {
        Style::default().fg(self.success).add_modifier(Modifier::BOLD)
    }

    pub fn style_muted(&self) -> Style {
        Style::default().fg(self.muted)
    }

    pub fn style_error(&self) -> Style {
        Style::default().fg(self.error).add_modifier(Modifier::BOLD)
    }

    pub fn style_border_focused(&self) -> Style {
        Style::default().fg(self.accent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_unique() {
        let mut slugs: Vec<_> = THEMES.iter().map(|t| t.slug).collect();
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), THEMES.len());
    }

    #[test]
    fn unknown_slug_falls_back_to_first_theme() {
        assert_eq!(by_slug("no-such-theme").slug, THEMES[0].slug);
        assert_eq!(by_slug("").slug, "vintage");
    }

    #[test]
    fn lookup_round_trips_every_slug() {
        for t in THEMES {
            assert_eq!(by_slug(t.slug).name, t.name);
        }
    }
}

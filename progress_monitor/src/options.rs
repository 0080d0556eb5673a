//! Display knobs shared with interactive renderers.  The non-interactive writer accepts
//! them and ignores them.

/// Ordering of tracker rows on screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    None,
    Message,
    MessageDsc,
    Percent,
    PercentDsc,
    Value,
    ValueDsc,
}

/// Side of the row on which the bar is drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrackerPosition {
    #[default]
    Right,
    Left,
}

/// Characters and toggles used to draw a bar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Style {
    pub name: String,
    pub bar_finished: char,
    pub bar_unfinished: char,
    pub show_speed: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            bar_finished: '#',
            bar_unfinished: '.',
            show_speed: true,
        }
    }
}

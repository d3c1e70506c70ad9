//! Color utilities for CLI output
//!
//! Keeps host states colored the same way in tables and status lines.

use comfy_table::Color;
use console::{Style, StyledObject};
use dockhand_core::State;

/// Style a host state for terminal output
///
/// - Running -> green bold
/// - Stopped -> red
/// - Starting, Degraded -> yellow
/// - Error -> red bold
/// - None -> dim
pub fn state_style(state: State) -> StyledObject<String> {
    let style = match state {
        State::Running => Style::new().green().bold(),
        State::Stopped => Style::new().red(),
        State::Starting | State::Degraded => Style::new().yellow(),
        State::Error => Style::new().red().bold(),
        State::None => Style::new().dim(),
    };
    style.apply_to(state.to_string())
}

/// Table cell color for a host state
pub fn state_color(state: State) -> Color {
    match state {
        State::Running => Color::Green,
        State::Stopped | State::Error => Color::Red,
        State::Starting | State::Degraded => Color::Yellow,
        State::None => Color::Reset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // StyledObject::to_string() includes ANSI escapes when colors are on,
    // so these check the text content only.

    #[test]
    fn state_style_keeps_state_name() {
        for state in [State::Running, State::Stopped, State::Degraded, State::Error] {
            assert!(state_style(state).to_string().contains(&state.to_string()));
        }
    }

    #[test]
    fn state_style_none_is_empty_text() {
        console::set_colors_enabled(false);
        assert_eq!(state_style(State::None).to_string(), "");
    }

    #[test]
    fn degraded_fleet_is_yellow() {
        assert_eq!(state_color(State::Degraded), Color::Yellow);
        assert_eq!(state_color(State::Running), Color::Green);
        assert_eq!(state_color(State::Error), Color::Red);
    }
}

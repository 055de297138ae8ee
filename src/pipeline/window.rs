use crate::config::types::BatchConfig;
use crate::line::Line;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Open,
    Closed,
}

/// Result of trying to close a window.
#[derive(Debug)]
pub enum Closed {
    /// This call performed the close and the window held lines
    Contents(WindowContents),
    /// This call performed the close but nothing had arrived
    Empty,
    /// Another trigger already closed the window
    AlreadyClosed,
}

#[derive(Debug)]
pub struct WindowContents {
    pub payload: String,
    pub line_count: usize,
    pub opened_at: Instant,
    pub closed_at: Instant,
}

/// Accumulates lines between two window boundaries.
///
/// A window never holds more than `max_lines` lines, and once closed it
/// accepts nothing further.
#[derive(Debug)]
pub struct Window {
    state: WindowState,
    opened_at: Instant,
    deadline: Option<Instant>,
    max_lines: usize,
    line_count: usize,
    payload: String,
}

impl Window {
    /// Open a window now; its timer (if any) is armed from this instant.
    pub fn open(config: &BatchConfig) -> Self {
        let opened_at = Instant::now();
        Self {
            state: WindowState::Open,
            opened_at,
            deadline: config.max_time.and_then(|t| opened_at.checked_add(t)),
            max_lines: config.max_lines.max(1),
            line_count: 0,
            payload: String::new(),
        }
    }

    /// Append a line.
    ///
    /// `Ok(true)` means the window just became full and must be closed.
    /// A closed window hands the line back.
    pub fn push(&mut self, line: Line) -> Result<bool, Line> {
        if self.state == WindowState::Closed {
            return Err(line);
        }

        if self.line_count > 0 {
            self.payload.push('\n');
        }
        self.payload.push_str(line.as_str());
        self.line_count += 1;

        Ok(self.line_count >= self.max_lines)
    }

    /// Transition `Open -> Closed`. Only the first call observes the contents.
    pub fn close(&mut self) -> Closed {
        if self.state == WindowState::Closed {
            return Closed::AlreadyClosed;
        }
        self.state = WindowState::Closed;

        if self.line_count == 0 {
            return Closed::Empty;
        }

        Closed::Contents(WindowContents {
            payload: std::mem::take(&mut self.payload),
            line_count: self.line_count,
            opened_at: self.opened_at,
            closed_at: Instant::now(),
        })
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn is_empty(&self) -> bool {
        self.line_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(max_lines: usize, max_time: Option<Duration>) -> BatchConfig {
        BatchConfig {
            max_lines,
            max_time,
        }
    }

    #[test]
    fn test_push_until_full() {
        let mut window = Window::open(&config(3, None));
        assert_eq!(window.push(Line::from("a v=1i")), Ok(false));
        assert_eq!(window.push(Line::from("b v=2i")), Ok(false));
        assert_eq!(window.push(Line::from("c v=3i")), Ok(true));
        assert_eq!(window.line_count(), 3);

        match window.close() {
            Closed::Contents(contents) => {
                assert_eq!(contents.payload, "a v=1i\nb v=2i\nc v=3i");
                assert_eq!(contents.line_count, 3);
            }
            other => panic!("expected contents, got {:?}", other),
        }
    }

    #[test]
    fn test_close_is_monotonic() {
        let mut window = Window::open(&config(10, None));
        window.push(Line::from("a v=1i")).unwrap();

        assert!(matches!(window.close(), Closed::Contents(_)));
        assert!(matches!(window.close(), Closed::AlreadyClosed));
        assert_eq!(window.state(), WindowState::Closed);

        // A closed window hands lines back
        let rejected = window.push(Line::from("late v=1i")).unwrap_err();
        assert_eq!(rejected.as_str(), "late v=1i");
    }

    #[test]
    fn test_empty_window_closes_empty() {
        let mut window = Window::open(&config(10, Some(Duration::from_millis(5))));
        assert!(window.is_empty());
        assert!(matches!(window.close(), Closed::Empty));
        assert!(matches!(window.close(), Closed::AlreadyClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_armed_at_open() {
        let before = Instant::now();
        let window = Window::open(&config(10, Some(Duration::from_millis(100))));
        assert_eq!(window.deadline(), Some(before + Duration::from_millis(100)));

        let unbounded = Window::open(&config(10, None));
        assert_eq!(unbounded.deadline(), None);
    }
}

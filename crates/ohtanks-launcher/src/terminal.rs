use std::io::{self, Write};

use ohtanks_core::StatusEvent;

const PROGRESS_PREFIXES: [&str; 2] = ["Downloading:", "Extracting files:"];

/// Renders status events as terminal lines.
///
/// Consecutive progress lines overwrite each other in place; every other
/// message starts a new line.
pub struct StatusView<W: Write> {
    out: W,
    progress_open: bool,
    close_requested: bool,
}

impl<W: Write> StatusView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            progress_open: false,
            close_requested: false,
        }
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn render(&mut self, event: &StatusEvent) -> io::Result<()> {
        match event {
            StatusEvent::Message(message) if is_progress(message) => {
                write!(self.out, "\r{message}\x1b[K")?;
                self.progress_open = true;
            }
            StatusEvent::Message(message) => {
                self.end_progress()?;
                writeln!(self.out, "{message}")?;
            }
            StatusEvent::CloseRequested => {
                self.end_progress()?;
                self.close_requested = true;
            }
        }
        self.out.flush()
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.end_progress()?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn end_progress(&mut self) -> io::Result<()> {
        if self.progress_open {
            self.progress_open = false;
            writeln!(self.out)?;
        }
        Ok(())
    }
}

fn is_progress(message: &str) -> bool {
    PROGRESS_PREFIXES
        .iter()
        .any(|prefix| message.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use ohtanks_core::StatusEvent;

    use super::StatusView;

    fn message(text: &str) -> StatusEvent {
        StatusEvent::Message(text.to_string())
    }

    #[test]
    fn progress_lines_are_rewritten_in_place() {
        let mut view = StatusView::new(Vec::new());
        for event in [
            message("Downloading version 2.0.0..."),
            message("Downloading: 50% (1.0 MB / 2.0 MB)"),
            message("Downloading: 100% (2.0 MB / 2.0 MB)"),
            message("Version 2.0.0 downloaded successfully!"),
        ] {
            view.render(&event).expect("render should succeed");
        }

        let output = String::from_utf8(view.finish().expect("finish should succeed"))
            .expect("output should be utf-8");
        assert_eq!(
            output,
            "Downloading version 2.0.0...\n\
             \rDownloading: 50% (1.0 MB / 2.0 MB)\x1b[K\
             \rDownloading: 100% (2.0 MB / 2.0 MB)\x1b[K\n\
             Version 2.0.0 downloaded successfully!\n"
        );
    }

    #[test]
    fn close_request_is_tracked_and_ends_open_progress() {
        let mut view = StatusView::new(Vec::new());
        view.render(&message("Extracting files: 100% (3/3)"))
            .expect("render should succeed");
        assert!(!view.close_requested());

        view.render(&StatusEvent::CloseRequested)
            .expect("render should succeed");
        assert!(view.close_requested());

        let output = view.finish().expect("finish should succeed");
        assert!(output.ends_with(b"\x1b[K\n"));
    }
}

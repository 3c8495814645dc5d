use crate::cli::preview::{move_to_top, AsciiRenderer};
use crate::core::processor::FrameReport;
use crate::pipeline::ProgressObserver;
use image::RgbImage;
use std::io::{self, Write};
use std::time::{Duration, Instant};

const BAR_WIDTH: usize = 30;
const PREVIEW_INTERVAL: Duration = Duration::from_millis(100);

pub fn progress_bar(percent: u8, width: usize) -> String {
    let filled = (percent.min(100) as usize * width) / 100;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}

/// Terminal front-end for a video job: a single updating progress line, or a
/// full-screen ASCII preview when a renderer is given.
pub struct ConsoleObserver {
    preview: Option<AsciiRenderer>,
    last_render: Option<Instant>,
    status: String,
    last_log: String,
    line_open: bool,
    /// Messages raised while the preview owns the screen, printed afterwards.
    deferred: Vec<String>,
}

impl ConsoleObserver {
    pub fn new(preview: Option<AsciiRenderer>) -> Self {
        Self {
            preview,
            last_render: None,
            status: String::new(),
            last_log: String::new(),
            line_open: false,
            deferred: Vec::new(),
        }
    }

    pub fn take_deferred(&mut self) -> Vec<String> {
        std::mem::take(&mut self.deferred)
    }

    fn close_line(&mut self) {
        if self.line_open {
            println!();
            self.line_open = false;
        }
    }
}

impl ProgressObserver for ConsoleObserver {
    fn on_progress(&mut self, percent: Option<u8>, status: &str) {
        self.status = match percent {
            Some(p) => format!("{} {:>3}% {}", progress_bar(p, BAR_WIDTH), p, status),
            None => status.to_string(),
        };

        if self.preview.is_none() {
            print!("\r{}", self.status);
            io::stdout().flush().ok();
            self.line_open = true;
        }
    }

    fn on_log(&mut self, message: &str) {
        tracing::debug!("{}", message);
        if self.preview.is_some() {
            self.last_log = message.to_string();
            self.deferred.push(message.to_string());
        } else {
            self.close_line();
            println!("{}", message);
        }
    }

    fn on_frame(&mut self, frame: &RgbImage, report: &FrameReport) {
        let Some(renderer) = &self.preview else {
            return;
        };
        if self.last_render.is_some_and(|t| t.elapsed() < PREVIEW_INTERVAL) {
            return;
        }
        self.last_render = Some(Instant::now());

        let mut output = renderer.render_frame(frame, &report.faces);
        output.push_str(&format!(
            "\r\nFaces: {} | Blurred: {} | Whitelisted: {}\x1b[K",
            report.stats.detected, report.stats.blurred, report.stats.whitelisted
        ));
        output.push_str(&format!("\r\n{}\x1b[K", self.status));
        output.push_str(&format!("\r\n[p] pause/resume  [q] stop  {}\x1b[K", self.last_log));

        move_to_top().ok();
        print!("{}", output);
        io::stdout().flush().ok();
    }
}

impl Drop for ConsoleObserver {
    fn drop(&mut self) {
        self.close_line();
    }
}

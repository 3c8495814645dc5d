use crate::core::detector::FaceBox;
use crate::core::processor::FaceDecision;
use crate::pipeline::JobControl;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{self, ClearType},
};
use image::RgbImage;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ASCII_RAMP: &str = " .·:;+=xX#@";
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;
const KEY_POLL: Duration = Duration::from_millis(100);

/// Corner and edge glyphs for one box style.
struct BoxStyle {
    top_left: char,
    top_right: char,
    bottom_left: char,
    bottom_right: char,
    horizontal: char,
    vertical: char,
}

const BLURRED_STYLE: BoxStyle = BoxStyle {
    top_left: '┌',
    top_right: '┐',
    bottom_left: '└',
    bottom_right: '┘',
    horizontal: '─',
    vertical: '│',
};

const WHITELISTED_STYLE: BoxStyle = BoxStyle {
    top_left: '╔',
    top_right: '╗',
    bottom_left: '╚',
    bottom_right: '╝',
    horizontal: '═',
    vertical: '║',
};

pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        // Leave room below the picture for the status lines
        Self {
            width: width.unwrap_or(term_width.min(DEFAULT_WIDTH)).max(1),
            height: height.unwrap_or(term_height.saturating_sub(4).min(DEFAULT_HEIGHT)).max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Renders a processed frame. Blurred faces get a single-line box,
    /// whitelisted faces a double-line box.
    pub fn render_frame(&self, frame: &RgbImage, decisions: &[FaceDecision]) -> String {
        let mut grid = self.image_to_ascii(frame);
        for decision in decisions {
            let style = if decision.is_blurred() { &BLURRED_STYLE } else { &WHITELISTED_STYLE };
            self.draw_face_box(&mut grid, &decision.face, frame.dimensions(), style);
        }
        self.grid_to_string(&grid)
    }

    /// Renders raw detections, all in the single-line style.
    pub fn render_detections(&self, image: &RgbImage, faces: &[FaceBox]) -> String {
        let mut grid = self.image_to_ascii(image);
        for face in faces {
            self.draw_face_box(&mut grid, face, image.dimensions(), &BLURRED_STYLE);
        }
        self.grid_to_string(&grid)
    }

    fn image_to_ascii(&self, image: &RgbImage) -> Vec<Vec<char>> {
        let ramp: Vec<char> = ASCII_RAMP.chars().collect();
        let mut grid = vec![vec![' '; self.width]; self.height];
        let (img_width, img_height) = image.dimensions();
        if img_width == 0 || img_height == 0 {
            return grid;
        }

        for (term_y, row) in grid.iter_mut().enumerate() {
            let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;
            for (term_x, cell) in row.iter_mut().enumerate() {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                if img_x < img_width && img_y < img_height {
                    let p = image.get_pixel(img_x, img_y);
                    let luma = (299 * p[0] as usize + 587 * p[1] as usize + 114 * p[2] as usize) / 1000;
                    *cell = ramp[(luma.min(255) * (ramp.len() - 1)) / 255];
                }
            }
        }

        grid
    }

    fn draw_face_box(&self, grid: &mut [Vec<char>], face: &FaceBox, (img_w, img_h): (u32, u32), style: &BoxStyle) {
        if img_w == 0 || img_h == 0 {
            return;
        }

        let to_col = |x: f32| ((x.max(0.0) / img_w as f32) * self.width as f32) as usize;
        let to_row = |y: f32| ((y.max(0.0) / img_h as f32) * self.height as f32) as usize;

        let x1 = to_col(face.x1).min(self.width - 1);
        let x2 = to_col(face.x2).saturating_sub(1).clamp(x1, self.width - 1);
        let y1 = to_row(face.y1).min(self.height - 1);
        let y2 = to_row(face.y2).saturating_sub(1).clamp(y1, self.height - 1);

        for x in x1..=x2 {
            grid[y1][x] = style.horizontal;
            grid[y2][x] = style.horizontal;
        }
        for row in grid.iter_mut().take(y2 + 1).skip(y1) {
            row[x1] = style.vertical;
            row[x2] = style.vertical;
        }

        grid[y1][x1] = style.top_left;
        grid[y1][x2] = style.top_right;
        grid[y2][x1] = style.bottom_left;
        grid[y2][x2] = style.bottom_right;
    }

    fn grid_to_string(&self, grid: &[Vec<char>]) -> String {
        grid.iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

pub fn clear_screen() -> io::Result<()> {
    crossterm::execute!(io::stdout(), terminal::Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    io::stdout().flush()
}

pub fn move_to_top() -> io::Result<()> {
    crossterm::execute!(io::stdout(), cursor::MoveTo(0, 0))
}

/// Keyboard commands understood while a job is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    TogglePause,
    Stop,
}

pub fn key_action(key: &KeyEvent) -> Option<KeyAction> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Char('p') | KeyCode::Char('P') | KeyCode::Char(' ') => Some(KeyAction::TogglePause),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(KeyAction::Stop),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(KeyAction::Stop),
        _ => None,
    }
}

/// Raw mode with a hidden cursor for the lifetime of the guard.
pub struct PreviewTerminal;

impl PreviewTerminal {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), cursor::Hide)?;
        clear_screen()?;
        Ok(Self)
    }
}

impl Drop for PreviewTerminal {
    fn drop(&mut self) {
        crossterm::execute!(io::stdout(), cursor::Show).ok();
        terminal::disable_raw_mode().ok();
        println!();
    }
}

/// Polls the keyboard on a background thread and drives `control` until
/// `done` is set.
pub fn spawn_key_listener(control: JobControl, done: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        while !done.load(Ordering::SeqCst) && !control.is_stopped() {
            let key = match event::poll(KEY_POLL) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) => key,
                    Ok(_) => continue,
                    Err(_) => break,
                },
                Ok(false) => continue,
                Err(_) => break,
            };

            match key_action(&key) {
                Some(KeyAction::TogglePause) => {
                    let paused = control.toggle_pause();
                    tracing::debug!("Paused: {}", paused);
                }
                Some(KeyAction::Stop) => control.stop(),
                None => {}
            }
        }
    })
}

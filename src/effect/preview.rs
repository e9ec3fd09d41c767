//! Terminal preview for strip effects using crossterm.
//!
//! Draws the strip as rows of true-color cells in an alternate screen,
//! wrapped to the terminal width. Frames come from the same generator and
//! filter chain the server streams, power-limited when a limit is given.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::{
    cursor, event,
    style::{self, Color, Stylize},
    terminal, ExecutableCommand, QueueableCommand,
};

use super::ActiveLightEffect;
use crate::color::RgbColor;
use crate::power;

/// Width of each pixel cell in characters.
const CELL_W: u16 = 2;
/// Background color.
const BG: Color = Color::Rgb {
    r: 20,
    g: 20,
    b: 20,
};

/// Options for a preview session.
#[derive(Debug, Clone, Copy)]
pub struct PreviewOptions {
    pub length: usize,
    pub fps: u32,
    pub power_limit_ma: Option<u32>,
}

/// Run the terminal preview. Blocks until q/Esc is pressed.
pub fn run(effect: &mut ActiveLightEffect, opts: PreviewOptions) -> anyhow::Result<()> {
    let fps = opts.fps.clamp(1, 60);
    let frame_dur = Duration::from_secs_f64(1.0 / fps as f64);

    let mut stdout = io::stdout();
    terminal::enable_raw_mode()?;
    stdout
        .execute(terminal::EnterAlternateScreen)?
        .execute(cursor::Hide)?;

    let result = run_loop(&mut stdout, effect, opts, frame_dur);

    stdout
        .execute(cursor::Show)?
        .execute(terminal::LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;

    result
}

fn run_loop(
    stdout: &mut io::Stdout,
    effect: &mut ActiveLightEffect,
    opts: PreviewOptions,
    frame_dur: Duration,
) -> anyhow::Result<()> {
    let start = Instant::now();

    loop {
        if event::poll(Duration::ZERO)? {
            if let event::Event::Key(key) = event::read()? {
                match key.code {
                    event::KeyCode::Char('q') | event::KeyCode::Esc => break,
                    event::KeyCode::Char('c')
                        if key.modifiers.contains(event::KeyModifiers::CONTROL) =>
                    {
                        break
                    }
                    _ => {}
                }
            }
        }

        let mut pixels = effect.render(opts.length);
        let draw_ma = power::estimate_draw_ma(&pixels);
        let mut scale = None;
        if let Some(limit) = opts.power_limit_ma {
            scale = power::limit_scale(draw_ma, limit);
            if let Some(s) = scale {
                pixels = pixels.into_iter().map(|p| p.scale(s)).collect();
            }
        }

        let (cols, _) = terminal::size().unwrap_or((80, 24));
        let per_row = ((cols / CELL_W).max(1)) as usize;

        stdout.queue(cursor::MoveTo(0, 0))?;
        stdout.queue(style::PrintStyledContent(
            format!(
                " {} ({})  |  {:6.0}ms  |  iter {}  |  q/Esc to quit ",
                effect.name,
                effect.generator.name(),
                start.elapsed().as_secs_f64() * 1000.0,
                effect.generator.iterations(),
            )
            .with(Color::White)
            .on(Color::DarkGrey),
        ))?;

        let rows = draw_strip(stdout, &pixels, per_row)?;

        stdout.queue(cursor::MoveTo(0, rows + 3))?;
        let power_line = match scale {
            Some(s) => format!(" {:7.0} mA, limited x{:.2} ", draw_ma, s),
            None => format!(" {:7.0} mA ", draw_ma),
        };
        stdout.queue(style::PrintStyledContent(
            power_line.with(Color::White).on(Color::DarkGrey),
        ))?;

        stdout.flush()?;
        std::thread::sleep(frame_dur);
    }

    Ok(())
}

/// Draw pixels starting at row 2. Returns the number of rows used.
fn draw_strip(stdout: &mut io::Stdout, pixels: &[RgbColor], per_row: usize) -> io::Result<u16> {
    let mut rows = 0u16;
    for (row, chunk) in pixels.chunks(per_row).enumerate() {
        stdout.queue(cursor::MoveTo(0, row as u16 + 2))?;
        for p in chunk {
            let bg = if p.channel_sum() == 0 {
                BG
            } else {
                Color::Rgb {
                    r: p.r,
                    g: p.g,
                    b: p.b,
                }
            };
            stdout.queue(style::PrintStyledContent(
                " ".repeat(CELL_W as usize).on(bg),
            ))?;
        }
        rows = row as u16 + 1;
    }
    Ok(rows)
}

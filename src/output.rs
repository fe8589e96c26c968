//! Terminal rendering of progress messages and summaries.

use crate::audio::WavFormat;
use crate::generation::BatchSummary;
use crate::progress::{MessageKind, ProgressMessage};
use owo_colors::OwoColorize;

const BAR_WIDTH: usize = 20;

/// `[#####---------------]` for a 0-100 percentage.
pub fn progress_bar(percentage: u8) -> String {
    let filled = usize::from(percentage.min(100)) * BAR_WIDTH / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

/// One line for a progress message; errors in red, completion in green.
pub fn render_progress(message: &ProgressMessage, color: bool) -> String {
    let text = format!(
        "{} {:>3}% {}: {}",
        progress_bar(message.percentage),
        message.percentage,
        message.chapter_id,
        message.message
    );
    if !color {
        return text;
    }

    if message.kind == MessageKind::Log {
        text.dimmed().to_string()
    } else if message.message.starts_with("Error") {
        text.red().to_string()
    } else if message.percentage == 100 {
        text.green().to_string()
    } else {
        text
    }
}

/// Summary line of a whole-book run.
pub fn render_summary(summary: &BatchSummary, color: bool) -> String {
    let text = summary.to_string();
    match (color, summary.failed.is_empty() && !summary.cancelled) {
        (false, _) => text,
        (true, true) => text.green().to_string(),
        (true, false) => text.yellow().to_string(),
    }
}

/// Human-readable description of a WAV header.
pub fn describe_format(format: &WavFormat) -> String {
    let spec = format.spec();
    let block = u64::from(spec.block_align().max(1));
    let frames = u64::from(format.data_size) / block;
    let seconds = if spec.sample_rate == 0 {
        0.0
    } else {
        frames as f64 / f64::from(spec.sample_rate)
    };
    format!(
        "format tag {}, {spec}\n{} data bytes at offset {}, {frames} frames, {seconds:.3} s",
        format.audio_format, format.data_size, format.data_offset
    )
}

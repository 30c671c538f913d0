// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The scan loop: plays `[start, limit)` of the sample over and over.

/// Frame the scan starts at for a start control value.
pub(super) fn start_frame(start: f32, frames: usize) -> usize {
    let frame = (start.clamp(0.0, 1.0) * frames as f32).round() as usize;
    frame.min(frames)
}

/// The part of the sample being looped, recomputed from the controls every
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ScanRange {
    pub start: usize,
    pub limit: usize,
}

impl ScanRange {
    pub fn new(frames: usize, start: f32, step: f32, step_scale: f32) -> ScanRange {
        let start = start_frame(start, frames);
        // Negative and NaN steps are an empty range; `as` saturates the rest.
        let span = (step.max(0.0) * step_scale).round() as usize;
        ScanRange {
            start,
            limit: frames.min(start.saturating_add(span)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.limit <= self.start
    }
}

/// Copies the scan range into `out` starting at `position`, wrapping back to
/// `range.start` each time `range.limit` is reached, until `out` is full.
///
/// Leaves `out` untouched when the range is empty. Returns the number of
/// frames written.
pub(super) fn render(
    data: &[f32],
    range: ScanRange,
    position: &mut usize,
    gain: f32,
    out: &mut [f32],
) -> usize {
    if range.is_empty() {
        return 0;
    }

    let mut written = 0;
    while written < out.len() {
        if *position >= range.limit {
            *position = range.start;
        }

        let count = (range.limit - *position).min(out.len() - written);
        let source = &data[*position..*position + count];
        for (dst, src) in out[written..written + count].iter_mut().zip(source) {
            *dst = src * gain;
        }
        written += count;
        *position += count;

        if *position == range.limit {
            *position = range.start;
        }
    }
    written
}

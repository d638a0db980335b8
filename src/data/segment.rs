use std::{ops::Range, sync::Arc};

use rand::Rng;

use crate::{
    data::{domain::Candle, timeframe::TimeframeProfile},
    error::{ChartplayResult, DataError},
};

/// A contiguous window of the full series, split into warm-up, visible and future bars.
///
/// The segment never copies candles. It holds the shared series and a set of
/// offsets; revealing a bar just moves the boundary between the visible and
/// the future part, because the future bars are the ones directly following
/// the visible window.
///
/// ```md
/// start          visible_start        visible_end            end
///   |---- warmup ----|---- visible ----|---- pending future ---|
/// ```
#[derive(Debug, Clone)]
pub struct Segment {
    series: Arc<[Candle]>,
    start: usize,
    visible_start: usize,
    visible_end: usize,
    end: usize,
}

impl Segment {
    /// Bars preceding the visible window, used only as indicator lookback.
    pub fn warmup(&self) -> &[Candle] {
        &self.series[self.start..self.visible_start]
    }

    /// Bars currently shown to the player, including any already revealed.
    pub fn visible(&self) -> &[Candle] {
        &self.series[self.visible_start..self.visible_end]
    }

    /// Bars not revealed yet, in chronological order.
    pub fn pending_future(&self) -> &[Candle] {
        &self.series[self.visible_end..self.end]
    }

    /// Warm-up followed by the visible window; the lookback indicators run on.
    pub fn history(&self) -> &[Candle] {
        &self.series[self.start..self.visible_end]
    }

    pub fn last_visible(&self) -> Option<&Candle> {
        self.visible().last()
    }

    pub fn has_pending(&self) -> bool {
        self.visible_end < self.end
    }

    /// Index range of this segment within the full series.
    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Moves the next future bar into the visible window and returns it.
    pub(crate) fn reveal_next(&mut self) -> Option<&Candle> {
        if !self.has_pending() {
            return None;
        }
        self.visible_end += 1;
        self.series.get(self.visible_end - 1)
    }

    /// Drops the remaining future bars, e.g. when a position is closed early.
    pub(crate) fn discard_pending(&mut self) {
        self.end = self.visible_end;
    }
}

/// Draws a uniformly random window from `series`.
///
/// The start index is drawn from `0..=N - total`, so every full window of the
/// series, the last one included, is reachable. Fails with
/// [`DataError::InsufficientData`] instead of handing out a truncated window.
pub fn select_segment<R: Rng + ?Sized>(
    series: &Arc<[Candle]>,
    profile: TimeframeProfile,
    warmup_size: usize,
    rng: &mut R,
) -> ChartplayResult<Segment> {
    let available = series.len();
    let Some(total) = profile.total_with_warmup(warmup_size) else {
        return Err(DataError::InsufficientData {
            required: usize::MAX,
            available,
        }
        .into());
    };

    if available < total || profile.visible_count == 0 {
        return Err(DataError::InsufficientData {
            required: total.max(1),
            available,
        }
        .into());
    }

    let start = rng.random_range(0..=available - total);
    let visible_start = start + warmup_size;
    let visible_end = visible_start + profile.visible_count;

    Ok(Segment {
        series: Arc::clone(series),
        start,
        visible_start,
        visible_end,
        end: start + total,
    })
}

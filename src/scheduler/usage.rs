use crate::limits::{MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::*;

// ── Occupancy Sweep ──────────────────────────────────────────────

/// Sweep-line over weighted reservations: +q at start, -q at end.
///
/// Returns maximal segments of constant, non-zero occupancy sorted by start.
/// Equal timestamps are applied together, so back-to-back reservations never
/// produce a zero-length segment, and neighbouring segments with the same
/// quantity come out merged.
pub fn usage_segments<I>(reservations: I) -> Vec<UsageSegment>
where
    I: IntoIterator<Item = (Span, u32)>,
{
    let mut points: Vec<(Ms, i64)> = Vec::new();
    for (span, quantity) in reservations {
        if quantity == 0 {
            continue;
        }
        points.push((span.start, i64::from(quantity)));
        points.push((span.end, -i64::from(quantity)));
    }
    // Closing before opening at the same instant.
    points.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut result: Vec<UsageSegment> = Vec::new();
    let mut running: i64 = 0;
    let mut prev: Option<Ms> = None;

    for (time, delta) in points {
        if let Some(p) = prev
            && time > p
            && running > 0
        {
            let quantity = u32::try_from(running).unwrap_or(u32::MAX);
            push_segment(&mut result, p, time, quantity);
        }
        running += delta;
        prev = Some(time);
    }

    result
}

fn push_segment(out: &mut Vec<UsageSegment>, start: Ms, end: Ms, quantity: u32) {
    if let Some(last) = out.last_mut()
        && last.end == start
        && last.quantity == quantity
    {
        last.end = end;
        return;
    }
    out.push(UsageSegment { start, end, quantity });
}

/// Segments where occupancy reaches `capacity`, merged into disjoint spans.
///
/// With no units in service every instant is full, so the whole valid
/// timestamp range comes back as one span.
pub fn saturated_spans(segments: &[UsageSegment], capacity: u32) -> Vec<Span> {
    if capacity == 0 {
        return vec![Span::new(MIN_VALID_TIMESTAMP_MS, MAX_VALID_TIMESTAMP_MS)];
    }
    let full: Vec<Span> = segments
        .iter()
        .filter(|s| s.quantity >= capacity)
        .map(|s| Span::new(s.start, s.end))
        .collect();
    merge_overlapping(&full)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`. Both inputs sorted by start; `to_remove` disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

//! Recursive oversize expansion.
//!
//! A segment over the token ceiling is split along whatever structure it
//! carries: container members (header / per-member / footer), logical blocks
//! (greedy contiguous groups), or, when nothing else applies, raw line runs.
//! Every branch either shrinks the line range or falls through to the line
//! splitter, so the recursion terminates.

use super::{ChunkerConfig, Segment, token_estimate};

pub(crate) fn expand(
    segment: Segment,
    lines: &[&str],
    config: &ChunkerConfig,
    out: &mut Vec<Segment>,
) {
    if token_estimate(lines, segment.start, segment.end) <= config.max_tokens {
        out.push(segment);
        return;
    }
    if !segment.children.is_empty() {
        expand_container(segment, lines, config, out);
    } else if !segment.blocks.is_empty() {
        expand_blocks(segment, lines, config, out);
    } else {
        split_lines(&segment, lines, config, out);
    }
}

/// Split a container segment into header, per-member segments, and footer.
/// An undersize header is absorbed into the first member; an undersize
/// footer merges into the last emitted segment. Members keep their own
/// recorded blocks so an oversize method splits further on recursion.
fn expand_container(
    mut segment: Segment,
    lines: &[&str],
    config: &ChunkerConfig,
    out: &mut Vec<Segment>,
) {
    let children = std::mem::take(&mut segment.children);
    let mut children = clamp_disjoint(children, segment.start, segment.end);
    if children.is_empty() {
        split_lines(&segment, lines, config, out);
        return;
    }

    for child in &mut children {
        child.symbol = match (&segment.symbol, &child.symbol) {
            (Some(parent), Some(name)) => Some(format!("{parent}.{name}")),
            (None, Some(name)) => Some(name.clone()),
            (Some(parent), None) => Some(parent.clone()),
            (None, None) => None,
        };
    }

    let first_start = children[0].start;
    if first_start > segment.start {
        if token_estimate(lines, segment.start, first_start - 1) >= config.min_tokens {
            let header = Segment::plain(
                segment.start,
                first_start - 1,
                segment.kind.clone(),
                segment.symbol.clone(),
            );
            expand(header, lines, config, out);
        } else {
            children[0].start = segment.start;
        }
    }

    let last_end = children.last().map_or(segment.end, |c| c.end);
    for child in children {
        expand(child, lines, config, out);
    }

    if last_end < segment.end {
        if token_estimate(lines, last_end + 1, segment.end) >= config.min_tokens {
            let footer = Segment::plain(
                last_end + 1,
                segment.end,
                segment.kind.clone(),
                segment.symbol.clone(),
            );
            expand(footer, lines, config, out);
        } else if let Some(last) = out.last_mut() {
            last.end = segment.end;
        }
    }
}

/// Group consecutive logical blocks greedily under the token ceiling.
/// Closing a group and opening the next at `last_group_end + 1` keeps the
/// blank and comment lines between blocks; the final group always extends
/// to the segment end to cover the closing brace.
fn expand_blocks(
    mut segment: Segment,
    lines: &[&str],
    config: &ChunkerConfig,
    out: &mut Vec<Segment>,
) {
    let blocks = std::mem::take(&mut segment.blocks);
    let blocks = clamp_ranges(blocks, segment.start, segment.end);
    let Some(&(first_start, first_end)) = blocks.first() else {
        split_lines(&segment, lines, config, out);
        return;
    };

    if first_start > segment.start {
        let header = Segment::plain(
            segment.start,
            first_start - 1,
            segment.kind.clone(),
            segment.symbol.clone(),
        );
        expand(header, lines, config, out);
    }

    let mut groups = Vec::new();
    let mut group_start = first_start;
    let mut group_end = first_end;
    for &(_, block_end) in &blocks[1..] {
        if token_estimate(lines, group_start, block_end) > config.max_tokens {
            groups.push((group_start, group_end));
            group_start = group_end + 1;
        }
        group_end = block_end;
    }
    groups.push((group_start, segment.end));

    for (start, end) in groups {
        let group = Segment::plain(start, end, segment.kind.clone(), segment.symbol.clone());
        if token_estimate(lines, start, end) > config.max_tokens {
            split_lines(&group, lines, config, out);
        } else {
            out.push(group);
        }
    }
}

/// Last resort: split into contiguous line runs whose character counts stay
/// under `max_tokens × 4`, tagged `<kind>_part` with an increasing index.
fn split_lines(segment: &Segment, lines: &[&str], config: &ChunkerConfig, out: &mut Vec<Segment>) {
    let budget = config.max_tokens * 4;
    let kind = format!("{}_part", segment.kind);
    let mut index = 0;
    let mut part_start = segment.start;
    let mut accumulated = 0usize;

    for row in segment.start..=segment.end {
        let cost = lines.get(row).map_or(1, |l| l.chars().count() + 1);
        if accumulated > 0 && accumulated + cost > budget {
            out.push(part(segment, &kind, index, part_start, row - 1));
            index += 1;
            part_start = row;
            accumulated = 0;
        }
        accumulated += cost;
    }
    out.push(part(segment, &kind, index, part_start, segment.end));
}

fn part(segment: &Segment, kind: &str, index: usize, start: usize, end: usize) -> Segment {
    let symbol = match &segment.symbol {
        Some(s) => Some(format!("{s}.part{index}")),
        None => Some(format!("part{index}")),
    };
    Segment::plain(start, end, kind.to_string(), symbol)
}

/// Clamp child segments into the parent's range and drop any overlap with a
/// preceding sibling.
fn clamp_disjoint(children: Vec<Segment>, start: usize, end: usize) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();
    let mut floor = start;
    for mut child in children {
        child.start = child.start.max(floor);
        child.end = child.end.min(end);
        if child.start > child.end {
            continue;
        }
        floor = child.end + 1;
        out.push(child);
    }
    out
}

fn clamp_ranges(ranges: Vec<(usize, usize)>, start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut out: Vec<(usize, usize)> = Vec::new();
    let mut floor = start;
    for (mut s, mut e) in ranges {
        s = s.max(floor);
        e = e.min(end);
        if s > e {
            continue;
        }
        floor = e + 1;
        out.push((s, e));
    }
    out
}

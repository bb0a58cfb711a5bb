use crate::components::{BBox, ComponentSet, ComponentTag};
use crate::links::ObjectGroups;

// ── Text lines ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTag {
    Text,
    Merged,
    Ignored,
    Pathological,
}

/// Aggregated geometry of one text line.
///
/// `baseline` and `meanline` are pixel rows bounding the lowercase body;
/// `meanline <= baseline` and `x_height = baseline - meanline` hold by
/// construction.
#[derive(Debug, Clone)]
pub struct LineInfo {
    pub id: u32,
    pub members: Vec<u32>,
    pub bbox: BBox,
    pub baseline: usize,
    pub meanline: usize,
    pub x_height: usize,
    /// baseline − topmost member row (ascender band).
    pub a_height: usize,
    /// bottommost member row − baseline (descender band).
    pub d_height: usize,
    /// Member count.
    pub card: usize,
    pub char_width: f64,
    pub char_space: f64,
    pub tag: LineTag,
}

/// Ordered sequence of lines; id 0 is reserved.
#[derive(Debug, Clone)]
pub struct LineSet {
    lines: Vec<LineInfo>,
}

impl LineSet {
    /// A set with no lines (id 0 stays reserved).
    pub fn empty() -> LineSet {
        LineSet {
            lines: vec![LineInfo::sentinel()],
        }
    }

    /// Build lines from the link-induced equivalence classes.
    ///
    /// Classes with fewer than two object components form no line; their
    /// lone member is tagged Ignored in the component set, so afterwards
    /// every object component belongs to exactly one line or is Ignored.
    pub fn from_groups(set: &mut ComponentSet, groups: &mut ObjectGroups) -> LineSet {
        let mut lines = vec![LineInfo::sentinel()];

        for class in groups.classes() {
            let members: Vec<u32> = class
                .into_iter()
                .filter(|&id| set.get(id).tag == ComponentTag::Object)
                .collect();
            match members.len() {
                0 => {}
                1 => set.get_mut(members[0]).tag = ComponentTag::Ignored,
                _ => {
                    let id = lines.len() as u32;
                    lines.push(LineInfo::from_members(id, members, set));
                }
            }
        }

        LineSet { lines }
    }

    /// Number of real lines (sentinel excluded).
    pub fn len(&self) -> usize {
        self.lines.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: u32) -> &LineInfo {
        &self.lines[id as usize]
    }

    /// Real lines, id order.
    pub fn iter(&self) -> impl Iterator<Item = &LineInfo> {
        self.lines.iter().skip(1)
    }

    /// Lines that still carry text after merging and tagging.
    pub fn text_lines(&self) -> impl Iterator<Item = &LineInfo> {
        self.iter().filter(|line| line.tag == LineTag::Text)
    }

    /// Union of every non-ignored line's bbox.
    pub fn bbox_union(&self) -> Option<BBox> {
        self.iter()
            .filter(|line| line.tag != LineTag::Ignored)
            .map(|line| line.bbox)
            .reduce(|a, b| a.merge(&b))
    }

    fn get_mut(&mut self, id: u32) -> &mut LineInfo {
        &mut self.lines[id as usize]
    }
}

impl LineInfo {
    fn sentinel() -> LineInfo {
        LineInfo {
            id: 0,
            members: Vec::new(),
            bbox: BBox::point(0, 0),
            baseline: 0,
            meanline: 0,
            x_height: 0,
            a_height: 0,
            d_height: 0,
            card: 0,
            char_width: 0.0,
            char_space: 0.0,
            tag: LineTag::Ignored,
        }
    }

    fn from_members(id: u32, members: Vec<u32>, set: &ComponentSet) -> LineInfo {
        let mut line = LineInfo::sentinel();
        line.id = id;
        line.tag = LineTag::Text;
        line.members = members;
        line.recompute(set);
        line
    }

    /// Recompute every aggregate from the current member list.
    fn recompute(&mut self, set: &ComponentSet) {
        assert!(!self.members.is_empty());

        let bbox = self
            .members
            .iter()
            .map(|&id| set.get(id).bbox)
            .reduce(|a, b| a.merge(&b))
            .expect("non-empty members");

        self.baseline = weighted_median_bottom(&self.members, set);
        let dominant = dominant_height(&self.members, set, self.baseline);
        self.meanline = self.baseline.saturating_sub(dominant);
        self.x_height = self.baseline - self.meanline;
        self.a_height = self.baseline.saturating_sub(bbox.min_row);
        self.d_height = bbox.max_row.saturating_sub(self.baseline);
        self.card = self.members.len();

        self.char_width = self
            .members
            .iter()
            .map(|&id| set.get(id).width() as f64)
            .sum::<f64>()
            / self.members.len() as f64;

        // Mean gap between horizontally adjacent members.
        let mut order: Vec<u32> = self.members.clone();
        order.sort_by(|&a, &b| {
            set.get(a)
                .center
                .1
                .partial_cmp(&set.get(b).center.1)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if order.len() > 1 {
            let mut total = 0.0;
            for pair in order.windows(2) {
                let prev = set.get(pair[0]).bbox;
                let next = set.get(pair[1]).bbox;
                total += (next.min_col as f64 - prev.max_col as f64 - 1.0).max(0.0);
            }
            self.char_space = total / (order.len() - 1) as f64;
        } else {
            self.char_space = 0.0;
        }

        self.bbox = bbox;
    }
}

/// Median of member bbox-bottom rows, weighted by pixel count.
fn weighted_median_bottom(members: &[u32], set: &ComponentSet) -> usize {
    let mut bottoms: Vec<(usize, usize)> = members
        .iter()
        .map(|&id| {
            let comp = set.get(id);
            (comp.bbox.max_row, comp.pixel_count)
        })
        .collect();
    bottoms.sort_unstable();
    let total: usize = bottoms.iter().map(|&(_, weight)| weight).sum();
    let mut acc = 0;
    for (bottom, weight) in bottoms {
        acc += weight;
        if acc * 2 >= total {
            return bottom;
        }
    }
    unreachable!("weights sum to total");
}

/// Mode of member heights above the baseline, restricted to members
/// strictly above the class-median pixel count so that light punctuation
/// cannot set the x-height. When every member weighs the same the
/// restriction empties and the vote falls back to the full class.
fn dominant_height(members: &[u32], set: &ComponentSet, baseline: usize) -> usize {
    let mut counts: Vec<usize> = members.iter().map(|&id| set.get(id).pixel_count).collect();
    counts.sort_unstable();
    let median = counts[counts.len() / 2];

    let heavy: Vec<u32> = members
        .iter()
        .copied()
        .filter(|&id| set.get(id).pixel_count > median)
        .collect();
    let voters: &[u32] = if heavy.is_empty() { members } else { &heavy };

    let mut histogram: std::collections::BTreeMap<usize, usize> = std::collections::BTreeMap::new();
    for &id in voters {
        let height = baseline.saturating_sub(set.get(id).bbox.min_row);
        *histogram.entry(height).or_insert(0) += 1;
    }
    let mut best = (0usize, 0usize); // (count, height), smaller height on ties
    for (&height, &count) in &histogram {
        if count > best.0 {
            best = (count, height);
        }
    }
    best.1
}

// ── Merging ───────────────────────────────────────────────────────────────

/// Baseline offset tolerance as a fraction of the smaller x-height.
const MERGE_BASELINE_FRACTION: f64 = 0.2;
/// Acceptable x-height ratio band between merge partners.
const MERGE_XHEIGHT_RATIO: (f64, f64) = (0.6, 1.65);
/// Horizontal gap cap as a multiple of the larger char width.
const MERGE_GAP_FACTOR: f64 = 3.0;

/// Iteratively unify horizontally adjacent lines with compatible
/// baselines and x-heights. The loser of each merge is tagged Merged and
/// emptied; the winner's geometry is recomputed. Stops when a full pass
/// changes nothing.
pub fn text_merging(lines: &mut LineSet, set: &ComponentSet) {
    loop {
        let mut changed = false;

        'pass: for i in 1..=lines.len() as u32 {
            if lines.get(i).tag != LineTag::Text {
                continue;
            }
            for j in (i + 1)..=lines.len() as u32 {
                if lines.get(j).tag != LineTag::Text {
                    continue;
                }
                if mergeable(lines.get(i), lines.get(j)) {
                    let (winner, loser) = if lines.get(i).card >= lines.get(j).card {
                        (i, j)
                    } else {
                        (j, i)
                    };
                    let moved = std::mem::take(&mut lines.get_mut(loser).members);
                    lines.get_mut(loser).tag = LineTag::Merged;
                    lines.get_mut(loser).card = 0;
                    let win = lines.get_mut(winner);
                    win.members.extend(moved);
                    win.recompute(set);
                    changed = true;
                    break 'pass;
                }
            }
        }

        if !changed {
            break;
        }
    }
}

fn mergeable(a: &LineInfo, b: &LineInfo) -> bool {
    if a.x_height == 0 || b.x_height == 0 {
        return false;
    }
    let min_xh = a.x_height.min(b.x_height) as f64;
    let baseline_diff = (a.baseline as f64 - b.baseline as f64).abs();
    if baseline_diff >= MERGE_BASELINE_FRACTION * min_xh {
        return false;
    }

    let ratio = a.x_height as f64 / b.x_height as f64;
    if ratio < MERGE_XHEIGHT_RATIO.0 || ratio > MERGE_XHEIGHT_RATIO.1 {
        return false;
    }

    let (left, right) = if a.bbox.min_col <= b.bbox.min_col { (a, b) } else { (b, a) };
    let gap = (right.bbox.min_col as f64 - left.bbox.max_col as f64 - 1.0).max(0.0);
    gap <= MERGE_GAP_FACTOR * a.char_width.max(b.char_width)
}

// ── Pathology ─────────────────────────────────────────────────────────────

/// Minimum believable x-height in pixels.
const MIN_X_HEIGHT: usize = 4;
/// Minimum width/height ratio for a believable line.
const MIN_ASPECT: f64 = 1.5;

/// Tag lines that cannot be real text: sub-pixel x-heights, tall narrow
/// boxes, or lines swallowed whole by another line's bbox.
pub fn tag_pathological(lines: &mut LineSet) {
    let snapshots: Vec<(u32, BBox)> = lines
        .iter()
        .filter(|line| line.tag == LineTag::Text)
        .map(|line| (line.id, line.bbox))
        .collect();

    for &(id, bbox) in &snapshots {
        let line = lines.get(id);
        let aspect = bbox.width() as f64 / bbox.height() as f64;
        let engulfed = snapshots
            .iter()
            .any(|&(other, obox)| other != id && obox.contains(&bbox));
        if line.x_height < MIN_X_HEIGHT || aspect < MIN_ASPECT || engulfed {
            lines.get_mut(id).tag = LineTag::Pathological;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ComponentSet, Connectivity};
    use crate::image2d::{BitImage2, Image2D};
    use crate::links::{
        link_with_single_neighbor, merge_double_link, Direction, ObjectGroups,
    };

    fn set_from_rects(h: usize, w: usize, rects: &[(usize, usize, usize, usize)]) -> ComponentSet {
        let mut mask: BitImage2 = Image2D::new(h, w);
        for &(r0, c0, r1, c1) in rects {
            for r in r0..=r1 {
                for c in c0..=c1 {
                    mask.set(r, c, true);
                }
            }
        }
        ComponentSet::extract(&mask, Connectivity::Eight)
    }

    fn lines_of(set: &mut ComponentSet) -> LineSet {
        let right = link_with_single_neighbor(set, Direction::Right);
        let left = link_with_single_neighbor(set, Direction::Left);
        let merged = merge_double_link(&left, &right);
        let mut groups = ObjectGroups::from_links(&merged);
        LineSet::from_groups(set, &mut groups)
    }

    #[test]
    fn three_boxes_make_one_line_with_expected_metrics() {
        let mut set = set_from_rects(100, 100, &[(40, 10, 60, 30), (40, 40, 60, 60), (40, 70, 60, 90)]);
        let lines = lines_of(&mut set);
        assert_eq!(lines.len(), 1);

        let line = lines.get(1);
        assert_eq!(line.card, 3);
        assert_eq!(line.bbox, BBox { min_row: 40, min_col: 10, max_row: 60, max_col: 90 });
        assert_eq!(line.baseline, 60);
        assert_eq!(line.a_height, 20);
        assert_eq!(line.d_height, 0);
        assert_eq!(line.x_height, 20);
        assert!((line.char_width - 21.0).abs() < 1e-9);
        assert!((line.char_space - 9.0).abs() < 1e-9);
        assert!(line.meanline <= line.baseline);
    }

    #[test]
    fn singleton_component_is_ignored_not_lined() {
        let mut set = set_from_rects(100, 100, &[(40, 10, 60, 90)]);
        let lines = lines_of(&mut set);
        assert_eq!(lines.len(), 0);
        assert_eq!(set.get(1).tag, ComponentTag::Ignored);
    }

    #[test]
    fn every_component_lined_or_ignored() {
        let mut set = set_from_rects(
            120,
            200,
            &[
                (40, 10, 60, 30),
                (40, 40, 60, 60),
                (40, 70, 60, 90),
                (100, 5, 110, 8), // far-away speck, becomes a singleton
            ],
        );
        let lines = lines_of(&mut set);

        let mut lined: std::collections::BTreeSet<u32> = std::collections::BTreeSet::new();
        for line in lines.iter() {
            for &member in &line.members {
                assert!(lined.insert(member), "component {member} in two lines");
            }
        }
        for comp in set.iter() {
            let in_line = lined.contains(&comp.id);
            let ignored = comp.tag == ComponentTag::Ignored;
            assert!(in_line ^ ignored, "component {} must be lined xor ignored", comp.id);
        }
    }

    #[test]
    fn punctuation_does_not_set_the_x_height() {
        // Three full glyphs and two baseline dots: the dots outnumber no
        // one once the vote is restricted above the median pixel count.
        let set = set_from_rects(
            100,
            150,
            &[
                (40, 10, 60, 25),
                (40, 30, 60, 45),
                (40, 50, 60, 65),
                (58, 70, 60, 73),  // dot
                (58, 80, 60, 83),  // dot
            ],
        );
        let line = LineInfo::from_members(1, vec![1, 2, 3, 4, 5], &set);
        assert_eq!(line.baseline, 60);
        assert_eq!(line.x_height, 20);
        assert_eq!(line.meanline, 40);
    }

    #[test]
    fn compatible_halves_merge_into_one_line() {
        // Two groups on one baseline, the bridge gap small enough to merge.
        let mut set = set_from_rects(
            100,
            300,
            &[
                (40, 10, 60, 30),
                (40, 40, 60, 60),
                (40, 120, 60, 140),
                (40, 150, 60, 170),
            ],
        );
        let mut lines = lines_of(&mut set);
        assert_eq!(lines.len(), 2);

        text_merging(&mut lines, &set);
        let text: Vec<&LineInfo> = lines.text_lines().collect();
        assert_eq!(text.len(), 1);
        assert_eq!(text[0].card, 4);
        assert_eq!(text[0].bbox.min_col, 10);
        assert_eq!(text[0].bbox.max_col, 170);
        assert_eq!(
            lines.iter().filter(|l| l.tag == LineTag::Merged).count(),
            1
        );
    }

    #[test]
    fn incompatible_baselines_do_not_merge() {
        let mut set = set_from_rects(
            200,
            300,
            &[
                (40, 10, 60, 30),
                (40, 40, 60, 60),
                (140, 120, 160, 140),
                (140, 150, 160, 170),
            ],
        );
        let mut lines = lines_of(&mut set);
        assert_eq!(lines.len(), 2);
        text_merging(&mut lines, &set);
        assert_eq!(lines.text_lines().count(), 2);
    }

    #[test]
    fn pathological_lines_are_tagged() {
        // Tall narrow pair: aspect ratio far below 1.5.
        let mut set = set_from_rects(200, 60, &[(20, 10, 120, 14), (20, 18, 120, 22)]);
        let mut lines = lines_of(&mut set);
        assert_eq!(lines.len(), 1);
        tag_pathological(&mut lines);
        assert_eq!(lines.get(1).tag, LineTag::Pathological);
        assert_eq!(lines.text_lines().count(), 0);
    }

    #[test]
    fn bbox_union_spans_surviving_lines() {
        let mut set = set_from_rects(
            200,
            300,
            &[
                (40, 10, 60, 30),
                (40, 40, 60, 60),
                (140, 120, 160, 140),
                (140, 150, 160, 170),
            ],
        );
        let lines = lines_of(&mut set);
        let union = lines.bbox_union().expect("two lines");
        assert_eq!(union, BBox { min_row: 40, min_col: 10, max_row: 160, max_col: 170 });
    }
}

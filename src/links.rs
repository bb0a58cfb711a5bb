use crate::components::{Component, ComponentSet};
use crate::unionfind::UnionFind;

// ── Object linking ────────────────────────────────────────────────────────
//
// Each component nominates its nearest neighbor to the left and to the
// right along a horizontal ray cast from its mass center. A link survives
// only when both endpoints nominate each other, which eliminates most
// spurious jumps across gutters; a height-ratio filter then drops pairs
// of very different size, and the survivors induce the line groups.

/// Default bbox height-ratio above which a link is rejected.
pub const DEFAULT_HRATIO: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

/// One link per component id; a component with no neighbor links to
/// itself. Index 0 (background) always links to 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLinks {
    links: Vec<u32>,
}

impl ObjectLinks {
    /// Identity links over `n` components (+ background slot).
    pub fn identity(n: usize) -> Self {
        ObjectLinks {
            links: (0..=n as u32).collect(),
        }
    }

    #[inline]
    pub fn get(&self, id: u32) -> u32 {
        self.links[id as usize]
    }

    pub fn set(&mut self, id: u32, target: u32) {
        assert_ne!(id, 0, "background has no links");
        self.links[id as usize] = target;
    }

    /// Number of component slots (background excluded).
    pub fn len(&self) -> usize {
        self.links.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Real links only: `(source, target)` with `target != source`.
    pub fn iter_links(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.links
            .iter()
            .enumerate()
            .skip(1)
            .filter(|&(id, &target)| target != id as u32)
            .map(|(id, &target)| (id as u32, target))
    }
}

/// Maximum horizontal search distance for a source component:
/// `α · max(width, height)` with α = 1.
fn dmax(comp: &Component) -> f64 {
    comp.width().max(comp.height()) as f64
}

/// Per-row interval index over candidate y-extents. Bucket `r` holds every
/// linkable component whose bbox spans row `r`; one copy sorted by bbox
/// min_col serves rightward rays, one sorted by max_col serves leftward
/// rays. A query is a binary search plus a short walk.
struct RowIndex {
    by_min: Vec<Vec<(usize, u32)>>,
    by_max: Vec<Vec<(usize, u32)>>,
}

impl RowIndex {
    fn build(set: &ComponentSet, nrows: usize) -> Self {
        let mut by_min: Vec<Vec<(usize, u32)>> = vec![Vec::new(); nrows];
        let mut by_max: Vec<Vec<(usize, u32)>> = vec![Vec::new(); nrows];
        for comp in set.iter() {
            if !comp.is_object() {
                continue;
            }
            for r in comp.bbox.min_row..=comp.bbox.max_row.min(nrows - 1) {
                by_min[r].push((comp.bbox.min_col, comp.id));
                by_max[r].push((comp.bbox.max_col, comp.id));
            }
        }
        for bucket in by_min.iter_mut().chain(by_max.iter_mut()) {
            bucket.sort_unstable();
        }
        RowIndex { by_min, by_max }
    }
}

/// Nearest-neighbor links in one direction for every linkable component.
///
/// From the mass center of `s` a horizontal ray runs outward; the nearest
/// candidate whose bbox meets the ray within `dmax(s)`, whose mass center
/// lies strictly beyond `s`'s, and whose vertical span overlaps `s`'s is
/// chosen. Separators and ignored components neither link nor are linked.
pub fn link_with_single_neighbor(
    set: &ComponentSet,
    direction: Direction,
) -> ObjectLinks {
    let mut links = ObjectLinks::identity(set.len());
    let nrows = set.labels().nrows();
    if nrows == 0 || set.is_empty() {
        return links;
    }
    let index = RowIndex::build(set, nrows);

    for comp in set.iter() {
        if !comp.is_object() {
            continue;
        }
        let ray_row = (comp.center.0.round() as usize).min(nrows - 1);
        let reach = dmax(comp);

        let best = match direction {
            Direction::Right => nearest_right(set, &index.by_min[ray_row], comp, reach),
            Direction::Left => nearest_left(set, &index.by_max[ray_row], comp, reach),
        };
        if let Some(target) = best {
            links.set(comp.id, target);
        }
    }
    links
}

fn valid_target(set: &ComponentSet, source: &Component, id: u32) -> bool {
    if id == source.id {
        return false;
    }
    let target = set.get(id);
    target.is_object() && target.bbox.vertical_overlap(&source.bbox)
}

fn nearest_right(
    set: &ComponentSet,
    bucket: &[(usize, u32)],
    source: &Component,
    reach: f64,
) -> Option<u32> {
    let x = source.center.1;
    let split = bucket.partition_point(|&(min_col, _)| (min_col as f64) <= x);

    // Components overlapping the ray origin sit at distance zero; the one
    // starting furthest right wins among them.
    for &(_, id) in bucket[..split].iter().rev() {
        if !valid_target(set, source, id) {
            continue;
        }
        let target = set.get(id);
        if (target.bbox.max_col as f64) > x && target.center.1 > x {
            return Some(id);
        }
    }
    // Otherwise the first valid bbox within reach is the nearest.
    for &(min_col, id) in &bucket[split..] {
        if (min_col as f64) - x > reach {
            break;
        }
        if valid_target(set, source, id) && set.get(id).center.1 > x {
            return Some(id);
        }
    }
    None
}

/// Leftward mirror of `nearest_right`; `bucket` is sorted by bbox max_col.
fn nearest_left(
    set: &ComponentSet,
    bucket: &[(usize, u32)],
    source: &Component,
    reach: f64,
) -> Option<u32> {
    let x = source.center.1;
    let split = bucket.partition_point(|&(max_col, _)| (max_col as f64) < x);

    // Boxes straddling the ray origin sit at distance zero; the one ending
    // nearest the origin wins among them.
    for &(_, id) in &bucket[split..] {
        if !valid_target(set, source, id) {
            continue;
        }
        let target = set.get(id);
        if (target.bbox.min_col as f64) < x && target.center.1 < x {
            return Some(id);
        }
    }
    // Otherwise the first valid bbox within reach, walking leftward.
    for &(max_col, id) in bucket[..split].iter().rev() {
        if x - (max_col as f64) > reach {
            break;
        }
        if valid_target(set, source, id) && set.get(id).center.1 < x {
            return Some(id);
        }
    }
    None
}

/// Keep a link only when both endpoints nominate each other:
/// `merged[s] = right[s]` iff `left[right[s]] == s`.
pub fn merge_double_link(left: &ObjectLinks, right: &ObjectLinks) -> ObjectLinks {
    assert_eq!(left.len(), right.len());
    let mut merged = ObjectLinks::identity(right.len());
    for s in 1..=right.len() as u32 {
        let t = right.get(s);
        if t != s && left.get(t) == s {
            merged.set(s, t);
        }
    }
    merged
}

/// Reject links between components of too different heights. Rejected
/// links revert to self-links.
pub fn filter_links_hratio(set: &ComponentSet, links: &ObjectLinks, max_ratio: f64) -> ObjectLinks {
    let mut out = links.clone();
    for (s, t) in links.iter_links() {
        let hs = set.get(s).height() as f64;
        let ht = set.get(t).height() as f64;
        let ratio = hs.max(ht) / hs.min(ht);
        if ratio > max_ratio {
            out.set(s, s);
        }
    }
    out
}

// ── Grouping ──────────────────────────────────────────────────────────────

/// Equivalence classes over component ids induced by the surviving links.
pub struct ObjectGroups {
    uf: UnionFind,
}

impl ObjectGroups {
    pub fn from_links(links: &ObjectLinks) -> Self {
        let mut uf = UnionFind::new(links.len() + 1);
        for (s, t) in links.iter_links() {
            uf.union(s, t);
        }
        ObjectGroups { uf }
    }

    pub fn group_id(&mut self, id: u32) -> u32 {
        self.uf.find(id)
    }

    /// Member lists keyed by class, classes ordered by their smallest id.
    pub fn classes(&mut self) -> Vec<Vec<u32>> {
        let n = self.uf.len() as u32;
        let mut by_root: std::collections::BTreeMap<u32, Vec<u32>> = std::collections::BTreeMap::new();
        for id in 1..n {
            by_root.entry(self.uf.find(id)).or_default().push(id);
        }
        // BTreeMap iteration is root-ordered; roots are not ordered by
        // smallest member, so re-sort.
        let mut classes: Vec<Vec<u32>> = by_root.into_values().collect();
        classes.sort_by_key(|members| members[0]);
        classes
    }
}

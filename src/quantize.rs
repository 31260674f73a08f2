//! Octree color quantizer ("Adaptive Spatial Subdivision").
//!
//! Reduces an arbitrary RGB pixel stream to a palette of at most `max_colors`
//! representatives plus an exact map from every input color to a palette
//! index. Nodes live in a flat arena addressed by index, with parent
//! back-references instead of `Rc`/`RefCell` pointers.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};

/// The reference octree depth; `max_depth` in [`quantize`] defaults to this.
pub const DEFAULT_MAX_DEPTH: u8 = 8;

struct Node {
    // Never read: `reduce` and `assign` traverse with explicit stacks, not
    // by walking back up.
    #[allow(dead_code)]
    parent: Option<usize>,
    children: [Option<usize>; 8],
    depth: u8,
    low: [u8; 3],
    high: [u8; 3],
    center: [f64; 3],
    num_pixels_exclusive: u64,
    pixel_sums: [u64; 3],
    error: f64,
}

impl Node {
    fn new(parent: Option<usize>, low: [u8; 3], high: [u8; 3], depth: u8) -> Self {
        let center = [0, 1, 2].map(|i| (low[i] as f64 + high[i] as f64) / 2.0);
        Self {
            parent,
            children: [None; 8],
            depth,
            low,
            high,
            center,
            num_pixels_exclusive: 0,
            pixel_sums: [0; 3],
            error: 0.0,
        }
    }
}

/// Which of the 8 octants `color` falls in relative to this node's cube, and
/// the bounds of that child cube.
fn octant_for(node: &Node, color: [u8; 3]) -> (usize, [u8; 3], [u8; 3]) {
    let mut octant = 0usize;
    let mut child_low = [0u8; 3];
    let mut child_high = [0u8; 3];
    for i in 0..3 {
        let mid = node.low[i] + (node.high[i] - node.low[i]) / 2;
        if color[i] as u16 > mid as u16 {
            octant |= 1 << (2 - i);
            child_low[i] = mid + 1;
            child_high[i] = node.high[i];
        } else {
            child_low[i] = node.low[i];
            child_high[i] = mid;
        }
    }
    (octant, child_low, child_high)
}

struct Octree {
    nodes: Vec<Node>,
    max_depth: u8,
}

impl Octree {
    fn new(max_depth: u8) -> Self {
        Self {
            nodes: vec![Node::new(None, [0, 0, 0], [255, 255, 255], 0)],
            max_depth,
        }
    }

    fn classify(&mut self, color: [u8; 3]) {
        let mut cur = 0usize;
        loop {
            let dist = {
                let node = &self.nodes[cur];
                (0..3)
                    .map(|i| (color[i] as f64 - node.center[i]).powi(2))
                    .sum::<f64>()
            };
            self.nodes[cur].error += dist;

            if self.nodes[cur].depth == self.max_depth {
                let node = &mut self.nodes[cur];
                node.num_pixels_exclusive += 1;
                for (sum, &c) in node.pixel_sums.iter_mut().zip(color.iter()) {
                    *sum += c as u64;
                }
                return;
            }

            let (octant, child_low, child_high) = octant_for(&self.nodes[cur], color);
            let child_idx = match self.nodes[cur].children[octant] {
                Some(idx) => idx,
                None => {
                    let depth = self.nodes[cur].depth + 1;
                    let idx = self.nodes.len();
                    self.nodes.push(Node::new(Some(cur), child_low, child_high, depth));
                    self.nodes[cur].children[octant] = Some(idx);
                    idx
                }
            };
            cur = child_idx;
        }
    }

    /// Recursively absorbs `child`'s (already-pruned) descendants' exclusive
    /// totals into itself, then returns the child's totals to its caller for
    /// folding into the parent. `child` becomes permanently unreachable.
    fn prune(&mut self, parent: usize, octant: usize) {
        let child = self.nodes[parent].children[octant].take().expect("pruned an absent child");
        for slot in 0..8 {
            if self.nodes[child].children[slot].is_some() {
                self.prune(child, slot);
            }
        }
        let (count, sums) = (self.nodes[child].num_pixels_exclusive, self.nodes[child].pixel_sums);
        let parent_node = &mut self.nodes[parent];
        parent_node.num_pixels_exclusive += count;
        for (sum, s) in parent_node.pixel_sums.iter_mut().zip(sums.iter()) {
            *sum += s;
        }
    }

    fn representative_count(&self) -> usize {
        self.count_from(0)
    }

    fn count_from(&self, idx: usize) -> usize {
        let node = &self.nodes[idx];
        let mut count = if node.num_pixels_exclusive > 0 { 1 } else { 0 };
        for child in node.children.iter().flatten() {
            count += self.count_from(*child);
        }
        count
    }

    fn reduce(&mut self, max_colors: usize) -> Result<()> {
        let mut min_e = 0.0f64;
        loop {
            if self.representative_count() <= max_colors {
                return Ok(());
            }
            let mut next_min_e = f64::INFINITY;
            let mut stack = vec![0usize];
            let mut pruned_any = false;
            while let Some(idx) = stack.pop() {
                let children: Vec<(usize, usize)> = self.nodes[idx]
                    .children
                    .iter()
                    .enumerate()
                    .filter_map(|(o, c)| c.map(|c| (o, c)))
                    .collect();
                for (octant, child) in children {
                    if self.nodes[child].error <= min_e {
                        self.prune(idx, octant);
                        pruned_any = true;
                    } else {
                        if self.nodes[child].error < next_min_e {
                            next_min_e = self.nodes[child].error;
                        }
                        stack.push(child);
                    }
                }
            }
            if !pruned_any && !next_min_e.is_finite() {
                return Err(Error::QuantizerFailure);
            }
            min_e = next_min_e;
        }
    }

    /// Assigns a palette index (in preorder traversal order) to every
    /// remaining representative node, returning `(palette, index_by_node)`.
    fn assign(&self) -> (Vec<[u8; 3]>, HashMap<usize, u8>) {
        let mut palette = Vec::new();
        let mut index_by_node = HashMap::new();
        let mut stack = vec![0usize];
        // preorder, but push children in ascending octant order so traversal
        // order is deterministic
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.num_pixels_exclusive > 0 {
                let mean = [0, 1, 2].map(|i| (node.pixel_sums[i] / node.num_pixels_exclusive) as u8);
                index_by_node.insert(idx, palette.len() as u8);
                palette.push(mean);
            }
            for child in node.children.iter().flatten().rev() {
                stack.push(*child);
            }
        }
        (palette, index_by_node)
    }

    fn deepest_containing(&self, color: [u8; 3]) -> usize {
        let mut cur = 0usize;
        loop {
            if self.nodes[cur].depth == self.max_depth {
                return cur;
            }
            let (octant, _, _) = octant_for(&self.nodes[cur], color);
            match self.nodes[cur].children[octant] {
                Some(child) => cur = child,
                None => return cur,
            }
        }
    }
}

/// Result of quantizing a pixel stream: the reduced palette and an exact
/// mapping from every unique input color to its palette index.
pub struct Quantized {
    pub palette: Vec<[u8; 3]>,
    pub index_of: HashMap<[u8; 3], u8>,
}

/// Quantizes `colors` (an RGB pixel stream, duplicates expected) to at most
/// `max_colors` representatives, subdividing the cube to `max_depth` levels.
pub fn quantize(colors: &[[u8; 3]], max_colors: usize, max_depth: u8) -> Result<Quantized> {
    let mut tree = Octree::new(max_depth);
    for &c in colors {
        tree.classify(c);
    }
    tree.reduce(max_colors)?;
    let (palette, index_by_node) = tree.assign();

    let unique: HashSet<[u8; 3]> = colors.iter().copied().collect();
    let mut index_of = HashMap::with_capacity(unique.len());
    for color in unique {
        let node = tree.deepest_containing(color);
        let idx = *index_by_node
            .get(&node)
            .expect("deepest containing node must be a representative");
        index_of.insert(color, idx);
    }

    Ok(Quantized { palette, index_of })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bounds_palette_to_max_colors() {
        let colors: Vec<[u8; 3]> = (0..2000u32)
            .map(|i| [(i % 256) as u8, ((i * 3) % 256) as u8, ((i * 7) % 256) as u8])
            .collect();
        let q = quantize(&colors, 64, DEFAULT_MAX_DEPTH).unwrap();
        assert!(q.palette.len() <= 64);
        for c in &colors {
            let idx = q.index_of[c];
            assert!((idx as usize) < q.palette.len());
        }
    }

    #[test]
    fn single_color_quantizes_to_one_entry() {
        let colors = vec![[10, 20, 30]; 100];
        let q = quantize(&colors, 256, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(q.palette.len(), 1);
        assert_eq!(q.palette[0], [10, 20, 30]);
    }

    #[test]
    fn fewer_colors_than_cap_are_not_merged() {
        let colors = vec![[0, 0, 0], [255, 255, 255], [128, 64, 32]];
        let q = quantize(&colors, 256, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(q.palette.len(), 3);
    }
}
